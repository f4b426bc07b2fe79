// crates/clinote-server/src/jobs/types.rs
//! Parameters accepted by the Job Manager when a route enqueues work.

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub tenant_id: String,
    pub file_path: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub tenant_id: String,
}
