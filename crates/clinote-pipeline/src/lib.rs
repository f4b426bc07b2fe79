//! Orchestration layer binding the Dictionary Loader, Pattern Index, and
//! Chunk Executor into one extraction run. The Job Manager (clinote-server)
//! is the only caller.

pub mod chunk_executor;
pub mod dictionary_loader;
pub mod uploader;

pub use chunk_executor::{run as run_chunk_executor, ExecutorOutcome, ProgressUpdate};
pub use dictionary_loader::load as load_dictionary;
pub use uploader::{run as run_upload, UploadOutcome};
