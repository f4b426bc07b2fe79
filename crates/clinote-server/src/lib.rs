// crates/clinote-server/src/lib.rs
//! Clinical-note analytics server: job manager, progress bus, and the HTTP
//! surface binding them to the persistence gateway.

pub mod error;
pub mod jobs;
pub mod metrics;
pub mod progress_bus;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
