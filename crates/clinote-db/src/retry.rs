// crates/clinote-db/src/retry.rs
//! Batch-level retry for transient store errors. Kept separate from the
//! query bodies so retry logic never gets tangled up with business logic.

use std::future::Future;
use std::time::Duration;

/// Connectivity/lock-timeout errors are retried; anything else (malformed
/// SQL, constraint violations outside the conflict clause) is not.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message().to_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

/// Retries `f` up to `max_attempts` total tries with a short fixed backoff,
/// only for errors classified transient by `is_transient`.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, f: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}
