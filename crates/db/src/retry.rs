use std::{future::Future, time::Duration};

const MAX_RETRIES: usize = 3;
const INITIAL_BACKOFF_MS: u64 = 50;
const MAX_BACKOFF_MS: u64 = 1_000;

/// Errors that may wrap a transient SQLITE_BUSY and are safe to re-run.
pub(crate) trait MaybeBusy {
    fn is_sqlite_busy(&self) -> bool;
}

impl MaybeBusy for sqlx::Error {
    fn is_sqlite_busy(&self) -> bool {
        let Some(db_err) = self.as_database_error() else {
            return false;
        };

        if let Some(code) = db_err.code() {
            if code == "5" || code == "6" {
                return true;
            }
        }

        let message = db_err.message();
        message.contains("database is locked") || message.contains("database is busy")
    }
}

pub(crate) async fn retry_on_sqlite_busy<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    E: MaybeBusy,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
    for attempt in 0..=MAX_RETRIES {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_sqlite_busy() && attempt < MAX_RETRIES => {
                tokio::time::sleep(backoff).await;
                let next_ms = (backoff.as_millis() as u64)
                    .saturating_mul(2)
                    .min(MAX_BACKOFF_MS);
                backoff = Duration::from_millis(next_ms);
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop returns on success or error")
}
