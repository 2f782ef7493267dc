pub mod analysis;
pub mod job_store;
pub mod photo_service;
pub mod producer;
pub mod queue;
pub mod redis_queue;
pub mod storage;
pub mod worker;

use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`, turning an elapsed timer into `on_timeout()`.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
