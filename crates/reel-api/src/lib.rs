pub mod auth;
pub mod error;
pub mod extractors;
pub mod friends;
pub mod graph;
pub mod ingest;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod relations;
pub mod response;
pub mod routes;
pub mod thumbnail;
pub mod videos;

use tracing::error;

use crate::error::ServiceError;

/// Runs synchronous storage work on the blocking pool.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ServiceError::Internal
    })?
}
