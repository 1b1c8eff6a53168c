use crate::error::{Error, Result, StoreError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs a collaborator call under `limit`.
///
/// Both a store failure and an elapsed deadline surface as
/// [`Error::Transient`] tagged with `operation`.
pub(crate) async fn bounded<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => {
            warn!(operation, error = %source, "collaborator call failed");
            Err(Error::transient(operation, source))
        }
        Err(elapsed) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "collaborator call timed out");
            Err(Error::transient(operation, Box::new(elapsed)))
        }
    }
}
