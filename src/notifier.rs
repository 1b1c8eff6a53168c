use crate::error::StoreError;
use crate::model::TokenNotice;
use async_trait::async_trait;

/// Delivers freshly issued verification tokens to their owners.
///
/// Delivery is best effort: the service logs a failed publish and keeps the
/// token, so the user can ask for a resend.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hands `notice` to the delivery pipeline.
    async fn publish(&self, notice: TokenNotice) -> std::result::Result<(), StoreError>;
}

/// Notifier that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _notice: TokenNotice) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}
