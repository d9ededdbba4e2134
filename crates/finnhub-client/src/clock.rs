use async_trait::async_trait;
use std::time::Duration;

/// How the client waits between attempts.
#[async_trait]
pub trait RetryClock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Suspends the calling task on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl RetryClock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
