//! Fetch retry policy
//!
//! Only transient extractor failures are retried, and only while attempts
//! remain. Backoff sleeps end early when shutdown is requested.

use crate::extractor::ExtractorError;
use crate::shutdown::SharedShutdown;
use std::time::Duration;
use tracing::warn;

/// Whether attempt number `attempt` (1-based) that failed with `err` should
/// be followed by another one.
pub fn should_retry(err: &ExtractorError, attempt: u32, max_attempts: u32) -> bool {
    err.is_transient() && attempt < max_attempts
}

/// Sleep for `backoff`; returns `false` if shutdown interrupted the wait.
pub async fn wait_backoff(backoff: Duration, shutdown: Option<&SharedShutdown>) -> bool {
    match shutdown {
        Some(shutdown) => {
            if shutdown.is_shutdown_requested() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(backoff) => true,
                _ = shutdown.wait_for_shutdown() => {
                    warn!("Shutdown requested during retry backoff");
                    false
                }
            }
        }
        None => {
            tokio::time::sleep(backoff).await;
            true
        }
    }
}
