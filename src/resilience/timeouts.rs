//! Deadline enforcement for calls leaving the process.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A zero deadline means "no deadline"

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The deadline elapsed before the call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} elapsed")]
pub struct DeadlineElapsed(pub Duration);

/// Run `fut`, giving up after `deadline`.
pub async fn bounded<F, T>(deadline: Duration, fut: F) -> Result<T, DeadlineElapsed>
where
    F: Future<Output = T>,
{
    if deadline.is_zero() {
        return Ok(fut.await);
    }
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineElapsed(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let out = bounded(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_elapsed_deadline() {
        let out = bounded(Duration::from_millis(20), tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out, Err(DeadlineElapsed(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_zero_deadline_disables_timeout() {
        let out = bounded(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "done"
        })
        .await;
        assert_eq!(out, Ok("done"));
    }
}
