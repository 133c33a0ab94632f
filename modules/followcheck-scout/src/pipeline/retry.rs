use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use followcheck_common::PageError;

use crate::traits::{PageAccessor, Snapshot};

/// Take a snapshot, retrying transient failures up to `attempts` times with a
/// linear backoff (`backoff * attempt`) plus up to 20% jitter.
///
/// Returns `Ok(None)` when every attempt failed transiently; the caller treats
/// that as an unproductive step. Fatal errors propagate immediately.
pub async fn snapshot_with_retry(
    page: &dyn PageAccessor,
    attempts: u32,
    backoff: Duration,
) -> Result<Option<Snapshot>, PageError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match page.snapshot().await {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                if attempt == attempts {
                    warn!(attempt, error = %e, "Snapshot failed, giving up on this step");
                    break;
                }
                let delay = backoff * attempt;
                debug!(
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Snapshot failed, retrying after backoff"
                );
                tokio::time::sleep(delay + jitter(delay)).await;
            }
        }
    }
    Ok(None)
}

/// Random delay in `min..=max`, used to space out requests.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

fn jitter(base: Duration) -> Duration {
    random_delay(Duration::ZERO, base / 5)
}
