use std::future::Future;
use std::time::Duration;

/// Run `op` up to `max_attempts` times with a fixed delay between attempts.
/// Returns the first success, or the last error once attempts are exhausted;
/// the caller decides how to degrade.
pub async fn with_retries<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    debug_assert!(max_attempts >= 1);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    match last_err {
        Some(err) => Err(err),
        None => unreachable!("with_retries called with zero attempts"),
    }
}
