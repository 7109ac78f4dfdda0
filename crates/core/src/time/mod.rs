pub mod market;

use std::time::Duration;

/// Retry delay before attempt `attempt + 1`: `base` doubled per prior attempt,
/// saturating instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
