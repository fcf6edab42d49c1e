//! Exponential backoff schedule for payout job retries, capped so a
//! misbehaving bet doesn't push `nextAttemptAt` out for hours.

use chrono::Duration;

const BASE_SECONDS: i64 = 2;
const CAP_SECONDS: i64 = 5 * 60;

pub fn backoff_for(attempts: i32) -> Duration {
    let exp = BASE_SECONDS.saturating_pow(attempts.max(1) as u32).min(CAP_SECONDS);
    Duration::seconds(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(backoff_for(1), Duration::seconds(2));
        assert_eq!(backoff_for(2), Duration::seconds(4));
        assert_eq!(backoff_for(20), Duration::seconds(CAP_SECONDS));
    }
}
