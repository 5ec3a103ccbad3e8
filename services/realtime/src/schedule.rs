//! Daily batch scheduling against the market-local clock.

use chrono::{Duration as ChronoDuration, TimeZone};
use std::time::Duration;

const FALLBACK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Time until the next daily occurrence of `hour:minute`, market-local.
pub fn duration_until(hour: u32, minute: u32) -> Duration {
    let now = tickflow_codec::market_now();
    let target_time = match now.date_naive().and_hms_opt(hour, minute, 0) {
        Some(t) => t,
        None => return FALLBACK_INTERVAL,
    };
    let target = match now.offset().from_local_datetime(&target_time).single() {
        Some(t) => t,
        None => return FALLBACK_INTERVAL,
    };
    let target = if target <= now {
        target + ChronoDuration::days(1)
    } else {
        target
    };
    (target - now).to_std().unwrap_or(FALLBACK_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_positive_and_within_a_day() {
        let delay = duration_until(15, 0);
        assert!(delay > Duration::ZERO);
        assert!(delay <= Duration::from_secs(24 * 3600));
    }

    #[test]
    fn invalid_time_falls_back_to_a_day() {
        assert_eq!(duration_until(24, 0), FALLBACK_INTERVAL);
    }
}
