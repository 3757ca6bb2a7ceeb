//! Pure formatting helpers consumed by UIs.

use chrono::Duration;

/// Whole seconds, rounded down; negative durations count as zero.
pub fn whole_secs(d: Duration) -> u64 {
    d.num_seconds().max(0) as u64
}

/// `HH:MM:SS`, zero-padded. Hours keep counting past 24.
pub fn format_hms(d: Duration) -> String {
    let secs = whole_secs(d);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Time left against an estimate, never negative. `None` without an estimate.
pub fn remaining(estimate: Option<Duration>, elapsed: Duration) -> Option<Duration> {
    estimate.map(|target| {
        let left = target - elapsed;
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded() {
        assert_eq!(format_hms(Duration::zero()), "00:00:00");
        assert_eq!(format_hms(Duration::seconds(125)), "00:02:05");
        assert_eq!(format_hms(Duration::seconds(3600 * 27)), "27:00:00");
    }

    #[test]
    fn floors_fractional_seconds() {
        assert_eq!(format_hms(Duration::milliseconds(59_999)), "00:00:59");
    }

    #[test]
    fn negative_is_zero() {
        assert_eq!(format_hms(Duration::seconds(-5)), "00:00:00");
        assert_eq!(whole_secs(Duration::seconds(-5)), 0);
    }

    #[test]
    fn remaining_saturates() {
        assert_eq!(remaining(None, Duration::seconds(10)), None);
        assert_eq!(
            remaining(Some(Duration::minutes(1)), Duration::seconds(45)),
            Some(Duration::seconds(15))
        );
        assert_eq!(
            remaining(Some(Duration::minutes(1)), Duration::minutes(5)),
            Some(Duration::zero())
        );
    }
}
