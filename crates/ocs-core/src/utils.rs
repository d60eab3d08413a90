//! Duration and decimal helpers shared by the charging models

use chrono::Duration;
use rust_decimal::Decimal;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds in `d`, saturating on overflow
pub fn nanos(d: Duration) -> i64 {
    d.num_nanoseconds().unwrap_or(if d < Duration::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// `d` expressed in (fractional) seconds
pub fn seconds(d: Duration) -> Decimal {
    Decimal::from(nanos(d)) / Decimal::from(NANOS_PER_SECOND)
}

/// Number of `step`s needed to cover `d`, rounding up
pub fn ceil_div(d: Duration, step: Duration) -> i64 {
    let (d, step) = (nanos(d), nanos(step));
    if step <= 0 || d <= 0 {
        return 0;
    }
    d / step + i64::from(d % step != 0)
}

/// `step` repeated `times`
pub fn times(step: Duration, times: i64) -> Duration {
    Duration::nanoseconds(nanos(step).saturating_mul(times))
}

/// Rounds `d` up to the next multiple of `step`
pub fn round_up(d: Duration, step: Duration) -> Duration {
    if nanos(step) <= 0 {
        return d;
    }
    times(step, ceil_div(d, step))
}

/// Serde adapter storing `chrono::Duration` as integer nanoseconds
pub mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(super::nanos(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::nanoseconds(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(Duration::seconds(10)), dec!(10));
        assert_eq!(seconds(Duration::milliseconds(1500)), dec!(1.5));
    }

    #[test]
    fn test_ceil_div_and_round_up() {
        assert_eq!(ceil_div(Duration::seconds(10), Duration::seconds(60)), 1);
        assert_eq!(ceil_div(Duration::seconds(61), Duration::seconds(60)), 2);
        assert_eq!(ceil_div(Duration::seconds(60), Duration::zero()), 0);
        assert_eq!(
            round_up(Duration::seconds(10), Duration::minutes(1)),
            Duration::minutes(1)
        );
        assert_eq!(
            round_up(Duration::seconds(7), Duration::zero()),
            Duration::seconds(7)
        );
    }

    #[test]
    fn test_ceil_div_near_max_duration() {
        let longest = Duration::nanoseconds(i64::MAX);
        assert_eq!(ceil_div(longest, Duration::nanoseconds(2)), i64::MAX / 2 + 1);
        assert_eq!(ceil_div(longest, Duration::seconds(1)), i64::MAX / 1_000_000_000 + 1);
        assert_eq!(ceil_div(longest, Duration::nanoseconds(1)), i64::MAX);
    }
}
