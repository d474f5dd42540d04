//! Timeout headers.
//!
//! - Connect: `connect-timeout-ms`, a decimal millisecond count of at most 10 digits
//! - gRPC and gRPC-Web: `grpc-timeout`, at most 8 digits followed by a unit letter

use std::time::Duration;

/// Header name for Connect timeouts.
pub const CONNECT_TIMEOUT_MS: &str = "connect-timeout-ms";

/// Header name for gRPC timeouts.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// The largest value a `grpc-timeout` can carry.
const GRPC_TIMEOUT_MAX_VALUE: u128 = 99_999_999;

/// The largest value a `connect-timeout-ms` can carry.
const CONNECT_TIMEOUT_MAX_MS: u128 = 9_999_999_999;

/// Encode a `grpc-timeout` value.
///
/// The finest unit among nanoseconds, microseconds and milliseconds whose
/// value fits in 8 digits is chosen, unless the value is a whole multiple of
/// the next unit up. Seconds are the fallback, clamped to `99999999S`.
pub fn encode_grpc_timeout(timeout: Duration) -> String {
    let nanos = timeout.as_nanos();
    for (per_unit, unit) in [(1, 'n'), (1_000, 'u'), (1_000_000, 'm')] {
        let value = nanos / per_unit;
        if value <= GRPC_TIMEOUT_MAX_VALUE && value % 1_000 != 0 {
            return format!("{value}{unit}");
        }
    }
    let seconds = (nanos / 1_000_000_000).min(GRPC_TIMEOUT_MAX_VALUE);
    format!("{seconds}S")
}

/// Parse a `grpc-timeout` value.
///
/// Returns `None` for anything other than 1 to 8 digits followed by one of
/// `H`, `M`, `S`, `m`, `u` or `n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (digits, unit) = value.split_at_checked(value.len().checked_sub(1)?)?;
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

/// Encode a `connect-timeout-ms` value, clamped to 10 digits.
pub fn encode_connect_timeout(timeout: Duration) -> String {
    timeout.as_millis().min(CONNECT_TIMEOUT_MAX_MS).to_string()
}

/// Parse a `connect-timeout-ms` value of 1 to 10 digits.
pub fn parse_connect_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || value.len() > 10 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_grpc_timeout_unit_selection() {
        assert_eq!(encode_grpc_timeout(Duration::from_nanos(1)), "1n");
        assert_eq!(encode_grpc_timeout(Duration::from_nanos(1_000)), "1u");
        assert_eq!(encode_grpc_timeout(Duration::from_nanos(1_500)), "1500n");
        assert_eq!(encode_grpc_timeout(Duration::from_millis(2_500)), "2500m");
        assert_eq!(encode_grpc_timeout(Duration::from_secs(1)), "1S");
        assert_eq!(encode_grpc_timeout(Duration::from_secs(10)), "10S");
        assert_eq!(encode_grpc_timeout(Duration::ZERO), "0S");
    }

    #[test]
    fn test_encode_grpc_timeout_too_precise_falls_to_coarser_unit() {
        // 123456789 ns needs 9 digits
        assert_eq!(encode_grpc_timeout(Duration::from_nanos(123_456_789)), "123456u");
    }

    #[test]
    fn test_encode_grpc_timeout_clamps() {
        assert_eq!(encode_grpc_timeout(Duration::from_secs(99_999_999)), "99999999S");
        assert_eq!(encode_grpc_timeout(Duration::from_secs(100_000_000)), "99999999S");
        assert_eq!(encode_grpc_timeout(Duration::MAX), "99999999S");
    }

    #[test]
    fn test_parse_grpc_timeout() {
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("3S"), Some(Duration::from_secs(3)));
        assert_eq!(parse_grpc_timeout("2500m"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_grpc_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("1n"), Some(Duration::from_nanos(1)));
    }

    #[test]
    fn test_parse_grpc_timeout_rejects_malformed() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn test_grpc_timeout_round_trip() {
        for timeout in [
            Duration::from_nanos(7),
            Duration::from_micros(250),
            Duration::from_millis(1_500),
            Duration::from_secs(30),
            Duration::from_secs(3_600),
        ] {
            assert_eq!(parse_grpc_timeout(&encode_grpc_timeout(timeout)), Some(timeout));
        }
    }

    #[test]
    fn test_connect_timeout() {
        assert_eq!(encode_connect_timeout(Duration::from_millis(2_500)), "2500");
        assert_eq!(encode_connect_timeout(Duration::from_micros(10)), "0");
        assert_eq!(parse_connect_timeout("2500"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_connect_timeout("9999999999"), Some(Duration::from_millis(9_999_999_999)));
    }

    #[test]
    fn test_connect_timeout_clamps() {
        // 11 digits worth of milliseconds
        assert_eq!(
            encode_connect_timeout(Duration::from_millis(12_345_678_901)),
            "9999999999"
        );
        assert_eq!(encode_connect_timeout(Duration::MAX), "9999999999");
    }

    #[test]
    fn test_parse_connect_timeout_rejects_malformed() {
        assert_eq!(parse_connect_timeout(""), None);
        assert_eq!(parse_connect_timeout("abc"), None);
        assert_eq!(parse_connect_timeout("-5"), None);
        assert_eq!(parse_connect_timeout("12345678901"), None);
    }
}
