use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_interval`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration '{0}'")]
    Invalid(String),
    #[error("missing unit in duration '{0}' (use ns, us, ms, s, m or h)")]
    MissingUnit(String),
    #[error("unknown unit '{unit}' in duration '{input}' (use ns, us, ms, s, m or h)")]
    UnknownUnit { unit: String, input: String },
    #[error("duration '{0}' must be greater than zero")]
    NotPositive(String),
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Fractional digits beyond this are ignored (far below nanosecond precision).
const MAX_FRACTION_DIGITS: usize = 18;

/// Parses a polling interval such as `"30s"`, `"1m"`, `"1h30m"` or `"1.5s"`.
///
/// Each component is a decimal number followed by a unit: `ns`, `us` (or
/// `µs`), `ms`, `s`, `m`, `h`. Components add up. The result must be
/// positive, since a zero period can't drive a timer.
///
/// # Examples
///
/// ```
/// use gator::util::parse_interval;
/// use std::time::Duration;
///
/// assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_interval("1h30m").unwrap(), Duration::from_secs(5400));
/// assert!(parse_interval("ten seconds").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }
    if s.starts_with('-') {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Err(IntervalError::NotPositive(input.to_string()));
    }

    let overflow = || IntervalError::Overflow(input.to_string());
    let mut rest = s;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(IntervalError::Invalid(input.to_string()));
        }
        if unit.is_empty() {
            return Err(IntervalError::MissingUnit(input.to_string()));
        }
        let unit_nanos = unit_in_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| overflow())?;
            let scale = 10u128.pow(fraction.len() as u32);
            nanos = nanos
                .checked_add(digits * unit_nanos / scale)
                .ok_or_else(overflow)?;
        }

        total_nanos = total_nanos.checked_add(nanos).ok_or_else(overflow)?;
    }

    if total_nanos == 0 {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    let nanos = u64::try_from(total_nanos).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(nanos))
}

fn unit_in_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}
