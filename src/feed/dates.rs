use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Timestamp recorded for items whose publish date can't be read.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// RFC 1123 without the weekday and zone. The weekday is checked for shape
/// only (see [`strip_weekday`]) and the zone is handled per format.
const RFC1123_BODY: &str = "%d %b %Y %H:%M:%S";

const HOUR: i32 = 3600;

/// Converts an RSS `pubDate` into a UTC timestamp.
///
/// Tries, in order:
///
/// 1. RFC 1123 with a numeric zone: `Mon, 02 Jan 2006 15:04:05 -0700`
/// 2. RFC 1123 with a named zone: `Mon, 02 Jan 2006 15:04:05 MST`
///
/// and returns [`ZERO_TIME`] when neither matches. Never fails, so a bad date
/// can't stop ingestion.
///
/// # Examples
///
/// ```
/// use gator::feed::{normalize_pub_date, ZERO_TIME};
///
/// let ts = normalize_pub_date("Mon, 02 Jan 2006 15:04:05 -0700");
/// assert_eq!(ts.to_rfc3339(), "2006-01-02T22:04:05+00:00");
///
/// assert_eq!(normalize_pub_date("last tuesday"), ZERO_TIME);
/// ```
pub fn normalize_pub_date(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    parse_numeric_zone(raw)
        .or_else(|| parse_named_zone(raw))
        .unwrap_or_else(|| {
            tracing::debug!(raw = %raw, "Unparseable publish date, using zero time");
            ZERO_TIME
        })
}

fn parse_numeric_zone(raw: &str) -> Option<DateTime<Utc>> {
    let body = strip_weekday(raw)?;
    DateTime::parse_from_str(body, &format!("{RFC1123_BODY} %z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_named_zone(raw: &str) -> Option<DateTime<Utc>> {
    let body = strip_weekday(raw)?;
    let (stamp, zone) = body.rsplit_once(' ')?;
    let offset = FixedOffset::east_opt(named_zone_offset(zone)?)?;
    let naive = NaiveDateTime::parse_from_str(stamp, RFC1123_BODY).ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Drops a leading `Mon, ` after checking it is three letters.
///
/// Feeds often carry a weekday that disagrees with the date; only its shape
/// is validated, its value is ignored.
fn strip_weekday(raw: &str) -> Option<&str> {
    let (weekday, rest) = raw.split_once(", ")?;
    if weekday.len() == 3 && weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Offset in seconds east of UTC for an RFC 822 zone name.
///
/// Unknown all-caps abbreviations are accepted at zero offset; anything else
/// is not a zone name.
fn named_zone_offset(zone: &str) -> Option<i32> {
    let offset = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5 * HOUR,
        "EDT" => -4 * HOUR,
        "CST" => -6 * HOUR,
        "CDT" => -5 * HOUR,
        "MST" => -7 * HOUR,
        "MDT" => -6 * HOUR,
        "PST" => -8 * HOUR,
        "PDT" => -7 * HOUR,
        other if (3..=5).contains(&other.len()) && other.chars().all(|c| c.is_ascii_uppercase()) => 0,
        _ => return None,
    };
    Some(offset)
}
