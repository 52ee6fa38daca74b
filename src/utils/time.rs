use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current UTC time as an RFC 3339 string with a `Z` suffix.
pub(crate) fn utc_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Milliseconds since the Unix epoch, used for time-derived request ids.
pub(crate) fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_timestamp_is_rfc3339_with_z_suffix() {
        let stamp = utc_timestamp();
        assert!(stamp.ends_with('Z'), "expected Z suffix, got {stamp}");
        let parsed = OffsetDateTime::parse(&stamp, &Rfc3339).expect("parseable timestamp");
        assert!(parsed.offset().is_utc());
    }

    #[test]
    fn unix_millis_is_monotonic_enough() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
    }
}
