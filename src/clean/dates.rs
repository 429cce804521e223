use chrono::NaiveDate;

/// Fast parse of `"YYYY-MM-DD"` (optionally with a `" HH:MM:SS"` or
/// `"THH:MM:SS"` suffix) → millis UTC. Anything else is `None`.
pub fn parse_review_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    let b = s.as_bytes();
    // minimal length + separators check
    if b.len() < 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(5..7)?.parse().ok()?;
    let day: u32 = s.get(8..10)?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let naive = if b.len() == 10 {
        date.and_hms_opt(0, 0, 0)?
    } else {
        if b.len() < 19 || (b[10] != b' ' && b[10] != b'T') {
            return None;
        }
        let hour: u32 = s.get(11..13)?.parse().ok()?;
        let min: u32 = s.get(14..16)?.parse().ok()?;
        let sec: u32 = s.get(17..19)?.parse().ok()?;
        date.and_hms_opt(hour, min, sec)?
    };

    Some(naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates() {
        let ts = parse_review_millis("2022-01-01").expect("should parse");
        let expected = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(ts, expected);
    }

    #[test]
    fn parses_dates_with_time_suffix() {
        let ts = parse_review_millis("2019-06-23 14:30:05").expect("should parse");
        let expected = NaiveDate::from_ymd_opt(2019, 6, 23)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(ts, expected);
        assert_eq!(parse_review_millis("2019-06-23T14:30:05"), Some(expected));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert!(parse_review_millis(" 2022-01-01 ").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_review_millis("bad-date"), None);
        assert_eq!(parse_review_millis(""), None);
        assert_eq!(parse_review_millis("2022/01/01"), None);
        assert_eq!(parse_review_millis("2022-13-01"), None);
        assert_eq!(parse_review_millis("2022-01-01x12:00:00"), None);
    }
}
