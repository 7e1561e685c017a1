//! Publication-date parsing for Indonesian news pages.
//!
//! Outlets print dates like `"Selasa, 12 Mar 2024 14:35 WIB"` or
//! `"12 Maret 2024"`; APIs hand out ISO-8601 strings. Everything is parsed to
//! a timezone-less [`NaiveDateTime`] in the outlet's local time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Month number for an Indonesian (or English) month name or abbreviation.
fn month_number(token: &str) -> Option<u32> {
    let m = match token {
        "januari" | "january" | "jan" => 1,
        "februari" | "pebruari" | "february" | "feb" | "peb" => 2,
        "maret" | "march" | "mar" => 3,
        "april" | "apr" => 4,
        "mei" | "may" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "agustus" | "august" | "agu" | "agt" | "ags" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "oktober" | "october" | "okt" | "oct" => 10,
        "november" | "nopember" | "nov" | "nop" => 11,
        "desember" | "december" | "des" | "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn parse_clock(token: &str) -> Option<NaiveTime> {
    let normalized = token.replace('.', ":");
    NaiveTime::parse_from_str(&normalized, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&normalized, "%H:%M:%S"))
        .ok()
}

/// Parse a `"<day> <month name> <year> [HH:MM]"` date anywhere in `raw`.
///
/// Weekday names, commas and timezone suffixes (`WIB`, `WITA`) are ignored.
pub fn parse_indonesian_date(raw: &str) -> Option<NaiveDateTime> {
    let lowered = raw.to_lowercase().replace([',', '|'], " ");
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        let Some(month) = month_number(token) else {
            continue;
        };
        if i == 0 || i + 1 >= tokens.len() {
            continue;
        }
        let (Ok(day), Ok(year)) = (tokens[i - 1].parse::<u32>(), tokens[i + 1].parse::<i32>())
        else {
            continue;
        };
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        let time = tokens
            .get(i + 2)
            .and_then(|t| parse_clock(t))
            .unwrap_or(NaiveTime::MIN);
        return Some(date.and_time(time));
    }
    None
}

/// Parse any date representation we may encounter: ISO-8601 / RFC 3339,
/// `%Y-%m-%d %H:%M:%S`, a bare `%Y-%m-%d`, or an Indonesian date.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    parse_indonesian_date(s)
}

/// Canonical textual form used in output files.
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_cnn_style_date() {
        assert_eq!(
            parse_indonesian_date("Selasa, 12 Mar 2024 14:35 WIB"),
            Some(ymd_hm(2024, 3, 12, 14, 35))
        );
    }

    #[test]
    fn test_full_month_name_without_time() {
        assert_eq!(parse_indonesian_date("5 Agustus 2023"), Some(ymd_hm(2023, 8, 5, 0, 0)));
        assert_eq!(
            parse_indonesian_date("oleh Redaksi di 21 Desember 2022"),
            Some(ymd_hm(2022, 12, 21, 0, 0))
        );
    }

    #[test]
    fn test_invalid_dates_are_none() {
        assert_eq!(parse_indonesian_date("31 Februari 2024"), None);
        assert_eq!(parse_indonesian_date("tidak ada tanggal"), None);
        assert_eq!(parse_indonesian_date(""), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-02 03:04:00"), Some(ymd_hm(2024, 1, 2, 3, 4)));
        assert_eq!(parse_timestamp("2024-01-02T03:04:00"), Some(ymd_hm(2024, 1, 2, 3, 4)));
        assert_eq!(parse_timestamp("2024-01-02T03:04:00+08:00"), Some(ymd_hm(2024, 1, 2, 3, 4)));
        assert_eq!(parse_timestamp("2024-01-02"), Some(ymd_hm(2024, 1, 2, 0, 0)));
        assert_eq!(parse_timestamp("Senin, 1 Jan 2024 08.15 WITA"), Some(ymd_hm(2024, 1, 1, 8, 15)));
        assert_eq!(parse_timestamp("   "), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&ymd_hm(2024, 3, 12, 14, 35)), "2024-03-12 14:35:00");
    }
}
