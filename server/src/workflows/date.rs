//! Parsing of dates typed by staff.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// `DD-MM-YY` or `DD-MM-YYYY`, separated by `-`, `/` or `.`.
static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})$").expect("valid regex")
});

/// Outcome of reading a typed date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInput {
    /// A real calendar date
    Valid(NaiveDate),
    /// Date-shaped but not a real day, e.g. "31-02-26"
    Invalid,
    /// Not date-shaped at all
    Unrecognized,
}

/// Read a day-first date. Two-digit years are in the 2000s.
pub fn parse_date_input(text: &str) -> DateInput {
    let Some(caps) = DATE_SHAPE.captures(text.trim()) else {
        return DateInput::Unrecognized;
    };

    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let (Some(day), Some(month), Some(year)) = (number(1), number(2), number(3)) else {
        return DateInput::Unrecognized;
    };
    let year = if caps.get(3).map_or(0, |m| m.as_str().len()) == 2 {
        2000 + year
    } else {
        year
    };

    i32::try_from(year)
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
        .map_or(DateInput::Invalid, DateInput::Valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> DateInput {
        DateInput::Valid(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_valid_formats() {
        assert_eq!(parse_date_input("05-02-26"), date(2026, 2, 5));
        assert_eq!(parse_date_input(" 5/2/2026 "), date(2026, 2, 5));
        assert_eq!(parse_date_input("29.02.2028"), date(2028, 2, 29));
    }

    #[test]
    fn test_calendar_invalid() {
        assert_eq!(parse_date_input("99-99-99"), DateInput::Invalid);
        assert_eq!(parse_date_input("31-04-26"), DateInput::Invalid);
        assert_eq!(parse_date_input("29-02-2027"), DateInput::Invalid);
        assert_eq!(parse_date_input("00-01-26"), DateInput::Invalid);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(parse_date_input("mañana"), DateInput::Unrecognized);
        assert_eq!(parse_date_input("05-02"), DateInput::Unrecognized);
        assert_eq!(parse_date_input("05-02-026"), DateInput::Unrecognized);
        assert_eq!(parse_date_input(""), DateInput::Unrecognized);
    }
}
