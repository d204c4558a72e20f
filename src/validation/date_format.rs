/// Date strings checked against a day/month/year template.
///
/// Templates use `/`, `-` or `.` between three tokens: `dd` or `d` for the
/// day, `mm` or `m` for the month, `yyyy` or `yy` for the year. February
/// has 29 days whenever `year % 4 == 0`; century years are not corrected,
/// so `29/02/1900` is accepted.

use crate::core::{ClubhouseError, Result};
use regex::Regex;

const SEPARATORS: [char; 3] = ['/', '-', '.'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Day { digits: Digits },
    Month { digits: Digits },
    Year { digits: Digits },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Digits {
    Exactly(usize),
    UpTo(usize),
}

impl Digits {
    fn pattern(self) -> String {
        match self {
            Digits::Exactly(n) => format!(r"\d{{{}}}", n),
            Digits::UpTo(n) => format!(r"\d{{1,{}}}", n),
        }
    }
}

impl Part {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "dd" => Some(Part::Day { digits: Digits::Exactly(2) }),
            "d" => Some(Part::Day { digits: Digits::UpTo(2) }),
            "mm" => Some(Part::Month { digits: Digits::Exactly(2) }),
            "m" => Some(Part::Month { digits: Digits::UpTo(2) }),
            "yyyy" => Some(Part::Year { digits: Digits::Exactly(4) }),
            "yy" => Some(Part::Year { digits: Digits::Exactly(2) }),
            _ => None,
        }
    }

    fn pattern(self) -> String {
        match self {
            Part::Day { digits } | Part::Month { digits } | Part::Year { digits } => digits.pattern(),
        }
    }
}

fn split_three(s: &str, separator: char) -> Option<[&str; 3]> {
    let mut parts = s.split(separator);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c), None) => Some([a, b, c]),
        _ => None,
    }
}

fn days_in_month(month: u32, year: u32) -> u32 {
    match month {
        2 if year % 4 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Whether `value` is a real date laid out as `template` describes.
pub fn is_date_format_matched(value: &str, template: &str) -> bool {
    let found = SEPARATORS.iter().find_map(|&separator| {
        let tokens = split_three(template, separator)?;
        let values = split_three(value, separator)?;
        Some((separator, tokens, values))
    });
    let Some((separator, tokens, values)) = found else {
        return false;
    };

    let mut parts = Vec::with_capacity(3);
    for token in tokens {
        match Part::from_token(token) {
            Some(part) => parts.push(part),
            None => return false,
        }
    }

    let (mut day, mut month, mut year) = (None, None, None);
    for (part, value) in parts.iter().zip(values) {
        let slot = match part {
            Part::Day { .. } => &mut day,
            Part::Month { .. } => &mut month,
            Part::Year { .. } => &mut year,
        };
        if slot.is_some() {
            return false;
        }
        // Shape errors are left to the pattern match below.
        *slot = Some(value.parse::<u32>().ok());
    }
    let (Some(day), Some(month), Some(year)) = (day, month, year) else {
        return false;
    };

    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return false;
        }
        if let (Some(day), Some(year)) = (day, year) {
            if day < 1 || day > days_in_month(month, year) {
                return false;
            }
        }
    }

    let pattern = format!(
        "^{}{}{}{}{}$",
        parts[0].pattern(),
        regex::escape(&separator.to_string()),
        parts[1].pattern(),
        regex::escape(&separator.to_string()),
        parts[2].pattern()
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

/// # Errors
///
/// `ClubhouseError::Validation` naming the value and template.
pub fn validate_date_format(value: &str, template: &str) -> Result<()> {
    if is_date_format_matched(value, template) {
        Ok(())
    } else {
        Err(ClubhouseError::Validation(format!(
            "'{}' is not a valid date in the format {}",
            value, template
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_day() {
        assert!(is_date_format_matched("29/02/2024", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("29/02/2023", "dd/mm/yyyy"));
    }

    #[test]
    fn test_day_exceeds_month() {
        assert!(!is_date_format_matched("31/04/2024", "dd/mm/yyyy"));
        assert!(is_date_format_matched("30/04/2024", "dd/mm/yyyy"));
        assert!(is_date_format_matched("31/12/2024", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("00/12/2024", "dd/mm/yyyy"));
    }

    #[test]
    fn test_month_out_of_range() {
        assert!(!is_date_format_matched("13/13/2024", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("01/00/2024", "dd/mm/yyyy"));
    }

    #[test]
    fn test_century_years_follow_four_year_rule() {
        assert!(is_date_format_matched("29/02/1900", "dd/mm/yyyy"));
    }

    #[test]
    fn test_other_separators_and_orders() {
        assert!(is_date_format_matched("2024-02-29", "yyyy-mm-dd"));
        assert!(is_date_format_matched("3.7.24", "d.m.yy"));
        assert!(is_date_format_matched("12.31.2023", "mm.dd.yyyy"));
        assert!(!is_date_format_matched("31.12.2023", "mm.dd.yyyy"));
    }

    #[test]
    fn test_shape_must_match_template() {
        assert!(!is_date_format_matched("1/02/2024", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("01/02/24", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("ab/02/2024", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("01-02-2024", "dd/mm/yyyy"));
    }

    #[test]
    fn test_templates_without_three_parts() {
        assert!(!is_date_format_matched("01/02", "dd/mm"));
        assert!(!is_date_format_matched("01/02/2024/1", "dd/mm/yyyy"));
        assert!(!is_date_format_matched("01022024", "ddmmyyyy"));
        assert!(!is_date_format_matched("01/02/2024", "dd/dd/yyyy"));
        assert!(!is_date_format_matched("01/02/2024", "dd/mm/hh"));
    }

    #[test]
    fn test_validate_wraps_result() {
        assert!(validate_date_format("15/08/2022", "dd/mm/yyyy").is_ok());
        let err = validate_date_format("31/02/2022", "dd/mm/yyyy").unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::ValidationRejected);
    }
}
