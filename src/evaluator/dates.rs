// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Date helper bound as `dates` and used by `service` date functions
//!
//! Configuration authors write date patterns in the `SimpleDateFormat` style
//! (`dd/MM/yyyy`, `E, MMM dd yyyy`); [`convert_date_pattern`] turns those
//! into `chrono` format strings.

use super::error::{EvaluationError, EvaluationResult};
use super::operations::as_date;
use crate::model::Value;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Output pattern of `formatDate` when none is given
pub const DEFAULT_DATE_FORMAT: &str = "E, MMM dd yyyy";

/// Calendar operations relative to a fixed "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateService {
    today: NaiveDate,
}

impl DateService {
    /// Create a service whose `today()` is the given date
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Create a service on the local clock
    pub fn system() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }

    /// The current date
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Read a value as a date
    pub fn parse(&self, value: &Value) -> EvaluationResult<NaiveDate> {
        match value {
            Value::Null => Err(EvaluationError::missing("date")),
            other => as_date(other)
                .ok_or_else(|| EvaluationError::type_error("Date", other.type_name())),
        }
    }

    /// Whole days from `from` to `to`; negative when `to` is earlier
    pub fn days_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        (to - from).num_days()
    }

    /// Add (or with a negative count, subtract) days
    pub fn plus_days(&self, date: NaiveDate, days: i64) -> EvaluationResult<NaiveDate> {
        Duration::try_days(days)
            .and_then(|delta| date.checked_add_signed(delta))
            .ok_or_else(|| EvaluationError::invalid(format!("date out of range: {date} + {days}d")))
    }

    /// Re-format a date string from one pattern to another
    pub fn format_date(
        &self,
        input: &str,
        input_pattern: &str,
        output_pattern: &str,
    ) -> EvaluationResult<String> {
        let input_format = convert_date_pattern(input_pattern);
        let date_time = NaiveDateTime::parse_from_str(input, &input_format)
            .or_else(|_| {
                NaiveDate::parse_from_str(input, &input_format)
                    .map(|date| date.and_time(NaiveTime::MIN))
            })
            .map_err(|e| {
                EvaluationError::invalid(format!(
                    "'{input}' does not match pattern '{input_pattern}': {e}"
                ))
            })?;
        Ok(date_time
            .format(&convert_date_pattern(output_pattern))
            .to_string())
    }

    /// Format a date with a pattern
    pub fn format(&self, date: NaiveDate, pattern: &str) -> String {
        date.format(&convert_date_pattern(pattern)).to_string()
    }

    /// Describe a date relative to today ("3 days ago", "in 2 weeks")
    pub fn prettify(&self, date: NaiveDate) -> String {
        let days = self.days_between(self.today, date);
        if days == 0 {
            return "today".to_string();
        }

        let magnitude = days.unsigned_abs();
        let (count, unit) = match magnitude {
            0..=6 => (magnitude, "day"),
            7..=29 => (magnitude / 7, "week"),
            30..=364 => (magnitude / 30, "month"),
            _ => (magnitude / 365, "year"),
        };
        let plural = if count == 1 { "" } else { "s" };

        if days < 0 {
            format!("{count} {unit}{plural} ago")
        } else {
            format!("in {count} {unit}{plural}")
        }
    }

    /// Short age label for a birth date: `1y 2m`, `1m 2w`, `1w 2d`, `3d`
    ///
    /// At most two units are shown. From five years on only years are shown.
    pub fn age(&self, birth_date: NaiveDate) -> String {
        let days = self.days_between(birth_date, self.today).max(0);
        let years = days / 365;
        let months = (days % 365) / 30;
        let weeks = (days % 365 % 30) / 7;
        let remaining_days = days % 365 % 30 % 7;

        if years >= 5 {
            return format!("{years}y");
        }
        if years > 0 {
            return match (months, weeks) {
                (0, 0) => format!("{years}y"),
                (0, w) => format!("{years}y {w}w"),
                (m, _) => format!("{years}y {m}m"),
            };
        }
        if months > 0 {
            return if weeks > 0 {
                format!("{months}m {weeks}w")
            } else {
                format!("{months}m")
            };
        }
        if weeks > 0 {
            return if remaining_days > 0 {
                format!("{weeks}w {remaining_days}d")
            } else {
                format!("{weeks}w")
            };
        }
        format!("{remaining_days}d")
    }
}

impl Default for DateService {
    fn default() -> Self {
        Self::system()
    }
}

/// Convert a `SimpleDateFormat` pattern into a `chrono` format string
///
/// Text in single quotes is copied literally; `''` is a quote.
pub fn convert_date_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut output = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                output.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut output, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut output, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&next| next == c).count();
        let specifier = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('Z', _) | ('X', _) => "%z",
            _ => {
                for _ in 0..run {
                    push_literal(&mut output, c);
                }
                i += run;
                continue;
            }
        };
        output.push_str(specifier);
        i += run;
    }

    output
}

fn push_literal(output: &mut String, c: char) {
    if c == '%' {
        output.push_str("%%");
    } else {
        output.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> DateService {
        DateService::new(date(2024, 6, 15))
    }

    #[rstest]
    #[case("yyyy-MM-dd", "%Y-%m-%d")]
    #[case("dd/MM/yy", "%d/%m/%y")]
    #[case("E, MMM dd yyyy", "%a, %b %d %Y")]
    #[case("yyyy-MM-dd'T'HH:mm:ss", "%Y-%m-%dT%H:%M:%S")]
    #[case("d MMMM", "%-d %B")]
    #[case("'at' h a", "at %-I %p")]
    fn test_convert_date_pattern(#[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(convert_date_pattern(pattern), expected);
    }

    #[test]
    fn test_format_date() {
        let dates = service();
        assert_eq!(
            dates
                .format_date("2021-11-05", "yyyy-MM-dd", DEFAULT_DATE_FORMAT)
                .unwrap(),
            "Fri, Nov 05 2021"
        );
        assert_eq!(
            dates
                .format_date("2021-11-05T08:30:00", "yyyy-MM-dd'T'HH:mm:ss", "dd/MM/yyyy HH:mm")
                .unwrap(),
            "05/11/2021 08:30"
        );
        assert!(dates.format_date("05.11.2021", "yyyy-MM-dd", "dd").is_err());
    }

    #[rstest]
    #[case(date(2024, 6, 15), "today")]
    #[case(date(2024, 6, 12), "3 days ago")]
    #[case(date(2024, 6, 14), "1 day ago")]
    #[case(date(2024, 6, 29), "in 2 weeks")]
    #[case(date(2024, 3, 1), "3 months ago")]
    #[case(date(2022, 6, 1), "2 years ago")]
    fn test_prettify(#[case] input: NaiveDate, #[case] expected: &str) {
        assert_eq!(service().prettify(input), expected);
    }

    #[rstest]
    #[case(365, "1y")]
    #[case(399, "1y 1m")]
    #[case(372, "1y 1w")]
    #[case(35, "1m")]
    #[case(49, "1m 2w")]
    #[case(7, "1w")]
    #[case(9, "1w 2d")]
    #[case(3, "3d")]
    #[case(450, "1y 2m")]
    #[case(14700, "40y")]
    #[case(0, "0d")]
    fn test_age(#[case] days_ago: i64, #[case] expected: &str) {
        let dates = service();
        let birth_date = dates.plus_days(dates.today(), -days_ago).unwrap();
        assert_eq!(dates.age(birth_date), expected);
    }

    #[test]
    fn test_days_between_and_parse() {
        let dates = service();
        assert_eq!(dates.days_between(date(2024, 6, 1), date(2024, 6, 15)), 14);
        assert_eq!(dates.days_between(date(2024, 6, 15), date(2024, 6, 1)), -14);
        assert_eq!(
            dates.parse(&Value::from("2024-02-29T10:00:00Z")).unwrap(),
            date(2024, 2, 29)
        );
        assert!(dates.parse(&Value::Null).unwrap_err().is_missing_binding());
        assert!(matches!(
            dates.parse(&Value::Integer(3)),
            Err(EvaluationError::TypeError { .. })
        ));
    }
}
