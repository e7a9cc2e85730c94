//! Conversion of `SimpleDateFormat` style patterns (`dd.MM.yyyy`) into
//! chrono format strings, plus date offsets such as `+1d` or `-2h`.

use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{CitrusError, CitrusResult};

/// Default pattern used by date functions and matchers
pub const DEFAULT_DATE_PATTERN: &str = "dd.MM.yyyy";

/// Translate a date pattern into a chrono format string
pub fn to_chrono_format(pattern: &str) -> CitrusResult<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut format = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // quoted literal, '' is a single quote
            i += 1;
            if i < chars.len() && chars[i] == '\'' {
                format.push('\'');
                i += 1;
                continue;
            }
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut format, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut format, c);
            i += 1;
            continue;
        }

        let mut count = 1;
        while i + count < chars.len() && chars[i + count] == c {
            count += 1;
        }

        let specifier = match (c, count) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('a', _) => "%p",
            ('D', _) => "%j",
            ('Z', _) => "%z",
            ('X', _) => "%:z",
            ('z', _) => "%Z",
            _ => {
                return Err(CitrusError::runtime(format!(
                    "Unsupported date pattern letter '{}' in '{}'",
                    c, pattern
                )))
            }
        };

        format.push_str(specifier);
        i += count;
    }

    Ok(format)
}

fn push_literal(format: &mut String, c: char) {
    if c == '%' {
        format.push_str("%%");
    } else {
        format.push(c);
    }
}

/// Format a timestamp with a date pattern
pub fn format_date(date: &DateTime<Utc>, pattern: &str) -> CitrusResult<String> {
    let format = to_chrono_format(pattern)?;
    Ok(date.format(&format).to_string())
}

/// Check whether a value can be parsed with the date pattern
pub fn matches_date_pattern(value: &str, pattern: &str) -> CitrusResult<bool> {
    let format = to_chrono_format(pattern)?;
    Ok(DateTime::parse_from_str(value, &format).is_ok()
        || NaiveDateTime::parse_from_str(value, &format).is_ok()
        || NaiveDate::parse_from_str(value, &format).is_ok()
        || NaiveTime::parse_from_str(value, &format).is_ok())
}

/// Parse a date value with a date pattern
pub fn parse_date(value: &str, pattern: &str) -> CitrusResult<NaiveDate> {
    let format = to_chrono_format(pattern)?;
    NaiveDateTime::parse_from_str(value, &format)
        .map(|date_time| date_time.date())
        .or_else(|_| NaiveDate::parse_from_str(value, &format))
        .map_err(|e| {
            CitrusError::runtime(format!(
                "Failed to parse date '{}' with pattern '{}': {}",
                value, pattern, e
            ))
        })
}

/// Apply an offset expression like `+1y`, `-2M`, `1d`, `+3h+30m` to a date
pub fn apply_offset(date: DateTime<Utc>, offset: &str) -> CitrusResult<DateTime<Utc>> {
    let invalid = || CitrusError::runtime(format!("Invalid date offset '{}'", offset));
    let mut result = date;
    let mut chars = offset.trim().chars().peekable();

    while chars.peek().is_some() {
        let negative = match chars.peek() {
            Some('-') => {
                chars.next();
                true
            }
            Some('+') => {
                chars.next();
                false
            }
            _ => false,
        };

        let mut digits = String::new();
        while let Some(c) = chars.peek().filter(|c| c.is_ascii_digit()) {
            digits.push(*c);
            chars.next();
        }
        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        let unit = chars.next().ok_or_else(invalid)?;

        result = match unit {
            'y' | 'M' => {
                let months = Months::new((if unit == 'y' { amount * 12 } else { amount }) as u32);
                if negative {
                    result.checked_sub_months(months)
                } else {
                    result.checked_add_months(months)
                }
                .ok_or_else(invalid)?
            }
            'd' | 'h' | 'm' | 's' => {
                let duration = match unit {
                    'd' => ChronoDuration::days(amount),
                    'h' => ChronoDuration::hours(amount),
                    'm' => ChronoDuration::minutes(amount),
                    _ => ChronoDuration::seconds(amount),
                };
                if negative {
                    result - duration
                } else {
                    result + duration
                }
            }
            _ => return Err(invalid()),
        };
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pattern_conversion() {
        assert_eq!(to_chrono_format("dd.MM.yyyy").unwrap(), "%d.%m.%Y");
        assert_eq!(
            to_chrono_format("yyyy-MM-dd'T'HH:mm:ss").unwrap(),
            "%Y-%m-%dT%H:%M:%S"
        );
        assert!(to_chrono_format("qq").is_err());
    }

    #[test]
    fn test_format_and_offset() {
        let date = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(format_date(&date, DEFAULT_DATE_PATTERN).unwrap(), "31.01.2024");

        let next = apply_offset(date, "+1d").unwrap();
        assert_eq!(format_date(&next, "yyyy-MM-dd").unwrap(), "2024-02-01");

        let earlier = apply_offset(date, "-1y+2h").unwrap();
        assert_eq!(format_date(&earlier, "yyyy-MM-dd HH").unwrap(), "2023-01-31 12");
        assert!(apply_offset(date, "+1x").is_err());
    }

    #[test]
    fn test_matches_date_pattern() {
        assert!(matches_date_pattern("2024-05-01", "yyyy-MM-dd").unwrap());
        assert!(!matches_date_pattern("01/05/2024", "yyyy-MM-dd").unwrap());
        assert_eq!(
            parse_date("01.05.2024", DEFAULT_DATE_PATTERN).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
    }
}
