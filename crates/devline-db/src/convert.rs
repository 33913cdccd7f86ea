//! Cell converters for CSV → SQLite values
//!
//! Crawl outputs are written by several generations of tooling, so numbers
//! may carry a `.0`, booleans vary in case and timestamps come with or
//! without an offset. Every converter returns `None` for empty cells.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

static BR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WATCHING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*Watching\s+[\d,]+\s+Deviants?\s*").expect("valid regex")
});

/// `true`/`false` in any case
pub fn bool_cell(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Integer, or a float without fractional part
pub fn int_cell(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.timestamp_millis());
        }
    }
    // naive timestamps are UTC
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// ISO-8601 timestamp → UTC epoch milliseconds
pub fn iso_to_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let ms = parse_timestamp(s);
    if ms.is_none() {
        log::warn!("Could not convert date '{s}' to a timestamp");
    }
    ms
}

/// Epoch seconds as written by the gallery crawl, or an ISO timestamp
pub fn epoch_seconds(s: &str) -> Option<i64> {
    int_cell(s).or_else(|| iso_to_millis(s).map(|ms| ms.div_euclid(1000)))
}

/// Deviation description reduced to letters, digits and spaces
pub fn clean_description(s: &str) -> String {
    let text = BR.replace_all(s, " ");
    let text = TAG.replace_all(&text, "");
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

/// Rewrite a Python list literal (`['a', "b's", None]`) as JSON
fn python_to_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(other) => {
                                out.push('\\');
                                out.push(other);
                            }
                            None => {}
                        },
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            '"' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(other) => {
                                out.push('\\');
                                out.push(other);
                            }
                            None => {}
                        },
                        '"' => break,
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if !n.is_ascii_alphanumeric() {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }
    out
}

/// Tag names from a JSON or Python list literal.
///
/// Nulls and blank entries are dropped. `None` when the cell is not a list.
pub fn parse_tag_list(s: &str) -> Option<Vec<String>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(Vec::new());
    }
    let values: Vec<Value> = serde_json::from_str(s)
        .or_else(|_| serde_json::from_str(&python_to_json(s)))
        .ok()?;
    Some(
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(t) => Some(t.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|t| !t.is_empty())
            .collect(),
    )
}

/// Names from an about-page `Watching` cell (`Watching 12 Deviants amy bo ..`)
pub fn parse_watching_list(s: &str) -> Vec<String> {
    WATCHING_PREFIX
        .replace(s, "")
        .split_whitespace()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bools() {
        assert_eq!(bool_cell("True"), Some(true));
        assert_eq!(bool_cell(" false "), Some(false));
        assert_eq!(bool_cell(""), None);
        assert_eq!(bool_cell("1"), None);
    }

    #[test]
    fn ints_accept_whole_floats() {
        assert_eq!(int_cell("42"), Some(42));
        assert_eq!(int_cell("12.0"), Some(12));
        assert_eq!(int_cell("12.5"), None);
        assert_eq!(int_cell("n/a"), None);
        assert_eq!(int_cell(""), None);
    }

    #[test]
    fn timestamps_to_utc_millis() {
        assert_eq!(iso_to_millis("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(iso_to_millis("1970-01-01T01:00:00+01:00"), Some(0));
        assert_eq!(iso_to_millis("1970-01-01T01:00:00+0100"), Some(0));
        assert_eq!(iso_to_millis("1970-01-01 00:00:02.5"), Some(2500));
        assert_eq!(iso_to_millis("1970-01-02"), Some(86_400_000));
        assert_eq!(iso_to_millis("yesterday"), None);
        assert_eq!(iso_to_millis(""), None);
    }

    #[test]
    fn publish_dates_in_seconds() {
        assert_eq!(epoch_seconds("1700000000"), Some(1_700_000_000));
        assert_eq!(epoch_seconds("1970-01-01T00:01:00Z"), Some(60));
        assert_eq!(epoch_seconds(""), None);
    }

    #[test]
    fn descriptions_lose_markup() {
        assert_eq!(
            clean_description("Hello<br />world <b>bold</b>! &amp; 2024"),
            "Hello world bold amp 2024"
        );
    }

    #[test]
    fn tag_lists_in_both_dialects() {
        assert_eq!(
            parse_tag_list(r#"["cats", " ink ", null, ""]"#),
            Some(vec!["cats".to_string(), "ink".to_string()])
        );
        assert_eq!(
            parse_tag_list(r#"['cats', "bo's", None]"#),
            Some(vec!["cats".to_string(), "bo's".to_string()])
        );
        assert_eq!(
            parse_tag_list("['say \"hi\"']"),
            Some(vec!["say \"hi\"".to_string()])
        );
        assert_eq!(parse_tag_list(""), Some(vec![]));
        assert_eq!(parse_tag_list("cats, ink"), None);
    }

    #[test]
    fn watching_prefix_stripped() {
        assert_eq!(
            parse_watching_list("Watching 1,204 Deviants amy  bo\nzed"),
            vec!["amy", "bo", "zed"]
        );
        assert_eq!(parse_watching_list("watching 1 deviant amy"), vec!["amy"]);
        assert!(parse_watching_list("").is_empty());
    }
}
