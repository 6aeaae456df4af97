//! Built-in predicate families.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::{Predicate, PredicateError, PredicateFamily};
use crate::error::QualityError;

/// Named formats answered by the `regex` family.
const NAMED_FORMATS: &[(&str, &str)] = &[
    ("notEmpty", r"(?s)^.+$"),
    ("notBlank", r"\S"),
    ("email", r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$"),
    ("mobile", r"^1[3-9][0-9]{9}$"),
    ("number", r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?$"),
    ("integer", r"^[+-]?[0-9]+$"),
    ("date", r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$"),
    (
        "datetime",
        r"^[0-9]{4}-[0-9]{2}-[0-9]{2}[ T][0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?$",
    ),
    (
        "uuid",
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    ),
    (
        "ipv4",
        r"^((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])$",
    ),
    ("url", r"^https?://[^\s/$.?#][^\s]*$"),
];

/// Pre-compiled named format patterns.
///
/// Uses `OnceLock` for thread-safe lazy initialization.
struct FormatPatterns {
    formats: Vec<(&'static str, Regex)>,
}

impl FormatPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<FormatPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        let formats = NAMED_FORMATS
            .iter()
            .map(|(code, pattern)| {
                (
                    *code,
                    Regex::new(pattern).expect("Invalid built-in format pattern"),
                )
            })
            .collect();
        Self { formats }
    }

    fn lookup(code: &str) -> Option<(&'static str, &'static Regex)> {
        Self::instance()
            .formats
            .iter()
            .find(|(name, _)| *name == code)
            .map(|(name, regex)| (*name, regex))
    }
}

/// Predicate over one named format.
#[derive(Debug)]
struct FormatPredicate {
    code: &'static str,
    regex: &'static Regex,
}

impl Predicate for FormatPredicate {
    fn evaluate(&self, value: &str) -> std::result::Result<bool, PredicateError> {
        if !self.regex.is_match(value) {
            return Ok(false);
        }
        // Shape alone accepts impossible calendar values such as 2024-02-30
        Ok(match self.code {
            "date" => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            "datetime" => {
                let normalized = value.replacen('T', " ", 1);
                NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f").is_ok()
            }
            _ => true,
        })
    }
}

/// The `regex` family: well-known value formats addressed by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexFamily;

impl PredicateFamily for RegexFamily {
    fn name(&self) -> &str {
        "regex"
    }

    fn resolve(&self, code: &str) -> crate::Result<Option<Arc<dyn Predicate>>> {
        Ok(FormatPatterns::lookup(code).map(|(code, regex)| {
            Arc::new(FormatPredicate { code, regex }) as Arc<dyn Predicate>
        }))
    }

    fn codes(&self) -> Vec<String> {
        NAMED_FORMATS
            .iter()
            .map(|(code, _)| (*code).to_string())
            .collect()
    }
}

#[derive(Debug)]
struct PatternPredicate {
    regex: Regex,
}

impl Predicate for PatternPredicate {
    fn evaluate(&self, value: &str) -> std::result::Result<bool, PredicateError> {
        Ok(self.regex.is_match(value))
    }
}

/// The `pattern` family: the rule code is a regular expression that must
/// match the whole value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternFamily;

impl PredicateFamily for PatternFamily {
    fn name(&self) -> &str {
        "pattern"
    }

    fn resolve(&self, code: &str) -> crate::Result<Option<Arc<dyn Predicate>>> {
        let regex = Regex::new(&format!("^(?:{})$", code)).map_err(|e| {
            QualityError::configuration(format!("Invalid pattern rule code '{}': {}", code, e))
        })?;
        Ok(Some(Arc::new(PatternPredicate { regex })))
    }

    fn codes(&self) -> Vec<String> {
        vec!["<regular expression>".to_string()]
    }
}

#[derive(Debug)]
struct LengthPredicate {
    min: Option<usize>,
    max: Option<usize>,
}

impl Predicate for LengthPredicate {
    fn evaluate(&self, value: &str) -> std::result::Result<bool, PredicateError> {
        let length = value.chars().count();
        Ok(self.min.is_none_or(|min| length >= min) && self.max.is_none_or(|max| length <= max))
    }
}

/// The `length` family: code `min..max` bounds the character count
/// (inclusive, either side optional); a bare number requires that exact
/// length.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthFamily;

impl LengthFamily {
    fn parse_bound(code: &str, bound: &str) -> crate::Result<Option<usize>> {
        let bound = bound.trim();
        if bound.is_empty() {
            return Ok(None);
        }
        bound.parse::<usize>().map(Some).map_err(|e| {
            QualityError::configuration(format!("Invalid length rule code '{}': {}", code, e))
        })
    }
}

impl PredicateFamily for LengthFamily {
    fn name(&self) -> &str {
        "length"
    }

    fn resolve(&self, code: &str) -> crate::Result<Option<Arc<dyn Predicate>>> {
        let (min, max) = match code.split_once("..") {
            Some((min, max)) => (
                Self::parse_bound(code, min)?,
                Self::parse_bound(code, max)?,
            ),
            None => {
                let exact = Self::parse_bound(code, code)?;
                (exact, exact)
            }
        };

        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(QualityError::configuration(format!(
                "Invalid length rule code '{}': minimum exceeds maximum",
                code
            )));
        }
        if min.is_none() && max.is_none() {
            return Err(QualityError::configuration(format!(
                "Invalid length rule code '{}': no bound given",
                code
            )));
        }

        Ok(Some(Arc::new(LengthPredicate { min, max })))
    }

    fn codes(&self) -> Vec<String> {
        vec!["<min>..<max>".to_string(), "<exact>".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(code: &str) -> Arc<dyn Predicate> {
        RegexFamily.resolve(code).unwrap().unwrap()
    }

    #[test]
    fn test_not_empty_and_not_blank() {
        assert!(format("notEmpty").evaluate(" ").unwrap());
        assert!(!format("notEmpty").evaluate("").unwrap());
        assert!(format("notEmpty").evaluate("line\nbreak").unwrap());

        assert!(!format("notBlank").evaluate("  \t").unwrap());
        assert!(format("notBlank").evaluate(" x ").unwrap());
    }

    #[test]
    fn test_email_and_mobile() {
        assert!(format("email").evaluate("a@x.com").unwrap());
        assert!(!format("email").evaluate("a@x").unwrap());
        assert!(!format("email").evaluate("").unwrap());

        assert!(format("mobile").evaluate("13812345678").unwrap());
        assert!(!format("mobile").evaluate("12812345678").unwrap());
    }

    #[test]
    fn test_numeric_formats() {
        for ok in ["42", "-3.5", "+.5", "1e10", "2."] {
            assert!(format("number").evaluate(ok).unwrap(), "{}", ok);
        }
        assert!(!format("number").evaluate("1.2.3").unwrap());
        assert!(format("integer").evaluate("-17").unwrap());
        assert!(!format("integer").evaluate("1.0").unwrap());
    }

    #[test]
    fn test_calendar_formats() {
        assert!(format("date").evaluate("2024-02-29").unwrap());
        assert!(!format("date").evaluate("2023-02-29").unwrap());
        assert!(!format("date").evaluate("2024/02/01").unwrap());

        assert!(format("datetime").evaluate("2024-05-01 12:30:00").unwrap());
        assert!(format("datetime").evaluate("2024-05-01T12:30:00.125").unwrap());
        assert!(!format("datetime").evaluate("2024-05-01 25:00:00").unwrap());
    }

    #[test]
    fn test_identifier_formats() {
        assert!(
            format("uuid")
                .evaluate("550e8400-e29b-41d4-a716-446655440000")
                .unwrap()
        );
        assert!(format("ipv4").evaluate("192.168.0.1").unwrap());
        assert!(!format("ipv4").evaluate("256.1.1.1").unwrap());
        assert!(format("url").evaluate("https://example.com/a?b=c").unwrap());
        assert!(!format("url").evaluate("example.com").unwrap());
    }

    #[test]
    fn test_unknown_format() {
        assert!(RegexFamily.resolve("postcode").unwrap().is_none());
    }

    #[test]
    fn test_pattern_is_full_match() {
        let predicate = PatternFamily.resolve("[0-9]{3}").unwrap().unwrap();
        assert!(predicate.evaluate("123").unwrap());
        assert!(!predicate.evaluate("1234").unwrap());
        assert!(!predicate.evaluate("a123").unwrap());

        // alternation stays inside the anchors
        let predicate = PatternFamily.resolve("yes|no").unwrap().unwrap();
        assert!(!predicate.evaluate("yesno").unwrap());
        assert!(predicate.evaluate("no").unwrap());
    }

    #[test]
    fn test_length_bounds() {
        let range = LengthFamily.resolve("2..4").unwrap().unwrap();
        assert!(!range.evaluate("a").unwrap());
        assert!(range.evaluate("ab").unwrap());
        assert!(range.evaluate("abcd").unwrap());
        assert!(!range.evaluate("abcde").unwrap());

        let at_least = LengthFamily.resolve("3..").unwrap().unwrap();
        assert!(at_least.evaluate("日本語").unwrap());
        assert!(!at_least.evaluate("ab").unwrap());

        let exact = LengthFamily.resolve("11").unwrap().unwrap();
        assert!(exact.evaluate("13812345678").unwrap());
        assert!(!exact.evaluate("1381234567").unwrap());
    }

    #[test]
    fn test_length_rejects_malformed_codes() {
        assert!(LengthFamily.resolve("5..2").is_err());
        assert!(LengthFamily.resolve("..").is_err());
        assert!(LengthFamily.resolve("x..3").is_err());
    }
}
