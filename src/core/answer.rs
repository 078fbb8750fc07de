//! Answer coercion by format hint.
//!
//! Model output is arbitrary text. Each [`FormatHint`] branch extracts a
//! typed value and falls back to a fixed default instead of failing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use super::question::FormatHint;

// Patterns are literals; a failed compile would be a programming error
// caught by the unit tests, so they degrade to never-matching.
static THOUSANDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+\b").ok());
static INTEGER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[-+]?\d+").ok());
static DECIMAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").ok());
static PY_KEYWORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(True|False|None)\b").ok());

/// A coerced answer.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedAnswer {
    /// Typed value.
    pub value: Value,
    /// Set when nothing usable was found and the format default was used.
    pub defaulted: bool,
}

impl CoercedAnswer {
    const fn parsed(value: Value) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    const fn fallback(value: Value) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// Coerces raw model text into the shape declared by `hint`.
///
/// When the text contains a brace or bracket span, the outermost span is
/// parsed in preference to the whole text.
#[must_use]
pub fn coerce_answer(raw: &str, hint: &FormatHint) -> CoercedAnswer {
    let trimmed = raw.trim();
    let candidate = json_span(trimmed).unwrap_or(trimmed);

    match hint {
        FormatHint::Int => extract_int(candidate)
            .or_else(|| extract_int(trimmed))
            .map_or_else(|| CoercedAnswer::fallback(json!(0)), |n| {
                CoercedAnswer::parsed(json!(n))
            }),
        FormatHint::Float => extract_float(candidate)
            .or_else(|| extract_float(trimmed))
            .map_or_else(|| CoercedAnswer::fallback(json!(0.0)), |x| {
                CoercedAnswer::parsed(json!(round2(x)))
            }),
        FormatHint::Mapping(_) => parse_structure(candidate)
            .filter(Value::is_object)
            .map_or_else(|| CoercedAnswer::fallback(json!({})), CoercedAnswer::parsed),
        FormatHint::Sequence(_) => parse_structure(candidate)
            .filter(Value::is_array)
            .map_or_else(|| CoercedAnswer::fallback(json!([])), CoercedAnswer::parsed),
        FormatHint::Text(_) => json_span(trimmed)
            .and_then(parse_structure)
            .map_or_else(
                || CoercedAnswer::parsed(Value::String(trimmed.to_string())),
                CoercedAnswer::parsed,
            ),
    }
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Returns the span from the first `{`/`[` to the last `}`/`]`.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (start < end).then(|| &text[start..=end])
}

fn strip_thousands(text: &str) -> String {
    THOUSANDS.as_ref().map_or_else(
        || text.to_string(),
        |re| {
            re.replace_all(text, |caps: &regex::Captures<'_>| caps[0].replace(',', ""))
                .into_owned()
        },
    )
}

fn extract_int(text: &str) -> Option<i64> {
    let cleaned = strip_thousands(text);
    INTEGER
        .as_ref()?
        .find(&cleaned)
        .and_then(|m| m.as_str().trim_start_matches('+').parse().ok())
}

fn extract_float(text: &str) -> Option<f64> {
    let cleaned = strip_thousands(text);
    DECIMAL
        .as_ref()?
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|x| x.is_finite())
}

/// Literal-structure parse first (single quotes, `True`/`False`/`None`),
/// then strict JSON.
fn parse_structure(text: &str) -> Option<Value> {
    parse_literal(text).or_else(|| serde_json::from_str(text).ok())
}

fn parse_literal(text: &str) -> Option<Value> {
    let mut relaxed = if text.contains('"') {
        text.to_string()
    } else {
        text.replace('\'', "\"")
    };
    if let Some(re) = PY_KEYWORD.as_ref() {
        relaxed = re
            .replace_all(&relaxed, |caps: &regex::Captures<'_>| match &caps[1] {
                "True" => "true",
                "False" => "false",
                _ => "null",
            })
            .into_owned();
    }
    serde_json::from_str(&relaxed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_patterns_compile() {
        assert!(THOUSANDS.is_some());
        assert!(INTEGER.is_some());
        assert!(DECIMAL.is_some());
        assert!(PY_KEYWORD.is_some());
    }

    #[test_case("42 units", 42; "trailing unit")]
    #[test_case("The answer is -7.", -7; "negative")]
    #[test_case("about 1,234 orders", 1234; "thousands")]
    #[test_case("[14]", 14; "bracketed")]
    fn test_coerce_int(raw: &str, expected: i64) {
        let answer = coerce_answer(raw, &FormatHint::Int);
        assert_eq!(answer.value, json!(expected));
        assert!(!answer.defaulted);
    }

    #[test_case("$19.99 approx", 19.99; "currency")]
    #[test_case("$19.999 approx", 20.0; "rounds up")]
    #[test_case("Revenue: 440", 440.0; "integer text")]
    #[test_case("-3.14159", -3.14; "negative")]
    fn test_coerce_float(raw: &str, expected: f64) {
        let answer = coerce_answer(raw, &FormatHint::Float);
        assert_eq!(answer.value, json!(expected));
    }

    #[test]
    fn test_coerce_numeric_defaults() {
        let int = coerce_answer("no idea", &FormatHint::Int);
        assert_eq!(int.value, json!(0));
        assert!(int.defaulted);

        let float = coerce_answer("", &FormatHint::Float);
        assert_eq!(float.value, json!(0.0));
        assert!(float.defaulted);
    }

    #[test]
    fn test_coerce_mapping_from_prose() {
        let hint = FormatHint::parse("{category:str, quantity:int}");
        let answer = coerce_answer(
            r#"The top category is {"category": "Beverages", "quantity": 120} overall."#,
            &hint,
        );
        assert_eq!(answer.value, json!({"category": "Beverages", "quantity": 120}));
    }

    #[test]
    fn test_coerce_mapping_python_literal() {
        let hint = FormatHint::parse("{category:str, ok:bool}");
        let answer = coerce_answer("{'category': 'Dairy Products', 'ok': True}", &hint);
        assert_eq!(answer.value, json!({"category": "Dairy Products", "ok": true}));
    }

    #[test]
    fn test_coerce_sequence() {
        let hint = FormatHint::parse("list[{product:str, revenue:float}]");
        let answer = coerce_answer(
            r#"[{"product": "Côte de Blaye", "revenue": 53265.9}]"#,
            &hint,
        );
        assert_eq!(answer.value, json!([{"product": "Côte de Blaye", "revenue": 53265.9}]));
    }

    #[test]
    fn test_coerce_structure_defaults_to_empty_shape() {
        let mapping = coerce_answer("not structured", &FormatHint::parse("{a:int}"));
        assert_eq!(mapping.value, json!({}));
        assert!(mapping.defaulted);

        let sequence = coerce_answer("{\"a\": 1}", &FormatHint::parse("list[int]"));
        assert_eq!(sequence.value, json!([]));
        assert!(sequence.defaulted);
    }

    #[test_case("  Unopened beverages: 14 days.  ", json!("Unopened beverages: 14 days."); "plain prose")]
    #[test_case(r#"Top pick: {"category": "Beverages"}"#, json!({"category": "Beverages"}); "embedded object")]
    #[test_case("Best month [see calendar] was June", json!("Best month [see calendar] was June"); "unparsable brackets")]
    fn test_coerce_text(raw: &str, expected: Value) {
        let answer = coerce_answer(raw, &FormatHint::parse("str"));
        assert_eq!(answer.value, expected);
        assert!(!answer.defaulted);
    }

    #[test]
    fn test_json_span() {
        assert_eq!(json_span("x {\"a\": [1]} y"), Some("{\"a\": [1]}"));
        assert_eq!(json_span("no structure"), None);
        assert_eq!(json_span("} backwards {"), None);
    }
}
