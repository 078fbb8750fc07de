//! Batch questions and their declared answer format.

use serde::{Deserialize, Serialize};

/// Declared shape of the final answer.
///
/// A closed vocabulary: integers, floats, a structural shape (mapping or
/// sequence, carrying its textual description) or free text. Serialized
/// as the original hint string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormatHint {
    /// Whole number.
    Int,
    /// Decimal number, rounded to two places.
    Float,
    /// Object shape such as `{category:str, quantity:int}`.
    Mapping(String),
    /// Sequence shape such as `list[{product:str, revenue:float}]`.
    Sequence(String),
    /// Anything else; the answer is passed through as text.
    Text(String),
}

impl FormatHint {
    /// Classifies a raw hint string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_lowercase();
        match lower.as_str() {
            "int" | "integer" => Self::Int,
            "float" | "double" => Self::Float,
            _ if lower.starts_with('{') || lower.starts_with("dict") => {
                Self::Mapping(trimmed.to_string())
            }
            _ if lower.starts_with('[') || lower.starts_with("list") => {
                Self::Sequence(trimmed.to_string())
            }
            _ => Self::Text(trimmed.to_string()),
        }
    }

    /// Returns the hint as it should be shown to the model.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Mapping(s) | Self::Sequence(s) | Self::Text(s) => s,
        }
    }
}

impl Default for FormatHint {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for FormatHint {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<FormatHint> for String {
    fn from(hint: FormatHint) -> Self {
        hint.as_str().to_string()
    }
}

impl std::fmt::Display for FormatHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single batch question. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Caller-supplied identifier, echoed in the output record.
    pub id: String,
    /// Natural-language question text.
    pub question: String,
    /// Expected answer shape.
    #[serde(default)]
    pub format_hint: FormatHint,
}

impl Question {
    /// Creates a question.
    #[must_use]
    pub fn new(id: impl Into<String>, question: impl Into<String>, format_hint: &str) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            format_hint: FormatHint::parse(format_hint),
        }
    }
}
