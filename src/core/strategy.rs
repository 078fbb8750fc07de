//! Answering strategy chosen by the router.
//!
//! The router's raw output is untrusted free text; [`Strategy::normalize`]
//! is the only way it enters branching logic.

use serde::{Deserialize, Serialize};

/// How a question is answered.
///
/// `Hybrid` is the default: running both retrieval and SQL never loses
/// information, it only costs extra work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Document retrieval only.
    Rag,
    /// Database query only.
    Sql,
    /// Retrieval followed by a constrained database query.
    #[default]
    Hybrid,
}

impl Strategy {
    /// Parses an exact strategy label, ignoring case, surrounding
    /// whitespace, quotes and trailing punctuation.
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let token = s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match token.as_str() {
            "rag" => Some(Self::Rag),
            "sql" => Some(Self::Sql),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// Normalizes router output, defaulting to [`Strategy::Hybrid`] when the
    /// label is empty, malformed or contradictory.
    #[must_use]
    pub fn normalize(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Whether this strategy consults the document index.
    #[must_use]
    pub const fn uses_retrieval(self) -> bool {
        matches!(self, Self::Rag | Self::Hybrid)
    }

    /// Whether this strategy generates and runs a query.
    #[must_use]
    pub const fn uses_sql(self) -> bool {
        matches!(self, Self::Sql | Self::Hybrid)
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Sql => "sql",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
