//! Structured prompt signatures.
//!
//! A [`Signature`] names the input fields a stage sends to the model and the
//! output fields it expects back. Rendering turns input values into a tagged
//! user message; parsing turns the model's reply into a [`Prediction`],
//! tolerating replies that do not quite follow the requested format.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::AgentError;

/// Placeholder rendered for an input field with no value.
pub const EMPTY_FIELD: &str = "None";

static LABELED_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*[*#\-\s]*([A-Za-z][A-Za-z _]*?)[*\s]*:\s*(?:\*+\s*)?(.*)$").ok()
});

/// A named prompt field.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Field name as it appears in the prompt and the reply.
    pub name: &'static str,
    /// Short description shown to the model.
    pub desc: &'static str,
}

/// Input and output fields of one model call.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Signature name for logging.
    pub name: &'static str,
    /// Fields rendered into the prompt.
    pub inputs: &'static [Field],
    /// Fields expected in the reply.
    pub outputs: &'static [Field],
}

/// Question classification.
pub const ROUTER: Signature = Signature {
    name: "router",
    inputs: &[Field {
        name: "question",
        desc: "The user's question",
    }],
    outputs: &[
        Field {
            name: "route",
            desc: "Classification: 'rag' (doc-only), 'sql' (db-only), or 'hybrid' (both)",
        },
        Field {
            name: "reasoning",
            desc: "Brief explanation for the classification",
        },
    ],
};

/// Natural language to SQL.
pub const NL2SQL: Signature = Signature {
    name: "nl2sql",
    inputs: &[
        Field {
            name: "question",
            desc: "The user's question",
        },
        Field {
            name: "schema",
            desc: "Database schema information",
        },
        Field {
            name: "constraints",
            desc: "Extracted constraints: date ranges, entities, KPI formulas",
        },
        Field {
            name: "error_feedback",
            desc: "Error from previous attempt (None if first attempt)",
        },
    ],
    outputs: &[
        Field {
            name: "sql",
            desc: "SQLite query to answer the question",
        },
        Field {
            name: "explanation",
            desc: "Brief explanation of query logic",
        },
    ],
};

/// Final answer synthesis.
pub const SYNTHESIZER: Signature = Signature {
    name: "synthesizer",
    inputs: &[
        Field {
            name: "question",
            desc: "The user's question",
        },
        Field {
            name: "format_hint",
            desc: "Expected output format (e.g., 'int', 'float', '{category:str, quantity:int}')",
        },
        Field {
            name: "retrieval_results",
            desc: "Document chunks with scores and IDs",
        },
        Field {
            name: "sql_results",
            desc: "SQL query results as JSON",
        },
    ],
    outputs: &[
        Field {
            name: "final_answer",
            desc: "Answer matching format_hint exactly",
        },
        Field {
            name: "confidence",
            desc: "Confidence score 0.0-1.0",
        },
        Field {
            name: "explanation",
            desc: "Brief explanation (at most 2 sentences)",
        },
        Field {
            name: "citations",
            desc: "Comma-separated list of DB tables and doc chunk IDs used",
        },
    ],
};

impl Signature {
    /// Renders input values as a tagged user message followed by the
    /// expected reply format.
    ///
    /// Inputs missing from `values`, or blank, render as [`EMPTY_FIELD`].
    #[must_use]
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut prompt = String::new();
        for field in self.inputs {
            let value = values
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(EMPTY_FIELD);
            let _ = write!(prompt, "<{name}>\n{value}\n</{name}>\n\n", name = field.name);
        }

        prompt.push_str("Respond with a JSON object with these keys:\n");
        for field in self.outputs {
            let _ = writeln!(prompt, "- \"{}\": {}", field.name, field.desc);
        }
        prompt
    }

    /// Parses a model reply into a [`Prediction`].
    ///
    /// Accepts a JSON object (bare, fenced, or embedded in prose) or
    /// `field: value` lines. Output fields listed in `required` must be
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ResponseParse`] when a required field is
    /// missing.
    pub fn parse(&self, content: &str, required: &[&str]) -> Result<Prediction, AgentError> {
        let stripped = strip_fences(content);
        let prediction = parse_json_object(&stripped, self.outputs)
            .unwrap_or_else(|| parse_labeled(&stripped, self.outputs));

        if let Some(missing) = required.iter().find(|f| prediction.get(f).is_none()) {
            return Err(AgentError::ResponseParse {
                message: format!("{} reply is missing field '{missing}'", self.name),
                content: content.to_string(),
            });
        }
        Ok(prediction)
    }
}

/// Output field values parsed from a model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prediction {
    fields: BTreeMap<String, String>,
}

impl Prediction {
    /// Returns the value of an output field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Removes lines that open or close a fenced code block.
#[must_use]
pub fn strip_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_json_object(text: &str, outputs: &[Field]) -> Option<Prediction> {
    let object = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            (start < end)
                .then(|| serde_json::from_str::<Value>(&text[start..=end]).ok())
                .flatten()
        })?;
    let Value::Object(map) = object else {
        return None;
    };

    let fields = outputs
        .iter()
        .filter_map(|field| {
            let value = match map.get(field.name)? {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((field.name.to_string(), value))
        })
        .collect::<BTreeMap<_, _>>();

    (!fields.is_empty()).then_some(Prediction { fields })
}

fn parse_labeled(text: &str, outputs: &[Field]) -> Prediction {
    let Some(re) = LABELED_LINE.as_ref() else {
        return Prediction::default();
    };

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<&'static str> = None;

    for line in text.lines() {
        let label = re.captures(line).and_then(|caps| {
            let key = caps.get(1)?.as_str().trim().to_lowercase().replace(' ', "_");
            let field = outputs.iter().find(|f| f.name == key)?;
            Some((field.name, caps.get(2).map_or("", |m| m.as_str())))
        });

        match (label, current) {
            (Some((name, rest)), _) => {
                fields.insert(name.to_string(), rest.trim().to_string());
                current = Some(name);
            }
            (None, Some(name)) => {
                if let Some(value) = fields.get_mut(name) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(line.trim());
                }
            }
            (None, None) => {}
        }
    }

    fields.retain(|_, v| {
        *v = v.trim().to_string();
        !v.is_empty()
    });
    Prediction { fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_inputs_and_outputs() {
        let prompt = NL2SQL.render(&[
            ("question", "total revenue for order 10248"),
            ("schema", "## Table: Orders"),
            ("error_feedback", ""),
        ]);
        assert!(prompt.contains("<question>\ntotal revenue for order 10248\n</question>"));
        assert!(prompt.contains("<schema>\n## Table: Orders\n</schema>"));
        assert!(prompt.contains("<constraints>\nNone\n</constraints>"));
        assert!(prompt.contains("<error_feedback>\nNone\n</error_feedback>"));
        assert!(prompt.contains("\"sql\""));
        assert!(prompt.contains("\"explanation\""));
    }

    #[test]
    fn test_parse_plain_json() {
        let p = ROUTER
            .parse(r#"{"route": "sql", "reasoning": "needs totals"}"#, &["route"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("route"), Some("sql"));
        assert_eq!(p.get("reasoning"), Some("needs totals"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"sql\": \"SELECT 1\", \"explanation\": \"trivial\"}\n```";
        let p = NL2SQL
            .parse(reply, &["sql"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("sql"), Some("SELECT 1"));
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let reply = "Sure! Here it is: {\"route\": \"rag\"} Hope that helps.";
        let p = ROUTER
            .parse(reply, &["route"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("route"), Some("rag"));
    }

    #[test]
    fn test_parse_stringifies_non_string_values() {
        let reply = r#"{"final_answer": {"category": "Beverages", "quantity": 12}, "confidence": 0.9, "citations": ["orders"], "explanation": null}"#;
        let p = SYNTHESIZER
            .parse(reply, &["final_answer"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            p.get("final_answer"),
            Some(r#"{"category":"Beverages","quantity":12}"#)
        );
        assert_eq!(p.get("confidence"), Some("0.9"));
        assert_eq!(p.get("citations"), Some(r#"["orders"]"#));
        assert_eq!(p.get("explanation"), None);
    }

    #[test]
    fn test_parse_labeled_lines() {
        let reply = "Route: hybrid\nReasoning: needs the calendar\nand the orders table";
        let p = ROUTER
            .parse(reply, &["route"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("route"), Some("hybrid"));
        assert_eq!(
            p.get("reasoning"),
            Some("needs the calendar\nand the orders table")
        );
    }

    #[test]
    fn test_parse_markdown_labels() {
        let reply = "**Final Answer:** 42\n**Explanation:** counted rows";
        let p = SYNTHESIZER
            .parse(reply, &["final_answer"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("final_answer"), Some("42"));
        assert_eq!(p.get("explanation"), Some("counted rows"));
    }

    #[test]
    fn test_parse_missing_required_field() {
        let result = NL2SQL.parse("I cannot help with that.", &["sql"]);
        assert!(matches!(result, Err(AgentError::ResponseParse { .. })));
    }

    #[test]
    fn test_json_without_known_fields_falls_back_to_labels() {
        let p = ROUTER
            .parse("{\"answer\": 1}", &[])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(p.get("route"), None);
        assert_eq!(p.get("reasoning"), None);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_fences("  SELECT 2  "), "SELECT 2");
    }
}
