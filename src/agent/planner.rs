//! Constraint planner.
//!
//! Turns retrieved context into a constraint summary for the query
//! generator. Calendar chunks come first, KPI definitions next, and the
//! question itself last.

use crate::core::RetrievedChunk;

/// Constraints used when no chunk carries calendar or KPI context.
pub const NO_CONSTRAINTS: &str = "No specific constraints";

/// Chunk id marker for marketing calendar documents.
const CALENDAR_MARKER: &str = "marketing_calendar";
/// Chunk id marker for KPI definition documents.
const KPI_MARKER: &str = "kpi_definitions";

/// Builds the constraint summary for `question` from `chunks`.
///
/// Never returns an empty string: with no qualifying chunk the result is
/// [`NO_CONSTRAINTS`].
#[must_use]
pub fn plan_constraints(question: &str, chunks: &[RetrievedChunk]) -> String {
    let calendar = chunks
        .iter()
        .filter(|c| c.id.contains(CALENDAR_MARKER))
        .map(|c| format!("Marketing calendar context: {}", c.content));
    let kpis = chunks
        .iter()
        .filter(|c| c.id.contains(KPI_MARKER))
        .map(|c| format!("KPI definition: {}", c.content));

    let context: Vec<String> = calendar.chain(kpis).collect();
    if context.is_empty() {
        return NO_CONSTRAINTS.to_string();
    }

    let mut parts = context;
    parts.push(format!("Question context: {question}"));
    parts.join("\n")
}
