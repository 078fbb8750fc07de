//! Domain value types shared by every layer.
//!
//! Nothing in here performs I/O.

pub mod answer;
pub mod chunk;
pub mod question;
pub mod strategy;

pub use answer::{CoercedAnswer, coerce_answer, round2};
pub use chunk::{RetrievedChunk, mean_score};
pub use question::{FormatHint, Question};
pub use strategy::Strategy;
