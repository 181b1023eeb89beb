//! Upstream content records and the processors that normalize them.
//!
//! Rendering, OCR and language-model calls happen outside this crate. What
//! arrives here is a [`RawPage`] of extracted text; a [`PageProcessor`]
//! turns it into the single [`PageRecord`] shape the graph builder consumes,
//! whichever processing path produced it.

mod processor;
mod types;

pub use processor::{Enrichment, PageProcessor, ProcessingMode, Summarizer};
pub use types::{PageRecord, RawPage};
