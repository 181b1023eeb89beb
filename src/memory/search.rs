//! Query preparation for the trigram full-text projection.

/// Shortest needle the trigram tokenizer can answer through `MATCH`.
pub const MIN_MATCH_CHARS: usize = 3;

/// How a search string is executed against `memory_fts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtsQuery {
    /// Quoted FTS5 phrase, ranked by bm25.
    Phrase(String),
    /// `LIKE` pattern (with `\` escapes) for needles too short for trigrams.
    Like(String),
    /// Nothing to search for.
    Empty,
}

impl FtsQuery {
    /// Prepare free text for execution.
    ///
    /// The whole string is treated as one literal phrase, so FTS5 operators
    /// and column filters typed by a user never change the query shape.
    pub fn prepare(text: &str) -> Self {
        let needle = text.trim();
        if needle.is_empty() {
            return Self::Empty;
        }
        if needle.chars().count() < MIN_MATCH_CHARS {
            return Self::Like(like_pattern(needle));
        }
        Self::Phrase(format!("\"{}\"", needle.replace('"', "\"\"")))
    }
}

fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
