//! Parser registry
//!
//! Holds the fixed, ordered list of parsers. Order matters only for the
//! fallback path: when no probed candidate accepts, the first parser in
//! registration order willing to take the input wins, and the
//! always-accepting fallback parser sits last.

use tracing::debug;

use crate::format::{default_parsers, FormatParser};
use crate::metadata::AudioFormat;
use crate::probe::detector::probe_candidates;

pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
}

impl ParserRegistry {
    /// Build a registry over an explicit parser list
    pub fn new(parsers: Vec<Box<dyn FormatParser>>) -> Self {
        ParserRegistry { parsers }
    }

    /// Build the standard registry
    pub fn with_default_parsers() -> Self {
        ParserRegistry::new(default_parsers())
    }

    /// Resolve a parser for the given header prefix and filename hint
    ///
    /// Walks probe candidates in score order first; if none of them
    /// accepts, falls back to registration order. `allow_fallback`
    /// gates the terminal always-accepting parser.
    pub fn resolve(
        &self,
        header: &[u8],
        name_hint: Option<&str>,
        allow_fallback: bool,
    ) -> Option<&dyn FormatParser> {
        for candidate in probe_candidates(header, name_hint) {
            if let Some(parser) = self
                .parsers
                .iter()
                .find(|p| p.format() == candidate.format && p.can_parse(header, name_hint))
            {
                debug!(
                    format = %candidate.format,
                    score = candidate.score,
                    "resolved parser from probe"
                );
                return Some(parser.as_ref());
            }
        }

        self.parsers
            .iter()
            .filter(|p| allow_fallback || p.format() != AudioFormat::Unknown)
            .find(|p| p.can_parse(header, name_hint))
            .map(|p| {
                debug!(format = %p.format(), "resolved parser by registration order");
                p.as_ref()
            })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry::with_default_parsers()
    }
}
