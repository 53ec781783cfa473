//! Format probing and parser resolution
//!
//! The detector scores magic bytes and the filename hint into a ranked
//! candidate list; the registry turns that list into a concrete parser,
//! falling back to registration order when no probed candidate accepts.

pub mod detector;
pub mod registry;

pub use detector::{probe_candidates, Candidate};
pub use registry::ParserRegistry;

/// Prefix length the engine hands to the probe
pub const PROBE_PREFIX_LEN: usize = 4096;
