//! Parse configuration

/// Smallest window the reader will cache
pub const MIN_WINDOW_SIZE: usize = 4096;

/// Smallest permitted cap on a single read request
pub const MIN_MAX_READ_BYTES: usize = 256 * 1024;

/// Default window size
pub const DEFAULT_WINDOW_SIZE: usize = 64 * 1024;

/// Default cap on a single read request
pub const DEFAULT_MAX_READ_BYTES: usize = 16 * 1024 * 1024;

/// Default cap on binary payload embedding
pub const DEFAULT_MAX_BINARY_TAG_BYTES: usize = 8 * 1024 * 1024;

/// Configuration for parsing
///
/// All fields have working defaults; minimums are enforced by the accessor
/// methods rather than at construction so a literal struct update stays
/// ergonomic.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Target size of the reader's cached window
    pub window_size: usize,
    /// Decode tag vocabularies (ID3v2, APEv2, Vorbis comments, ilst, ASF)
    pub parse_tags: bool,
    /// Promote downgradeable warnings to errors
    pub strict_mode: bool,
    /// Hard cap on a single read request to the reader
    pub max_read_bytes: usize,
    /// Embed binary payload bytes alongside the digest
    pub include_binary_data: bool,
    /// Maximum payload size eligible for embedding
    pub max_binary_tag_bytes: usize,
    /// Permit the final fallback parser to attempt ID3/APE recovery
    pub allow_heuristic_fallback: bool,
    /// Permits in the engine's pool
    pub max_concurrent_tasks: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            window_size: DEFAULT_WINDOW_SIZE,
            parse_tags: true,
            strict_mode: false,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            include_binary_data: false,
            max_binary_tag_bytes: DEFAULT_MAX_BINARY_TAG_BYTES,
            allow_heuristic_fallback: true,
            max_concurrent_tasks: default_concurrency(),
        }
    }
}

impl ParseOptions {
    /// Effective window size (clamped to the minimum)
    pub fn effective_window_size(&self) -> usize {
        self.window_size.max(MIN_WINDOW_SIZE)
    }

    /// Effective read cap (clamped to the minimum)
    pub fn effective_max_read_bytes(&self) -> usize {
        self.max_read_bytes.max(MIN_MAX_READ_BYTES)
    }

    /// Effective permit count (at least one)
    pub fn effective_max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }
}

/// Default permit count: min(4, available CPUs), at least 1
fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(4).max(1)
}
