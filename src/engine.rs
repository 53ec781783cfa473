//! Parse engine
//!
//! A value object: options, the parser registry, and a counting permit
//! pool. Multiple engines coexist with independent option sets; there is
//! no global state. Every top-level parse holds one permit for its full
//! duration, released on success and failure alike.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::ParseContext;
use crate::metadata::ParsedAudioMetadata;
use crate::options::ParseOptions;
use crate::probe::{ParserRegistry, PROBE_PREFIX_LEN};
use crate::reader::WindowedReader;
use crate::source::{ByteSource, FileSource, MemorySource};

pub struct Engine {
    options: ParseOptions,
    registry: ParserRegistry,
    permits: Arc<PermitPool>,
}

impl Engine {
    /// Engine with default options
    pub fn new() -> Self {
        Engine::with_options(ParseOptions::default())
    }

    /// Engine with explicit options
    pub fn with_options(options: ParseOptions) -> Self {
        let permits = Arc::new(PermitPool::new(options.effective_max_concurrent_tasks()));
        Engine {
            options,
            registry: ParserRegistry::with_default_parsers(),
            permits,
        }
    }

    /// The options this engine parses with
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse a file on disk
    pub fn parse_path<P: AsRef<Path>>(&self, path: P) -> Result<ParsedAudioMetadata> {
        let source = FileSource::open(path)?;
        self.run(Box::new(source))
    }

    /// Parse an in-memory buffer
    pub fn parse_bytes(
        &self,
        data: impl Into<Bytes>,
        name_hint: Option<&str>,
    ) -> Result<ParsedAudioMetadata> {
        self.run(Box::new(MemorySource::new(data, name_hint)))
    }

    /// Parse a forward-only stream by draining it into memory first
    pub fn parse_stream<R: Read>(
        &self,
        reader: R,
        name_hint: Option<&str>,
    ) -> Result<ParsedAudioMetadata> {
        let source = MemorySource::from_reader(reader, name_hint)?;
        self.run(Box::new(source))
    }

    fn run(&self, source: Box<dyn ByteSource>) -> Result<ParsedAudioMetadata> {
        let _permit = self.permits.acquire();

        let mut reader = WindowedReader::new(source, &self.options);
        let name_hint = reader.name_hint().map(str::to_string);
        let header = reader.read(0, PROBE_PREFIX_LEN)?;

        let parser = self
            .registry
            .resolve(
                &header,
                name_hint.as_deref(),
                self.options.allow_heuristic_fallback,
            )
            .ok_or_else(|| Error::unsupported_format("no parser accepted the input"))?;

        debug!(format = %parser.format(), hint = name_hint.as_deref(), "dispatching parse");
        let ctx = ParseContext::new(self.options.clone(), name_hint);
        let mut metadata = parser.parse(&mut reader, &ctx)?;

        metadata.diagnostics.parser_name = parser.format().name().to_string();
        metadata.diagnostics.bytes_read = reader.bytes_read();
        Ok(metadata)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// Counting semaphore with FIFO waiters
///
/// Tickets impose the FIFO order: a waiter proceeds only when its ticket
/// is at the head and a permit is free. Not re-entrant.
struct PermitPool {
    state: Mutex<PoolState>,
    cond: Condvar,
}

struct PoolState {
    available: usize,
    next_ticket: u64,
    now_serving: u64,
}

impl PermitPool {
    fn new(permits: usize) -> Self {
        PermitPool {
            state: Mutex::new(PoolState {
                available: permits.max(1),
                next_ticket: 0,
                now_serving: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn acquire(self: &Arc<Self>) -> Permit {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket || state.available == 0 {
            self.cond.wait(&mut state);
        }
        state.available -= 1;
        state.now_serving += 1;
        self.cond.notify_all();

        Permit {
            pool: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        self.cond.notify_all();
    }
}

/// RAII permit; dropping returns it to the pool
struct Permit {
    pool: Arc<PermitPool>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.pool.release();
    }
}
