//! Chunk descriptors handed from the builder to the I/O workers

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::queue::FlushQueue;
use crate::trigger::Trigger;

/// Level used by a bare `--gzip` flag
pub const GZIP_DEFAULT_LEVEL: u32 = 6;
pub const GZIP_MIN_LEVEL: u32 = 1;
pub const GZIP_MAX_LEVEL: u32 = 9;

/// Gzip compression level for output chunks; zero disables compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GzipLevel(u32);

impl GzipLevel {
    pub const NONE: GzipLevel = GzipLevel(0);

    pub fn new(level: u32) -> Result<Self> {
        if level == 0 || (GZIP_MIN_LEVEL..=GZIP_MAX_LEVEL).contains(&level) {
            Ok(Self(level))
        } else {
            Err(anyhow!(
                "Unknown compression level: {} (expected {}-{}, or 0 to disable)",
                level,
                GZIP_MIN_LEVEL,
                GZIP_MAX_LEVEL
            ))
        }
    }

    pub fn level(self) -> u32 {
        self.0
    }

    pub fn is_enabled(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for GzipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_enabled() {
            write!(f, "gzip level {}", self.0)
        } else {
            write!(f, "uncompressed")
        }
    }
}

/// Derives output file paths from the output directory and prefix
#[derive(Debug, Clone)]
pub struct ChunkNaming {
    dir: PathBuf,
    prefix: String,
    gzip: bool,
}

impl ChunkNaming {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, gzip: GzipLevel) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            gzip: gzip.is_enabled(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<prefix><index:05>.csv[.gz]`
    pub fn path_for(&self, index: u32) -> PathBuf {
        let extension = if self.gzip { ".csv.gz" } else { ".csv" };
        self.dir
            .join(format!("{}{:05}{}", self.prefix, index, extension))
    }
}

/// One completed chunk in transit to a worker
///
/// Not `Clone`: the payload has exactly one owner, first the builder and then
/// the worker that pops it.
#[derive(Debug)]
pub struct Chunk {
    pub index: u32,
    pub path: PathBuf,
    pub rows: u64,
    pub payload: Vec<u8>,
    pub gzip: GzipLevel,
    pub trigger: Option<Arc<Trigger>>,
}

/// Destination for completed chunks
pub trait ChunkSink {
    fn submit(&mut self, chunk: Chunk) -> Result<()>;
}

impl ChunkSink for FlushQueue<Chunk> {
    fn submit(&mut self, chunk: Chunk) -> Result<()> {
        let index = chunk.index;
        self.push(chunk)
            .with_context(|| format!("Internal error: chunk {} could not be queued", index))
    }
}

impl ChunkSink for Vec<Chunk> {
    fn submit(&mut self, chunk: Chunk) -> Result<()> {
        self.push(chunk);
        Ok(())
    }
}
