//! Core library for the csv-split chunking tool

pub mod buffer;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod pipeline;
pub mod platform;
pub mod queue;
pub mod readers;
pub mod splitter;
pub mod stats;
pub mod trigger;
pub mod worker;
pub mod writer;

pub use chunk::{Chunk, ChunkNaming, ChunkSink, GzipLevel};
pub use config::{HeaderMode, InputSource, SplitConfig, SplitSettings};
pub use pipeline::{run_split, SplitReport};
pub use queue::{FlushQueue, QueueError, QueueReceiver};
pub use splitter::ChunkBuilder;
pub use trigger::{Trigger, TriggerOutcome};
pub use worker::{ChunkFailure, PoolStartError, WorkerPool};
