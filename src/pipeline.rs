//! Pipeline coordinator
//!
//! One producer (the calling thread) parses the input and feeds the chunk
//! builder; a pool of I/O workers writes the chunks it queues. The producer
//! only blocks when the flush queue is full, the workers only when it is empty.

use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{ChunkNaming, ChunkSink};
use crate::config::{SplitConfig, READ_BUF_SIZE};
use crate::queue::FlushQueue;
use crate::readers::open_input;
use crate::splitter::ChunkBuilder;
use crate::stats::ProcessingStats;
use crate::trigger::{Trigger, TriggerOutcome};
use crate::worker::{ChunkFailure, PoolStartError, WorkerPool};

/// Outcome of a completed split
#[derive(Debug)]
pub struct SplitReport {
    pub stats: ProcessingStats,
    pub failures: Vec<ChunkFailure>,
    pub final_trigger: Option<TriggerOutcome>,
}

impl SplitReport {
    /// True when every chunk reached disk
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Split the configured input into chunk files
///
/// Fails on invalid configuration or when the input cannot be read. In the
/// latter case the rows read so far are still flushed and every worker is
/// joined before the error is returned. Chunks that fail to write do not make
/// this function fail; they are listed in the report.
pub fn run_split(config: &SplitConfig) -> Result<SplitReport> {
    config.validate()?;
    let gzip = config.gzip()?;
    let mut stats = ProcessingStats::new();

    let input = open_input(&config.input.source)?;
    prepare_output_dir(&config.output.dir)?;

    let trigger = config
        .output
        .trigger
        .as_ref()
        .map(|cmd| Arc::new(Trigger::new(cmd.clone(), config.output.trigger_timeout)));

    let naming = ChunkNaming::new(&config.output.dir, config.output.prefix.clone(), gzip);
    let (mut queue, receiver) = FlushQueue::new(config.performance.backlog);
    let pool = match WorkerPool::start(config.performance.io_threads, receiver) {
        Ok(pool) => pool,
        Err(PoolStartError {
            worker_id,
            source,
            pool,
        }) => {
            queue.shutdown();
            if let Err(e) = pool.join() {
                log::error!("{:#}", e);
            }
            return Err(anyhow!("Failed to start I/O worker {}: {}", worker_id, source));
        }
    };

    log::debug!(
        "Splitting into '{}' with {} worker(s), backlog {}, {}",
        config.output.dir.display(),
        pool.len(),
        queue.capacity(),
        gzip
    );

    let mut builder = ChunkBuilder::new(&config.split, naming, queue)
        .with_gzip(gzip)
        .with_trigger(trigger.clone());

    let produced = produce(input, &mut builder, config.split.delimiter);
    // Whatever was read is flushed even when reading failed
    let finished = builder.finish();
    let summary = builder.summary();

    let mut queue = builder.into_sink();
    queue.shutdown();
    let joined = pool.join();

    produced?;
    finished?;
    let pool_report = joined?;

    stats.rows_read = summary.rows_read;
    stats.chunks_emitted = u64::from(summary.chunks_emitted);
    stats.merge(&pool_report.stats);

    let final_trigger = match trigger {
        Some(trigger) if config.output.final_trigger => {
            let outcome = trigger.run_final();
            stats.record_trigger(outcome.is_success());
            Some(outcome)
        }
        _ => None,
    };

    stats.finish_processing();

    if pool_report.failures.is_empty() {
        log::info!(
            "Split {} rows into {} chunk(s)",
            stats.rows_read,
            stats.chunks_written
        );
    } else {
        log::warn!(
            "{} of {} chunk(s) could not be written",
            pool_report.failures.len(),
            stats.chunks_emitted
        );
    }

    Ok(SplitReport {
        stats,
        failures: pool_report.failures,
        final_trigger,
    })
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create output directory '{}'", dir.display()))
}

/// Stream every record of `input` through the builder
fn produce<R: Read, S: ChunkSink>(
    input: R,
    builder: &mut ChunkBuilder<S>,
    delimiter: u8,
) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .buffer_capacity(READ_BUF_SIZE)
        .from_reader(input);
    let mut record = ByteRecord::new();

    loop {
        let more = reader.read_byte_record(&mut record).with_context(|| {
            format!(
                "Failed to read input after {} rows",
                builder.summary().rows_read
            )
        })?;
        if !more {
            return Ok(());
        }
        builder.process_record(&record)?;
    }
}
