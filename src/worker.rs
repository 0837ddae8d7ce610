//! I/O worker pool
//!
//! Workers pop completed chunks from the flush queue, write them to disk and
//! run the trigger command. A failed chunk is logged and counted; it never
//! stops the other workers or the producer.

use anyhow::{anyhow, Result};
use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::chunk::Chunk;
use crate::config::{IO_THREADS_MAX, IO_THREADS_MIN};
use crate::queue::QueueReceiver;
use crate::stats::ProcessingStats;
use crate::writer::write_chunk;

/// A chunk that could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub index: u32,
    pub path: PathBuf,
    pub rows: u64,
    pub reason: String,
}

/// What one worker did before the queue closed
#[derive(Debug, Default)]
struct WorkerReport {
    stats: ProcessingStats,
    failures: Vec<ChunkFailure>,
}

/// Combined result of every worker in the pool
#[derive(Debug, Default)]
pub struct PoolReport {
    pub stats: ProcessingStats,
    pub failures: Vec<ChunkFailure>,
}

#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerReport>>,
}

/// A worker thread could not be started
///
/// `pool` holds the workers that did start. They block on the queue until it
/// is shut down, so the caller shuts the queue down and then joins them.
#[derive(Debug, Error)]
#[error("Failed to start I/O worker {worker_id}: {source}")]
pub struct PoolStartError {
    pub worker_id: usize,
    #[source]
    pub source: io::Error,
    pub pool: WorkerPool,
}

type WorkerHandle = JoinHandle<WorkerReport>;

fn spawn_worker(worker_id: usize, receiver: QueueReceiver<Chunk>) -> io::Result<WorkerHandle> {
    thread::Builder::new()
        .name(format!("csv-split-io-{}", worker_id))
        .spawn(move || worker_thread(worker_id, receiver))
}

impl WorkerPool {
    /// Start `workers` threads (clamped to the supported range) consuming
    /// from `receiver`
    pub fn start(workers: usize, receiver: QueueReceiver<Chunk>) -> Result<Self, PoolStartError> {
        Self::start_with(workers, receiver, spawn_worker)
    }

    fn start_with<F>(
        workers: usize,
        receiver: QueueReceiver<Chunk>,
        mut spawn: F,
    ) -> Result<Self, PoolStartError>
    where
        F: FnMut(usize, QueueReceiver<Chunk>) -> io::Result<WorkerHandle>,
    {
        let workers = workers.clamp(IO_THREADS_MIN, IO_THREADS_MAX);
        let mut pool = Self {
            handles: Vec::with_capacity(workers),
        };

        for worker_id in 0..workers {
            match spawn(worker_id, receiver.clone()) {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    return Err(PoolStartError {
                        worker_id,
                        source,
                        pool,
                    })
                }
            }
        }

        log::debug!("Started {} I/O worker(s)", workers);
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to drain the queue and exit. All workers are
    /// joined even if one of them panicked.
    pub fn join(self) -> Result<PoolReport> {
        let mut report = PoolReport::default();
        let mut panicked = Vec::new();

        for (idx, handle) in self.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(worker) => {
                    report.stats.merge(&worker.stats);
                    report.failures.extend(worker.failures);
                }
                Err(_) => panicked.push(idx),
            }
        }

        if !panicked.is_empty() {
            return Err(anyhow!("I/O worker(s) {:?} panicked", panicked));
        }

        report.failures.sort_by_key(|f| f.index);
        Ok(report)
    }
}

fn worker_thread(worker_id: usize, receiver: QueueReceiver<Chunk>) -> WorkerReport {
    let mut report = WorkerReport::default();

    while let Some(chunk) = receiver.pop() {
        process_chunk(worker_id, chunk, &mut report);
    }

    log::trace!(
        "I/O worker {} finished: {} written, {} failed",
        worker_id,
        report.stats.chunks_written,
        report.stats.chunks_failed
    );
    report
}

fn process_chunk(worker_id: usize, chunk: Chunk, report: &mut WorkerReport) {
    match write_chunk(&chunk.path, &chunk.payload, chunk.gzip) {
        Ok(bytes) => {
            log::info!(
                "Wrote chunk {} ({} rows) to '{}'",
                chunk.index,
                chunk.rows,
                chunk.path.display()
            );
            report.stats.record_written(chunk.rows, bytes);
        }
        Err(e) => {
            log::error!(
                "Worker {} failed to write chunk {} ({} rows) to '{}': {:#}",
                worker_id,
                chunk.index,
                chunk.rows,
                chunk.path.display(),
                e
            );
            report.stats.record_failed();
            report.failures.push(ChunkFailure {
                index: chunk.index,
                path: chunk.path,
                rows: chunk.rows,
                reason: format!("{:#}", e),
            });
            return;
        }
    }

    if let Some(trigger) = &chunk.trigger {
        let outcome = trigger.run(&chunk.path, chunk.rows);
        report.stats.record_trigger(outcome.is_success());
    }
}
