use std::time::{Duration, Instant};

/// Statistics collected during a split run
///
/// Each I/O worker keeps its own copy; the coordinator merges them after the
/// workers are joined.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    pub rows_read: u64,
    pub chunks_emitted: u64,
    pub chunks_written: u64,
    pub chunks_failed: u64,
    pub rows_written: u64,
    pub bytes_written: u64,
    pub triggers_run: u64,
    pub triggers_failed: u64,
    pub processing_time: Duration,
    pub start_time: Option<Instant>,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_written(&mut self, rows: u64, bytes: u64) {
        self.chunks_written += 1;
        self.rows_written += rows;
        self.bytes_written += bytes;
    }

    pub fn record_failed(&mut self) {
        self.chunks_failed += 1;
    }

    pub fn record_trigger(&mut self, success: bool) {
        self.triggers_run += 1;
        if !success {
            self.triggers_failed += 1;
        }
    }

    /// Fold a worker's counters into this one
    pub fn merge(&mut self, other: &ProcessingStats) {
        self.chunks_written += other.chunks_written;
        self.chunks_failed += other.chunks_failed;
        self.rows_written += other.rows_written;
        self.bytes_written += other.bytes_written;
        self.triggers_run += other.triggers_run;
        self.triggers_failed += other.triggers_failed;
    }

    pub fn finish_processing(&mut self) {
        if let Some(start) = self.start_time {
            self.processing_time = start.elapsed();
        }
    }

    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Rows processed: {} read, {} written; Chunks: {} emitted, {} written",
            self.rows_read, self.rows_written, self.chunks_emitted, self.chunks_written
        );

        if self.chunks_failed > 0 {
            output.push_str(&format!(", {} failed", self.chunks_failed));
        }

        output.push_str(&format!(", {} bytes", self.bytes_written));

        let processing_time_ms = self.processing_time.as_millis();
        output.push_str(&format!(" in {}ms", processing_time_ms));

        if processing_time_ms > 0 && self.rows_read > 0 {
            let rows_per_sec = (self.rows_read as f64 * 1000.0) / processing_time_ms as f64;
            output.push_str(&format!(" ({:.0} rows/s)", rows_per_sec));
        }

        if self.triggers_run > 0 {
            output.push_str(&format!(", {} trigger runs", self.triggers_run));
            if self.triggers_failed > 0 {
                output.push_str(&format!(" ({} failed)", self.triggers_failed));
            }
        }

        output
    }
}
