use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunk::GzipLevel;
use crate::queue::QUEUE_BACKLOG_DEFAULT;

pub const IO_THREADS_DEFAULT: usize = 1;
pub const IO_THREADS_MIN: usize = 1;
pub const IO_THREADS_MAX: usize = 10;

/// Read buffer for the input stream (32 KiB)
pub const READ_BUF_SIZE: usize = 32 * 1024;

/// Main configuration struct for csv-split
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub split: SplitSettings,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    pub source: InputSource,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// 0 disables compression
    pub gzip_level: u32,
    pub trigger: Option<String>,
    pub trigger_timeout: Option<Duration>,
    pub final_trigger: bool,
}

/// Settings that drive the split decision
#[derive(Debug, Clone)]
pub struct SplitSettings {
    pub max_rows: u64,
    pub group_column: Option<usize>,
    pub delimiter: u8,
    pub header: HeaderMode,
    /// Initial row buffer capacity; `None` uses the default
    pub buffer_capacity: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub io_threads: usize,
    pub backlog: usize,
}

/// What to do with the first input row
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// The first row is data
    #[default]
    None,
    /// Repeat the first row at the top of every chunk
    Keep,
    /// Discard the first row
    Drop,
}

impl SplitConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(cli: &crate::cli::Cli) -> Self {
        let source = if cli.stdin {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(&cli.input))
        };

        let prefix = match (&cli.prefix, cli.stdin) {
            (Some(prefix), _) => prefix.clone(),
            // The positional argument names the prefix when reading stdin
            (None, true) => cli.input.clone(),
            (None, false) => default_prefix(Path::new(&cli.input)),
        };

        Self {
            input: InputConfig { source },
            output: OutputConfig {
                dir: cli
                    .output_dir
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
                prefix,
                gzip_level: cli.gzip.unwrap_or(0),
                trigger: cli.trigger.clone(),
                trigger_timeout: cli.trigger_timeout,
                final_trigger: !cli.no_final_trigger,
            },
            split: SplitSettings {
                max_rows: cli.num_rows,
                group_column: usize::try_from(cli.group_col).ok(),
                delimiter: cli.delimiter,
                header: cli.header,
                buffer_capacity: None,
            },
            performance: PerformanceConfig {
                io_threads: cli.io_threads,
                backlog: cli.backlog,
            },
        }
    }

    /// Check everything that must hold before the pipeline starts
    pub fn validate(&self) -> Result<()> {
        if self.split.max_rows == 0 {
            return Err(anyhow!("--num-rows must be at least 1"));
        }

        if !(IO_THREADS_MIN..=IO_THREADS_MAX).contains(&self.performance.io_threads) {
            return Err(anyhow!(
                "--io-threads must be between {} and {} (got {})",
                IO_THREADS_MIN,
                IO_THREADS_MAX,
                self.performance.io_threads
            ));
        }

        if self.performance.backlog == 0 {
            return Err(anyhow!("--backlog must be at least 1"));
        }

        self.gzip()?;

        if let InputSource::File(path) = &self.input.source {
            if !path.is_file() {
                return Err(anyhow!("Input file '{}' does not exist", path.display()));
            }
        }

        if self.output.prefix.contains(std::path::is_separator) {
            return Err(anyhow!(
                "Prefix '{}' must not contain a path separator",
                self.output.prefix
            ));
        }

        if self.output.dir.exists() && !self.output.dir.is_dir() {
            return Err(anyhow!(
                "Output path '{}' is not a directory",
                self.output.dir.display()
            ));
        }

        if matches!(self.output.trigger.as_deref(), Some(cmd) if cmd.trim().is_empty()) {
            return Err(anyhow!("--trigger command must not be empty"));
        }

        Ok(())
    }

    pub fn gzip(&self) -> Result<GzipLevel> {
        GzipLevel::new(self.output.gzip_level)
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                source: InputSource::Stdin,
            },
            output: OutputConfig {
                dir: PathBuf::from("."),
                prefix: "out_".to_string(),
                gzip_level: 0,
                trigger: None,
                trigger_timeout: None,
                final_trigger: true,
            },
            split: SplitSettings {
                max_rows: 1,
                group_column: None,
                delimiter: b',',
                header: HeaderMode::None,
                buffer_capacity: None,
            },
            performance: PerformanceConfig {
                io_threads: IO_THREADS_DEFAULT,
                backlog: QUEUE_BACKLOG_DEFAULT,
            },
        }
    }
}

/// `data.csv` -> `data_`
pub fn default_prefix(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    // `data.csv.gz` -> `data_`
    let stem = stem.strip_suffix(".csv").unwrap_or(&stem);
    format!("{}_", stem)
}

/// Format an error message with the program prefix
pub fn format_error_message(message: &str) -> String {
    format!("csv-split: Error: {}", message)
}

/// Format a warning message with the program prefix
pub fn format_warning_message(message: &str) -> String {
    format!("csv-split: Warning: {}", message)
}
