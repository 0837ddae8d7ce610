//! Command-line interface definition

use clap::Parser;
use std::time::Duration;

use crate::config::{HeaderMode, IO_THREADS_DEFAULT};
use crate::queue::QUEUE_BACKLOG_DEFAULT;

#[derive(Parser, Debug)]
#[command(name = "csv-split")]
#[command(about = "Split a CSV stream into numbered chunk files without breaking row groups")]
#[command(
    long_about = "Split a CSV stream into numbered chunk files without breaking row groups\n\nRows are written to <OUTPUT_DIR>/<PREFIX><NNNNN>.csv[.gz]. With --group-col, rows\nsharing a value in that column always land in the same chunk, even when the group\nis larger than --num-rows.\n\nEXAMPLES:\n  csv-split -n 100000 data.csv out/\n  csv-split -n 5000 -g 0 -i 4 --gzip orders.csv chunks/\n  zcat big.csv.gz | csv-split --stdin -n 1000 big_ out/\n  csv-split -n 1000 -t 'wc -l \"$CSV_PAYLOAD_FILE\"' data.csv"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Input CSV file; with --stdin, the output file prefix
    pub input: String,

    /// Directory receiving the chunk files (created if missing)
    pub output_dir: Option<String>,

    /// Read CSV data from standard input
    #[arg(long = "stdin", help_heading = "Input Options")]
    pub stdin: bool,

    /// Field delimiter for input and output (single ASCII character, or "tab")
    #[arg(
        short = 'd',
        long = "delimiter",
        default_value = ",",
        value_parser = parse_delimiter,
        help_heading = "Input Options"
    )]
    pub delimiter: u8,

    /// How to treat the first row
    #[arg(
        long = "header",
        value_enum,
        default_value_t = HeaderMode::None,
        help_heading = "Input Options"
    )]
    pub header: HeaderMode,

    /// Maximum rows per chunk
    #[arg(short = 'n', long = "num-rows", help_heading = "Split Options")]
    pub num_rows: u64,

    /// 0-based column whose equal values must stay in one chunk; negative disables
    #[arg(
        short = 'g',
        long = "group-col",
        default_value_t = -1,
        allow_negative_numbers = true,
        help_heading = "Split Options"
    )]
    pub group_col: i64,

    /// Output file prefix (default: input file stem followed by '_')
    #[arg(short = 'p', long = "prefix", help_heading = "Output Options")]
    pub prefix: Option<String>,

    /// Gzip output chunks; optional level 1-9 (default 6)
    #[arg(
        short = 'z',
        long = "gzip",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "6",
        value_name = "LEVEL",
        help_heading = "Output Options"
    )]
    pub gzip: Option<u32>,

    /// Command run after each chunk is written; receives CSV_PAYLOAD_FILE and CSV_ROWCOUNT
    #[arg(short = 't', long = "trigger", help_heading = "Output Options")]
    pub trigger: Option<String>,

    /// Kill a trigger command running longer than this many seconds
    #[arg(
        long = "trigger-timeout",
        value_name = "SECONDS",
        value_parser = parse_seconds,
        requires = "trigger",
        help_heading = "Output Options"
    )]
    pub trigger_timeout: Option<Duration>,

    /// Don't run the trigger once more after the last chunk
    #[arg(long = "no-final-trigger", help_heading = "Output Options")]
    pub no_final_trigger: bool,

    /// Number of I/O worker threads (1-10)
    #[arg(
        short = 'i',
        long = "io-threads",
        default_value_t = IO_THREADS_DEFAULT,
        help_heading = "Performance Options"
    )]
    pub io_threads: usize,

    /// Completed chunks allowed to wait for a worker before reading pauses
    #[arg(
        long = "backlog",
        default_value_t = QUEUE_BACKLOG_DEFAULT,
        help_heading = "Performance Options"
    )]
    pub backlog: usize,

    /// Print processing statistics to stderr
    #[arg(short = 's', long = "stats", help_heading = "Diagnostics")]
    pub stats: bool,

    /// Only log errors
    #[arg(
        short = 'q',
        long = "quiet",
        conflicts_with = "verbose",
        help_heading = "Diagnostics"
    )]
    pub quiet: bool,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Diagnostics")]
    pub verbose: u8,

    /// Specify custom configuration file path
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Ignore configuration files
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Use alias from configuration file
    #[arg(short = 'a', long = "alias", help_heading = "Configuration Options")]
    pub alias: Vec<String>,

    /// Show configuration file and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

impl Cli {
    /// Log filter derived from -q / -v
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => return Ok(b'\t'),
        "\n" | "\r" | "\"" => {
            return Err(format!(
                "'{}' cannot be used as a delimiter",
                value.escape_default()
            ))
        }
        _ => {}
    }

    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!(
            "delimiter must be a single ASCII character, got '{}'",
            value
        )),
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(format!("timeout must be a positive number of seconds, got '{}'", value));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("timeout of '{}' seconds is too large", value))
}
