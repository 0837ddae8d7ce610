use clap::Parser;

use csv_split::cli::Cli;
use csv_split::config::{format_error_message, format_warning_message, SplitConfig};
use csv_split::config_file::ConfigFile;
use csv_split::platform::{ExitCode, SafeStderr};
use csv_split::run_split;

fn main() {
    let mut stderr = SafeStderr::new();

    // Process command line arguments with config file support
    let cli = process_args_with_config(&mut stderr);
    init_logging(&cli);

    let config = SplitConfig::from_cli(&cli);
    if let Err(e) = config.validate() {
        stderr
            .writeln(&format_error_message(&format!("{:#}", e)))
            .unwrap_or(());
        ExitCode::InvalidUsage.exit();
    }

    let report = match run_split(&config) {
        Ok(report) => report,
        Err(e) => {
            stderr
                .writeln(&format_error_message(&format!("{:#}", e)))
                .unwrap_or(());
            ExitCode::GeneralError.exit();
        }
    };

    for failure in &report.failures {
        stderr
            .writeln(&format_error_message(&format!(
                "Chunk {} ({} rows) was not written: {}",
                failure.index, failure.rows, failure.reason
            )))
            .unwrap_or(());
    }

    // Totals are always shown when something went wrong
    if cli.stats || !report.is_success() {
        stderr.writeln(&report.stats.format_stats()).unwrap_or(());
    }

    if report.is_success() {
        ExitCode::Success.exit();
    }

    stderr
        .writeln(&format_warning_message(&format!(
            "{} of {} chunk(s) failed",
            report.failures.len(),
            report.stats.chunks_emitted
        )))
        .unwrap_or(());
    ExitCode::GeneralError.exit();
}

fn init_logging(cli: &Cli) {
    let level = cli.log_level();
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.to_string()),
    );
    if level >= log::LevelFilter::Debug {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp(None).format_target(false);
    }
    builder.init();
}

/// Extract the value of --config-file from raw args
fn extract_config_file_arg(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config-file" {
            return iter.next().cloned();
        }
        if let Some(path) = arg.strip_prefix("--config-file=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Process command line arguments with config file support
fn process_args_with_config(stderr: &mut SafeStderr) -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();

    // --show-config needs no other arguments, so it runs before parsing
    if raw_args.iter().any(|arg| arg == "--show-config") {
        ConfigFile::show_config();
        ExitCode::Success.exit();
    }

    let processed_args = if raw_args.iter().any(|arg| arg == "--ignore-config") {
        raw_args
    } else {
        let config_file_path = extract_config_file_arg(&raw_args);
        match ConfigFile::load_with_custom_path(config_file_path.as_deref()) {
            Ok(config_file) => match config_file.process_args(raw_args) {
                Ok(processed) => processed,
                Err(e) => {
                    stderr
                        .writeln(&format!("csv-split: Config error: {:#}", e))
                        .unwrap_or(());
                    ExitCode::InvalidUsage.exit();
                }
            },
            Err(e) => {
                stderr
                    .writeln(&format!("csv-split: Config file error: {:#}", e))
                    .unwrap_or(());
                ExitCode::GeneralError.exit();
            }
        }
    };

    Cli::parse_from(processed_args)
}
