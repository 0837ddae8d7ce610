use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;
use std::process;

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Safe wrapper for writing to stderr
pub struct SafeStderr {
    stderr: io::Stderr,
}

impl SafeStderr {
    pub fn new() -> Self {
        Self {
            stderr: io::stderr(),
        }
    }

    /// Write a line to stderr, handling errors gracefully
    pub fn writeln(&mut self, data: &str) -> Result<()> {
        match writeln!(self.stderr, "{}", data) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Nowhere left to report to
                ExitCode::GeneralError.exit();
            }
        }
    }
}

impl Default for SafeStderr {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a helpful error message for file creation failures
pub fn describe_file_error(path: &Path, error: &io::Error) -> String {
    let base_msg = format!("Cannot create output file '{}': {}", path.display(), error);

    let suggestion = match error.kind() {
        io::ErrorKind::PermissionDenied => {
            if path.parent().is_some_and(|p| !p.exists()) {
                "Suggestion: Output directory does not exist, create it first"
            } else {
                "Suggestion: Check directory permissions or choose a writable output directory"
            }
        }
        io::ErrorKind::NotFound => "Suggestion: Output directory does not exist, create it first",
        _ if path.is_dir() => {
            "Suggestion: A directory exists with the chunk's name, remove it or change --prefix"
        }
        io::ErrorKind::InvalidInput => "Suggestion: Check for invalid characters in --prefix",
        _ => return base_msg,
    };

    format!("{}\n{}", base_msg, suggestion)
}
