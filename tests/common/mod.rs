// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn binary_path() -> &'static str {
    env!("CARGO_BIN_EXE_csv-split")
}

/// Run csv-split with the given arguments, ignoring any config file on the
/// machine running the tests
pub fn run_csv_split(args: &[&str]) -> (String, String, i32) {
    let mut full_args = vec!["--ignore-config"];
    full_args.extend_from_slice(args);
    run_csv_split_raw(&full_args, None, None)
}

/// Run csv-split feeding `input` on stdin
pub fn run_csv_split_with_input(args: &[&str], input: &[u8]) -> (String, String, i32) {
    let mut full_args = vec!["--ignore-config"];
    full_args.extend_from_slice(args);
    run_csv_split_raw(&full_args, Some(input), None)
}

/// Run csv-split exactly as given, optionally from another working directory
pub fn run_csv_split_raw(
    args: &[&str],
    input: Option<&[u8]>,
    cwd: Option<&Path>,
) -> (String, String, i32) {
    let mut cmd = Command::new(binary_path());
    cmd.args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().expect("Failed to start csv-split");
    if let Some(data) = input {
        child
            .stdin
            .take()
            .expect("stdin is piped")
            .write_all(data)
            .expect("Failed to write to stdin");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// `count` rows of `<i>,name<i>`, starting at 1
pub fn numbered_csv(count: usize) -> String {
    (1..=count).map(|i| format!("{},name{}\n", i, i)).collect()
}

/// Write `content` to `dir/name` and return the path
pub fn write_input(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write input file");
    path
}

/// Chunk files in `dir`, sorted by name
pub fn chunk_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("Failed to list output directory")
        .map(|entry| entry.expect("Failed to read entry").path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name.ends_with(".csv") || name.ends_with(".csv.gz")
        })
        .collect();
    files.sort();
    files
}

pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .expect("Failed to read chunk")
        .lines()
        .count()
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
