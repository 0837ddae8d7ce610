use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::config::InputSource;
use crate::decompression::{maybe_decompress, InputCompression};

/// Open the configured input, transparently decompressing gzip or zstd data
pub fn open_input(source: &InputSource) -> Result<Box<dyn Read>> {
    let (reader, compression) = match source {
        InputSource::File(path) => open_file(path)?,
        InputSource::Stdin => maybe_decompress(io::stdin())
            .context("Failed to read from standard input")?,
    };

    if compression != InputCompression::Plain {
        log::debug!("Input is {:?} compressed", compression);
    }
    Ok(reader)
}

fn open_file(path: &Path) -> Result<(Box<dyn Read>, InputCompression)> {
    if path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    {
        return Err(anyhow!(
            "ZIP input is not supported, only gzip and zstd are decompressed on the fly. Extract it first: unzip {}",
            path.display()
        ));
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open input file '{}'", path.display()))?;
    maybe_decompress(file)
        .with_context(|| format!("Failed to read input file '{}'", path.display()))
}
