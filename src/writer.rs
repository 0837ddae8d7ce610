//! Writing one chunk payload to its destination file

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::chunk::GzipLevel;
use crate::platform::describe_file_error;

/// Create `path` and write `payload` to it, gzip-compressed when `gzip` is
/// enabled. Returns the number of bytes that reached the file.
pub fn write_chunk(path: &Path, payload: &[u8], gzip: GzipLevel) -> Result<u64> {
    let file = File::create(path).map_err(|e| anyhow!("{}", describe_file_error(path, &e)))?;

    if gzip.is_enabled() {
        let mut encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(gzip.level()),
        );
        encoder
            .write_all(payload)
            .with_context(|| format!("Compression failed for '{}'", path.display()))?;
        let mut out = encoder
            .finish()
            .with_context(|| format!("Compression failed for '{}'", path.display()))?;
        out.flush()
            .with_context(|| format!("Output file flush failed '{}'", path.display()))?;
        let written = out
            .get_ref()
            .metadata()
            .map(|m| m.len())
            .unwrap_or(payload.len() as u64);
        Ok(written)
    } else {
        let mut out = BufWriter::new(file);
        out.write_all(payload)
            .with_context(|| format!("Output file write failed '{}'", path.display()))?;
        out.flush()
            .with_context(|| format!("Output file flush failed '{}'", path.display()))?;
        Ok(payload.len() as u64)
    }
}
