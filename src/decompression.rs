use flate2::read::MultiGzDecoder;
use std::io::{self, Chain, Cursor, Read};

const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Input compression detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCompression {
    Gzip,
    Zstd,
    Plain,
}

impl InputCompression {
    fn detect(head: &[u8]) -> Self {
        if head.starts_with(&GZIP_MAGIC) {
            InputCompression::Gzip
        } else if head.starts_with(&ZSTD_MAGIC) {
            InputCompression::Zstd
        } else {
            InputCompression::Plain
        }
    }
}

/// Read until `buf` is full or the stream ends; pipes may deliver the magic
/// bytes across several reads
fn read_head<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Wrap `reader` in a gzip or zstd decoder when its first bytes carry the
/// matching magic signature; otherwise pass the bytes through unchanged
pub fn maybe_decompress<R: Read + 'static>(
    mut reader: R,
) -> io::Result<(Box<dyn Read>, InputCompression)> {
    let mut head = [0u8; 4];
    let n = read_head(&mut reader, &mut head)?;

    // Put the sniffed bytes back in front
    let chained: Chain<Cursor<Vec<u8>>, R> = Cursor::new(head[..n].to_vec()).chain(reader);

    let compression = InputCompression::detect(&head[..n]);
    let reader: Box<dyn Read> = match compression {
        InputCompression::Gzip => Box::new(MultiGzDecoder::new(chained)),
        InputCompression::Zstd => Box::new(zstd::Decoder::new(chained)?),
        InputCompression::Plain => Box::new(chained),
    };
    Ok((reader, compression))
}
