#![no_main]

use csv::{ByteRecord, ReaderBuilder};
use csv_split::chunk::{Chunk, ChunkNaming, GzipLevel};
use csv_split::config::{HeaderMode, SplitSettings};
use csv_split::splitter::ChunkBuilder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let max_rows = u64::from(data[0] % 16) + 1;
    let group_column = match data[1] % 4 {
        0 => None,
        n => Some(usize::from(n - 1)),
    };
    let header = match data[2] % 3 {
        0 => HeaderMode::None,
        1 => HeaderMode::Keep,
        _ => HeaderMode::Drop,
    };

    let settings = SplitSettings {
        max_rows,
        group_column,
        delimiter: b',',
        header,
        buffer_capacity: Some(64),
    };
    let mut builder = ChunkBuilder::new(
        &settings,
        ChunkNaming::new("fuzz", "f_", GzipLevel::NONE),
        Vec::<Chunk>::new(),
    );

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(&data[3..]);
    let mut record = ByteRecord::new();
    let mut groups = Vec::new();
    while let Ok(true) = reader.read_byte_record(&mut record) {
        if record.is_empty() {
            continue;
        }
        groups.push(
            group_column
                .and_then(|col| record.get(col))
                .unwrap_or_default()
                .to_vec(),
        );
        builder.process_record(&record).expect("vec sink never fails");
    }

    let summary = builder.finish().expect("vec sink never fails");
    let chunks = builder.into_sink();

    if header != HeaderMode::None && !groups.is_empty() {
        groups.remove(0);
    }
    assert_eq!(summary.rows_read, groups.len() as u64);
    assert_eq!(chunks.iter().map(|c| c.rows).sum::<u64>(), summary.rows_read);

    let mut row = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(chunk.rows > 0);
        assert_eq!(chunk.index as usize, i + 1);
        if group_column.is_none() && i + 1 < chunks.len() {
            assert_eq!(chunk.rows, max_rows);
        }
        row += chunk.rows as usize;
        // A group never continues into the next chunk
        if group_column.is_some() && row < groups.len() {
            assert_ne!(groups[row - 1], groups[row]);
        }
    }
});
