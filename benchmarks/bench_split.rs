use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use csv::{ByteRecord, ReaderBuilder};

use csv_split::chunk::{Chunk, ChunkNaming, ChunkSink, GzipLevel};
use csv_split::config::{HeaderMode, SplitSettings};
use csv_split::splitter::ChunkBuilder;

const ROWS: usize = 50_000;

/// Counts chunks without keeping their payloads
#[derive(Default)]
struct CountingSink {
    chunks: usize,
    bytes: usize,
}

impl ChunkSink for CountingSink {
    fn submit(&mut self, chunk: Chunk) -> anyhow::Result<()> {
        self.chunks += 1;
        self.bytes += chunk.payload.len();
        Ok(())
    }
}

fn sample_csv(group_run: usize) -> Vec<u8> {
    let mut out = String::with_capacity(ROWS * 48);
    for i in 0..ROWS {
        out.push_str(&format!(
            "{},customer-{},\"Street {}, Apt {}\",{}.{:02}\n",
            i / group_run,
            i % 977,
            i,
            i % 40,
            i * 3,
            i % 100
        ));
    }
    out.into_bytes()
}

fn records(data: &[u8]) -> Vec<ByteRecord> {
    ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data)
        .byte_records()
        .collect::<Result<_, _>>()
        .expect("sample data parses")
}

fn split_records(records: &[ByteRecord], group_column: Option<usize>) -> CountingSink {
    let settings = SplitSettings {
        max_rows: 1_000,
        group_column,
        delimiter: b',',
        header: HeaderMode::None,
        buffer_capacity: None,
    };
    let mut builder = ChunkBuilder::new(
        &settings,
        ChunkNaming::new("bench", "b_", GzipLevel::NONE),
        CountingSink::default(),
    );
    for record in records {
        builder.process_record(record).expect("counting sink never fails");
    }
    builder.finish().expect("counting sink never fails");
    builder.into_sink()
}

fn bench_chunk_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_builder");
    group.throughput(Throughput::Elements(ROWS as u64));

    for group_run in [1usize, 25, 5_000] {
        let recs = records(&sample_csv(group_run));
        group.bench_with_input(
            BenchmarkId::new("grouped", group_run),
            &recs,
            |b, recs| b.iter(|| black_box(split_records(black_box(recs), Some(0)))),
        );
    }

    let recs = records(&sample_csv(1));
    group.bench_function("ungrouped", |b| {
        b.iter(|| black_box(split_records(black_box(&recs), None)))
    });
    group.finish();
}

fn bench_parse_and_split(c: &mut Criterion) {
    let data = sample_csv(25);
    let mut group = c.benchmark_group("parse_and_split");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("grouped", |b| {
        b.iter(|| {
            let recs = records(black_box(&data));
            black_box(split_records(&recs, Some(0)))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_chunk_builder, bench_parse_and_split);
criterion_main!(benches);
