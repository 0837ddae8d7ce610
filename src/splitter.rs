//! Chunk builder: the single-threaded split decision
//!
//! Fields arrive one at a time in input order. The builder serializes each
//! row into a shared buffer and decides after every row whether the chunk is
//! complete. Completed chunks are copied out and handed to a [`ChunkSink`],
//! which in the pipeline is the bounded flush queue.
//!
//! With a group column configured, rows sharing a group value always land in
//! the same chunk:
//!
//! - when the row limit is reached part-way into a group, the chunk ends just
//!   before that group and the group's rows are carried into the next chunk;
//! - when the whole chunk is a single group, the builder waits for the group
//!   value to change, however far past the limit that is.

use anyhow::Result;
use csv::ByteRecord;
use std::sync::Arc;

use crate::buffer::{RowBuffer, BUFFER_SIZE};
use crate::chunk::{Chunk, ChunkNaming, ChunkSink, GzipLevel};
use crate::config::{HeaderMode, SplitSettings};
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Below the row limit, or no group column
    Normal,
    /// Limit reached inside a group that started the chunk; split on the
    /// next group change
    AwaitingGroupChange,
}

/// Counters describing what the builder has produced so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderSummary {
    pub rows_read: u64,
    pub chunks_emitted: u32,
    pub bytes_emitted: u64,
}

pub struct ChunkBuilder<S: ChunkSink> {
    sink: S,
    naming: ChunkNaming,
    gzip: GzipLevel,
    trigger: Option<Arc<Trigger>>,

    max_rows: u64,
    group_column: Option<usize>,
    delimiter: u8,
    header_mode: HeaderMode,
    header: Option<Vec<u8>>,
    awaiting_header: bool,

    buffer: RowBuffer,
    group_value: RowBuffer,
    last_group: RowBuffer,
    has_last_group: bool,

    state: SplitState,
    next_index: u32,
    chunk_rows: u64,
    column: usize,
    row_start: usize,
    group_start: usize,
    group_rows: u64,

    summary: BuilderSummary,
}

impl<S: ChunkSink> ChunkBuilder<S> {
    pub fn new(settings: &SplitSettings, naming: ChunkNaming, sink: S) -> Self {
        Self {
            sink,
            naming,
            gzip: GzipLevel::NONE,
            trigger: None,
            max_rows: settings.max_rows.max(1),
            group_column: settings.group_column,
            delimiter: settings.delimiter,
            header_mode: settings.header,
            header: None,
            awaiting_header: settings.header != HeaderMode::None,
            buffer: RowBuffer::with_capacity(settings.buffer_capacity.unwrap_or(BUFFER_SIZE)),
            group_value: RowBuffer::new(),
            last_group: RowBuffer::new(),
            has_last_group: false,
            state: SplitState::Normal,
            next_index: 0,
            chunk_rows: 0,
            column: 0,
            row_start: 0,
            group_start: 0,
            group_rows: 0,
            summary: BuilderSummary::default(),
        }
    }

    pub fn with_gzip(mut self, gzip: GzipLevel) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_trigger(mut self, trigger: Option<Arc<Trigger>>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn summary(&self) -> BuilderSummary {
        self.summary
    }

    /// Header row captured from the input, without its line terminator
    pub fn header(&self) -> Option<&[u8]> {
        self.header
            .as_deref()
            .map(|h| h.strip_suffix(b"\n").unwrap_or(h))
    }

    /// Give back the sink, e.g. to shut the flush queue down
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Feed every field of a parsed record; a record without fields is skipped
    pub fn process_record(&mut self, record: &ByteRecord) -> Result<()> {
        let last = record.len().saturating_sub(1);
        for (i, field) in record.iter().enumerate() {
            self.process_field(field, i == last)?;
        }
        Ok(())
    }

    /// Feed one field. `last_in_row` marks the row terminator.
    pub fn process_field(&mut self, field: &[u8], last_in_row: bool) -> Result<()> {
        if self.column == 0 {
            self.row_start = self.buffer.len();
            self.group_value.reset();
        } else {
            self.buffer.push(self.delimiter);
        }

        self.buffer.push_field(field, self.delimiter);

        if self.group_column == Some(self.column) {
            self.group_value.set(field);
        }
        self.column += 1;

        if last_in_row {
            self.end_row()?;
        }
        Ok(())
    }

    /// Flush whatever is buffered as the final chunk
    pub fn finish(&mut self) -> Result<BuilderSummary> {
        if self.column > 0 {
            self.end_row()?;
        }

        if !self.buffer.is_empty() {
            let payload = self.buffer.take_all();
            let rows = self.chunk_rows;
            self.reset_chunk(0);
            self.emit(payload, rows)?;
        }
        Ok(self.summary)
    }

    fn end_row(&mut self) -> Result<()> {
        self.buffer.push(b'\n');
        self.column = 0;

        if self.awaiting_header {
            self.awaiting_header = false;
            let header = self.buffer.split_prefix(self.buffer.len());
            if self.header_mode == HeaderMode::Keep {
                self.header = Some(header);
            }
            return Ok(());
        }

        self.summary.rows_read += 1;
        self.chunk_rows += 1;

        if self.group_column.is_some() {
            return self.end_grouped_row();
        }

        if self.chunk_rows >= self.max_rows {
            self.flush_prefix(self.buffer.len(), 0)?;
        }
        Ok(())
    }

    fn end_grouped_row(&mut self) -> Result<()> {
        let changed =
            self.has_last_group && self.group_value.as_bytes() != self.last_group.as_bytes();
        std::mem::swap(&mut self.group_value, &mut self.last_group);
        self.has_last_group = true;

        if changed {
            self.group_start = self.row_start;
            self.group_rows = 1;
        } else {
            self.group_rows += 1;
        }

        if self.state == SplitState::AwaitingGroupChange && changed {
            self.flush_prefix(self.row_start, 1)?;
            self.state = SplitState::Normal;
        }

        if self.state == SplitState::Normal && self.chunk_rows >= self.max_rows {
            if self.group_start > 0 {
                // Group rows never reach the limit while the group starts mid-chunk
                debug_assert!(self.group_rows < self.max_rows);
                self.flush_prefix(self.group_start, self.group_rows)?;
            } else {
                log::trace!(
                    "Row limit {} reached inside a single group, deferring split",
                    self.max_rows
                );
                self.state = SplitState::AwaitingGroupChange;
            }
        }
        Ok(())
    }

    /// Complete a chunk made of `[0, at)`, keeping the rows after `at`
    /// (`carried_rows` of them) for the next chunk
    fn flush_prefix(&mut self, at: usize, carried_rows: u64) -> Result<()> {
        let rows = self.chunk_rows - carried_rows;
        let payload = self.buffer.split_prefix(at);
        self.reset_chunk(carried_rows);
        self.emit(payload, rows)
    }

    fn reset_chunk(&mut self, carried_rows: u64) {
        self.chunk_rows = carried_rows;
        self.group_rows = carried_rows;
        self.row_start = 0;
        self.group_start = 0;
    }

    fn emit(&mut self, body: Vec<u8>, rows: u64) -> Result<()> {
        self.next_index += 1;
        let index = self.next_index;

        let payload = match &self.header {
            Some(header) => {
                let mut payload = Vec::with_capacity(header.len() + body.len());
                payload.extend_from_slice(header);
                payload.extend_from_slice(&body);
                payload
            }
            None => body,
        };

        self.summary.chunks_emitted += 1;
        self.summary.bytes_emitted += payload.len() as u64;

        let chunk = Chunk {
            index,
            path: self.naming.path_for(index),
            rows,
            payload,
            gzip: self.gzip,
            trigger: self.trigger.clone(),
        };
        log::debug!(
            "Chunk {} complete: {} rows, {} bytes -> '{}'",
            index,
            rows,
            chunk.payload.len(),
            chunk.path.display()
        );

        self.sink.submit(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings(max_rows: u64, group_column: Option<usize>) -> SplitSettings {
        SplitSettings {
            max_rows,
            group_column,
            delimiter: b',',
            header: HeaderMode::None,
            buffer_capacity: Some(64),
        }
    }

    fn builder(settings: &SplitSettings) -> ChunkBuilder<Vec<Chunk>> {
        ChunkBuilder::new(
            settings,
            ChunkNaming::new("out", "part_", GzipLevel::NONE),
            Vec::new(),
        )
    }

    fn feed_rows(builder: &mut ChunkBuilder<Vec<Chunk>>, rows: &[Vec<&str>]) {
        for row in rows {
            let last = row.len() - 1;
            for (i, field) in row.iter().enumerate() {
                builder.process_field(field.as_bytes(), i == last).unwrap();
            }
        }
    }

    fn split(settings: &SplitSettings, rows: &[Vec<&str>]) -> Vec<Chunk> {
        let mut b = builder(settings);
        feed_rows(&mut b, rows);
        b.finish().unwrap();
        b.into_sink()
    }

    fn numbered_rows(n: usize) -> Vec<Vec<String>> {
        (1..=n)
            .map(|i| vec![i.to_string(), format!("value{}", i)])
            .collect()
    }

    fn as_str_rows(rows: &[Vec<String>]) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|r| r.iter().map(String::as_str).collect())
            .collect()
    }

    fn row_counts(chunks: &[Chunk]) -> Vec<u64> {
        chunks.iter().map(|c| c.rows).collect()
    }

    fn payload_lines(chunk: &Chunk) -> Vec<String> {
        String::from_utf8(chunk.payload.clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_ungrouped_split_sizes() {
        let rows = numbered_rows(25);
        let chunks = split(&settings(10, None), &as_str_rows(&rows));
        assert_eq!(row_counts(&chunks), vec![10, 10, 5]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(payload_lines(&chunks[2])[0], "21,value21");
    }

    #[test]
    fn test_ungrouped_even_split_has_no_empty_tail() {
        let rows = numbered_rows(20);
        let chunks = split(&settings(10, None), &as_str_rows(&rows));
        assert_eq!(row_counts(&chunks), vec![10, 10]);
    }

    #[test]
    fn test_one_row_per_chunk() {
        let rows = numbered_rows(3);
        let chunks = split(&settings(1, None), &as_str_rows(&rows));
        assert_eq!(row_counts(&chunks), vec![1, 1, 1]);
        assert_eq!(chunks[1].payload, b"2,value2\n");
    }

    #[test]
    fn test_empty_input_emits_nothing() {
        let chunks = split(&settings(10, Some(0)), &[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_group_split_backs_off_to_group_start() {
        // Rows 5-8 share group "A"
        let groups = ["g1", "g2", "g3", "g4", "A", "A", "A", "A", "g9", "g10", "g11", "g12"];
        let rows: Vec<Vec<&str>> = groups.iter().map(|g| vec![*g, "x"]).collect();

        let chunks = split(&settings(5, Some(0)), &rows);
        assert_eq!(row_counts(&chunks), vec![4, 4, 4]);
        assert_eq!(payload_lines(&chunks[1]), vec!["A,x"; 4]);
    }

    #[test]
    fn test_single_group_exceeds_limit() {
        let mut rows: Vec<Vec<&str>> = vec![vec!["A", "1"]; 7];
        rows.push(vec!["B", "2"]);
        rows.push(vec!["B", "3"]);

        let chunks = split(&settings(2, Some(0)), &rows);
        assert_eq!(row_counts(&chunks), vec![7, 2]);
    }

    #[test]
    fn test_first_row_reaching_limit_defers_split() {
        let rows = vec![vec!["A"], vec!["A"], vec!["A"], vec!["B"]];
        let chunks = split(&settings(1, Some(0)), &rows);
        assert_eq!(row_counts(&chunks), vec![3, 1]);
        assert_eq!(chunks[0].payload, b"A\nA\nA\n");
    }

    #[test]
    fn test_group_column_in_middle_of_row() {
        let rows = vec![
            vec!["1", "k1", "a"],
            vec!["2", "k1", "b"],
            vec!["3", "k2", "c"],
            vec!["4", "k2", "d"],
            vec!["5", "k3", "e"],
        ];
        let chunks = split(&settings(3, Some(1)), &rows);
        // The row reaching the limit starts a group, so it moves on with it
        assert_eq!(row_counts(&chunks), vec![2, 2, 1]);
        assert_eq!(chunks[0].payload, b"1,k1,a\n2,k1,b\n");
        assert_eq!(chunks[1].payload, b"3,k2,c\n4,k2,d\n");
        assert_eq!(chunks[2].payload, b"5,k3,e\n");
    }

    #[test]
    fn test_short_row_has_empty_group_value() {
        let rows = vec![vec!["x"], vec!["y"], vec!["z", "g"]];
        let chunks = split(&settings(1, Some(1)), &rows);
        // The first two rows both have an empty group value
        assert_eq!(row_counts(&chunks), vec![2, 1]);
    }

    #[test]
    fn test_header_keep_prefixes_every_chunk() {
        let mut s = settings(2, None);
        s.header = HeaderMode::Keep;
        let rows = vec![vec!["id", "name"], vec!["1", "a"], vec!["2", "b"], vec!["3", "c"]];

        let mut b = builder(&s);
        feed_rows(&mut b, &rows);
        let summary = b.finish().unwrap();
        assert_eq!(b.header(), Some(b"id,name".as_slice()));
        let chunks = b.into_sink();

        assert_eq!(summary.rows_read, 3);
        assert_eq!(row_counts(&chunks), vec![2, 1]);
        assert_eq!(chunks[0].payload, b"id,name\n1,a\n2,b\n");
        assert_eq!(chunks[1].payload, b"id,name\n3,c\n");
    }

    #[test]
    fn test_header_drop() {
        let mut s = settings(10, None);
        s.header = HeaderMode::Drop;
        let rows = vec![vec!["id"], vec!["1"]];
        let chunks = split(&s, &rows);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].payload, b"1\n");
    }

    #[test]
    fn test_header_only_input_emits_nothing() {
        let mut s = settings(10, None);
        s.header = HeaderMode::Keep;
        let chunks = split(&s, &[vec!["id", "name"]]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_fields_are_requoted() {
        let rows = vec![vec!["a,b", "plain"], vec!["say \"hi\"", ""]];
        let chunks = split(&settings(10, None), &rows);
        assert_eq!(
            chunks[0].payload,
            b"\"a,b\",plain\n\"say \"\"hi\"\"\",\n".as_slice()
        );
    }

    #[test]
    fn test_finish_terminates_partial_row() {
        let mut b = builder(&settings(10, None));
        b.process_field(b"a", false).unwrap();
        b.process_field(b"b", false).unwrap();
        let summary = b.finish().unwrap();
        assert_eq!(summary.rows_read, 1);
        assert_eq!(b.into_sink()[0].payload, b"a,b\n");
    }

    #[test]
    fn test_chunks_carry_paths_and_settings() {
        let trigger = Arc::new(Trigger::new("true", None));
        let mut b = ChunkBuilder::new(
            &settings(1, None),
            ChunkNaming::new("dir", "p", GzipLevel::new(4).unwrap()),
            Vec::new(),
        )
        .with_gzip(GzipLevel::new(4).unwrap())
        .with_trigger(Some(Arc::clone(&trigger)));
        feed_rows(&mut b, &[vec!["1"], vec!["2"]]);
        b.finish().unwrap();
        let chunks = b.into_sink();

        assert_eq!(chunks[1].path, std::path::PathBuf::from("dir/p00002.csv.gz"));
        assert_eq!(chunks[1].gzip.level(), 4);
        assert!(chunks[1].trigger.is_some());
    }

    #[test]
    fn test_process_record() {
        let mut b = builder(&settings(10, None));
        b.process_record(&ByteRecord::from(vec!["x", "y", "z"]))
            .unwrap();
        b.finish().unwrap();
        assert_eq!(b.into_sink()[0].payload, b"x,y,z\n");
    }

    fn grouped_input() -> impl Strategy<Value = (Vec<u8>, u64)> {
        (prop::collection::vec(1u8..6, 0..60), 1u64..8).prop_map(|(runs, max)| {
            let mut groups = Vec::new();
            for (g, len) in runs.into_iter().enumerate() {
                groups.extend(std::iter::repeat(g as u8).take(len as usize));
            }
            (groups, max)
        })
    }

    proptest! {
        #[test]
        fn prop_groups_never_span_chunks((groups, max) in grouped_input()) {
            let rows: Vec<Vec<String>> = groups
                .iter()
                .enumerate()
                .map(|(i, g)| vec![format!("g{}", g), i.to_string()])
                .collect();
            let chunks = split(&settings(max, Some(0)), &as_str_rows(&rows));

            let mut seen_in = std::collections::HashMap::new();
            let mut concatenated = Vec::new();
            for chunk in &chunks {
                prop_assert!(chunk.rows > 0);
                for line in payload_lines(chunk) {
                    let group = line.split(',').next().unwrap().to_string();
                    let owner = seen_in.entry(group).or_insert(chunk.index);
                    prop_assert_eq!(*owner, chunk.index);
                }
                concatenated.extend_from_slice(&chunk.payload);
            }

            let expected: String = rows.iter().map(|r| format!("{}\n", r.join(","))).collect();
            prop_assert_eq!(String::from_utf8(concatenated).unwrap(), expected);
            prop_assert_eq!(chunks.iter().map(|c| c.rows).sum::<u64>(), groups.len() as u64);
        }

        #[test]
        fn prop_ungrouped_chunks_are_full(total in 0usize..200, max in 1u64..20) {
            let rows = numbered_rows(total);
            let chunks = split(&settings(max, None), &as_str_rows(&rows));

            let expected_chunks = (total as u64).div_ceil(max);
            prop_assert_eq!(chunks.len() as u64, expected_chunks);
            for (i, chunk) in chunks.iter().enumerate() {
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.rows, max);
                } else {
                    let rem = total as u64 % max;
                    prop_assert_eq!(chunk.rows, if rem == 0 { max } else { rem });
                }
            }
        }
    }
}
