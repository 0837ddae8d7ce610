//! Growable byte buffer used for row formatting and group-value tracking
//!
//! The buffer is reset between chunks rather than reallocated, so the
//! capacity reached by the largest chunk is reused for every following one.

/// Initial capacity of the row-formatting buffer (10 MiB)
pub const BUFFER_SIZE: usize = 1024 * 1000 * 10;

/// Check if a CSV field needs quoting on output
pub(crate) fn needs_csv_quoting(field: &[u8], delimiter: u8) -> bool {
    field
        .iter()
        .any(|&b| b == delimiter || b == b'"' || b == b'\n' || b == b'\r')
}

#[derive(Debug, Default)]
pub struct RowBuffer {
    data: Vec<u8>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Replace the contents with `bytes`, keeping the allocation
    pub fn set(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Drop the contents without releasing capacity
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Append one CSV field, quoting it only when the raw bytes would not
    /// survive a round trip through the parser
    pub fn push_field(&mut self, field: &[u8], delimiter: u8) {
        if !needs_csv_quoting(field, delimiter) {
            self.data.extend_from_slice(field);
            return;
        }

        self.data.push(b'"');
        for &b in field {
            if b == b'"' {
                self.data.push(b'"');
            }
            self.data.push(b);
        }
        self.data.push(b'"');
    }

    /// Copy `[0, at)` out into an exactly-sized allocation and shift the
    /// remainder to the front of the buffer
    pub fn split_prefix(&mut self, at: usize) -> Vec<u8> {
        let at = at.min(self.data.len());
        let prefix = self.data[..at].to_vec();
        self.data.copy_within(at.., 0);
        self.data.truncate(self.data.len() - at);
        prefix
    }

    /// Copy the whole buffer out and reset it
    pub fn take_all(&mut self) -> Vec<u8> {
        let len = self.data.len();
        self.split_prefix(len)
    }
}
