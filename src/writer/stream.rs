//! Buffered stream writer: sequential `write` calls through the page cache

use super::{FileWriter, WriterKind};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Default `BufWriter` capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct StreamWriter {
    buffer_capacity: usize,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Default for StreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriter for StreamWriter {
    fn kind(&self) -> WriterKind {
        WriterKind::Stream
    }

    fn write_file(&self, file: File, data: &[u8]) -> io::Result<()> {
        let mut out = BufWriter::with_capacity(self.buffer_capacity, file);
        out.write_all(data)?;
        // Surface write errors here instead of losing them in Drop
        out.flush()
    }
}
