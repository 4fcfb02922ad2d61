//! Memory-mapped writer: size the file, map it, copy, unmap

use super::{FileWriter, WriterKind};
use memmap2::MmapMut;
use std::fs::File;
use std::io;

/// Writes through a shared writable mapping of the whole file.
///
/// The mapping is dropped (unmapped) before the file handle closes. Dirty
/// pages are left to the kernel; no `msync` is issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapWriter;

impl MmapWriter {
    pub fn new() -> Self {
        MmapWriter
    }
}

impl FileWriter for MmapWriter {
    fn kind(&self) -> WriterKind {
        WriterKind::MemoryMap
    }

    fn write_file(&self, file: File, data: &[u8]) -> io::Result<()> {
        file.set_len(data.len() as u64)?;
        if data.is_empty() {
            // Zero-length mappings are rejected by mmap(2)
            return Ok(());
        }

        // SAFETY: the file was created with `create_new` under a random name
        // and is mapped exactly once, so no other mapping or process can
        // change its length while the map is alive.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map.copy_from_slice(data);
        drop(map);
        Ok(())
    }
}
