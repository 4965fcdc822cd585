//! Disk-segment writer: one append-only, re-readable file per segment.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tempfile::TempDir;

use crate::Result;

/// A single record as it is written to and read from a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub h0: u64,
    pub h1: u64,
    pub payload: u64,
}

const RECORD_LEN_WITH_PAYLOAD: usize = 24;
const RECORD_LEN_WITHOUT_PAYLOAD: usize = 16;

impl Record {
    #[inline]
    fn write_to(self, out: &mut Vec<u8>, with_payload: bool) {
        out.extend_from_slice(&self.h0.to_le_bytes());
        out.extend_from_slice(&self.h1.to_le_bytes());
        if with_payload {
            out.extend_from_slice(&self.payload.to_le_bytes());
        }
    }

    #[inline]
    fn read_from(bytes: &[u8], with_payload: bool) -> Self {
        let h0 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let h1 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let payload = if with_payload {
            u64::from_le_bytes(bytes[16..24].try_into().unwrap())
        } else {
            0
        };
        Self { h0, h1, payload }
    }
}

/// One append-only, seekable segment file with a fixed-size write buffer in front of it.
pub struct SegmentFile {
    file: File,
    buffer: Vec<u8>,
    buffer_capacity: usize,
    with_payload: bool,
}

impl SegmentFile {
    fn new(file: File, buffer_capacity: usize, with_payload: bool) -> Self {
        Self { file, buffer: Vec::with_capacity(buffer_capacity), buffer_capacity, with_payload }
    }

    /// Appends a record, flushing the buffer to disk if it is now full.
    pub fn append(&mut self, record: Record) -> Result<()> {
        record.write_to(&mut self.buffer, self.with_payload);
        if self.buffer.len() >= self.buffer_capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the write buffer to the underlying file without affecting the read position.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Truncates the file and drops the write buffer, returning the segment to empty.
    pub fn truncate(&mut self) -> Result<()> {
        self.buffer.clear();
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Reads every record currently committed to disk, in file order.
    ///
    /// Callers must [`flush`](Self::flush) first if there are pending buffered records.
    pub fn read_all(&mut self) -> Result<Vec<Record>> {
        let record_len = if self.with_payload { RECORD_LEN_WITH_PAYLOAD } else { RECORD_LEN_WITHOUT_PAYLOAD };
        self.file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        self.file.read_to_end(&mut raw)?;
        Ok(raw.chunks_exact(record_len).map(|c| Record::read_from(c, self.with_payload)).collect())
    }
}

/// Owns the `S = 2^L` temporary segment files a store spreads its records across.
pub struct SegmentRegistry {
    _dir: TempDir,
    segments: Vec<SegmentFile>,
}

impl SegmentRegistry {
    /// Creates `segment_count` fresh, empty segment files under `temp_dir` (or the
    /// system temporary directory if `None`).
    pub fn new(segment_count: usize, buffer_capacity: usize, with_payload: bool, temp_dir: Option<&std::path::Path>) -> Result<Self> {
        let dir = match temp_dir {
            Some(path) => tempfile::Builder::new().prefix("store-").tempdir_in(path)?,
            None => tempfile::Builder::new().prefix("store-").tempdir()?,
        };
        let mut segments = Vec::with_capacity(segment_count);
        for i in 0..segment_count {
            let path: PathBuf = dir.path().join(format!("segment-{i:08}.bin"));
            let file = File::options().read(true).write(true).create(true).truncate(true).open(&path)?;
            segments.push(SegmentFile::new(file, buffer_capacity, with_payload));
        }
        Ok(Self { _dir: dir, segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_mut(&mut self, index: usize) -> &mut SegmentFile {
        &mut self.segments[index]
    }

    pub fn flush_all(&mut self) -> Result<()> {
        for segment in &mut self.segments {
            segment.flush()?;
        }
        Ok(())
    }

    pub fn truncate_all(&mut self) -> Result<()> {
        for segment in &mut self.segments {
            segment.truncate()?;
        }
        Ok(())
    }
}
