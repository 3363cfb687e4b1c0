//! Memory mapped stream for regular files.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use super::{Stream, PAD};

/// Maps the whole file once and serves windows straight from the
/// mapping. A mapping is exactly as long as the file, so windows that
/// would read past the end are served from an owned copy of the tail
/// with the zero padding appended.
pub struct MmapStream {
    map: Option<Mmap>,
    file_len: usize,
    tail: Vec<u8>,
    tail_start: usize,
    offset: usize,
    size: usize,
}

impl MmapStream {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len() as usize;
        let map = if file_len > 0 {
            Some(unsafe { Mmap::map(&file)? })
        } else {
            None
        };
        Ok(Self {
            map,
            file_len,
            tail: Vec::new(),
            tail_start: usize::MAX,
            offset: 0,
            size: 0,
        })
    }

    fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Copies `[start, file_len)` plus padding into the owned tail.
    fn build_tail(&mut self, start: usize) {
        let mut tail = Vec::with_capacity(self.file_len - start + PAD);
        tail.extend_from_slice(&self.data()[start..]);
        tail.resize(self.file_len - start + PAD, 0);
        self.tail = tail;
        self.tail_start = start;
    }
}

impl Stream for MmapStream {
    fn advance(&mut self, req_size: usize, step: usize) -> io::Result<()> {
        if step > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "step past end of window",
            ));
        }
        self.offset += step;
        self.size = req_size.min(self.file_len - self.offset);
        if self.offset + self.size + PAD > self.file_len && self.offset < self.tail_start {
            self.build_tail(self.offset);
        }
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        let end = self.offset + self.size + PAD;
        if end <= self.file_len {
            &self.data()[self.offset..end]
        } else {
            let start = self.offset - self.tail_start;
            &self.tail[start..start + self.size + PAD]
        }
    }

    fn size(&self) -> usize {
        self.size
    }
}
