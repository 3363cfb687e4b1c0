//! Buffered stream over any readable source.

use std::fs::File;
use std::io::{self, Read, Stdin};
use std::path::Path;

use super::{Stream, PAD};

/// Owns a growable buffer refilled from `R`. Works for regular files,
/// pipes and standard input alike.
pub struct BufferedStream<R: Read> {
    inner: R,
    buf: Vec<u8>,
    size: usize,
    eof: bool,
}

impl<R: Read> BufferedStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; PAD],
            size: 0,
            eof: false,
        }
    }
}

impl BufferedStream<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl BufferedStream<Stdin> {
    pub fn stdin() -> Self {
        Self::new(io::stdin())
    }
}

impl<R: Read> Stream for BufferedStream<R> {
    fn advance(&mut self, req_size: usize, step: usize) -> io::Result<()> {
        if step > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "step past end of window",
            ));
        }

        // slide retained bytes to the front
        self.buf.copy_within(step..self.size, 0);
        self.size -= step;

        if self.buf.len() < req_size + PAD {
            self.buf.resize(req_size + PAD, 0);
        }

        while self.size < req_size && !self.eof {
            let n = self.inner.read(&mut self.buf[self.size..req_size])?;
            if n == 0 {
                self.eof = true;
            }
            self.size += n;
        }

        self.buf[self.size..self.size + PAD].fill(0);
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        &self.buf[..self.size + PAD]
    }

    fn size(&self) -> usize {
        self.size
    }
}
