//! Sliding window byte sources for the text parser.
//!
//! A [Stream] exposes a contiguous window into its source that only
//! moves forward. The window is always readable for [PAD] bytes past
//! the real data, zero filled, so fixed width field parsers and line
//! scanners never need per byte bounds checks near the end of input.

use std::io;

mod buffered;
mod mmap;

pub use buffered::BufferedStream;
pub use mmap::MmapStream;

/// Guaranteed readable zero bytes past the real data of a window.
pub const PAD: usize = 80;

/// Window size the parser requests per advance.
pub const BLOCK_SIZE: usize = 1024 * 1024 - PAD;

/// A forward only, buffered view into a byte source.
pub trait Stream {
    /// Discards `step` bytes from the front of the window and tries to
    /// make at least `req_size` bytes available. A shorter window after
    /// a successful call means the source is exhausted; a zero length
    /// window is end of input.
    fn advance(&mut self, req_size: usize, step: usize) -> io::Result<()>;

    /// Current window: `size()` real bytes followed by [PAD] readable
    /// zeros (the returned slice has length `size() + PAD`).
    fn buffer(&self) -> &[u8];

    /// Number of real bytes in the window.
    fn size(&self) -> usize;
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn buffered_window_and_padding() {
        let data = b"hello stream".to_vec();
        let mut stream = BufferedStream::new(Cursor::new(data));
        stream.advance(8, 0).unwrap();
        assert_eq!(stream.size(), 8);
        assert_eq!(&stream.buffer()[..8], b"hello st");
        // consume five, ask for more than remains
        stream.advance(BLOCK_SIZE, 5).unwrap();
        assert_eq!(stream.size(), 7);
        assert_eq!(&stream.buffer()[..7], b" stream");
        assert!(stream.buffer()[7..].iter().all(|&b| b == 0));
        assert_eq!(stream.buffer().len(), 7 + PAD);
        // consume the rest: empty window signals end of input
        stream.advance(BLOCK_SIZE, 7).unwrap();
        assert_eq!(stream.size(), 0);
    }

    #[test]
    fn buffered_rejects_overstep() {
        let mut stream = BufferedStream::new(Cursor::new(b"abc".to_vec()));
        stream.advance(3, 0).unwrap();
        assert!(stream.advance(3, 4).is_err());
    }
}
