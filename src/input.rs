//! Raw interleaved float input
//!
//! Reads little-endian 32-bit float frames from any byte stream and hands
//! them out in fixed-size blocks.

use std::io::{ErrorKind, Read};
use thiserror::Error;

/// Errors while reading raw frames
#[derive(Error, Debug)]
pub enum InputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input ended inside a frame ({0} trailing bytes)")]
    TruncatedFrame(usize),
}

/// Block reader for raw F32LE interleaved audio
pub struct FrameReader<R: Read> {
    reader: R,
    bytes_per_frame: usize,
    bytes: Vec<u8>,
    samples: Vec<f32>,
    frames_read: u64,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader yielding at most `block_frames` frames per block
    pub fn new(reader: R, channels: usize, block_frames: usize) -> Self {
        let bytes_per_frame = channels * std::mem::size_of::<f32>();
        Self {
            reader,
            bytes_per_frame,
            bytes: vec![0u8; bytes_per_frame * block_frames.max(1)],
            samples: Vec::with_capacity(channels * block_frames.max(1)),
            frames_read: 0,
        }
    }

    /// Total frames returned so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next block; `None` at end of input
    ///
    /// Short reads are accumulated so every block holds whole frames.
    pub fn next_block(&mut self) -> Result<Option<&[f32]>, InputError> {
        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.reader.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        let trailing = filled % self.bytes_per_frame;
        if trailing != 0 {
            return Err(InputError::TruncatedFrame(trailing));
        }

        self.samples.clear();
        self.samples.extend(
            self.bytes[..filled]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        self.frames_read += (filled / self.bytes_per_frame) as u64;
        Ok(Some(&self.samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Reader returning at most 3 bytes per read call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let len = buf.len().min(3);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn test_blocks_of_whole_frames() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut reader = FrameReader::new(Cursor::new(encode(&samples)), 2, 2);

        assert_eq!(reader.next_block().unwrap().unwrap(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(reader.next_block().unwrap().unwrap(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(reader.next_block().unwrap().unwrap(), &[8.0, 9.0]);
        assert!(reader.next_block().unwrap().is_none());
        assert_eq!(reader.frames_read(), 5);
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let samples = [0.25f32, -0.5, 0.75, 1.0];
        let mut reader = FrameReader::new(Trickle(Cursor::new(encode(&samples))), 2, 2);
        assert_eq!(reader.next_block().unwrap().unwrap(), &samples);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut bytes = encode(&[0.1, 0.2]);
        bytes.extend_from_slice(&[0, 0]);
        let mut reader = FrameReader::new(Cursor::new(bytes), 2, 4);
        assert!(matches!(
            reader.next_block(),
            Err(InputError::TruncatedFrame(2))
        ));
    }
}
