//! Positions inside a line that arrived in several pieces.
//!
//! The line source hands over one logical line as an ordered sequence of byte
//! chunks. Nothing here ever concatenates them: a [`Cursor`] is a plain
//! `(segment, offset)` pair and a [`ChunkView`] knows how to walk chunk
//! boundaries to move it, read through it and measure what is left.

/// A position in a chunk sequence.
///
/// `segment` is the index of the chunk, `offset` the byte offset inside it.
/// Positions handed out by [`ChunkView`] are always normalized: either they
/// point at an existing byte, or they are the end sentinel
/// `(chunk count, 0)`. Ordering is lexicographic, which for normalized
/// positions is the same as ordering by distance from the start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    segment: usize,
    offset: usize,
}

impl Cursor {
    pub fn segment(&self) -> usize {
        self.segment
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Read-only view over a chunk sequence.
#[derive(Debug, Clone, Copy)]
pub struct ChunkView<'a, C> {
    chunks: &'a [C],
}

impl<'a, C: AsRef<[u8]>> ChunkView<'a, C> {
    pub fn new(chunks: &'a [C]) -> Self {
        Self { chunks }
    }

    /// First position of the stream (the end sentinel when every chunk is empty).
    pub fn start(&self) -> Cursor {
        self.normalize(Cursor::default())
    }

    /// The end-of-stream sentinel.
    pub fn end(&self) -> Cursor {
        Cursor {
            segment: self.chunks.len(),
            offset: 0,
        }
    }

    pub fn is_end(&self, at: Cursor) -> bool {
        at.segment >= self.chunks.len()
    }

    /// Moves `at` forward by `n` bytes, stopping at the end sentinel.
    pub fn advance(&self, at: &mut Cursor, n: usize) {
        *at = self.normalize(Cursor {
            segment: at.segment,
            offset: at.offset + n,
        });
    }

    /// Returns a copy of `at` moved forward by `n` bytes.
    pub fn advanced(&self, at: Cursor, n: usize) -> Cursor {
        let mut moved = at;
        self.advance(&mut moved, n);
        moved
    }

    /// Byte under the cursor, `None` at the end of the stream.
    pub fn current(&self, at: Cursor) -> Option<u8> {
        self.chunks
            .get(at.segment)
            .and_then(|chunk| chunk.as_ref().get(at.offset))
            .copied()
    }

    /// Byte `n` positions after the cursor.
    pub fn peek(&self, at: Cursor, n: usize) -> Option<u8> {
        self.current(self.advanced(at, n))
    }

    /// Number of bytes from the cursor (inclusive) to the end of the stream.
    pub fn remaining(&self, at: Cursor) -> usize {
        let Some(first) = self.chunks.get(at.segment) else {
            return 0;
        };
        let head = first.as_ref().len().saturating_sub(at.offset);
        let tail: usize = self.chunks[at.segment + 1..]
            .iter()
            .map(|chunk| chunk.as_ref().len())
            .sum();
        head + tail
    }

    /// Copies the bytes of `[begin, end)` out of the chunks.
    pub fn slice(&self, begin: Cursor, end: Cursor) -> Vec<u8> {
        let mut out = Vec::new();
        if begin >= end {
            return out;
        }
        let mut at = begin;
        while at < end {
            let Some(chunk) = self.chunks.get(at.segment) else {
                break;
            };
            let bytes = chunk.as_ref();
            let stop = if at.segment == end.segment {
                end.offset
            } else {
                bytes.len()
            };
            out.extend_from_slice(&bytes[at.offset..stop]);
            at = self.normalize(Cursor {
                segment: at.segment,
                offset: stop,
            });
        }
        out
    }

    /// Rolls an offset that ran past its chunk over into the following
    /// chunks, skipping empty ones.
    fn normalize(&self, mut at: Cursor) -> Cursor {
        while let Some(chunk) = self.chunks.get(at.segment) {
            let len = chunk.as_ref().len();
            if at.offset < len {
                return at;
            }
            at.offset -= len;
            at.segment += 1;
        }
        self.end()
    }
}
