use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkRange
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` of a payload of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ChunkRange {
    /// Computes the next range to send from `position`.
    ///
    /// The end is clamped to `total`. Returns `None` when nothing is left,
    /// which includes a `position` already past the end.
    pub fn next(position: u64, chunk_size: u64, total: u64) -> Option<Self> {
        let end = position.saturating_add(chunk_size).min(total);
        if end <= position {
            return None;
        }
        Some(Self {
            start: position,
            end,
            total,
        })
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Ranges produced by [`ChunkRange::next`] are never empty.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Value of the `Content-Range` header for this range.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end - 1, self.total)
    }
}

/// Number of chunks needed to send `total` bytes.
pub fn chunk_count(total: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: u64 = 20 * 1024;
    const L: u64 = 115_063;

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn checksum_bytes_different_data() {
        assert_ne!(checksum_bytes(b"hello"), checksum_bytes(b"world"));
    }

    #[test]
    fn first_range() {
        let r = ChunkRange::next(0, C, L).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 20480);
        assert_eq!(r.len(), C);
        assert_eq!(r.content_range(), "bytes 0-20479/115063");
    }

    #[test]
    fn last_range_is_clamped() {
        let r = ChunkRange::next(102_400, C, L).unwrap();
        assert_eq!(r.end, L);
        assert_eq!(r.len(), L % C);
        assert_eq!(r.content_range(), "bytes 102400-115062/115063");
    }

    #[test]
    fn nothing_left() {
        assert!(ChunkRange::next(L, C, L).is_none());
        // Position overshoots after an unclamped advance.
        assert!(ChunkRange::next(122_880, C, L).is_none());
        assert!(ChunkRange::next(0, C, 0).is_none());
    }

    #[test]
    fn walking_ranges_covers_payload() {
        let mut position = 0;
        let mut ranges = Vec::new();
        while let Some(r) = ChunkRange::next(position, C, L) {
            ranges.push(r);
            position += C;
        }

        assert_eq!(ranges.len() as u64, chunk_count(L, C));
        assert_eq!(ranges.len(), 6);
        assert_eq!(ranges.iter().map(ChunkRange::len).sum::<u64>(), L);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn exact_multiple_last_chunk_is_full() {
        let total = 3 * C;
        let last = ChunkRange::next(2 * C, C, total).unwrap();
        assert_eq!(last.len(), C);
        assert_eq!(chunk_count(total, C), 3);
    }

    #[test]
    fn chunk_count_edges() {
        assert_eq!(chunk_count(0, C), 0);
        assert_eq!(chunk_count(1, C), 1);
        assert_eq!(chunk_count(10, 0), 0);
    }
}
