//! Part planning
//!
//! Splits a byte range into numbered parts of a fixed chunk size. The one
//! wrinkle is the tail: a remainder smaller than the configured floor is
//! merged into the preceding part instead of shipped on its own, so the
//! last part may be up to `chunk_size + min_floor - 1` bytes.

/// One planned part of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 1-based part number, dense and ascending.
    pub part_number: u32,

    /// Byte offset of the part within the source.
    pub offset: u64,

    /// Length of the part in bytes.
    pub len: u64,
}

impl ChunkSpec {
    /// Exclusive end offset of the part.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Plans the parts for a `file_size`-byte source at `chunk_size`.
///
/// Parts tile the source exactly: offsets are contiguous, lengths sum to
/// `file_size`, and part numbers run 1..=n with no gaps. A final remainder
/// shorter than `min_floor` is absorbed into the last full part. An empty
/// source yields no parts.
#[must_use]
pub fn plan_parts(file_size: u64, chunk_size: u64, min_floor: u64) -> Vec<ChunkSpec> {
    if file_size == 0 || chunk_size == 0 {
        return Vec::new();
    }
    if file_size <= chunk_size {
        return vec![ChunkSpec {
            part_number: 1,
            offset: 0,
            len: file_size,
        }];
    }

    let full_parts = file_size / chunk_size;
    let remainder = file_size % chunk_size;

    let mut parts = Vec::with_capacity(full_parts as usize + 1);
    for i in 0..full_parts {
        parts.push(ChunkSpec {
            part_number: i as u32 + 1,
            offset: i * chunk_size,
            len: chunk_size,
        });
    }

    if remainder >= min_floor {
        parts.push(ChunkSpec {
            part_number: full_parts as u32 + 1,
            offset: full_parts * chunk_size,
            len: remainder,
        });
    } else if remainder > 0 {
        // Tail too small to ship alone; fold it into the last full part.
        if let Some(last) = parts.last_mut() {
            last.len += remainder;
        }
    }

    parts
}
