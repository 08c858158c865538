//! # Host Copies
//!
//! Packing between a pitched host region and the compacted row-major layout
//! the copy kernels read and write in staging buffers.
//!
//! ```text
//! host (pitched)                     staging (compacted)
//! ┌────────────┬───┐                 ┌────────────┐
//! │ row 0      │pad│    pack ──▶     │ row 0      │
//! │ row 1      │pad│                 │ row 1      │
//! │ row 2      │pad│    ◀── unpack   │ row 2      │
//! └────────────┴───┘                 └────────────┘
//! ```

/// A region of host memory laid out with arbitrary pitches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchedRegion {
    /// Address of the first byte
    pub ptr: usize,
    /// Bytes copied per row
    pub row_bytes: usize,
    /// Rows per slice
    pub rows: usize,
    /// Slices
    pub slices: usize,
    /// Bytes between rows
    pub row_pitch: usize,
    /// Bytes between slices
    pub slice_pitch: usize,
}

impl PitchedRegion {
    /// Size of the compacted representation
    #[inline]
    pub const fn packed_size(&self) -> usize {
        self.row_bytes * self.rows * self.slices
    }

    fn row_addr(&self, row: usize, slice: usize) -> usize {
        self.ptr + slice * self.slice_pitch + row * self.row_pitch
    }
}

/// Copy a pitched host region into a compacted buffer
///
/// Copies at most `packed.len()` bytes.
///
/// # Safety
/// Every row of `src` must be valid for reads of `row_bytes` bytes and must
/// not overlap `packed`.
pub unsafe fn pack(src: &PitchedRegion, packed: &mut [u8]) {
    if src.row_bytes == 0 {
        return;
    }
    let rows = (0..src.slices).flat_map(|z| (0..src.rows).map(move |y| (y, z)));
    for (chunk, (y, z)) in packed.chunks_exact_mut(src.row_bytes).zip(rows) {
        let row = src.row_addr(y, z) as *const u8;
        // SAFETY: caller guarantees the row is readable and disjoint
        unsafe { core::ptr::copy_nonoverlapping(row, chunk.as_mut_ptr(), src.row_bytes) };
    }
}

/// Copy a compacted buffer out to a pitched host region
///
/// # Safety
/// Every row of `dst` must be valid for writes of `row_bytes` bytes and must
/// not overlap `packed`.
pub unsafe fn unpack(packed: &[u8], dst: &PitchedRegion) {
    if dst.row_bytes == 0 {
        return;
    }
    let rows = (0..dst.slices).flat_map(|z| (0..dst.rows).map(move |y| (y, z)));
    for (chunk, (y, z)) in packed.chunks_exact(dst.row_bytes).zip(rows) {
        let row = dst.row_addr(y, z) as *mut u8;
        // SAFETY: caller guarantees the row is writable and disjoint
        unsafe { core::ptr::copy_nonoverlapping(chunk.as_ptr(), row, dst.row_bytes) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    fn region(ptr: *const u8) -> PitchedRegion {
        // 3 bytes per row, 2 rows, 2 slices, row pitch 4, slice pitch 10
        PitchedRegion {
            ptr: ptr as usize,
            row_bytes: 3,
            rows: 2,
            slices: 2,
            row_pitch: 4,
            slice_pitch: 10,
        }
    }

    #[test]
    fn test_pack_skips_padding() {
        let host: Vec<u8> = (0..20).collect();
        let src = region(host.as_ptr());
        let mut packed = vec![0u8; src.packed_size()];
        unsafe { pack(&src, &mut packed) };
        assert_eq!(packed, [0, 1, 2, 4, 5, 6, 10, 11, 12, 14, 15, 16]);
    }

    #[test]
    fn test_unpack_leaves_padding() {
        let mut host = vec![0xAAu8; 20];
        let dst = region(host.as_mut_ptr());
        let packed: Vec<u8> = (1..=12).collect();
        unsafe { unpack(&packed, &dst) };
        assert_eq!(&host[0..4], &[1, 2, 3, 0xAA]);
        assert_eq!(&host[4..8], &[4, 5, 6, 0xAA]);
        assert_eq!(&host[8..10], &[0xAA, 0xAA]);
        assert_eq!(&host[10..13], &[7, 8, 9]);
        assert_eq!(&host[14..17], &[10, 11, 12]);
    }
}
