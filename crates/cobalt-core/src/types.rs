//! # Cobalt Core Types
//!
//! Address, size and extent types shared by every layer.

use core::fmt;
use core::ops::Add;

use static_assertions::assert_eq_size;

// =============================================================================
// GPU ADDRESS
// =============================================================================

/// Device virtual address
///
/// An address in the device's address space. Heap-relative offsets written
/// into hardware commands are computed against these.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GpuAddr(u64);

// Written into hardware commands as two raw dwords
assert_eq_size!(GpuAddr, u64);

impl GpuAddr {
    /// Create a new GPU address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null GPU address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// Low 32 bits, as split into command dwords
    #[inline]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits, as split into command dwords
    #[inline]
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl Add<u64> for GpuAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// SIZE TYPES
// =============================================================================

/// Size in bytes
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Zero size
    pub const ZERO: Self = Self(0);
    /// 4 KiB page
    pub const KIB_4: Self = Self(4 * 1024);
    /// 64 KiB
    pub const KIB_64: Self = Self(64 * 1024);

    /// Create from bytes
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from KiB
    #[inline]
    pub const fn from_kib(kib: u64) -> Self {
        Self(kib * 1024)
    }

    /// Get as bytes
    #[inline]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    /// Align up
    #[inline]
    pub const fn align_up(self, alignment: u64) -> Self {
        Self(align_up(self.0, alignment))
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1024 * 1024 {
            write!(f, "{} MiB", self.0 / (1024 * 1024))
        } else if self.0 >= 1024 {
            write!(f, "{} KiB", self.0 / 1024)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Round `value` up to a power-of-two `alignment`
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

// =============================================================================
// THREE-COMPONENT EXTENT
// =============================================================================

/// Three-component origin or region, in pixels (x) and rows/slices (y, z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dim3 {
    /// Width component
    pub x: usize,
    /// Height component
    pub y: usize,
    /// Depth component
    pub z: usize,
}

impl Dim3 {
    /// Create from components
    #[inline]
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Product of the three components
    #[inline]
    pub const fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Check if any component is zero
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

impl From<[usize; 3]> for Dim3 {
    fn from(v: [usize; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_addr_split() {
        let addr = GpuAddr::new(0x0000_0012_3456_7000);
        assert_eq!(addr.low(), 0x3456_7000);
        assert_eq!(addr.high(), 0x12);
        assert!(addr.is_aligned(0x1000));
        assert_eq!((addr + 0x40).raw(), 0x0000_0012_3456_7040);
    }

    #[test]
    fn test_dim3_volume() {
        assert_eq!(Dim3::new(4, 3, 2).volume(), 24);
        assert!(Dim3::new(4, 0, 2).is_empty());
        assert_eq!(Dim3::from([1, 2, 3]), Dim3::new(1, 2, 3));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(ByteSize::from_bytes(4097).align_up(4096), ByteSize::from_kib(8));
    }
}
