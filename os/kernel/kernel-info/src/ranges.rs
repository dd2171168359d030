//! # Physical Ranges

use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// A contiguous span of physical address space, `[start, start + length)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    pub start: PhysicalAddress,
    pub length: u64,
}

impl PhysicalRange {
    #[must_use]
    pub const fn new(start: PhysicalAddress, length: u64) -> Self {
        Self { start, length }
    }

    /// First address past the range, saturating at the top of the address space.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start.as_u64().saturating_add(self.length))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.start.as_u64() && pa.as_u64() < self.end().as_u64()
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start.as_u64() < other.end().as_u64()
            && other.start.as_u64() < self.end().as_u64()
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end())
    }
}

/// What a platform-reported range holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PlatformRangeKind {
    /// Byte-addressable persistent memory (NVDIMM).
    PersistentMemory,
    /// Volatile memory reported outside the firmware memory map.
    Volatile,
    /// Anything else that still needs to be reachable through the direct map.
    Other,
}

/// A physical range reported by platform firmware tables rather than by the
/// UEFI memory map, e.g. an NFIT system-physical-address range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PlatformRange {
    pub range: PhysicalRange,
    pub kind: PlatformRangeKind,
}

impl PlatformRange {
    #[must_use]
    pub const fn new(start: PhysicalAddress, length: u64, kind: PlatformRangeKind) -> Self {
        Self {
            range: PhysicalRange::new(start, length),
            kind,
        }
    }

    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.range.end()
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.kind == PlatformRangeKind::PersistentMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        let a = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x2000);
        let b = PhysicalRange::new(PhysicalAddress::new(0x3000), 0x1000);
        let c = PhysicalRange::new(PhysicalAddress::new(0x2FFF), 0x1);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(!a.overlaps(&PhysicalRange::new(PhysicalAddress::new(0x1000), 0)));
    }

    #[test]
    fn contains_excludes_end() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x1000);
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(r.contains(PhysicalAddress::new(0x1FFF)));
        assert!(!r.contains(PhysicalAddress::new(0x2000)));
        assert!(!r.contains(PhysicalAddress::new(0xFFF)));
    }

    #[test]
    fn end_saturates() {
        let r = PhysicalRange::new(PhysicalAddress::new(u64::MAX - 1), 16);
        assert_eq!(r.end().as_u64(), u64::MAX);
    }
}
