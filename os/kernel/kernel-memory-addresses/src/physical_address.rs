use crate::{PageSize, PhysicalPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address (RAM or MMIO).
///
/// Carries intent only; no range or canonicality check is applied. Physical
/// address `0` is a valid, mappable location, which is why code that needs an
/// "absent" value uses `Option<PhysicalAddress>` rather than a zero sentinel.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
/// assert_eq!(pa.page::<Size4K>().base().as_u64(), 0x0000_0010_2000_0000);
/// assert_eq!(pa.offset::<Size4K>(), 0x42);
/// assert!(pa.aligned_page::<Size4K>().is_none());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Page of size `S` containing this address (aligns down).
    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing(self)
    }

    /// Offset of this address within its `S`-sized page.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & S::OFFSET_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.offset::<S>() == 0
    }

    /// The page starting exactly at this address, or `None` if misaligned.
    #[inline]
    #[must_use]
    pub const fn aligned_page<S: PageSize>(self) -> Option<PhysicalPage<S>> {
        if self.is_aligned::<S>() {
            Some(PhysicalPage::containing(self))
        } else {
            None
        }
    }

    /// Round up to the next `S` boundary; `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Option<Self> {
        match self.0.checked_add(S::OFFSET_MASK) {
            Some(v) => Some(Self(v & !S::OFFSET_MASK)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        pa.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size2M, Size4K};

    #[test]
    fn align_up_rounds_to_next_boundary() {
        let pa = PhysicalAddress::new(0x20_0001);
        assert_eq!(pa.align_up::<Size2M>(), Some(PhysicalAddress::new(0x40_0000)));
        assert_eq!(
            PhysicalAddress::new(0x40_0000).align_up::<Size2M>(),
            Some(PhysicalAddress::new(0x40_0000))
        );
        assert_eq!(PhysicalAddress::new(u64::MAX).align_up::<Size4K>(), None);
    }

    #[test]
    fn aligned_page_rejects_offsets() {
        assert!(PhysicalAddress::new(0x1000).aligned_page::<Size4K>().is_some());
        assert!(PhysicalAddress::new(0x1000).aligned_page::<Size2M>().is_none());
        assert!(PhysicalAddress::zero().aligned_page::<Size2M>().is_some());
    }

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0xFEE0_0000);
        assert_eq!(format!("{pa:?}"), "PA(0x00000000FEE00000)");
        assert_eq!(format!("{pa}"), "0x00000000FEE00000");
    }
}
