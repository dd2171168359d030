use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Page-aligned base of a physical page of size `S`.
///
/// The low `S::SHIFT` bits of the base are always zero, so a
/// `PhysicalPage<Size2M>` can be handed to a 2 MiB leaf without a further
/// alignment check.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self {
            base: addr.as_u64() & !S::OFFSET_MASK,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Byte address `offset` bytes into this page.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < S::SIZE);
        PhysicalAddress::new(self.base | (offset & S::OFFSET_MASK))
    }

    /// The page `count` pages above this one; `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add_pages(self, count: u64) -> Option<Self> {
        let Some(bytes) = count.checked_mul(S::SIZE) else {
            return None;
        };
        match self.base.checked_add(bytes) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }

    /// First byte past the end of a run of `count` pages starting here.
    #[inline]
    #[must_use]
    pub const fn end_of_run(self, count: u64) -> Option<PhysicalAddress> {
        match self.checked_add_pages(count) {
            Some(p) => Some(p.base()),
            None => None,
        }
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    #[inline]
    fn from(page: PhysicalPage<S>) -> Self {
        page.base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size2M, Size4K};

    #[test]
    fn containing_aligns_down() {
        let p = PhysicalPage::<Size2M>::containing(PhysicalAddress::new(0x0000_0008_1234_5678));
        assert_eq!(p.base().as_u64(), 0x0000_0008_1220_0000);
        assert_eq!(p.join(0x3_4567).as_u64(), 0x0000_0008_1223_4567);
    }

    #[test]
    fn page_arithmetic() {
        let p = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x10_0000));
        assert_eq!(p.checked_add_pages(3).map(PhysicalPage::base), Some(PhysicalAddress::new(0x10_3000)));
        assert_eq!(p.end_of_run(16), Some(PhysicalAddress::new(0x11_0000)));
        assert_eq!(p.checked_add_pages(u64::MAX), None);
    }

    #[test]
    fn formatting() {
        let p = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x1000));
        assert_eq!(format!("{p}"), "0x0000000000001000/4K");
        assert_eq!(format!("{p:?}"), "PhysicalPage<4K>(0x0000000000001000)");
    }
}
