//! # x86-64 Page Map Level 4 (PML4 / L4)
//!
//! - [`Pml4e`]: bit layout of an L4 entry. Always a link to an L3 table.
//! - [`Pml4Entry`]: the raw 64-bit slot stored in the table.
//!
//! A PML4E must have bit 7 clear; there are no 512 GiB pages.

use crate::page_table::attributes::attribute_conversions;
use crate::page_table::{ADDRESS_MASK, EntryTarget, PRESENT_BIT, TableEntry};
use crate::PageAttributes;
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// L4 **PML4E**: pointer to an L3 table (non-leaf; PS **must be 0**).
#[doc(alias = "PML4E")]
#[bitfield(u64)]
pub struct Pml4e {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// (bit 6): ignored.
    #[bits(1)]
    __ignored6: u8,
    /// (bit 7): must be 0.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// OS-available (bits 8..11).
    #[bits(4)]
    pub os_available_low: u8,
    /// L3 table physical address (bits 12..51).
    #[bits(40)]
    phys_addr_51_12: u64,
    /// OS-available (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

attribute_conversions!(Pml4e);

impl Pml4e {
    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, page: PhysicalPage<Size4K>) -> Self {
        self.set_phys_addr_51_12(page.base().as_u64() >> 12);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(self.phys_addr_51_12() << 12))
    }
}

/// One slot of an L4 table.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Pml4Entry(u64);

impl Pml4Entry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0 & PRESENT_BIT != 0
    }

    #[inline]
    #[must_use]
    pub const fn view(self) -> Pml4e {
        Pml4e::from_bits(self.0)
    }

    /// L3 table this entry links, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        if self.is_present() {
            Some(self.view().physical_page())
        } else {
            None
        }
    }

    /// Present link to the L3 table in `page`.
    #[inline]
    #[must_use]
    pub const fn present_next_with(attrs: PageAttributes, page: PhysicalPage<Size4K>) -> Self {
        Self(
            Pml4e::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }
}

impl TableEntry for Pml4Entry {
    const ZERO: Self = Self(0);

    #[inline]
    fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    fn into_bits(self) -> u64 {
        self.0
    }

    #[inline]
    fn is_leaf(self) -> bool {
        false
    }

    fn target(self) -> Option<EntryTarget> {
        self.next_table().map(EntryTarget::Table)
    }

    fn attributes(self) -> PageAttributes {
        self.view().attributes()
    }
}

impl fmt::Debug for Pml4Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            write!(f, "PML4E({:#018x} -> {})", self.0, PhysicalAddress::new(self.0 & ADDRESS_MASK))
        } else {
            f.write_str("PML4E(-)")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn link_keeps_ps_clear() {
        let l3 = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x0000_0012_3456_7000));
        let e = Pml4Entry::present_next_with(PageAttributes::user_rw(), l3);
        assert_eq!(e.into_bits() & (1 << 7), 0);
        assert_eq!(e.into_bits(), 0x0000_0012_3456_7007);
        assert_eq!(e.next_table(), Some(l3));
    }

    #[test]
    fn non_present_has_no_target() {
        assert_eq!(Pml4Entry::zero().target(), None);
        assert_eq!(Pml4Entry::from_bits(0x5000).next_table(), None);
    }
}
