//! # x86-64 Page Table (PT / L1)
//!
//! - [`Pte4K`]: bit layout of a 4 KiB leaf.
//! - [`PtEntry`]: the raw 64-bit slot stored in the table.
//!
//! L1 never points to another table; every present entry maps a 4 KiB page.
//! Bit 7 is the PAT selector here, not `PS`.

use crate::page_table::attributes::attribute_conversions;
use crate::page_table::{EntryTarget, PRESENT_BIT, TableEntry};
use crate::PageAttributes;
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// L1 **PTE (4 KiB leaf)**.
#[doc(alias = "PTE")]
#[bitfield(u64)]
pub struct Pte4K {
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
    /// Dirty (bit 6).
    pub dirty: bool,
    /// PAT selector (bit 7).
    pub pat: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// Page frame (bits 12..51).
    #[bits(40)]
    phys_addr_51_12: u64,
    /// OS-available (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,
    /// Protection key / OS use (bits 59..62).
    #[bits(4)]
    pub protection_key: u8,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

attribute_conversions!(Pte4K, global);

impl Pte4K {
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

/// One slot of an L1 table.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct PtEntry(u64);

impl PtEntry {
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
    pub const fn view(self) -> Pte4K {
        Pte4K::from_bits(self.0)
    }

    /// The mapped 4 KiB page, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn page(self) -> Option<PhysicalPage<Size4K>> {
        if self.is_present() {
            Some(self.view().physical_page())
        } else {
            None
        }
    }

    /// Present 4 KiB leaf at `page`.
    #[inline]
    #[must_use]
    pub const fn present_with(attrs: PageAttributes, page: PhysicalPage<Size4K>) -> Self {
        Self(
            Pte4K::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }
}

impl TableEntry for PtEntry {
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
        self.is_present()
    }

    fn target(self) -> Option<EntryTarget> {
        self.page().map(|page| EntryTarget::Page {
            base: page.base(),
            size: 4096,
        })
    }

    fn attributes(self) -> PageAttributes {
        self.view().attributes()
    }
}

impl fmt::Debug for PtEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page() {
            Some(p) => write!(f, "PTE({:#018x} -> 4K {})", self.0, p.base()),
            None => f.write_str("PTE(-)"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pte_4k_leaf() {
        let k4 = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x5555_0000));
        let attrs = PageAttributes::user_rw().with_writable(false).with_no_execute(true);
        let e = PtEntry::present_with(attrs, k4);
        assert_eq!(e.page(), Some(k4));

        let v = e.view();
        assert!(!v.pat());
        assert!(v.no_execute());
        assert!(v.user());
        assert!(!v.writable());
        assert_eq!(e.attributes(), attrs);
    }

    #[test]
    fn pat_bit_is_not_a_size_bit() {
        let e = PtEntry::from_bits(0x1000 | (1 << 7) | 1);
        assert!(e.is_leaf());
        assert!(e.view().pat());
    }
}
