//! # x86-64 Page Directory Pointer Table (PDPT / L3)
//!
//! At L3 the `PS` bit selects the role of an entry:
//! - `PS=0`: [`Pdpte`], link to an L2 table (4 KiB-aligned).
//! - `PS=1`: [`Pdpte1G`], 1 GiB leaf (1 GiB-aligned).

use crate::page_table::attributes::attribute_conversions;
use crate::page_table::{EntryTarget, PRESENT_BIT, PS_BIT, TableEntry};
use crate::PageAttributes;
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size1G, Size4K};

/// L3 **PDPTE**: pointer to a page directory (non-leaf; PS = 0).
#[bitfield(u64)]
pub struct Pdpte {
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
    /// (bit 6): ignored in non-leaf.
    #[bits(1)]
    __d_ignored: u8,
    /// (bit 7): must be 0 in non-leaf.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// (bit 8): ignored in non-leaf.
    #[bits(1)]
    __g_ignored: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// L2 table physical address (bits 12..51).
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

attribute_conversions!(Pdpte);

impl Pdpte {
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

/// L3 **PDPTE (1 GiB leaf)** (PS = 1). PAT moves to bit 12.
#[bitfield(u64)]
pub struct Pdpte1G {
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
    /// Page size (bit 7): 1 for the leaf form.
    #[bits(default = true)]
    page_size: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// PAT selector (bit 12).
    pub pat_large: bool,
    /// Reserved (bits 13..29).
    #[bits(17)]
    __res13_29: u32,
    /// Physical address bits 51..30.
    #[bits(22)]
    phys_addr_51_30: u32,
    /// OS-available (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,
    /// Protection key / OS use (bits 59..62).
    #[bits(4)]
    pub protection_key: u8,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

attribute_conversions!(Pdpte1G, global);

impl Pdpte1G {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_physical_page(mut self, page: PhysicalPage<Size1G>) -> Self {
        self.set_phys_addr_51_30((page.base().as_u64() >> 30) as u32);
        self.set_page_size(true);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size1G> {
        PhysicalPage::containing(PhysicalAddress::new((self.phys_addr_51_30() as u64) << 30))
    }
}

/// Decoded PDPTE.
#[derive(Copy, Clone, Debug)]
pub enum PdptEntryKind {
    NextPageDirectory(PhysicalPage<Size4K>, Pdpte),
    Leaf1GiB(PhysicalPage<Size1G>, Pdpte1G),
}

/// One slot of an L3 table.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct PdptEntry(u64);

impl PdptEntry {
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

    /// Decode by the `PS` bit, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdptEntryKind> {
        if !self.is_present() {
            return None;
        }
        Some(if self.0 & PS_BIT != 0 {
            let leaf = Pdpte1G::from_bits(self.0);
            PdptEntryKind::Leaf1GiB(leaf.physical_page(), leaf)
        } else {
            let next = Pdpte::from_bits(self.0);
            PdptEntryKind::NextPageDirectory(next.physical_page(), next)
        })
    }

    /// Present link to the L2 table in `page` (PS = 0).
    #[inline]
    #[must_use]
    pub const fn present_next_with(attrs: PageAttributes, page: PhysicalPage<Size4K>) -> Self {
        Self(
            Pdpte::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }

    /// Present 1 GiB leaf at `page` (PS = 1).
    #[inline]
    #[must_use]
    pub const fn present_leaf_with(attrs: PageAttributes, page: PhysicalPage<Size1G>) -> Self {
        Self(
            Pdpte1G::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }
}

impl TableEntry for PdptEntry {
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
        self.is_present() && self.0 & PS_BIT != 0
    }

    fn target(self) -> Option<EntryTarget> {
        Some(match self.kind()? {
            PdptEntryKind::NextPageDirectory(page, _) => EntryTarget::Table(page),
            PdptEntryKind::Leaf1GiB(page, _) => EntryTarget::Page {
                base: page.base(),
                size: Size1G::SIZE,
            },
        })
    }

    fn attributes(self) -> PageAttributes {
        match self.kind() {
            Some(PdptEntryKind::Leaf1GiB(_, leaf)) => leaf.attributes(),
            _ => Pdpte::from_bits(self.0).attributes(),
        }
    }
}

impl fmt::Debug for PdptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => f.write_str("PDPTE(-)"),
            Some(PdptEntryKind::NextPageDirectory(p, _)) => {
                write!(f, "PDPTE({:#018x} -> PD {})", self.0, p.base())
            }
            Some(PdptEntryKind::Leaf1GiB(p, _)) => write!(f, "PDPTE({:#018x} -> 1G {})", self.0, p.base()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pdpt_table_vs_1g() {
        let pd = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x3000_0000));
        let e = PdptEntry::present_next_with(PageAttributes::kernel_rw(), pd);
        match e.kind() {
            Some(PdptEntryKind::NextPageDirectory(p, _)) => assert_eq!(p, pd),
            other => panic!("expected next PD, got {other:?}"),
        }
        assert!(!e.is_leaf());

        let g = PhysicalPage::<Size1G>::containing(PhysicalAddress::new(0x0000_0002_4000_0000));
        let e = PdptEntry::present_leaf_with(PageAttributes::kernel_rw(), g);
        match e.kind() {
            Some(PdptEntryKind::Leaf1GiB(p, _)) => assert_eq!(p, g),
            other => panic!("expected 1GiB leaf, got {other:?}"),
        }
        assert!(e.is_leaf());
        assert_ne!(e.into_bits() & PS_BIT, 0);
    }

    #[test]
    fn leaf_pat_bit_does_not_alias_address() {
        let g = PhysicalPage::<Size1G>::containing(PhysicalAddress::new(0x4000_0000));
        let leaf = Pdpte1G::from_attributes(PageAttributes::kernel_rw())
            .with_physical_page(g)
            .with_pat_large(true);
        assert_eq!(leaf.physical_page(), g);
    }
}
