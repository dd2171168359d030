//! # x86-64 Page Directory (PD / L2)
//!
//! At L2 the `PS` bit selects the role of an entry:
//! - `PS=0`: [`Pde`], link to an L1 page table (4 KiB-aligned).
//! - `PS=1`: [`Pde2M`], 2 MiB leaf (2 MiB-aligned).
//!
//! The direct map is built entirely from 2 MiB leaves, so this is the level
//! the memory core writes most.

use crate::page_table::attributes::attribute_conversions;
use crate::page_table::{EntryTarget, PRESENT_BIT, PS_BIT, TableEntry};
use crate::PageAttributes;
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size2M, Size4K};

/// L2 **PDE**: pointer to a page table (non-leaf; PS = 0).
#[bitfield(u64)]
pub struct Pde {
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
    /// L1 table physical address (bits 12..51).
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

attribute_conversions!(Pde);

impl Pde {
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

/// L2 **PDE (2 MiB leaf)** (PS = 1). PAT moves to bit 12.
#[bitfield(u64)]
pub struct Pde2M {
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
    /// Reserved (bits 13..20).
    #[bits(8)]
    __res13_20: u8,
    /// Physical address bits 51..21.
    #[bits(31)]
    phys_addr_51_21: u32,
    /// OS-available (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,
    /// Protection key / OS use (bits 59..62).
    #[bits(4)]
    pub protection_key: u8,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

attribute_conversions!(Pde2M, global);

impl Pde2M {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_physical_page(mut self, page: PhysicalPage<Size2M>) -> Self {
        self.set_phys_addr_51_21((page.base().as_u64() >> 21) as u32);
        self.set_page_size(true);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size2M> {
        PhysicalPage::containing(PhysicalAddress::new((self.phys_addr_51_21() as u64) << 21))
    }
}

/// Decoded PDE.
#[derive(Copy, Clone, Debug)]
pub enum PdEntryKind {
    NextPageTable(PhysicalPage<Size4K>, Pde),
    Leaf2MiB(PhysicalPage<Size2M>, Pde2M),
}

/// One slot of an L2 table.
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct PdEntry(u64);

impl PdEntry {
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
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.is_present() {
            return None;
        }
        Some(if self.0 & PS_BIT != 0 {
            let leaf = Pde2M::from_bits(self.0);
            PdEntryKind::Leaf2MiB(leaf.physical_page(), leaf)
        } else {
            let next = Pde::from_bits(self.0);
            PdEntryKind::NextPageTable(next.physical_page(), next)
        })
    }

    /// Present link to the L1 table in `page` (PS = 0).
    #[inline]
    #[must_use]
    pub const fn present_next_with(attrs: PageAttributes, page: PhysicalPage<Size4K>) -> Self {
        Self(
            Pde::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }

    /// Present 2 MiB leaf at `page` (PS = 1).
    #[inline]
    #[must_use]
    pub const fn present_leaf_with(attrs: PageAttributes, page: PhysicalPage<Size2M>) -> Self {
        Self(
            Pde2M::from_attributes(attrs)
                .with_present(true)
                .with_physical_page(page)
                .into_bits(),
        )
    }
}

impl TableEntry for PdEntry {
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
            PdEntryKind::NextPageTable(page, _) => EntryTarget::Table(page),
            PdEntryKind::Leaf2MiB(page, _) => EntryTarget::Page {
                base: page.base(),
                size: Size2M::SIZE,
            },
        })
    }

    fn attributes(self) -> PageAttributes {
        match self.kind() {
            Some(PdEntryKind::Leaf2MiB(_, leaf)) => leaf.attributes(),
            _ => Pde::from_bits(self.0).attributes(),
        }
    }
}

impl fmt::Debug for PdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => f.write_str("PDE(-)"),
            Some(PdEntryKind::NextPageTable(p, _)) => write!(f, "PDE({:#018x} -> PT {})", self.0, p.base()),
            Some(PdEntryKind::Leaf2MiB(p, _)) => write!(f, "PDE({:#018x} -> 2M {})", self.0, p.base()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pd_table_vs_2m() {
        let pt = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x2000_0000));
        let e = PdEntry::present_next_with(PageAttributes::user_rw(), pt);
        match e.kind() {
            Some(PdEntryKind::NextPageTable(p, f)) => {
                assert_eq!(p.base().as_u64(), 0x2000_0000);
                assert!(f.user());
            }
            other => panic!("expected next PT, got {other:?}"),
        }

        let m2 = PhysicalPage::<Size2M>::containing(PhysicalAddress::new(0x0040_0000));
        let e = PdEntry::present_leaf_with(PageAttributes::user_rw(), m2);
        match e.kind() {
            Some(PdEntryKind::Leaf2MiB(p, f)) => {
                assert_eq!(p.base().as_u64(), 0x0040_0000);
                assert!(f.writable());
            }
            other => panic!("expected 2MiB leaf, got {other:?}"),
        }
        assert_eq!(e.into_bits(), 0x0040_0087);
    }

    #[test]
    fn raw_ps_bit_decides_kind() {
        assert!(PdEntry::from_bits(0x0020_0083).is_leaf());
        assert!(!PdEntry::from_bits(0x0000_5003).is_leaf());
        assert!(!PdEntry::from_bits(0x0020_0082).is_leaf());
    }
}
