//! # Page Tables
//!
//! One generic [`PageTable<L>`] (512 entries, exactly one 4 KiB frame) and
//! four level markers. The level decides the entry type, which address bits
//! select the slot, and which installations are legal:
//!
//! | Marker | Entry | Index bits | Child table | Leaf size |
//! |--------|-------|------------|-------------|-----------|
//! | [`L4`] | [`Pml4Entry`](pml4::Pml4Entry) | 47..39 | [`L3`] | – |
//! | [`L3`] | [`PdptEntry`](pdpt::PdptEntry) | 38..30 | [`L2`] | 1 GiB |
//! | [`L2`] | [`PdEntry`](pd::PdEntry) | 29..21 | [`L1`] | 2 MiB |
//! | [`L1`] | [`PtEntry`](pt::PtEntry) | 20..12 | – | 4 KiB |
//!
//! Installing over a present slot is refused with
//! [`VmemError::SlotOccupied`]: nothing here ever frees a table, so an
//! overwrite would leak the sub-tree behind it.
//!
//! TLB maintenance is the caller's responsibility after mutating an active
//! address space.

pub mod attributes;
pub mod pd;
pub mod pdpt;
pub mod pml4;
pub mod pt;

use crate::{PageAttributes, VmemError};
use core::fmt;
use kernel_memory_addresses::{
    ENTRIES_PER_TABLE, L1_SHIFT, L2_SHIFT, L3_SHIFT, L4_SHIFT, PageSize, PhysicalAddress,
    PhysicalPage, Size1G, Size2M, Size4K, TableIndex, VirtualAddress,
};

/// Present (bit 0).
pub const PRESENT_BIT: u64 = 1 << 0;
/// Page size (bit 7) at L3/L2. PAT at L1, must-be-zero at L4.
pub const PS_BIT: u64 = 1 << 7;
/// Physical address field, bits 51..12.
pub const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// What a present entry points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryTarget {
    /// Next-level table frame.
    Table(PhysicalPage<Size4K>),
    /// Leaf mapping of `size` bytes starting at `base`.
    Page { base: PhysicalAddress, size: u64 },
}

/// Common view over the four entry types.
pub trait TableEntry: Copy + fmt::Debug {
    /// Non-present, all bits clear.
    const ZERO: Self;

    fn from_bits(bits: u64) -> Self;
    fn into_bits(self) -> u64;

    #[inline]
    fn is_present(self) -> bool {
        self.into_bits() & PRESENT_BIT != 0
    }

    /// Present and terminating the walk at this level.
    fn is_leaf(self) -> bool;

    /// Decoded target, or `None` if not present.
    fn target(self) -> Option<EntryTarget>;

    fn attributes(self) -> PageAttributes;
}

mod sealed {
    pub trait Sealed {}
}

/// A paging level.
pub trait TableLevel: sealed::Sealed {
    type Entry: TableEntry;
    /// 4 for the root, 1 for the last level.
    const LEVEL: u8;
    /// Lowest VA bit of this level's index field.
    const SHIFT: u32;
    /// Architectural table name.
    const NAME: &'static str;
}

/// A level whose entries can link a next-level table.
pub trait ParentLevel: TableLevel {
    type Child: TableLevel;

    fn table_entry(child: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self::Entry;
}

/// A level whose entries can map memory directly.
pub trait LeafLevel: TableLevel {
    type Size: PageSize;

    fn leaf_entry(page: PhysicalPage<Self::Size>, attrs: PageAttributes) -> Self::Entry;
}

/// Leaf levels above L1 (`PS=1` forms).
pub trait LargePageLevel: LeafLevel {}

/// Root level (PML4).
#[derive(Debug)]
pub enum L4 {}
/// Page directory pointer table level.
#[derive(Debug)]
pub enum L3 {}
/// Page directory level.
#[derive(Debug)]
pub enum L2 {}
/// Page table level.
#[derive(Debug)]
pub enum L1 {}

impl sealed::Sealed for L4 {}
impl sealed::Sealed for L3 {}
impl sealed::Sealed for L2 {}
impl sealed::Sealed for L1 {}

impl TableLevel for L4 {
    type Entry = pml4::Pml4Entry;
    const LEVEL: u8 = 4;
    const SHIFT: u32 = L4_SHIFT;
    const NAME: &'static str = "PML4";
}

impl TableLevel for L3 {
    type Entry = pdpt::PdptEntry;
    const LEVEL: u8 = 3;
    const SHIFT: u32 = L3_SHIFT;
    const NAME: &'static str = "PDPT";
}

impl TableLevel for L2 {
    type Entry = pd::PdEntry;
    const LEVEL: u8 = 2;
    const SHIFT: u32 = L2_SHIFT;
    const NAME: &'static str = "PD";
}

impl TableLevel for L1 {
    type Entry = pt::PtEntry;
    const LEVEL: u8 = 1;
    const SHIFT: u32 = L1_SHIFT;
    const NAME: &'static str = "PT";
}

impl ParentLevel for L4 {
    type Child = L3;

    #[inline]
    fn table_entry(child: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self::Entry {
        pml4::Pml4Entry::present_next_with(attrs, child)
    }
}

impl ParentLevel for L3 {
    type Child = L2;

    #[inline]
    fn table_entry(child: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self::Entry {
        pdpt::PdptEntry::present_next_with(attrs, child)
    }
}

impl ParentLevel for L2 {
    type Child = L1;

    #[inline]
    fn table_entry(child: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self::Entry {
        pd::PdEntry::present_next_with(attrs, child)
    }
}

impl LeafLevel for L3 {
    type Size = Size1G;

    #[inline]
    fn leaf_entry(page: PhysicalPage<Size1G>, attrs: PageAttributes) -> Self::Entry {
        pdpt::PdptEntry::present_leaf_with(attrs, page)
    }
}

impl LeafLevel for L2 {
    type Size = Size2M;

    #[inline]
    fn leaf_entry(page: PhysicalPage<Size2M>, attrs: PageAttributes) -> Self::Entry {
        pd::PdEntry::present_leaf_with(attrs, page)
    }
}

impl LeafLevel for L1 {
    type Size = Size4K;

    #[inline]
    fn leaf_entry(page: PhysicalPage<Size4K>, attrs: PageAttributes) -> Self::Entry {
        pt::PtEntry::present_with(attrs, page)
    }
}

impl LargePageLevel for L3 {}
impl LargePageLevel for L2 {}

/// A page table of level `L`: 512 entries in one 4 KiB-aligned frame.
#[repr(C, align(4096))]
pub struct PageTable<L: TableLevel> {
    entries: [L::Entry; ENTRIES_PER_TABLE],
}

const _: () = {
    assert!(size_of::<PageTable<L4>>() == 4096);
    assert!(size_of::<PageTable<L3>>() == 4096);
    assert!(size_of::<PageTable<L2>>() == 4096);
    assert!(size_of::<PageTable<L1>>() == 4096);
};

impl<L: TableLevel> PageTable<L> {
    /// A table with every entry non-present.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [L::Entry::ZERO; ENTRIES_PER_TABLE],
        }
    }

    /// Slot that `va` selects at this level.
    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> TableIndex {
        va.table_index(L::SHIFT)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: TableIndex) -> L::Entry {
        self.entries[index.as_usize()]
    }

    #[inline]
    pub fn set(&mut self, index: TableIndex, entry: L::Entry) {
        self.entries[index.as_usize()] = entry;
    }

    /// Mutable reference to the entry that translates `va` at this level.
    #[inline]
    pub fn entry_for_address(&mut self, va: VirtualAddress) -> &mut L::Entry {
        &mut self.entries[Self::index_of(va).as_usize()]
    }

    /// Mark all 512 entries non-present.
    pub fn clear(&mut self) {
        self.entries.fill(L::Entry::ZERO);
    }

    /// `(index, entry)` for every present slot, in slot order.
    pub fn present_entries(&self) -> impl Iterator<Item = (TableIndex, L::Entry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (table_index(i), *e))
    }

    fn vacant_slot(&mut self, va: VirtualAddress) -> Result<&mut L::Entry, VmemError> {
        let index = Self::index_of(va);
        let slot = &mut self.entries[index.as_usize()];
        if slot.is_present() {
            return Err(VmemError::SlotOccupied {
                level: L::LEVEL,
                index: index.as_u16(),
            });
        }
        Ok(slot)
    }
}

impl<L: ParentLevel> PageTable<L> {
    /// Link `child` as the next-level table for `va`.
    ///
    /// `child` should be cleared before it becomes reachable.
    ///
    /// # Errors
    /// [`VmemError::SlotOccupied`] if the slot is already present; the
    /// existing entry is left untouched.
    pub fn install_child_table(
        &mut self,
        va: VirtualAddress,
        child: PhysicalPage<Size4K>,
        attrs: PageAttributes,
    ) -> Result<(), VmemError> {
        *self.vacant_slot(va)? = L::table_entry(child, attrs.with_present(true));
        Ok(())
    }

    /// Next-level table linked for `va`, if the slot holds one.
    #[must_use]
    pub fn child_table(&self, va: VirtualAddress) -> Option<PhysicalPage<Size4K>> {
        match self.get(Self::index_of(va)).target()? {
            EntryTarget::Table(page) => Some(page),
            EntryTarget::Page { .. } => None,
        }
    }
}

impl<L: LeafLevel> PageTable<L> {
    /// Map the `L::Size` page containing `va` to `page`.
    ///
    /// # Errors
    /// [`VmemError::SlotOccupied`] if the slot is already present.
    pub fn install_leaf(
        &mut self,
        va: VirtualAddress,
        page: PhysicalPage<L::Size>,
        attrs: PageAttributes,
    ) -> Result<(), VmemError> {
        *self.vacant_slot(va)? = L::leaf_entry(page, attrs.with_present(true));
        Ok(())
    }
}

impl<L: LargePageLevel> PageTable<L> {
    /// Install a 1 GiB (L3) or 2 MiB (L2) leaf. The page type guarantees
    /// the large-page alignment of `page`.
    ///
    /// # Errors
    /// [`VmemError::SlotOccupied`] if the slot is already present.
    #[inline]
    pub fn install_large_page(
        &mut self,
        va: VirtualAddress,
        page: PhysicalPage<L::Size>,
        attrs: PageAttributes,
    ) -> Result<(), VmemError> {
        self.install_leaf(va, page, attrs)
    }
}

impl PageTable<L1> {
    /// Install a 4 KiB leaf.
    ///
    /// # Errors
    /// [`VmemError::SlotOccupied`] if the slot is already present.
    #[inline]
    pub fn install_page(
        &mut self,
        va: VirtualAddress,
        page: PhysicalPage<Size4K>,
        attrs: PageAttributes,
    ) -> Result<(), VmemError> {
        self.install_leaf(va, page, attrs)
    }
}

impl PageAttributes {
    #[inline]
    #[must_use]
    const fn with_present(mut self, present: bool) -> Self {
        self.present = present;
        self
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn table_index(i: usize) -> TableIndex {
    TableIndex::new(i as u16)
}
