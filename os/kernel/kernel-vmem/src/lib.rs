//! # Four-Level Paging
//!
//! Typed x86-64 page tables and the operations the memory core performs on
//! them: locating the entry for an address, linking child tables, installing
//! large and small leaves, clearing tables, translating and diagnosing.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L4   |  L3   |  L2   |  L1   | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each holding 512 entries of 8 bytes.
//!
//! ```text
//!  L4 (PML4) → L3 (PDPT) → L2 (PD) → L1 (PT) → 4 KiB frame
//!                 │           │
//!                 │           └──► PS=1: 2 MiB leaf
//!                 └──────────────► PS=1: 1 GiB leaf
//! ```
//!
//! | Level | Table | Entry type | Leaf form |
//! |:------|:------|:-----------|:----------|
//! | [`L4`] | PML4 | [`Pml4Entry`] | never (bit 7 must be zero) |
//! | [`L3`] | PDPT | [`PdptEntry`] | 1 GiB with `PS=1` |
//! | [`L2`] | PD   | [`PdEntry`]   | 2 MiB with `PS=1` |
//! | [`L1`] | PT   | [`PtEntry`]   | always 4 KiB (bit 7 is PAT) |
//!
//! ## Seams
//!
//! - [`FrameAlloc`] hands out zero-or-garbage 4 KiB frames for new tables.
//! - [`PhysMapper`] turns a physical address into a pointer the running
//!   code can dereference. Every access to table memory goes through it,
//!   which lets the tests run the whole hierarchy on simulated RAM.
//! - [`TranslationRoot`] is the only writer of the hardware root (CR3).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod address_space;
pub mod dump;
pub mod page_table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
pub(crate) mod test_utils {
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}

pub use crate::address_space::{AddressSpace, MapSize, TranslationRoot};
pub use crate::page_table::attributes::PageAttributes;
pub use crate::page_table::pd::{Pde, Pde2M, PdEntry, PdEntryKind};
pub use crate::page_table::pdpt::{PdptEntry, PdptEntryKind, Pdpte, Pdpte1G};
pub use crate::page_table::pml4::{Pml4Entry, Pml4e};
pub use crate::page_table::pt::{Pte4K, PtEntry};
pub use crate::page_table::{
    EntryTarget, L1, L2, L3, L4, LargePageLevel, LeafLevel, PageTable, ParentLevel, TableEntry,
    TableLevel,
};

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub use crate::address_space::Cr3Root;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Source of 4 KiB frames for new page tables.
///
/// # Safety
/// A returned frame must be backed by RAM and exclusively owned by the caller
/// from then on; the allocator must never return it again.
pub unsafe trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

unsafe impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }
}

/// Scoped raw access to physical memory.
///
/// Converts a physical address into a pointer valid in the current address
/// space (identity map, higher-half direct map, or a test buffer).
///
/// # Safety
/// For every physical address the memory core asks about (table frames and
/// free page runs), the returned pointer must be valid for reads and writes
/// of `T` and suitably aligned when `pa` is.
pub unsafe trait PhysMapper {
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Borrow the memory at `pa` as a `T`.
    ///
    /// # Safety
    /// The memory must hold a valid `T` and no other reference to it may be
    /// alive for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr::<T>(pa) }
    }
}

unsafe impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (**self).phys_to_ptr(pa)
    }
}

/// Errors raised while manipulating the page table hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmemError {
    #[error("out of memory while allocating an L{level} table")]
    OutOfMemory { level: u8 },
    #[error("L{level} slot {index} is already present")]
    SlotOccupied { level: u8, index: u16 },
    #[error("address {address:#x} is not aligned to {alignment:#x}")]
    MisalignedMapping { address: u64, alignment: u64 },
}
