//! # Mapping Size
//!
//! Decides at the type level where [`AddressSpace::map_one`] stops walking
//! and which table receives the leaf, so callers never branch on size at
//! runtime.

use crate::page_table::{L1, L2, L3, L4, LeafLevel};
use crate::{AddressSpace, FrameAlloc, PageAttributes, PhysMapper, VmemError};
use kernel_memory_addresses::{PageSize, PhysicalPage, Size1G, Size2M, Size4K, VirtualAddress};

/// A page size that [`AddressSpace::map_one`] can install.
///
/// | Size | Leaf table | Walk |
/// |------|------------|------|
/// | [`Size1G`] | L3 (PDPT) | L4 |
/// | [`Size2M`] | L2 (PD)   | L4 → L3 |
/// | [`Size4K`] | L1 (PT)   | L4 → L3 → L2 |
pub trait MapSize: PageSize {
    /// Level whose table holds the leaf.
    type Level: LeafLevel<Size = Self>;

    /// Frame of the table the leaf for `va` goes into, creating missing
    /// intermediate tables linked with `nonleaf`.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if a table cannot be allocated,
    /// [`VmemError::SlotOccupied`] if a larger leaf already covers `va`.
    fn leaf_table<A: FrameAlloc + ?Sized, M: PhysMapper>(
        space: &mut AddressSpace<'_, M>,
        alloc: &mut A,
        va: VirtualAddress,
        nonleaf: PageAttributes,
    ) -> Result<PhysicalPage<Size4K>, VmemError>;
}

impl MapSize for Size1G {
    type Level = L3;

    fn leaf_table<A: FrameAlloc + ?Sized, M: PhysMapper>(
        space: &mut AddressSpace<'_, M>,
        alloc: &mut A,
        va: VirtualAddress,
        nonleaf: PageAttributes,
    ) -> Result<PhysicalPage<Size4K>, VmemError> {
        let root = space.root_page();
        space.ensure_child_table::<L4, _>(alloc, root, va, nonleaf)
    }
}

impl MapSize for Size2M {
    type Level = L2;

    fn leaf_table<A: FrameAlloc + ?Sized, M: PhysMapper>(
        space: &mut AddressSpace<'_, M>,
        alloc: &mut A,
        va: VirtualAddress,
        nonleaf: PageAttributes,
    ) -> Result<PhysicalPage<Size4K>, VmemError> {
        let l3 = Size1G::leaf_table(space, alloc, va, nonleaf)?;
        space.ensure_child_table::<L3, _>(alloc, l3, va, nonleaf)
    }
}

impl MapSize for Size4K {
    type Level = L1;

    fn leaf_table<A: FrameAlloc + ?Sized, M: PhysMapper>(
        space: &mut AddressSpace<'_, M>,
        alloc: &mut A,
        va: VirtualAddress,
        nonleaf: PageAttributes,
    ) -> Result<PhysicalPage<Size4K>, VmemError> {
        let l2 = Size2M::leaf_table(space, alloc, va, nonleaf)?;
        space.ensure_child_table::<L2, _>(alloc, l2, va, nonleaf)
    }
}
