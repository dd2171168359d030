//! # Address Space (x86-64, PML4-rooted)
//!
//! A handle on one translation tree: the L4 frame plus the [`PhysMapper`]
//! used to reach every table below it.
//!
//! - [`AddressSpace::create`] allocates and clears a fresh L4.
//! - [`AddressSpace::map_one`] installs one leaf (4 KiB / 2 MiB / 1 GiB),
//!   allocating missing intermediate tables on the way down.
//! - [`AddressSpace::translate`] resolves a VA, including large leaves.
//! - [`AddressSpace::activate`] hands the root to a [`TranslationRoot`].
//!
//! Non-leaf entries get caller-provided attributes (typically present,
//! writable, user); the leaf decides the effective permissions. Nothing here
//! sets `global` or `no_execute` on its own.
//!
//! ## Safety
//!
//! Mutating an active tree requires TLB maintenance (`invlpg` or a CR3
//! reload), which is left to the caller.

mod map_size;

pub use crate::address_space::map_size::MapSize;
use crate::page_table::{EntryTarget, L4, ParentLevel, TableEntry, TableLevel};
use crate::{FrameAlloc, PageAttributes, PageTable, PhysMapper, VmemError};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// The only writer of the hardware translation root.
pub trait TranslationRoot {
    /// Make `root` the active L4 table.
    ///
    /// # Safety
    /// The tree under `root` must map the currently executing code, its stack
    /// and every structure the caller touches afterwards.
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>);
}

/// [`TranslationRoot`] backed by the `CR3` register.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct Cr3Root;

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl TranslationRoot for Cr3Root {
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>) {
        use kernel_registers::StoreRegisterUnsafe;
        use kernel_registers::cr3::Cr3;
        unsafe { Cr3::with_root(root).store_unsafe() }
    }
}

/// Allocate a frame for a level-`L` table and clear it.
///
/// # Errors
/// [`VmemError::OutOfMemory`] if `alloc` has no frame left.
pub fn allocate_table<L: TableLevel, A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
    alloc: &mut A,
    mapper: &M,
) -> Result<PhysicalPage<Size4K>, VmemError> {
    let frame = alloc
        .alloc_4k()
        .ok_or(VmemError::OutOfMemory { level: L::LEVEL })?;
    // SAFETY: the frame was just handed out, so nothing else refers to it.
    let table = unsafe { mapper.phys_to_mut::<PageTable<L>>(frame.base()) };
    table.clear();
    log::debug!("allocated {} table at {}", L::NAME, frame.base());
    Ok(frame)
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// A new, empty address space.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if no frame is left for the L4.
    pub fn create<A: FrameAlloc + ?Sized>(alloc: &mut A, mapper: &'m M) -> Result<Self, VmemError> {
        let root = allocate_table::<L4, _, _>(alloc, mapper)?;
        Ok(Self { root, mapper })
    }

    /// Wrap an existing tree.
    ///
    /// # Safety
    /// `root` must hold a valid L4 table reachable through `mapper`, and so
    /// must every table it links.
    #[inline]
    pub const unsafe fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Frame of the L4 table.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[inline]
    #[must_use]
    pub fn pml4(&self) -> &PageTable<L4> {
        // SAFETY: `root` holds an L4 table by construction.
        unsafe { self.table::<L4>(self.root) }
    }

    #[inline]
    pub fn pml4_mut(&mut self) -> &mut PageTable<L4> {
        // SAFETY: `root` holds an L4 table by construction.
        unsafe { self.table_mut::<L4>(self.root) }
    }

    /// Borrow the level-`L` table in `page`.
    ///
    /// # Safety
    /// `page` must hold a level-`L` table of this tree.
    #[inline]
    pub unsafe fn table_mut<L: TableLevel>(&mut self, page: PhysicalPage<Size4K>) -> &mut PageTable<L> {
        unsafe { self.mapper.phys_to_mut::<PageTable<L>>(page.base()) }
    }

    #[inline]
    unsafe fn table<L: TableLevel>(&self, page: PhysicalPage<Size4K>) -> &PageTable<L> {
        unsafe { &*self.mapper.phys_to_ptr::<PageTable<L>>(page.base()) }
    }

    /// Entry that translates `va` in the level-`L` table at `page`.
    #[inline]
    fn step<L: TableLevel>(&self, page: PhysicalPage<Size4K>, va: VirtualAddress) -> Option<EntryTarget> {
        // SAFETY: only called with frames reached by walking down from `root`.
        unsafe { self.table::<L>(page) }.get(PageTable::<L>::index_of(va)).target()
    }

    /// Translate `va` if mapped. Large leaves contribute the in-page offset
    /// of their own size.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        use crate::page_table::{L1, L2, L3};

        let leaf = |base: PhysicalAddress, size: u64| Some(base + (va.as_u64() & (size - 1)));

        let EntryTarget::Table(l3) = self.step::<L4>(self.root, va)? else {
            return None;
        };
        let l2 = match self.step::<L3>(l3, va)? {
            EntryTarget::Page { base, size } => return leaf(base, size),
            EntryTarget::Table(l2) => l2,
        };
        let l1 = match self.step::<L2>(l2, va)? {
            EntryTarget::Page { base, size } => return leaf(base, size),
            EntryTarget::Table(l1) => l1,
        };
        match self.step::<L1>(l1, va)? {
            EntryTarget::Page { base, size } => leaf(base, size),
            EntryTarget::Table(_) => None,
        }
    }

    /// Map one `S`-sized page `va → pa`.
    ///
    /// Missing intermediate tables are allocated, cleared and linked with
    /// `nonleaf`. The leaf is written with `leaf`.
    ///
    /// # Errors
    /// - [`VmemError::MisalignedMapping`] if `va` or `pa` is not `S`-aligned.
    /// - [`VmemError::OutOfMemory`] if an intermediate table cannot be allocated.
    /// - [`VmemError::SlotOccupied`] if the leaf slot is taken, or a larger
    ///   leaf sits where a table is needed.
    pub fn map_one<A: FrameAlloc + ?Sized, S: MapSize>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        nonleaf: PageAttributes,
        leaf: PageAttributes,
    ) -> Result<(), VmemError> {
        let page = pa.aligned_page::<S>().ok_or(VmemError::MisalignedMapping {
            address: pa.as_u64(),
            alignment: S::SIZE,
        })?;
        if !va.is_aligned::<S>() {
            return Err(VmemError::MisalignedMapping {
                address: va.as_u64(),
                alignment: S::SIZE,
            });
        }

        let table = S::leaf_table(self, alloc, va, nonleaf)?;
        // SAFETY: `leaf_table` returns the frame of an `S::Level` table.
        let table = unsafe { self.table_mut::<S::Level>(table) };
        table.install_leaf(va, page, leaf)
    }

    /// Return the `P::Child` table linked for `va` in `parent`, creating it
    /// if the slot is empty.
    pub(crate) fn ensure_child_table<P: ParentLevel, A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
        parent: PhysicalPage<Size4K>,
        va: VirtualAddress,
        attrs: PageAttributes,
    ) -> Result<PhysicalPage<Size4K>, VmemError> {
        let index = PageTable::<P>::index_of(va);
        // SAFETY: `parent` is the root or was reached by walking down from it.
        let entry = unsafe { self.table::<P>(parent) }.get(index);
        match entry.target() {
            Some(EntryTarget::Table(child)) => Ok(child),
            Some(EntryTarget::Page { .. }) => Err(VmemError::SlotOccupied {
                level: P::LEVEL,
                index: index.as_u16(),
            }),
            None => {
                let child = allocate_table::<P::Child, _, _>(alloc, self.mapper)?;
                // SAFETY: as above.
                unsafe { self.table_mut::<P>(parent) }.install_child_table(va, child, attrs)?;
                Ok(child)
            }
        }
    }

    /// Load this tree into `root`.
    ///
    /// # Safety
    /// See [`TranslationRoot::load`]. CPU paging state (CR0/CR4/EFER) must be
    /// consistent with the tree.
    pub unsafe fn activate<R: TranslationRoot + ?Sized>(&self, root: &mut R) {
        log::info!("activating address space rooted at {}", self.root.base());
        unsafe { root.load(self.root) };
    }
}

impl<M: PhysMapper> core::fmt::Debug for AddressSpace<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace").field("root", &self.root).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BumpFrames, RecordingRoot, SimulatedMemory};
    use kernel_memory_addresses::{Size1G, Size2M};

    fn setup() -> (SimulatedMemory, BumpFrames) {
        let mem = SimulatedMemory::new(64);
        let frames = BumpFrames::new(mem.base(), 64);
        (mem, frames)
    }

    #[test]
    fn create_is_empty() {
        let (mem, mut frames) = setup();
        let space = AddressSpace::create(&mut frames, &mem).unwrap();
        assert_eq!(space.pml4().present_entries().count(), 0);
        assert_eq!(space.translate(VirtualAddress::new(0)), None);
    }

    #[test]
    fn map_and_translate_each_size() {
        let (mem, mut frames) = setup();
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();

        space
            .map_one::<_, Size4K>(&mut frames, VirtualAddress::new(0x7000), PhysicalAddress::new(0x9_9000), rw, rw)
            .unwrap();
        space
            .map_one::<_, Size2M>(
                &mut frames,
                VirtualAddress::new(0x4000_0000),
                PhysicalAddress::new(0x1_0000_0000),
                rw,
                rw,
            )
            .unwrap();
        space
            .map_one::<_, Size1G>(
                &mut frames,
                VirtualAddress::new(0xFFFF_8000_0000_0000),
                PhysicalAddress::new(0x8000_0000),
                rw,
                PageAttributes::kernel_rw(),
            )
            .unwrap();

        assert_eq!(space.translate(VirtualAddress::new(0x7123)), Some(PhysicalAddress::new(0x9_9123)));
        assert_eq!(
            space.translate(VirtualAddress::new(0x4012_3456)),
            Some(PhysicalAddress::new(0x1_0012_3456))
        );
        assert_eq!(
            space.translate(VirtualAddress::new(0xFFFF_8000_3FFF_FFFF)),
            Some(PhysicalAddress::new(0xBFFF_FFFF))
        );
        assert_eq!(space.translate(VirtualAddress::new(0x8000)), None);
        assert_eq!(space.pml4().present_entries().count(), 2);
    }

    #[test]
    fn misaligned_mapping_is_rejected() {
        let (mem, mut frames) = setup();
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();
        let err = space.map_one::<_, Size2M>(
            &mut frames,
            VirtualAddress::new(0x20_0000),
            PhysicalAddress::new(0x1000),
            rw,
            rw,
        );
        assert_eq!(
            err,
            Err(VmemError::MisalignedMapping {
                address: 0x1000,
                alignment: 0x20_0000
            })
        );
        let err = space.map_one::<_, Size4K>(
            &mut frames,
            VirtualAddress::new(0x1800),
            PhysicalAddress::new(0x1000),
            rw,
            rw,
        );
        assert!(matches!(err, Err(VmemError::MisalignedMapping { address: 0x1800, .. })));
    }

    #[test]
    fn small_page_under_large_leaf_is_refused() {
        let (mem, mut frames) = setup();
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();
        space
            .map_one::<_, Size2M>(&mut frames, VirtualAddress::new(0), PhysicalAddress::new(0), rw, rw)
            .unwrap();
        let err = space.map_one::<_, Size4K>(
            &mut frames,
            VirtualAddress::new(0x1000),
            PhysicalAddress::new(0x1000),
            rw,
            rw,
        );
        assert_eq!(err, Err(VmemError::SlotOccupied { level: 2, index: 0 }));
        assert_eq!(space.translate(VirtualAddress::new(0x1000)), Some(PhysicalAddress::new(0x1000)));
    }

    #[test]
    fn out_of_frames_reports_level() {
        let mem = SimulatedMemory::new(2);
        let mut frames = BumpFrames::new(mem.base(), 2);
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();
        let err = space.map_one::<_, Size4K>(&mut frames, VirtualAddress::new(0), PhysicalAddress::new(0), rw, rw);
        assert_eq!(err, Err(VmemError::OutOfMemory { level: 2 }));
    }

    #[test]
    fn activate_loads_root() {
        let (mem, mut frames) = setup();
        let space = AddressSpace::create(&mut frames, &mem).unwrap();
        let mut root = RecordingRoot::default();
        unsafe { space.activate(&mut root) };
        assert_eq!(root.loaded, vec![space.root_page()]);
    }
}
