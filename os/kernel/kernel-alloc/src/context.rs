//! # Memory Context
//!
//! The memory core's state, constructed once at boot and passed explicitly
//! to whoever needs it:
//!
//! - the DRAM page allocator, seeded from the firmware memory map,
//! - the persistent-memory allocator, seeded from platform ranges,
//! - the root of the kernel address space.

use crate::page_allocator::PageAllocator;
use crate::vmm::{BuildError, DirectMapConfig, MemorySources, build_kernel_address_space, derive_address_space};
use kernel_info::mmap::MemoryRegion;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K};
use kernel_registers::efer::Efer;
use kernel_vmem::{AddressSpace, PhysMapper, TranslationRoot, VmemError, dump};

/// Fail unless `efer` reports four-level paging as enabled and active.
///
/// # Errors
/// [`BuildError::LongModeInactive`] otherwise.
pub const fn check_long_mode(efer: Efer) -> Result<(), BuildError> {
    if efer.long_mode() {
        Ok(())
    } else {
        Err(BuildError::LongModeInactive)
    }
}

/// Current `IA32_EFER`, for [`MemoryContext::init`].
///
/// # Safety
/// Must run at CPL0.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub unsafe fn current_efer() -> Efer {
    use kernel_registers::LoadRegisterUnsafe;
    unsafe { Efer::load_unsafe() }
}

pub struct MemoryContext<M: PhysMapper> {
    mapper: M,
    dram: PageAllocator<M>,
    pmem: PageAllocator<M>,
    kernel_root: PhysicalPage<Size4K>,
}

impl<M: PhysMapper + Copy> MemoryContext<M> {
    /// Check `efer` for long mode, seed the DRAM allocator, build and
    /// activate the kernel address space, then seed the persistent-memory
    /// allocator from persistent platform ranges.
    ///
    /// # Errors
    /// - [`BuildError::LongModeInactive`] before anything is touched.
    /// - [`BuildError::PageAlloc`] for malformed (overlapping or unaligned)
    ///   firmware input.
    /// - [`BuildError::OutOfMemory`] if the page tables do not fit.
    ///
    /// # Safety
    /// - Conventional regions and persistent ranges must be unused memory
    ///   reachable through `mapper`, before and after activation.
    /// - See [`TranslationRoot::load`].
    pub unsafe fn init<R, T>(
        efer: Efer,
        mapper: M,
        sources: &MemorySources<'_, R>,
        config: &DirectMapConfig,
        root: &mut T,
    ) -> Result<Self, BuildError>
    where
        R: IntoIterator<Item = MemoryRegion> + Clone,
        T: TranslationRoot + ?Sized,
    {
        check_long_mode(efer)?;
        log::info!("4-level paging enabled");

        let mut dram = PageAllocator::new(mapper);
        unsafe { dram.seed_from_memory_map(sources.regions.clone())? };

        let kernel_root = {
            let space = build_kernel_address_space(&mut dram, &mapper, sources, config)?;
            unsafe { space.activate(root) };
            space.root_page()
        };

        let mut pmem = PageAllocator::new(mapper);
        for range in sources.platform_ranges.iter().filter(|r| r.is_persistent()) {
            let Some(start) = range.range.start.align_up::<Size4K>() else {
                continue;
            };
            let frames = range.end().as_u64().saturating_sub(start.as_u64()) / Size4K::SIZE;
            unsafe { pmem.free_pages(start, frames)? };
            log::info!("persistent memory {:?}: {} frames", range.range, frames);
        }

        Ok(Self {
            mapper,
            dram,
            pmem,
            kernel_root,
        })
    }

    #[inline]
    pub const fn kernel_root(&self) -> PhysicalPage<Size4K> {
        self.kernel_root
    }

    /// Handle on the kernel address space.
    pub fn kernel_space(&self) -> AddressSpace<'_, M> {
        // SAFETY: `kernel_root` was built through `mapper` in `init`.
        unsafe { AddressSpace::from_root(&self.mapper, self.kernel_root) }
    }

    #[inline]
    pub const fn dram(&mut self) -> &mut PageAllocator<M> {
        &mut self.dram
    }

    #[inline]
    pub const fn pmem(&mut self) -> &mut PageAllocator<M> {
        &mut self.pmem
    }

    /// New address space sharing the kernel half. Returns its root, ready to
    /// be loaded when the owning execution context is scheduled.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if DRAM is exhausted.
    pub fn new_address_space(&mut self) -> Result<PhysicalPage<Size4K>, VmemError> {
        // SAFETY: see `kernel_space`.
        let kernel = unsafe { AddressSpace::from_root(&self.mapper, self.kernel_root) };
        let space = derive_address_space(&mut self.dram, &kernel)?;
        Ok(space.root_page())
    }

    /// Run `f` on the address space rooted at `root`, with DRAM as the
    /// source of new tables.
    ///
    /// # Safety
    /// `root` must come from [`new_address_space`](Self::new_address_space)
    /// or be [`kernel_root`](Self::kernel_root).
    pub unsafe fn with_address_space<F, O>(&mut self, root: PhysicalPage<Size4K>, f: F) -> O
    where
        F: FnOnce(&mut AddressSpace<'_, M>, &mut PageAllocator<M>) -> O,
    {
        let mut space = unsafe { AddressSpace::from_root(&self.mapper, root) };
        f(&mut space, &mut self.dram)
    }

    /// Write both allocators' free runs and the kernel tree through `log`.
    pub fn log_state(&self) {
        log::info!("DRAM free runs:");
        self.dram.log_free_runs();
        log::info!("PMEM free runs:");
        self.pmem.log_free_runs();
        dump::log_tree(&self.kernel_space());
    }
}
