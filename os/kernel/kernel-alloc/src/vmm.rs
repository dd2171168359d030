//! # Kernel Address Space Construction
//!
//! The kernel runs on a single direct map: physical `0..direct_mapping_end`
//! identity-mapped with 2 MiB leaves. Every other address space shares the
//! kernel's upper half and starts with an empty lower half.
//!
//! ```text
//!   L4 slot   0 ─┬─ L3 ─┬─ L2 ── 512 × 2 MiB leaves   (0 .. 1 GiB)
//!                │      ├─ L2 ── ...                  (1 .. 2 GiB)
//!                │      └─ ...
//!   L4 slot   1 ─┴─ ...                               (512 GiB ..)
//!   L4 slot 256..511     kernel half, shared verbatim with derived spaces
//! ```
//!
//! 1 GiB leaves are never used; only 2 MiB support is assumed of the CPU.

use kernel_info::memory::{KERNEL_HALF_FIRST_SLOT, LOW_MMIO_END};
use kernel_info::mmap::MemoryRegion;
use kernel_info::ranges::{PhysicalRange, PlatformRange};
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PageSize, PhysicalAddress, Size2M, TableIndex, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PageAttributes, PhysMapper, VmemError};

/// Tunables of the direct map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirectMapConfig {
    /// Map at least up to here, even if no input reaches it.
    pub minimum_end: PhysicalAddress,
    /// Attributes of every 2 MiB leaf.
    pub leaf_attributes: PageAttributes,
}

impl Default for DirectMapConfig {
    fn default() -> Self {
        Self {
            minimum_end: PhysicalAddress::zero(),
            leaf_attributes: PageAttributes::user_rw(),
        }
    }
}

impl DirectMapConfig {
    /// Cover the whole 32-bit space so the local and I/O APIC windows are
    /// reachable even though no descriptor reports them.
    #[must_use]
    pub fn covering_low_mmio() -> Self {
        Self {
            minimum_end: PhysicalAddress::new(LOW_MMIO_END),
            ..Self::default()
        }
    }
}

/// Everything the direct map must cover.
#[derive(Debug, Clone)]
pub struct MemorySources<'a, R> {
    /// Firmware memory map.
    pub regions: R,
    /// Active framebuffer, if any. It usually does not appear in the
    /// firmware map.
    pub framebuffer: Option<PhysicalRange>,
    /// Ranges reported by platform tables (e.g. NFIT), which may also be
    /// missing from the firmware map.
    pub platform_ranges: &'a [PlatformRange],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("out of memory while allocating an L{level} table")]
    OutOfMemory { level: u8 },
    #[error(transparent)]
    Vmem(VmemError),
    #[error(transparent)]
    PageAlloc(#[from] crate::page_allocator::PageAllocError),
    #[error("IA32_EFER reports long mode as inactive")]
    LongModeInactive,
}

impl From<VmemError> for BuildError {
    fn from(value: VmemError) -> Self {
        match value {
            VmemError::OutOfMemory { level } => Self::OutOfMemory { level },
            other => Self::Vmem(other),
        }
    }
}

/// End of the direct map: the maximum over every descriptor end, the
/// framebuffer end, every platform range end and `config.minimum_end`.
///
/// Also reports the loader-code descriptor, the only one that is expected to
/// appear exactly once.
pub fn direct_mapping_end<R>(sources: &MemorySources<'_, R>, config: &DirectMapConfig) -> PhysicalAddress
where
    R: IntoIterator<Item = MemoryRegion> + Clone,
{
    let mut end = config.minimum_end;
    let mut loader_code = 0usize;
    for region in sources.regions.clone() {
        end = end.max(region.end());
        if region.is_loader_code() {
            loader_code += 1;
            if loader_code == 1 {
                log::info!("kernel loaded at {region:?}");
            } else {
                log::warn!("additional loader code region {region:?}");
            }
        }
    }
    if let Some(fb) = sources.framebuffer {
        end = end.max(fb.end());
    }
    for range in sources.platform_ranges {
        end = end.max(range.end());
    }
    end
}

/// Build the kernel address space: an identity direct map of physical
/// `0..direct_mapping_end` in 2 MiB leaves.
///
/// The result is not activated; see [`AddressSpace::activate`].
///
/// # Errors
/// [`BuildError::OutOfMemory`] if a table frame cannot be allocated. No
/// partially built address space is returned.
pub fn build_kernel_address_space<'m, A, M, R>(
    alloc: &mut A,
    mapper: &'m M,
    sources: &MemorySources<'_, R>,
    config: &DirectMapConfig,
) -> Result<AddressSpace<'m, M>, BuildError>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper,
    R: IntoIterator<Item = MemoryRegion> + Clone,
{
    let end = direct_mapping_end(sources, config).as_u64();
    log::info!("direct mapping end: {:#x}", end);

    let mut space = AddressSpace::create(alloc, mapper)?;
    let links = PageAttributes::user_rw();

    let mut pa = 0u64;
    while pa < end {
        space.map_one::<_, Size2M>(
            alloc,
            VirtualAddress::new(pa),
            PhysicalAddress::new(pa),
            links,
            config.leaf_attributes,
        )?;
        pa += Size2M::SIZE;
    }

    log::info!(
        "kernel address space at {}: {} MiB direct-mapped",
        space.root_page().base(),
        pa >> 20
    );
    Ok(space)
}

/// A fresh address space sharing the kernel half of `kernel`.
///
/// L4 slots 256..511 are copied verbatim, so the kernel's L3 tables are
/// shared. Slots 0..255 start empty.
///
/// # Errors
/// [`VmemError::OutOfMemory`] if no frame is left for the new L4.
pub fn derive_address_space<'m, A, M>(
    alloc: &mut A,
    kernel: &AddressSpace<'m, M>,
) -> Result<AddressSpace<'m, M>, VmemError>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper,
{
    let mut space = AddressSpace::create(alloc, kernel.mapper())?;
    let source = kernel.pml4();
    let target = space.pml4_mut();
    for slot in KERNEL_HALF_FIRST_SLOT..ENTRIES_PER_TABLE {
        #[allow(clippy::cast_possible_truncation)]
        let index = TableIndex::new(slot as u16);
        target.set(index, source.get(index));
    }
    log::debug!(
        "derived address space {} from kernel {}",
        space.root_page().base(),
        kernel.root_page().base()
    );
    Ok(space)
}
