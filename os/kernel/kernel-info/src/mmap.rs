//! # Firmware Memory Map
//!
//! The loader hands over the raw `EFI_MEMORY_DESCRIPTOR` array as copied
//! after `ExitBootServices`. Descriptors are laid out with the
//! firmware-reported stride (`desc_size`), which may be larger than
//! `size_of::<MemoryDescriptor>()`; never index the buffer as a Rust slice
//! of descriptors.

use crate::ranges::PhysicalRange;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};
use uefi::boot::MemoryType;
use uefi::mem::memory_map::MemoryDescriptor;

/// UEFI pages are always 4 KiB, independent of the CPU page size in use.
pub const UEFI_PAGE_SIZE: u64 = Size4K::SIZE;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("descriptor stride of {desc_size} bytes is smaller than a memory descriptor")]
    StrideTooSmall { desc_size: usize },
}

/// One firmware memory descriptor, reduced to what the memory core consumes.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: PhysicalAddress,
    pub page_count: u64,
    pub ty: MemoryType,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(start: PhysicalAddress, page_count: u64, ty: MemoryType) -> Self {
        Self {
            start,
            page_count,
            ty,
        }
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::new(self.start, self.page_count.saturating_mul(UEFI_PAGE_SIZE))
    }

    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.range().end()
    }

    /// Free RAM the page allocator may take ownership of.
    #[must_use]
    pub fn is_conventional(&self) -> bool {
        self.ty == MemoryType::CONVENTIONAL
    }

    /// The region the loader placed the kernel image in.
    #[must_use]
    pub fn is_loader_code(&self) -> bool {
        self.ty == MemoryType::LOADER_CODE
    }
}

impl From<&MemoryDescriptor> for MemoryRegion {
    fn from(desc: &MemoryDescriptor) -> Self {
        Self::new(PhysicalAddress::new(desc.phys_start), desc.page_count, desc.ty)
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} ({} pages)",
            self.ty,
            self.range(),
            self.page_count
        )
    }
}

/// Iterator over a raw descriptor buffer.
#[derive(Clone)]
pub struct MemoryMapIter<'a> {
    chunks: core::slice::ChunksExact<'a, u8>,
}

impl<'a> MemoryMapIter<'a> {
    /// Iterate the descriptors in `buffer`, each `desc_size` bytes apart.
    /// Trailing bytes shorter than one stride are ignored.
    ///
    /// # Errors
    /// [`MemoryMapError::StrideTooSmall`] if `desc_size` cannot hold a descriptor.
    pub fn new(buffer: &'a [u8], desc_size: usize) -> Result<Self, MemoryMapError> {
        if desc_size < size_of::<MemoryDescriptor>() {
            return Err(MemoryMapError::StrideTooSmall { desc_size });
        }
        Ok(Self {
            chunks: buffer.chunks_exact(desc_size),
        })
    }
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryRegion;

    #[allow(unsafe_code)]
    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        // SAFETY: the chunk is at least one descriptor long (checked in `new`),
        // every bit pattern is a valid descriptor, and `read_unaligned` makes
        // no alignment assumption about the loader's buffer.
        let desc = unsafe { chunk.as_ptr().cast::<MemoryDescriptor>().read_unaligned() };
        Some(MemoryRegion::from(&desc))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for MemoryMapIter<'_> {}
