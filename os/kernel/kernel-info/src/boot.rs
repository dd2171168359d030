//! # Kernel Boot Information

use crate::mmap::{MemoryMapError, MemoryMapIter};
use crate::ranges::PhysicalRange;
use kernel_memory_addresses::PhysicalAddress;

/// Information the kernel needs right after `ExitBootServices`.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// RSDP (ACPI 2.0+) physical address, or 0 if not provided.
    pub rsdp_addr: u64,

    /// Framebuffer location, passed from UEFI GOP.
    pub fb: FramebufferInfo,
}

impl KernelBootInfo {
    #[must_use]
    pub const fn rsdp(&self) -> Option<PhysicalAddress> {
        if self.rsdp_addr == 0 {
            None
        } else {
            Some(PhysicalAddress::new(self.rsdp_addr))
        }
    }
}

#[repr(C)]
#[derive(Clone, Debug)]
pub struct MemoryMapInfo {
    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes (the firmware stride).
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI).
    pub mmap_desc_version: u32,
}

impl MemoryMapInfo {
    /// Iterate the descriptors of the handed-over memory map.
    ///
    /// # Safety
    /// `mmap_ptr` must point to `mmap_len` readable bytes that stay alive and
    /// unmodified for `'a`. This holds for the loader's copy, which lives in
    /// `LOADER_DATA` memory the page allocator never hands out.
    ///
    /// # Errors
    /// [`MemoryMapError::StrideTooSmall`] if the reported stride is too small.
    #[allow(unsafe_code, clippy::cast_possible_truncation)]
    pub unsafe fn descriptors<'a>(&self) -> Result<MemoryMapIter<'a>, MemoryMapError> {
        let bytes: &'a [u8] = if self.mmap_ptr == 0 || self.mmap_len == 0 {
            &[]
        } else {
            // SAFETY: upheld by the caller.
            unsafe {
                core::slice::from_raw_parts(
                    core::ptr::with_exposed_provenance::<u8>(self.mmap_ptr as usize),
                    self.mmap_len as usize,
                )
            }
        };
        MemoryMapIter::new(bytes, self.mmap_desc_size as usize)
    }
}

/// Linear framebuffer location. Only the extent matters to the memory core,
/// which must keep it reachable through the direct map.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct FramebufferInfo {
    /// Linear framebuffer base address (CPU physical address).
    pub framebuffer_ptr: u64,

    /// Total framebuffer size in **bytes**.
    pub framebuffer_size: u64,
}

impl FramebufferInfo {
    /// No framebuffer (headless boot or `BltOnly` GOP mode).
    pub const NONE: Self = Self {
        framebuffer_ptr: 0,
        framebuffer_size: 0,
    };

    #[must_use]
    pub const fn range(&self) -> Option<PhysicalRange> {
        if self.framebuffer_ptr == 0 || self.framebuffer_size == 0 {
            None
        } else {
            Some(PhysicalRange::new(
                PhysicalAddress::new(self.framebuffer_ptr),
                self.framebuffer_size,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmap::MemoryRegion;
    use uefi::boot::MemoryType;

    #[test]
    fn framebuffer_range() {
        assert_eq!(FramebufferInfo::NONE.range(), None);
        let fb = FramebufferInfo {
            framebuffer_ptr: 0x8000_0000,
            framebuffer_size: 0x30_0000,
        };
        assert_eq!(fb.range().map(|r| r.end()), Some(PhysicalAddress::new(0x8030_0000)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn descriptors_from_handover() {
        let regions = [
            MemoryRegion::new(PhysicalAddress::new(0x1000), 8, MemoryType::CONVENTIONAL),
            MemoryRegion::new(PhysicalAddress::new(0x9000), 2, MemoryType::ACPI_RECLAIM),
        ];
        let buf = crate::mmap::tests::encode(&regions, 48);
        let info = MemoryMapInfo {
            mmap_ptr: buf.as_ptr().expose_provenance() as u64,
            mmap_len: buf.len() as u64,
            mmap_desc_size: 48,
            mmap_desc_version: 1,
        };
        let parsed: Vec<_> = unsafe { info.descriptors() }.unwrap().collect();
        assert_eq!(parsed, regions);
    }

    #[test]
    fn rsdp_zero_means_absent() {
        let mut info = KernelBootInfo {
            mmap: MemoryMapInfo {
                mmap_ptr: 0,
                mmap_len: 0,
                mmap_desc_size: 48,
                mmap_desc_version: 1,
            },
            rsdp_addr: 0,
            fb: FramebufferInfo::NONE,
        };
        assert_eq!(info.rsdp(), None);
        info.rsdp_addr = 0x7FE_E014;
        assert_eq!(info.rsdp(), Some(PhysicalAddress::new(0x7FE_E014)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn empty_handover_yields_nothing() {
        let info = MemoryMapInfo {
            mmap_ptr: 0,
            mmap_len: 0,
            mmap_desc_size: 48,
            mmap_desc_version: 1,
        };
        assert_eq!(unsafe { info.descriptors() }.unwrap().count(), 0);
    }
}
