//! # Identity [`PhysMapper`]
//!
//! While the loader's identity map is live, and afterwards through the
//! kernel's own direct map, every physical address below the direct-map end
//! is also a valid virtual address. Converting one into the other is then a
//! plain cast.
//!
//! ```text
//!  VA 0x0000_0000_0000_0000 ──► PA 0x0
//!        ...   (2 MiB leaves)   ...
//!  VA direct_mapping_end    ──► PA direct_mapping_end
//! ```

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for an identity-mapped lower half.
///
/// Only valid while the active translation root identity-maps every address
/// passed to it.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

// SAFETY: the direct map built by this crate covers every descriptor,
// framebuffer and platform range, which bounds the addresses the memory core
// asks about.
unsafe impl PhysMapper for IdentityPhysMapper {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        core::ptr::with_exposed_provenance_mut(pa.as_u64() as usize)
    }
}
