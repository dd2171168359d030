//! # Kernel Memory Core
//!
//! Physical page allocation and construction of the kernel address space.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              MemoryContext                   │
//! │    • owns DRAM and PMEM allocators           │
//! │    • remembers the kernel root               │
//! └───────────┬─────────────────────┬────────────┘
//!             │                     │
//! ┌───────────▼────────────┐ ┌──────▼─────────────────────┐
//! │  PageAllocator         │ │  vmm                        │
//! │  • first-fit free runs │ │  • 2 MiB identity direct map│
//! │  • nodes in free pages │ │  • shared kernel half       │
//! └───────────┬────────────┘ └──────┬─────────────────────┘
//!             │                     │
//! ┌───────────▼─────────────────────▼────────────┐
//! │        PhysMapper (IdentityPhysMapper)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Boot sequence
//!
//! 1. [`MemoryContext::init`] checks `IA32_EFER` for long mode, seeds DRAM
//!    from the firmware memory map, builds the direct map, activates it and
//!    seeds persistent memory.
//! 2. [`MemoryContext::new_address_space`] hands out roots sharing the
//!    kernel half.
//!
//! Nothing here is global; the context is passed to whoever needs it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod context;
pub mod page_allocator;
pub mod phys_mapper;
pub mod vmm;

pub use context::{MemoryContext, check_long_mode};
pub use page_allocator::{FreeRun, PageAllocError, PageAllocator};
pub use phys_mapper::IdentityPhysMapper;
pub use vmm::{BuildError, DirectMapConfig, MemorySources};

#[cfg(test)]
pub(crate) mod test_utils {
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
