//! # Physical and Virtual Address Types
//!
//! Zero-cost, strongly typed wrappers for the addresses the page allocator and
//! the paging code pass around, so that a physical frame can never be handed
//! to something expecting a virtual address (or the other way round).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | Raw physical byte address (RAM or MMIO). |
//! | [`PhysicalPage<S>`] | Page-aligned physical base of a page of size `S`. |
//! | [`VirtualAddress`] | Raw virtual byte address. |
//! | [`TableIndex`] / [`TableIndices`] | 9-bit slot indices a virtual address selects at each level. |
//!
//! ## Page Sizes
//!
//! Three x86-64 page sizes are available as marker types implementing the
//! sealed [`PageSize`] trait:
//!
//! - [`Size4K`]: 4 KiB frames, the allocation granule
//! - [`Size2M`]: 2 MiB pages, used for the kernel direct mapping
//! - [`Size1G`]: 1 GiB pages
//!
//! ## Virtual Address Layout
//!
//! ```text
//! | 63 .. 48 | 47 .. 39 | 38 .. 30 | 29 .. 21 | 20 .. 12 | 11 .. 0 |
//! | sign-ext |    L4    |    L3    |    L2    |    L1    | offset  |
//! ```
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
//! let ix = va.indices();
//! assert_eq!(ix.l4.as_usize(), 511);
//! assert_eq!(ix.offset, 0x234);
//! assert_eq!(ix.join(), va);
//!
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.join(pa.offset::<Size4K>()), pa);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::{
    ENTRIES_PER_TABLE, L1_SHIFT, L2_SHIFT, L3_SHIFT, L4_SHIFT, TableIndex, TableIndices,
    VirtualAddress,
};
