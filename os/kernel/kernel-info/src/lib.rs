//! # Kernel Boot Interface and Memory Layout
//!
//! Data handed from the UEFI loader to the kernel, and the layout constants
//! the memory core is built around.
//!
//! ## Modules
//!
//! * [`boot`]: the `#[repr(C)]` handoff structure ([`KernelBootInfo`](boot::KernelBootInfo))
//!   with the raw memory map, RSDP pointer and framebuffer extent.
//! * [`mmap`]: stride-aware iteration over the raw `EFI_MEMORY_DESCRIPTOR` array.
//! * [`ranges`]: physical ranges, including platform-reported ones such as
//!   persistent memory that is absent from the firmware memory map.
//! * [`memory`]: the kernel/user half split and fixed MMIO locations.
//!
//! ## Address Space Split
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌──────────────────────────────┐  L4 slot 0
//!                       │  Private half                │
//!                       │  (per execution context)     │
//! 0x0000_7FFF_FFFF_FFFF ├──────────────────────────────┤  L4 slot 255
//!                       │  non-canonical hole          │
//! 0xFFFF_8000_0000_0000 ├──────────────────────────────┤  L4 slot 256
//!                       │  Kernel half                 │
//!                       │  (shared by all spaces)      │
//! 0xFFFF_FFFF_FFFF_FFFF └──────────────────────────────┘  L4 slot 511
//! ```
//!
//! Physical memory is identity mapped with 2 MiB pages from address 0 up to
//! the highest byte any descriptor, the framebuffer, or a platform range
//! reaches.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod mmap;
pub mod ranges;
