//! # Typed `x86_64` Control Registers
//!
//! Only the registers the memory core touches are modelled:
//!
//! - [`cr3::Cr3`]: translation root (physical base of the active L4 table)
//! - [`efer::Efer`]: long-mode status, checked before paging structures are built
//!
//! Raw `mov`/`rdmsr` access lives behind the `asm` feature so the bit layouts
//! stay testable on any host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "efer")]
pub mod efer;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// The access is privileged and requires kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For CR3 this means the new root must map the currently executing code
    /// and stack.
    unsafe fn store_unsafe(self);
}
