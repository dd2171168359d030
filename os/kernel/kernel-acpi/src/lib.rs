//! # ACPI Platform Range Discovery
//!
//! Just enough ACPI to learn about physical memory the UEFI memory map does
//! not describe, most importantly NVDIMM ranges reported by the NFIT.
//!
//! ```text
//! KernelBootInfo::rsdp_addr
//!     ↓
//! RSDP/XSDP   (rsdp::AcpiRoots::parse)
//!     ↓
//! XSDT / RSDT (sdt::find_table)
//!     ↓
//! NFIT        (nfit::spa_ranges)  ──► PlatformRange { range, kind }
//! ```
//!
//! Firmware tables are untrusted input: every structure is bounds- and
//! checksum-verified, and malformed data is reported as an [`AcpiError`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use kernel_memory_addresses::PhysicalAddress;

pub mod nfit;
pub mod rsdp;
pub mod sdt;

pub use rsdp::AcpiRoots;
pub use sdt::find_table;

/// Map a physical region and return a *read-only* byte slice for its contents.
/// You provide the implementation (identity map, kmap, etc.).
pub trait PhysMapRo {
    /// # Safety
    /// The implementor must ensure the returned slice is valid for `len` bytes.
    unsafe fn map_ro<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a [u8];
}

impl<T: PhysMapRo + ?Sized> PhysMapRo for &T {
    unsafe fn map_ro<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a [u8] {
        unsafe { (**self).map_ro(pa, len) }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcpiError {
    #[error("null table pointer")]
    NullPointer,
    #[error("unexpected signature {0:?}")]
    BadSignature([u8; 8]),
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("structure truncated at offset {0}")]
    Truncated(usize),
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

fn verify_checksum(bytes: &[u8]) -> Result<(), AcpiError> {
    if sum(bytes) == 0 {
        Ok(())
    } else {
        Err(AcpiError::BadChecksum)
    }
}

fn read<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], AcpiError> {
    bytes
        .get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or(AcpiError::Truncated(offset))
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, AcpiError> {
    read(bytes, offset).map(u16::from_le_bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, AcpiError> {
    read(bytes, offset).map(u32::from_le_bytes)
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, AcpiError> {
    read(bytes, offset).map(u64::from_le_bytes)
}

/// Pad a 4-byte table signature for [`AcpiError::BadSignature`].
const fn signature8(sig: [u8; 4]) -> [u8; 8] {
    [sig[0], sig[1], sig[2], sig[3], b' ', b' ', b' ', b' ']
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_a_wrapping_byte_sum() {
        assert_eq!(sum(&[0xFF, 0x02]), 0x01);
        assert!(verify_checksum(&[0x80, 0x80]).is_ok());
        assert_eq!(verify_checksum(&[1]), Err(AcpiError::BadChecksum));
    }

    #[test]
    fn reads_are_bounds_checked() {
        let bytes = [1, 0, 0, 0, 2];
        assert_eq!(read_u32(&bytes, 0), Ok(1));
        assert_eq!(read_u16(&bytes, 4), Err(AcpiError::Truncated(4)));
        assert_eq!(read_u64(&bytes, 9), Err(AcpiError::Truncated(9)));
    }
}
