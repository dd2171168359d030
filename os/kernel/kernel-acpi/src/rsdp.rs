//! # Root System Description Pointer
//!
//! ```text
//! offset  size  field
//!      0     8  "RSD PTR "
//!      8     1  checksum over bytes 0..20
//!     15     1  revision (0 = ACPI 1.0, 2+ = XSDP)
//!     16     4  RSDT address
//!     20     4  length (XSDP)
//!     24     8  XSDT address (XSDP)
//!     32     1  extended checksum over `length` bytes
//! ```

use crate::{AcpiError, PhysMapRo, read, read_u32, read_u64, verify_checksum};
use kernel_memory_addresses::PhysicalAddress;

const SIGNATURE: [u8; 8] = *b"RSD PTR ";
const V1_LEN: usize = 20;
const V2_LEN: usize = 36;

/// Root table addresses from a validated RSDP.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcpiRoots {
    pub revision: u8,
    pub rsdt_addr: Option<PhysicalAddress>,
    pub xsdt_addr: Option<PhysicalAddress>,
}

impl AcpiRoots {
    /// Validate the RSDP at `rsdp_addr` and extract the root table pointers.
    ///
    /// # Errors
    /// - [`AcpiError::NullPointer`] for a zero address.
    /// - [`AcpiError::BadSignature`] / [`AcpiError::BadChecksum`] for corrupt
    ///   structures.
    ///
    /// # Safety
    /// `map` must be able to map the RSDP (and, for ACPI 2.0+, its full
    /// reported length).
    pub unsafe fn parse<M: PhysMapRo + ?Sized>(map: &M, rsdp_addr: PhysicalAddress) -> Result<Self, AcpiError> {
        if rsdp_addr.as_u64() == 0 {
            return Err(AcpiError::NullPointer);
        }

        let v1 = unsafe { map.map_ro(rsdp_addr, V1_LEN) };
        let signature = read::<8>(v1, 0)?;
        if signature != SIGNATURE {
            return Err(AcpiError::BadSignature(signature));
        }
        verify_checksum(v1)?;

        let [revision] = read::<1>(v1, 15)?;
        let rsdt_addr = non_null(u64::from(read_u32(v1, 16)?));
        if revision < 2 {
            return Ok(Self {
                revision,
                rsdt_addr,
                xsdt_addr: None,
            });
        }

        let header = unsafe { map.map_ro(rsdp_addr, V2_LEN) };
        let length = read_u32(header, 20)? as usize;
        if length < V2_LEN {
            return Err(AcpiError::Truncated(length));
        }
        let full = unsafe { map.map_ro(rsdp_addr, length) };
        verify_checksum(full)?;

        Ok(Self {
            revision,
            rsdt_addr,
            xsdt_addr: non_null(read_u64(full, 24)?),
        })
    }
}

const fn non_null(addr: u64) -> Option<PhysicalAddress> {
    if addr == 0 {
        None
    } else {
        Some(PhysicalAddress::new(addr))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::{FakePhys, seal};

    pub fn rsdp_v2(rsdt: u32, xsdt: u64) -> Vec<u8> {
        let mut r = vec![0u8; V2_LEN];
        r[0..8].copy_from_slice(&SIGNATURE);
        r[9..15].copy_from_slice(b"OSTEST");
        r[15] = 2;
        r[16..20].copy_from_slice(&rsdt.to_le_bytes());
        r[20..24].copy_from_slice(&(V2_LEN as u32).to_le_bytes());
        r[24..32].copy_from_slice(&xsdt.to_le_bytes());
        seal(&mut r[..V1_LEN], 8);
        seal(&mut r, 32);
        r
    }

    #[test]
    fn parses_xsdp() {
        let mut mem = FakePhys::new(0x1000, 0x100);
        mem.put(0x1000, &rsdp_v2(0x2000, 0x3000));
        let roots = unsafe { AcpiRoots::parse(&mem, PhysicalAddress::new(0x1000)) }.unwrap();
        assert_eq!(roots.revision, 2);
        assert_eq!(roots.rsdt_addr, Some(PhysicalAddress::new(0x2000)));
        assert_eq!(roots.xsdt_addr, Some(PhysicalAddress::new(0x3000)));
    }

    #[test]
    fn acpi_1_has_no_xsdt() {
        let mut r = rsdp_v2(0x2000, 0x3000);
        r[15] = 0;
        seal(&mut r[..V1_LEN], 8);
        let mut mem = FakePhys::new(0, 0x100);
        mem.put(0x40, &r[..V1_LEN]);
        let roots = unsafe { AcpiRoots::parse(&mem, PhysicalAddress::new(0x40)) }.unwrap();
        assert_eq!(roots.xsdt_addr, None);
        assert_eq!(roots.rsdt_addr, Some(PhysicalAddress::new(0x2000)));
    }

    #[test]
    fn rejects_corruption() {
        let mem = FakePhys::new(0, 0x100);
        assert_eq!(
            unsafe { AcpiRoots::parse(&mem, PhysicalAddress::zero()) },
            Err(AcpiError::NullPointer)
        );
        assert!(matches!(
            unsafe { AcpiRoots::parse(&mem, PhysicalAddress::new(0x10)) },
            Err(AcpiError::BadSignature(_))
        ));

        let mut mem = FakePhys::new(0, 0x100);
        let mut r = rsdp_v2(0x2000, 0x3000);
        r[30] ^= 0xFF;
        mem.put(0x10, &r);
        assert_eq!(
            unsafe { AcpiRoots::parse(&mem, PhysicalAddress::new(0x10)) },
            Err(AcpiError::BadChecksum)
        );
    }
}
