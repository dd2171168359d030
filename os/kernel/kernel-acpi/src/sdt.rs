//! # System Description Tables
//!
//! Every table starts with the same 36-byte header; the XSDT body is an
//! array of 64-bit table addresses, the RSDT body an array of 32-bit ones.

use crate::rsdp::AcpiRoots;
use crate::{AcpiError, PhysMapRo, read, read_u32, read_u64, signature8, verify_checksum};
use kernel_memory_addresses::PhysicalAddress;

pub const HEADER_LEN: usize = 36;

/// Map the table at `pa`, check its signature and checksum, and return its
/// bytes (header included).
///
/// # Errors
/// [`AcpiError`] for null, mislabelled, short or corrupt tables.
///
/// # Safety
/// `map` must be able to map the header and the table's reported length.
pub unsafe fn load_table<'a, M: PhysMapRo + ?Sized>(
    map: &M,
    pa: PhysicalAddress,
    signature: [u8; 4],
) -> Result<&'a [u8], AcpiError> {
    if pa.as_u64() == 0 {
        return Err(AcpiError::NullPointer);
    }
    let header = unsafe { map.map_ro(pa, HEADER_LEN) };
    let found = read::<4>(header, 0)?;
    if found != signature {
        return Err(AcpiError::BadSignature(signature8(found)));
    }
    let length = read_u32(header, 4)? as usize;
    if length < HEADER_LEN {
        return Err(AcpiError::Truncated(length));
    }
    let table = unsafe { map.map_ro(pa, length) };
    verify_checksum(table)?;
    Ok(table)
}

/// Look up the first table with `signature` through the XSDT, falling back
/// to the RSDT on ACPI 1.0 systems.
///
/// Returns `Ok(None)` if no entry carries that signature.
///
/// # Errors
/// [`AcpiError`] if the root table itself is unusable. Individual entries
/// with a bad checksum are skipped with a warning.
///
/// # Safety
/// See [`load_table`].
pub unsafe fn find_table<M: PhysMapRo + ?Sized>(
    map: &M,
    roots: &AcpiRoots,
    signature: [u8; 4],
) -> Result<Option<PhysicalAddress>, AcpiError> {
    let (root, entry_size) = match (roots.xsdt_addr, roots.rsdt_addr) {
        (Some(xsdt), _) => (unsafe { load_table(map, xsdt, *b"XSDT")? }, 8),
        (None, Some(rsdt)) => (unsafe { load_table(map, rsdt, *b"RSDT")? }, 4),
        (None, None) => return Err(AcpiError::NullPointer),
    };

    let mut offset = HEADER_LEN;
    while offset + entry_size <= root.len() {
        let addr = if entry_size == 8 {
            read_u64(root, offset)?
        } else {
            u64::from(read_u32(root, offset)?)
        };
        offset += entry_size;
        if addr == 0 {
            continue;
        }

        let pa = PhysicalAddress::new(addr);
        let header = unsafe { map.map_ro(pa, HEADER_LEN) };
        if read::<4>(header, 0)? != signature {
            continue;
        }
        match unsafe { load_table(map, pa, signature) } {
            Ok(_) => return Ok(Some(pa)),
            Err(e) => log::warn!("skipping table at {pa}: {e}"),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePhys, table};

    fn roots(xsdt: Option<u64>, rsdt: Option<u64>) -> AcpiRoots {
        AcpiRoots {
            revision: 2,
            rsdt_addr: rsdt.map(PhysicalAddress::new),
            xsdt_addr: xsdt.map(PhysicalAddress::new),
        }
    }

    #[test]
    fn finds_table_through_xsdt() {
        let mut mem = FakePhys::new(0, 0x1000);
        let mut body = Vec::new();
        body.extend_from_slice(&0x200u64.to_le_bytes());
        body.extend_from_slice(&0x300u64.to_le_bytes());
        mem.put(0x100, &table(b"XSDT", &body));
        mem.put(0x200, &table(b"APIC", &[0; 8]));
        mem.put(0x300, &table(b"NFIT", &[0; 4]));

        let found = unsafe { find_table(&mem, &roots(Some(0x100), None), *b"NFIT") };
        assert_eq!(found, Ok(Some(PhysicalAddress::new(0x300))));
        let missing = unsafe { find_table(&mem, &roots(Some(0x100), None), *b"SRAT") };
        assert_eq!(missing, Ok(None));
    }

    #[test]
    fn falls_back_to_rsdt() {
        let mut mem = FakePhys::new(0, 0x1000);
        mem.put(0x100, &table(b"RSDT", &0x200u32.to_le_bytes()));
        mem.put(0x200, &table(b"NFIT", &[0; 4]));
        let found = unsafe { find_table(&mem, &roots(None, Some(0x100)), *b"NFIT") };
        assert_eq!(found, Ok(Some(PhysicalAddress::new(0x200))));
    }

    #[test]
    fn corrupt_entries_are_skipped() {
        let mut mem = FakePhys::new(0, 0x1000);
        mem.put(0x100, &table(b"XSDT", &0x200u64.to_le_bytes()));
        let mut nfit = table(b"NFIT", &[0; 4]);
        nfit[36] = 1;
        mem.put(0x200, &nfit);
        let found = unsafe { find_table(&mem, &roots(Some(0x100), None), *b"NFIT") };
        assert_eq!(found, Ok(None));
    }

    #[test]
    fn load_table_validates() {
        let mut mem = FakePhys::new(0, 0x1000);
        mem.put(0x100, &table(b"XSDT", &[]));
        assert!(unsafe { load_table(&mem, PhysicalAddress::new(0x100), *b"XSDT") }.is_ok());
        assert_eq!(
            unsafe { load_table(&mem, PhysicalAddress::new(0x100), *b"RSDT") },
            Err(AcpiError::BadSignature(*b"XSDT    "))
        );
        assert_eq!(
            unsafe { load_table(&mem, PhysicalAddress::new(0x400), *b"RSDT") },
            Err(AcpiError::BadSignature(*b"\0\0\0\0    "))
        );
    }
}
