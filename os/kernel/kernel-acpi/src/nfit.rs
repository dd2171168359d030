//! # NVDIMM Firmware Interface Table
//!
//! The NFIT body is a sequence of typed structures after a 4-byte reserved
//! field. Only System Physical Address (SPA) range structures are decoded:
//!
//! ```text
//! offset  size  field
//!      0     2  type (0 = SPA range)
//!      2     2  length (56)
//!      4     2  range structure index
//!      6     2  flags
//!     12     4  proximity domain
//!     16    16  address range type GUID
//!     32     8  range base
//!     40     8  range length
//!     48     8  memory mapping attributes
//! ```

use crate::rsdp::AcpiRoots;
use crate::sdt::{HEADER_LEN, find_table, load_table};
use crate::{AcpiError, PhysMapRo, read, read_u16, read_u64};
use kernel_info::ranges::{PlatformRange, PlatformRangeKind};
use kernel_memory_addresses::PhysicalAddress;

pub const SIGNATURE: [u8; 4] = *b"NFIT";

const FIRST_STRUCTURE: usize = HEADER_LEN + 4;
const TYPE_SPA_RANGE: u16 = 0;
const SPA_RANGE_LEN: usize = 56;

/// `66F0D379-B4F3-4074-AC43-0D3318B78CDB`, in table byte order.
const GUID_PERSISTENT_MEMORY: [u8; 16] = [
    0x79, 0xD3, 0xF0, 0x66, 0xF3, 0xB4, 0x74, 0x40, 0xAC, 0x43, 0x0D, 0x33, 0x18, 0xB7, 0x8C, 0xDB,
];

/// `7305944F-FDDA-44E3-B16C-3F22D252E5D0`, in table byte order.
const GUID_VOLATILE_MEMORY: [u8; 16] = [
    0x4F, 0x94, 0x05, 0x73, 0xDA, 0xFD, 0xE3, 0x44, 0xB1, 0x6C, 0x3F, 0x22, 0xD2, 0x52, 0xE5, 0xD0,
];

fn classify(guid: [u8; 16]) -> PlatformRangeKind {
    match guid {
        GUID_PERSISTENT_MEMORY => PlatformRangeKind::PersistentMemory,
        GUID_VOLATILE_MEMORY => PlatformRangeKind::Volatile,
        _ => PlatformRangeKind::Other,
    }
}

/// SPA ranges of a validated NFIT (see [`crate::sdt::load_table`]).
///
/// Yields one item per SPA range structure. A structure that runs past the
/// table end or has a zero length yields [`AcpiError::Truncated`] and ends
/// the iteration.
pub fn spa_ranges(table: &[u8]) -> SpaRanges<'_> {
    SpaRanges {
        table,
        offset: FIRST_STRUCTURE,
    }
}

/// Locate the NFIT and iterate its SPA ranges. `Ok(None)` on platforms
/// without NVDIMMs.
///
/// # Errors
/// See [`find_table`].
///
/// # Safety
/// See [`load_table`].
pub unsafe fn discover<'a, M: PhysMapRo + ?Sized>(
    map: &M,
    roots: &AcpiRoots,
) -> Result<Option<SpaRanges<'a>>, AcpiError> {
    let Some(pa) = (unsafe { find_table(map, roots, SIGNATURE)? }) else {
        log::debug!("no NFIT");
        return Ok(None);
    };
    let table = unsafe { load_table(map, pa, SIGNATURE)? };
    log::info!("NFIT at {pa}, {} bytes", table.len());
    Ok(Some(spa_ranges(table)))
}

#[derive(Debug, Clone)]
pub struct SpaRanges<'a> {
    table: &'a [u8],
    offset: usize,
}

impl SpaRanges<'_> {
    fn next_structure(&mut self) -> Result<Option<PlatformRange>, AcpiError> {
        let at = self.offset;
        let ty = read_u16(self.table, at)?;
        let len = read_u16(self.table, at + 2)? as usize;
        if len < 4 || at + len > self.table.len() {
            return Err(AcpiError::Truncated(at));
        }
        self.offset = at + len;

        if ty != TYPE_SPA_RANGE {
            return Ok(None);
        }
        if len < SPA_RANGE_LEN {
            return Err(AcpiError::Truncated(at));
        }
        let guid = read::<16>(self.table, at + 16)?;
        let base = read_u64(self.table, at + 32)?;
        let length = read_u64(self.table, at + 40)?;
        Ok(Some(PlatformRange::new(PhysicalAddress::new(base), length, classify(guid))))
    }
}

impl Iterator for SpaRanges<'_> {
    type Item = Result<PlatformRange, AcpiError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.table.len() {
            match self.next_structure() {
                Ok(Some(range)) => return Some(Ok(range)),
                Ok(None) => {}
                Err(e) => {
                    self.offset = self.table.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl core::iter::FusedIterator for SpaRanges<'_> {}
