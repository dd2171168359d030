#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: translation root register (IA-32e, PCID disabled).
///
/// Holds the physical frame of the L4 table plus cache-control flags for the
/// L4 walk itself.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    /// Bits 0–2: reserved.
    #[bits(3)]
    __reserved0: u8,

    /// Bit 3: PWT, write-through for L4 accesses.
    pub pwt: bool,

    /// Bit 4: PCD, cache disable for L4 accesses.
    pub pcd: bool,

    /// Bits 5–11: reserved.
    #[bits(7)]
    __reserved1: u8,

    /// Bits 12–51: L4 frame number.
    #[bits(40)]
    root_frame: u64,

    /// Bits 52–63: reserved.
    #[bits(12)]
    __reserved2: u16,
}

impl Cr3 {
    /// CR3 value selecting `root` as the L4 table with write-back caching.
    #[must_use]
    pub const fn with_root(root: PhysicalPage<Size4K>) -> Self {
        Self::new().with_root_frame(root.base().as_u64() >> 12)
    }

    /// The L4 table frame this value points at.
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(self.root_frame() << 12))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_frame_roundtrips_through_bits() {
        let root = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x0012_3456_7000));
        let cr3 = Cr3::with_root(root);
        assert_eq!(cr3.into_bits(), 0x0012_3456_7000);
        assert_eq!(cr3.root(), root);
    }

    #[test]
    fn flags_do_not_leak_into_root() {
        let cr3 = Cr3::from_bits(0x0000_0000_0040_0018);
        assert!(cr3.pwt());
        assert!(cr3.pcd());
        assert_eq!(cr3.root().base(), PhysicalAddress::new(0x40_0000));
    }
}
