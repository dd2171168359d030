#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;

/// `IA32_EFER` (MSR `0xC000_0080`), reduced to the bits paging cares about.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Efer {
    /// Bit 0: SCE, `SYSCALL`/`SYSRET` enable.
    pub sce: bool,

    #[bits(7)]
    __reserved0: u8,

    /// Bit 8: LME, long mode enable.
    pub lme: bool,

    #[bits(1)]
    __reserved1: u8,

    /// Bit 10: LMA, long mode active (read-only).
    pub lma: bool,

    /// Bit 11: NXE, enables the no-execute bit in page table entries.
    pub nxe: bool,

    #[bits(52)]
    __reserved2: u64,
}

impl Efer {
    pub const MSR: u32 = 0xC000_0080;

    /// Four-level paging is in effect.
    #[must_use]
    pub const fn long_mode(&self) -> bool {
        self.lme() && self.lma()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Efer {
    unsafe fn load_unsafe() -> Self {
        let (lo, hi): (u32, u32);
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") Self::MSR,
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits((u64::from(hi) << 32) | u64::from(lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_mode_bits() {
        let efer = Efer::from_bits(0x0000_0000_0000_0D01);
        assert!(efer.sce());
        assert!(efer.lme());
        assert!(efer.lma());
        assert!(efer.nxe());
        assert!(efer.long_mode());
        assert!(!Efer::from_bits(0x100).long_mode());
    }
}
