//! # Memory Layout

use kernel_memory_addresses::{ENTRIES_PER_TABLE, VirtualAddress};

/// First L4 slot of the kernel (upper, canonical-high) half.
///
/// Slots `KERNEL_HALF_FIRST_SLOT..512` are shared by every address space;
/// slots below it are private to each execution context.
pub const KERNEL_HALF_FIRST_SLOT: usize = 256;

/// Lowest canonical upper-half address, the first byte covered by
/// [`KERNEL_HALF_FIRST_SLOT`].
pub const KERNEL_HALF_START: VirtualAddress = VirtualAddress::new(0xffff_8000_0000_0000);

/// Top of the low 4 GiB that holds legacy MMIO windows.
pub const LOW_MMIO_END: u64 = 0x1_0000_0000;

/// Physical base of the local APIC register window.
pub const LAPIC_PHYS_BASE: u64 = 0xFEE0_0000;

/// Physical base of the first I/O APIC on PC-compatible platforms.
pub const IOAPIC_PHYS_BASE: u64 = 0xFEC0_0000;

const _: () = {
    assert!(KERNEL_HALF_FIRST_SLOT < ENTRIES_PER_TABLE);
    assert!(KERNEL_HALF_START.indices().l4.as_usize() == KERNEL_HALF_FIRST_SLOT);
    assert!(LAPIC_PHYS_BASE < LOW_MMIO_END);
    assert!(IOAPIC_PHYS_BASE < LOW_MMIO_END);
};
