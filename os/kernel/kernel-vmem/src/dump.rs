//! # Diagnostic Traversal
//!
//! Read-only walks over a translation tree, reporting raw entries to a
//! visitor. Used for boot diagnostics and by tests to assert on the exact
//! shape of a tree.

use crate::page_table::{ADDRESS_MASK, PRESENT_BIT, PS_BIT};
use crate::{AddressSpace, PhysMapper};
use kernel_memory_addresses::{
    ENTRIES_PER_TABLE, L1_SHIFT, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress,
};

/// One entry seen during a walk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Visit {
    /// 4 for the root, 1 for the last level.
    pub level: u8,
    pub index: u16,
    /// Raw 64-bit entry.
    pub bits: u64,
    /// Lowest virtual address the entry covers.
    pub va: VirtualAddress,
}

impl Visit {
    #[inline]
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.bits & PRESENT_BIT != 0
    }

    /// Present and ending the walk: always at L1, `PS=1` at L3/L2.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.is_present() && (self.level == 1 || (self.level <= 3 && self.bits & PS_BIT != 0))
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.bits & ADDRESS_MASK)
    }

    /// Bytes of address space this entry covers.
    #[inline]
    #[must_use]
    pub const fn span(&self) -> u64 {
        1 << level_shift(self.level)
    }
}

const fn level_shift(level: u8) -> u32 {
    L1_SHIFT + 9 * (level as u32).saturating_sub(1)
}

const fn slot_va(prefix: u64, level: u8, index: usize) -> u64 {
    let va = prefix | ((index as u64) << level_shift(level));
    if level == 4 && index >= ENTRIES_PER_TABLE / 2 {
        va | 0xFFFF_0000_0000_0000
    } else {
        va
    }
}

fn raw_table<'a, M: PhysMapper>(
    space: &'a AddressSpace<'_, M>,
    frame: PhysicalPage<Size4K>,
) -> &'a [u64; ENTRIES_PER_TABLE] {
    // SAFETY: `frame` is the root of `space` or was linked from a present
    // non-leaf entry of it; every table is 512 plain u64s.
    unsafe { &*space.mapper().phys_to_ptr::<[u64; ENTRIES_PER_TABLE]>(frame.base()) }
}

fn walk_table<M: PhysMapper, F: FnMut(Visit)>(
    space: &AddressSpace<'_, M>,
    frame: PhysicalPage<Size4K>,
    level: u8,
    prefix: u64,
    visitor: &mut F,
) {
    for (i, &bits) in raw_table(space, frame).iter().enumerate() {
        if bits & PRESENT_BIT == 0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)]
        let visit = Visit {
            level,
            index: i as u16,
            bits,
            va: VirtualAddress::new(slot_va(prefix, level, i)),
        };
        visitor(visit);
        if !visit.is_leaf() {
            walk_table(space, visit.address().page(), level - 1, visit.va.as_u64(), visitor);
        }
    }
}

/// Depth-first walk from L4 over every present entry, in slot order.
/// Descends through non-leaf entries, stops at leaves.
pub fn traverse<M: PhysMapper, F: FnMut(Visit)>(space: &AddressSpace<'_, M>, mut visitor: F) {
    walk_table(space, space.root_page(), 4, 0, &mut visitor);
}

/// Follow `va` down from L4, reporting each entry on the way. The last
/// reported entry is either a leaf or not present.
pub fn walk_address<M: PhysMapper, F: FnMut(Visit)>(
    space: &AddressSpace<'_, M>,
    va: VirtualAddress,
    mut visitor: F,
) {
    let mut frame = space.root_page();
    for level in (1..=4u8).rev() {
        let index = va.table_index(level_shift(level));
        let bits = raw_table(space, frame)[index.as_usize()];
        let base = va.as_u64() & !((1u64 << level_shift(level)) - 1);
        let visit = Visit {
            level,
            index: index.as_u16(),
            bits,
            va: VirtualAddress::new(base),
        };
        visitor(visit);
        if !visit.is_present() || visit.is_leaf() {
            return;
        }
        frame = visit.address().page();
    }
}

const fn level_name(level: u8) -> &'static str {
    match level {
        4 => "PML4",
        3 => "PDPT",
        2 => "PD",
        _ => "PT",
    }
}

const INDENT: &str = "      ";

/// Write the whole tree through `log` at trace level, followed by a
/// per-level summary at debug level.
pub fn log_tree<M: PhysMapper>(space: &AddressSpace<'_, M>) {
    let mut tables = [0usize; 4];
    let mut leaves = [0usize; 4];
    traverse(space, |v| {
        let depth = 2 * usize::from(4 - v.level);
        let slot = usize::from(v.level - 1);
        if v.is_leaf() {
            leaves[slot] += 1;
        } else {
            tables[slot] += 1;
        }
        log::trace!(
            "{}{}[{:3}] {} {:#018x} -> {}{}",
            &INDENT[..depth],
            level_name(v.level),
            v.index,
            v.va,
            v.bits,
            v.address(),
            if v.is_leaf() { " (leaf)" } else { "" },
        );
    });
    log::debug!(
        "page tables of {}: {} L3, {} L2, {} L1 linked; leaves 1G={} 2M={} 4K={}",
        space.root_page().base(),
        tables[3],
        tables[2],
        tables[1],
        leaves[2],
        leaves[1],
        leaves[0],
    );
}

/// Write the walk for `va` through `log` at debug level.
pub fn log_address<M: PhysMapper>(space: &AddressSpace<'_, M>, va: VirtualAddress) {
    walk_address(space, va, |v| {
        log::debug!(
            "{} {}[{}] = {:#018x}{}",
            va,
            level_name(v.level),
            v.index,
            v.bits,
            if v.is_present() { "" } else { " (not present)" },
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageAttributes;
    use crate::test_utils::init_logging;
    use crate::testing::{BumpFrames, SimulatedMemory};
    use alloc::vec::Vec;
    use kernel_memory_addresses::{Size2M, Size4K};

    #[test]
    fn traverse_reports_tree_in_order() {
        init_logging();
        let mem = SimulatedMemory::new(16);
        let mut frames = BumpFrames::new(mem.base(), 16);
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();
        space
            .map_one::<_, Size2M>(&mut frames, VirtualAddress::new(0x20_0000), PhysicalAddress::new(0x20_0000), rw, rw)
            .unwrap();
        space
            .map_one::<_, Size4K>(
                &mut frames,
                VirtualAddress::new(0xFFFF_8000_0000_1000),
                PhysicalAddress::new(0x5000),
                rw,
                rw,
            )
            .unwrap();

        let mut seen = Vec::new();
        traverse(&space, |v| seen.push((v.level, v.index, v.is_leaf(), v.va.as_u64())));
        assert_eq!(
            seen,
            vec![
                (4, 0, false, 0),
                (3, 0, false, 0),
                (2, 1, true, 0x20_0000),
                (4, 256, false, 0xFFFF_8000_0000_0000),
                (3, 0, false, 0xFFFF_8000_0000_0000),
                (2, 0, false, 0xFFFF_8000_0000_0000),
                (1, 1, true, 0xFFFF_8000_0000_1000),
            ]
        );
        log_tree(&space);
    }

    #[test]
    fn walk_address_stops_at_missing_entry() {
        let mem = SimulatedMemory::new(8);
        let mut frames = BumpFrames::new(mem.base(), 8);
        let mut space = AddressSpace::create(&mut frames, &mem).unwrap();
        let rw = PageAttributes::user_rw();
        space
            .map_one::<_, Size2M>(&mut frames, VirtualAddress::new(0), PhysicalAddress::new(0), rw, rw)
            .unwrap();

        let mut levels = Vec::new();
        walk_address(&space, VirtualAddress::new(0x1234), |v| levels.push((v.level, v.is_leaf())));
        assert_eq!(levels, vec![(4, false), (3, false), (2, true)]);

        let mut levels = Vec::new();
        walk_address(&space, VirtualAddress::new(0x4000_0000), |v| levels.push((v.level, v.is_present())));
        assert_eq!(levels, vec![(4, true), (3, false)]);
    }

    #[test]
    fn visit_span_per_level() {
        let v = |level| Visit {
            level,
            index: 0,
            bits: 0,
            va: VirtualAddress::new(0),
        };
        assert_eq!(v(1).span(), 0x1000);
        assert_eq!(v(2).span(), 0x20_0000);
        assert_eq!(v(3).span(), 0x4000_0000);
        assert_eq!(v(4).span(), 0x80_0000_0000);
        // out-of-range levels clamp instead of overflowing the shift
        assert_eq!(v(0).span(), 0x1000);
    }
}
