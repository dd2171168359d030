//! # Test Doubles
//!
//! Host-side stand-ins for physical memory, frame allocation and the
//! translation root, so page tables can be built and inspected without
//! touching real hardware. Enabled for this crate's tests and, through the
//! `testing` feature, for downstream crates.

use crate::{FrameAlloc, PhysMapper, TranslationRoot};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; 4096]>);

/// Zero-initialized RAM covering `[base, base + frames * 4 KiB)`.
pub struct SimulatedMemory {
    base: u64,
    frames: Box<[Frame]>,
}

impl SimulatedMemory {
    /// `frames` pages of RAM starting at physical 0.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self::with_base(PhysicalAddress::zero(), frames)
    }

    /// `frames` pages of RAM starting at `base`.
    ///
    /// # Panics
    /// If `base` is not 4 KiB aligned.
    #[must_use]
    pub fn with_base(base: PhysicalAddress, frames: usize) -> Self {
        assert!(base.is_aligned::<Size4K>(), "simulated RAM base {base} is not page aligned");
        let frames = (0..frames)
            .map(|_| Frame(UnsafeCell::new([0; 4096])))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            base: base.as_u64(),
            frames,
        }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// First address past the simulated RAM.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base + self.frames.len() as u64 * Size4K::SIZE)
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Read the 64-bit word at `pa`.
    #[must_use]
    pub fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        // SAFETY: `phys_to_ptr` checked the bounds; any bit pattern is a u64.
        unsafe { self.phys_to_ptr::<u64>(pa).read_unaligned() }
    }
}

// SAFETY: every address inside the buffer maps to its own bytes; addresses
// outside panic instead of returning a dangling pointer.
unsafe impl PhysMapper for SimulatedMemory {
    /// # Panics
    /// If `[pa, pa + size_of::<T>())` is not inside a single simulated frame.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        let offset = pa
            .as_u64()
            .checked_sub(self.base)
            .unwrap_or_else(|| panic!("{pa} is below simulated RAM at {}", self.base()));
        let index = usize::try_from(offset / Size4K::SIZE).unwrap_or(usize::MAX);
        let within = usize::try_from(offset % Size4K::SIZE).unwrap_or(usize::MAX);
        let frame = self
            .frames
            .get(index)
            .unwrap_or_else(|| panic!("{pa} is past simulated RAM end {}", self.end()));
        assert!(
            within + size_of::<T>() <= 4096,
            "{pa}: access of {} bytes crosses a frame boundary",
            size_of::<T>()
        );
        // SAFETY: `within` is inside the frame.
        unsafe { frame.0.get().cast::<u8>().add(within).cast::<T>() }
    }
}

impl fmt::Debug for SimulatedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedMemory")
            .field("base", &self.base())
            .field("end", &self.end())
            .finish()
    }
}

/// Hands out consecutive frames from a fixed window, never reusing one.
#[derive(Debug, Clone)]
pub struct BumpFrames {
    next: u64,
    end: u64,
}

impl BumpFrames {
    #[must_use]
    pub const fn new(base: PhysicalAddress, frames: u64) -> Self {
        Self {
            next: base.as_u64(),
            end: base.as_u64() + frames * Size4K::SIZE,
        }
    }

    /// Frames not handed out yet.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        (self.end - self.next) / Size4K::SIZE
    }
}

// SAFETY: every frame is returned at most once.
unsafe impl FrameAlloc for BumpFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.next >= self.end {
            return None;
        }
        let page = PhysicalPage::containing(PhysicalAddress::new(self.next));
        self.next += Size4K::SIZE;
        Some(page)
    }
}

/// [`TranslationRoot`] that records every root it is asked to load.
#[derive(Debug, Default, Clone)]
pub struct RecordingRoot {
    pub loaded: Vec<PhysicalPage<Size4K>>,
}

impl RecordingRoot {
    /// Most recently loaded root.
    #[must_use]
    pub fn current(&self) -> Option<PhysicalPage<Size4K>> {
        self.loaded.last().copied()
    }
}

impl TranslationRoot for RecordingRoot {
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>) {
        self.loaded.push(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_memory_is_addressable_from_base() {
        let mem = SimulatedMemory::with_base(PhysicalAddress::new(0x10_0000), 2);
        assert_eq!(mem.end(), PhysicalAddress::new(0x10_2000));
        unsafe { mem.phys_to_ptr::<u64>(PhysicalAddress::new(0x10_1008)).write(0xDEAD_BEEF) };
        assert_eq!(mem.read_u64(PhysicalAddress::new(0x10_1008)), 0xDEAD_BEEF);
        assert_eq!(mem.read_u64(PhysicalAddress::new(0x10_0000)), 0);
    }

    #[test]
    #[should_panic(expected = "past simulated RAM end")]
    fn out_of_range_access_panics() {
        let mem = SimulatedMemory::new(1);
        let _ = mem.read_u64(PhysicalAddress::new(0x1000));
    }

    #[test]
    fn bump_frames_exhaust() {
        let mut frames = BumpFrames::new(PhysicalAddress::new(0x4000), 2);
        assert_eq!(frames.alloc_4k().map(|p| p.base().as_u64()), Some(0x4000));
        assert_eq!(frames.alloc_4k().map(|p| p.base().as_u64()), Some(0x5000));
        assert_eq!(frames.remaining(), 0);
        assert!(frames.alloc_4k().is_none());
    }
}
