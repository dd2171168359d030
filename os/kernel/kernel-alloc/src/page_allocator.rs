//! # Physical Page Allocator
//!
//! First-fit allocator over runs of free 4 KiB frames. The bookkeeping lives
//! inside the free memory itself: the first frame of every run holds its
//! list node.
//!
//! ```text
//! head ──► +-----------------------+          +-----------------------+
//!          | FreeRunNode           |   next   | FreeRunNode           |
//!          |  frame_count = 3      | ───────► |  frame_count = 1      | ──► ∅
//!          +-----------------------+          +-----------------------+
//!          | frame 1 | frame 2     |          ^ run base
//!          ^ run base
//! ```
//!
//! - New runs are pushed at the head. The list is neither sorted nor
//!   coalesced.
//! - Allocation takes the first run with `frame_count >= n`. An exact fit
//!   unlinks the run; otherwise the frames are carved from the run's low
//!   end and its node moves up by `n` frames.
//! - A frame handed out is never read again by the allocator.
//!
//! Every access to a node goes through the [`PhysMapper`], so the same code
//! runs on real RAM and on simulated memory in tests.

use core::fmt;
use kernel_info::mmap::MemoryRegion;
use kernel_info::ranges::PhysicalRange;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FrameAlloc, PhysMapper};

/// Node stored in the first frame of every free run.
#[repr(C)]
#[derive(Copy, Clone)]
struct FreeRunNode {
    frame_count: u64,
    /// Base of the next run, or [`END_OF_LIST`].
    next: u64,
}

/// Physical 0 is a valid run base, so the end marker is all ones.
const END_OF_LIST: u64 = u64::MAX;

const fn link(next: Option<PhysicalAddress>) -> u64 {
    match next {
        Some(pa) => pa.as_u64(),
        None => END_OF_LIST,
    }
}

const fn unlink(next: u64) -> Option<PhysicalAddress> {
    if next == END_OF_LIST {
        None
    } else {
        Some(PhysicalAddress::new(next))
    }
}

/// A registered run of free frames, as reported by [`PageAllocator::free_runs`].
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct FreeRun {
    pub base: PhysicalAddress,
    pub frame_count: u64,
}

impl FreeRun {
    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::new(self.base, self.frame_count.saturating_mul(Size4K::SIZE))
    }
}

impl fmt::Debug for FreeRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({} frames)", self.range(), self.frame_count)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageAllocError {
    #[error("no free run holds {requested} frames")]
    OutOfMemory { requested: u64 },
    #[error("run at {base} ({frame_count} frames) overlaps a free run")]
    OverlappingFree { base: PhysicalAddress, frame_count: u64 },
    #[error("run base {0} is not 4 KiB aligned")]
    UnalignedBase(PhysicalAddress),
    #[error("zero frames requested")]
    EmptyRequest,
}

/// Intrusive first-fit page allocator.
///
/// # Invariants
/// - Registered runs never overlap.
/// - Every run base is 4 KiB aligned and the run is at least one frame.
/// - `head` is the most recently registered or relocated run.
pub struct PageAllocator<M: PhysMapper> {
    mapper: M,
    head: Option<PhysicalAddress>,
}

impl<M: PhysMapper> PageAllocator<M> {
    /// An allocator without any free memory.
    pub const fn new(mapper: M) -> Self {
        Self { mapper, head: None }
    }

    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    fn read_node(&self, at: PhysicalAddress) -> FreeRunNode {
        // SAFETY: `at` is the base of a registered run, which `free_pages`'
        // contract makes readable through the mapper.
        unsafe { self.mapper.phys_to_ptr::<FreeRunNode>(at).read() }
    }

    #[inline]
    fn write_node(&mut self, at: PhysicalAddress, node: FreeRunNode) {
        // SAFETY: as in `read_node`; the frame at `at` belongs to a free run.
        unsafe { self.mapper.phys_to_ptr::<FreeRunNode>(at).write(node) }
    }

    /// Point the predecessor of a run (or the head) at `next`.
    fn relink(&mut self, prev: Option<PhysicalAddress>, next: Option<PhysicalAddress>) {
        match prev {
            None => self.head = next,
            Some(prev) => {
                let mut node = self.read_node(prev);
                node.next = link(next);
                self.write_node(prev, node);
            }
        }
    }

    /// Register `[base, base + frame_count * 4 KiB)` as free.
    ///
    /// A zero-frame run is accepted and ignored.
    ///
    /// # Errors
    /// - [`PageAllocError::UnalignedBase`] if `base` is not 4 KiB aligned.
    /// - [`PageAllocError::OverlappingFree`] if the run overlaps a registered
    ///   one. The list is left unchanged.
    ///
    /// # Safety
    /// The run must be RAM reachable through the mapper, owned by nobody
    /// else, and must stay untouched by anyone but this allocator until it
    /// is handed out again.
    pub unsafe fn free_pages(&mut self, base: PhysicalAddress, frame_count: u64) -> Result<(), PageAllocError> {
        if frame_count == 0 {
            return Ok(());
        }
        if !base.is_aligned::<Size4K>() {
            return Err(PageAllocError::UnalignedBase(base));
        }
        let incoming = PhysicalRange::new(base, frame_count.saturating_mul(Size4K::SIZE));
        if self.free_runs().any(|run| run.range().overlaps(&incoming)) {
            return Err(PageAllocError::OverlappingFree { base, frame_count });
        }

        let node = FreeRunNode {
            frame_count,
            next: link(self.head),
        };
        self.write_node(base, node);
        self.head = Some(base);
        log::trace!("free run {incoming:?} registered");
        Ok(())
    }

    /// Take `frame_count` contiguous frames from the first run large enough.
    ///
    /// # Errors
    /// - [`PageAllocError::EmptyRequest`] for `frame_count == 0`.
    /// - [`PageAllocError::OutOfMemory`] if no run is large enough.
    pub fn alloc_pages(&mut self, frame_count: u64) -> Result<PhysicalPage<Size4K>, PageAllocError> {
        if frame_count == 0 {
            return Err(PageAllocError::EmptyRequest);
        }

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(base) = cursor {
            let node = self.read_node(base);
            if node.frame_count >= frame_count {
                if node.frame_count == frame_count {
                    self.relink(prev, unlink(node.next));
                } else {
                    let rest = base + frame_count * Size4K::SIZE;
                    self.write_node(
                        rest,
                        FreeRunNode {
                            frame_count: node.frame_count - frame_count,
                            next: node.next,
                        },
                    );
                    self.relink(prev, Some(rest));
                }
                return Ok(PhysicalPage::containing(base));
            }
            prev = cursor;
            cursor = unlink(node.next);
        }

        Err(PageAllocError::OutOfMemory {
            requested: frame_count,
        })
    }

    /// Registered runs in list order.
    pub fn free_runs(&self) -> FreeRuns<'_, M> {
        FreeRuns {
            allocator: self,
            cursor: self.head,
        }
    }

    /// Total number of free frames.
    pub fn free_frame_count(&self) -> u64 {
        self.free_runs().map(|run| run.frame_count).sum()
    }

    /// Register every conventional region of the firmware memory map.
    /// Returns the number of frames seeded.
    ///
    /// # Errors
    /// Propagates [`free_pages`](Self::free_pages) failures, e.g. for
    /// overlapping descriptors.
    ///
    /// # Safety
    /// Conventional regions must be unused RAM reachable through the mapper.
    pub unsafe fn seed_from_memory_map<I>(&mut self, regions: I) -> Result<u64, PageAllocError>
    where
        I: IntoIterator<Item = MemoryRegion>,
    {
        let mut seeded = 0;
        for region in regions.into_iter().filter(MemoryRegion::is_conventional) {
            unsafe { self.free_pages(region.start, region.page_count)? };
            seeded += region.page_count;
        }
        log::info!("available memory: {} KiB", seeded * (Size4K::SIZE / 1024));
        Ok(seeded)
    }

    /// Write all free runs through `log`.
    pub fn log_free_runs(&self) {
        for run in self.free_runs() {
            log::info!("  {run:?}");
        }
        log::info!("free: {} KiB", self.free_frame_count() * (Size4K::SIZE / 1024));
    }
}

// SAFETY: each frame is handed out once and not touched again until it is
// registered anew through `free_pages`.
unsafe impl<M: PhysMapper> FrameAlloc for PageAllocator<M> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.alloc_pages(1).ok()
    }
}

impl<M: PhysMapper> fmt::Debug for PageAllocator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.free_runs()).finish()
    }
}

/// Iterator returned by [`PageAllocator::free_runs`].
pub struct FreeRuns<'a, M: PhysMapper> {
    allocator: &'a PageAllocator<M>,
    cursor: Option<PhysicalAddress>,
}

impl<M: PhysMapper> Iterator for FreeRuns<'_, M> {
    type Item = FreeRun;

    fn next(&mut self) -> Option<FreeRun> {
        let base = self.cursor?;
        let node = self.allocator.read_node(base);
        self.cursor = unlink(node.next);
        Some(FreeRun {
            base,
            frame_count: node.frame_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_logging;
    use kernel_vmem::testing::SimulatedMemory;
    use proptest::prelude::*;
    use uefi::boot::MemoryType;

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    fn runs<M: PhysMapper>(alloc: &PageAllocator<M>) -> Vec<(u64, u64)> {
        alloc.free_runs().map(|r| (r.base.as_u64(), r.frame_count)).collect()
    }

    #[test]
    fn exhaustion_with_exact_fit() {
        init_logging();
        const N: u64 = 16;
        let mem = SimulatedMemory::new(32);
        let mut alloc = PageAllocator::new(&mem);
        let base = pa(0x4000);
        unsafe { alloc.free_pages(base, N) }.unwrap();

        assert_eq!(
            alloc.alloc_pages(N + 1),
            Err(PageAllocError::OutOfMemory { requested: N + 1 })
        );
        assert_eq!(alloc.alloc_pages(N - 1).unwrap().base(), base);
        assert_eq!(runs(&alloc), vec![(0x4000 + (N - 1) * 0x1000, 1)]);
        assert_eq!(alloc.alloc_pages(1).unwrap().base(), base + (N - 1) * 0x1000);
        assert_eq!(alloc.free_runs().count(), 0);
        assert_eq!(alloc.alloc_pages(1), Err(PageAllocError::OutOfMemory { requested: 1 }));
    }

    #[test]
    fn first_fit_in_list_order() {
        let mem = SimulatedMemory::new(32);
        let mut alloc = PageAllocator::new(&mem);
        unsafe {
            alloc.free_pages(pa(0x1000), 2).unwrap();
            alloc.free_pages(pa(0x8000), 4).unwrap();
            alloc.free_pages(pa(0x10000), 1).unwrap();
        }
        assert_eq!(runs(&alloc), vec![(0x10000, 1), (0x8000, 4), (0x1000, 2)]);

        // head run too small, second run carved from its low end
        assert_eq!(alloc.alloc_pages(2).unwrap().base(), pa(0x8000));
        assert_eq!(runs(&alloc), vec![(0x10000, 1), (0xA000, 2), (0x1000, 2)]);

        // exact fit in the middle unlinks it
        assert_eq!(alloc.alloc_pages(2).unwrap().base(), pa(0xA000));
        assert_eq!(runs(&alloc), vec![(0x10000, 1), (0x1000, 2)]);
        assert_eq!(alloc.free_frame_count(), 3);
    }

    #[test]
    fn overlapping_free_is_rejected() {
        let mem = SimulatedMemory::new(32);
        let mut alloc = PageAllocator::new(&mem);
        unsafe { alloc.free_pages(pa(0x4000), 4) }.unwrap();
        let err = unsafe { alloc.free_pages(pa(0x7000), 2) };
        assert_eq!(
            err,
            Err(PageAllocError::OverlappingFree {
                base: pa(0x7000),
                frame_count: 2
            })
        );
        assert_eq!(runs(&alloc), vec![(0x4000, 4)]);

        // adjacent is fine
        unsafe { alloc.free_pages(pa(0x8000), 1) }.unwrap();
        assert_eq!(alloc.free_frame_count(), 5);
    }

    #[test]
    fn degenerate_requests() {
        let mem = SimulatedMemory::new(4);
        let mut alloc = PageAllocator::new(&mem);
        assert_eq!(alloc.alloc_pages(0), Err(PageAllocError::EmptyRequest));
        assert_eq!(
            unsafe { alloc.free_pages(pa(0x1800), 1) },
            Err(PageAllocError::UnalignedBase(pa(0x1800)))
        );
        unsafe { alloc.free_pages(pa(0x1000), 0) }.unwrap();
        assert_eq!(alloc.free_runs().count(), 0);
    }

    #[test]
    fn seed_takes_conventional_regions_only() {
        init_logging();
        let mem = SimulatedMemory::new(64);
        let mut alloc = PageAllocator::new(&mem);
        let map = [
            MemoryRegion::new(pa(0), 4, MemoryType::BOOT_SERVICES_DATA),
            MemoryRegion::new(pa(0x4000), 8, MemoryType::CONVENTIONAL),
            MemoryRegion::new(pa(0xC000), 2, MemoryType::LOADER_CODE),
            MemoryRegion::new(pa(0x20000), 16, MemoryType::CONVENTIONAL),
            MemoryRegion::new(pa(0x30000), 0, MemoryType::CONVENTIONAL),
        ];
        let seeded = unsafe { alloc.seed_from_memory_map(map) }.unwrap();
        assert_eq!(seeded, 24);
        assert_eq!(runs(&alloc), vec![(0x20000, 16), (0x4000, 8)]);
        alloc.log_free_runs();
    }

    #[test]
    fn serves_as_table_frame_source() {
        let mem = SimulatedMemory::new(8);
        let mut alloc = PageAllocator::new(&mem);
        unsafe { alloc.free_pages(pa(0x2000), 2) }.unwrap();
        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Some(pa(0x2000)));
        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Some(pa(0x3000)));
        assert_eq!(alloc.alloc_4k(), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Alloc(u64),
        FreeLatest,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![3 => (1u64..6).prop_map(Op::Alloc), 1 => Just(Op::FreeLatest)]
    }

    proptest! {
        #[test]
        fn allocations_never_overlap(ops in prop::collection::vec(op(), 1..64)) {
            const FRAMES: u64 = 64;
            let mem = SimulatedMemory::new(FRAMES as usize);
            let mut alloc = PageAllocator::new(&mem);
            unsafe { alloc.free_pages(pa(0), FRAMES) }.unwrap();

            let mut live: Vec<PhysicalRange> = Vec::new();
            for op in ops {
                match op {
                    Op::Alloc(n) => {
                        let Ok(page) = alloc.alloc_pages(n) else { continue };
                        let range = PhysicalRange::new(page.base(), n * 0x1000);
                        prop_assert!(range.end().as_u64() <= FRAMES * 0x1000);
                        for other in &live {
                            prop_assert!(!other.overlaps(&range), "{range:?} overlaps {other:?}");
                        }
                        for run in alloc.free_runs() {
                            prop_assert!(!run.range().overlaps(&range));
                        }
                        live.push(range);
                    }
                    Op::FreeLatest => {
                        if let Some(range) = live.pop() {
                            unsafe { alloc.free_pages(range.start, range.length / 0x1000) }.unwrap();
                        }
                    }
                }
                let live_frames: u64 = live.iter().map(|r| r.length / 0x1000).sum();
                prop_assert_eq!(alloc.free_frame_count() + live_frames, FRAMES);
            }
        }
    }
}
