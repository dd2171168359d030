use crate::PageSize;
use core::fmt;
use core::ops::{Add, AddAssign};

/// Number of entries in one page table at any level.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Bit position of the lowest index bit of each translation level.
pub const L4_SHIFT: u32 = 39;
pub const L3_SHIFT: u32 = 30;
pub const L2_SHIFT: u32 = 21;
pub const L1_SHIFT: u32 = 12;

/// Virtual memory address.
///
/// Canonicality is not enforced on construction; [`VirtualAddress::is_canonical`]
/// reports it and [`TableIndices::join`] always produces a canonical value.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset of this address within its `S`-sized page.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & S::OFFSET_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.offset::<S>() == 0
    }

    /// `true` if bits 63..=47 are all equal (48-bit canonical form).
    #[inline]
    #[must_use]
    pub const fn is_canonical(self) -> bool {
        let top = self.0 >> 47;
        top == 0 || top == 0x1_FFFF
    }

    /// 9-bit table index selected by the index field starting at `shift`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // masked to 9 bits
    pub const fn table_index(self, shift: u32) -> TableIndex {
        TableIndex(((self.0 >> shift) & 0x1FF) as u16)
    }

    /// Split the address into its four table indices and the 4 KiB page offset.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn indices(self) -> TableIndices {
        TableIndices {
            l4: self.table_index(L4_SHIFT),
            l3: self.table_index(L3_SHIFT),
            l2: self.table_index(L2_SHIFT),
            l1: self.table_index(L1_SHIFT),
            offset: (self.0 & 0xFFF) as u16,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// Index of one of the 512 slots of a page table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// # Panics
    /// Debug builds panic if `index >= 512`.
    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        debug_assert!((index as usize) < ENTRIES_PER_TABLE);
        Self(index & 0x1FF)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A virtual address decomposed into its translation indices.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_8000_0020_1ABC);
/// let ix = va.indices();
/// assert_eq!(ix.l4.as_usize(), 256);
/// assert_eq!(ix.l2.as_usize(), 1);
/// assert_eq!(ix.l1.as_usize(), 1);
/// assert_eq!(ix.offset, 0xABC);
/// assert_eq!(ix.join(), va);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableIndices {
    pub l4: TableIndex,
    pub l3: TableIndex,
    pub l2: TableIndex,
    pub l1: TableIndex,
    pub offset: u16,
}

impl TableIndices {
    /// Reassemble a canonical virtual address, sign-extending bit 47.
    #[must_use]
    pub const fn join(self) -> VirtualAddress {
        let raw = ((self.l4.0 as u64) << L4_SHIFT)
            | ((self.l3.0 as u64) << L3_SHIFT)
            | ((self.l2.0 as u64) << L2_SHIFT)
            | ((self.l1.0 as u64) << L1_SHIFT)
            | (self.offset as u64 & 0xFFF);
        // Shift bit 47 into the sign position and back to replicate it upward.
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let canonical = (((raw << 16) as i64) >> 16) as u64;
        VirtualAddress(canonical)
    }
}
