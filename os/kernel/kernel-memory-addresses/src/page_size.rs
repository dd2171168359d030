use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the page sizes the MMU can map with a single entry.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., the number of low offset bits.
    const SHIFT: u32;
    /// Mask selecting the in-page offset bits.
    const OFFSET_MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            #[inline]
            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }
    };
}

page_size!(
    /// 4 KiB page frame; the allocation granule.
    Size4K, 12, "4K"
);
page_size!(
    /// 2 MiB large page, mapped by a leaf L2 entry.
    Size2M, 21, "2M"
);
page_size!(
    /// 1 GiB large page, mapped by a leaf L3 entry.
    Size1G, 30, "1G"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_shifts() {
        assert_eq!(Size4K::SIZE, 4096);
        assert_eq!(Size2M::SIZE, 2 * 1024 * 1024);
        assert_eq!(Size1G::SIZE, 1024 * 1024 * 1024);
        assert_eq!(Size2M::OFFSET_MASK, 0x1F_FFFF);
    }

    #[test]
    fn labels() {
        assert_eq!(format!("{Size4K}/{Size2M}/{Size1G}"), "4K/2M/1G");
    }
}
