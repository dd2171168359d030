//! # Page Attributes
//!
//! Level-independent description of the permission and caching bits an
//! entry should carry. Each entry view converts from and to it, forcing the
//! bits that are fixed by the entry's form (e.g. `PS`).

/// Permission and caching bits for a new entry.
///
/// The effective permission of a translation is the intersection over all
/// levels, so non-leaf entries usually carry the most permissive set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct PageAttributes {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    /// Leaf only; ignored for table links.
    pub global: bool,
    /// Requires `EFER.NXE`.
    pub no_execute: bool,
}

impl PageAttributes {
    /// Not present.
    pub const NONE: Self = Self {
        present: false,
        writable: false,
        user: false,
        write_through: false,
        cache_disable: false,
        global: false,
        no_execute: false,
    };

    /// Present, writable, supervisor-only.
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self {
            present: true,
            writable: true,
            ..Self::NONE
        }
    }

    /// Present, writable, user-accessible. Used for the direct map and for
    /// table links, leaving the final say to the leaf.
    #[must_use]
    pub const fn user_rw() -> Self {
        Self {
            present: true,
            writable: true,
            user: true,
            ..Self::NONE
        }
    }

    #[must_use]
    pub const fn with_user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub const fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    #[must_use]
    pub const fn with_no_execute(mut self, no_execute: bool) -> Self {
        self.no_execute = no_execute;
        self
    }
}

/// Implements `from_attributes` / `attributes` for an entry bitfield.
/// Leaf forms pass `global` to carry bit 8.
macro_rules! attribute_conversions {
    ($entry:ty) => {
        impl $entry {
            /// Build this entry form from level-independent attributes.
            #[inline]
            #[must_use]
            pub const fn from_attributes(a: $crate::PageAttributes) -> Self {
                Self::new()
                    .with_present(a.present)
                    .with_writable(a.writable)
                    .with_user(a.user)
                    .with_write_through(a.write_through)
                    .with_cache_disable(a.cache_disable)
                    .with_no_execute(a.no_execute)
            }

            /// Level-independent view of this entry's attribute bits.
            #[inline]
            #[must_use]
            pub const fn attributes(self) -> $crate::PageAttributes {
                $crate::PageAttributes {
                    present: self.present(),
                    writable: self.writable(),
                    user: self.user(),
                    write_through: self.write_through(),
                    cache_disable: self.cache_disable(),
                    global: false,
                    no_execute: self.no_execute(),
                }
            }
        }
    };
    ($entry:ty, global) => {
        impl $entry {
            /// Build this entry form from level-independent attributes.
            #[inline]
            #[must_use]
            pub const fn from_attributes(a: $crate::PageAttributes) -> Self {
                Self::new()
                    .with_present(a.present)
                    .with_writable(a.writable)
                    .with_user(a.user)
                    .with_write_through(a.write_through)
                    .with_cache_disable(a.cache_disable)
                    .with_global(a.global)
                    .with_no_execute(a.no_execute)
            }

            /// Level-independent view of this entry's attribute bits.
            #[inline]
            #[must_use]
            pub const fn attributes(self) -> $crate::PageAttributes {
                $crate::PageAttributes {
                    present: self.present(),
                    writable: self.writable(),
                    user: self.user(),
                    write_through: self.write_through(),
                    cache_disable: self.cache_disable(),
                    global: self.global(),
                    no_execute: self.no_execute(),
                }
            }
        }
    };
}

pub(crate) use attribute_conversions;
