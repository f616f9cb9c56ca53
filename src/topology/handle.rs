//! Arena handles for cells, facets and edges.
//!
//! All topology lives in per-process arenas (`Vec`s) owned by the
//! [`Forest`](crate::forest::Forest). Cells, facets and edges refer to each other through
//! these dense indices instead of pointers, so parent/child and cell/facet/cell cycles carry
//! no ownership.
//!
//! Each handle wraps a `NonZeroU32` holding `index + 1`; this keeps `Option<Handle>` the
//! same size as the handle itself, which matters for the 26-slot neighbor arrays in 3D.

use std::{fmt, num::NonZeroU32};

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a dense arena position.
            ///
            /// # Panics
            ///
            /// Panics if `index` does not fit into 32 bits.
            #[inline]
            pub fn new(index: usize) -> Self {
                let raw = u32::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .and_then(NonZeroU32::new)
                    .expect(concat!($label, " index exceeds u32 range"));
                $name(raw)
            }

            /// Dense arena position.
            #[inline]
            pub const fn get(self) -> usize {
                (self.0.get() - 1) as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.get())
            }
        }
    };
}

arena_handle!(
    /// Position of a [`BackgroundCell`](crate::topology::cell::BackgroundCell) in the cell arena.
    CellIndex,
    "cell"
);
arena_handle!(
    /// Position of a [`Facet`](crate::topology::facet::Facet) in the facet arena.
    FacetIndex,
    "facet"
);
arena_handle!(
    /// Position of an [`Edge`](crate::topology::edge::Edge) in the edge arena.
    EdgeIndex,
    "edge"
);

static_assertions::assert_eq_size!(CellIndex, u32);
static_assertions::assert_eq_size!(Option<CellIndex>, u32);
static_assertions::assert_eq_size!(Option<FacetIndex>, u32);
static_assertions::assert_eq_size!(Option<EdgeIndex>, u32);
