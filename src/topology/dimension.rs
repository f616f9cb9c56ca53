//! Spatial dimensionality of a forest and the slot counts it implies.

use crate::mesh_error::MeshError;
use crate::topology::tables::TopologyTables;

/// Number of spatial dimensions of a background forest.
///
/// Slot counts follow from `N`: `2^N` children, `3^N - 1` neighbors, `2N` facets and
/// (3D only) 12 edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum Dimension {
    One,
    Two,
    Three,
}

impl Dimension {
    /// Converts a raw dimension count.
    pub fn new(n: usize) -> Result<Self, MeshError> {
        match n {
            1 => Ok(Dimension::One),
            2 => Ok(Dimension::Two),
            3 => Ok(Dimension::Three),
            other => Err(MeshError::UnsupportedDimension(other)),
        }
    }

    /// `N`.
    #[inline]
    pub const fn get(self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    /// Children per refined cell, `2^N`.
    #[inline]
    pub const fn children(self) -> usize {
        1 << self.get()
    }

    /// Neighbor slots per cell, `3^N - 1`.
    #[inline]
    pub const fn neighbors(self) -> usize {
        match self {
            Dimension::One => 2,
            Dimension::Two => 8,
            Dimension::Three => 26,
        }
    }

    /// Facet slots per cell, `2N`.
    #[inline]
    pub const fn facets(self) -> usize {
        2 * self.get()
    }

    /// Edge slots per cell. Only hexahedra carry edges separate from their facets.
    #[inline]
    pub const fn edges(self) -> usize {
        match self {
            Dimension::Three => 12,
            _ => 0,
        }
    }

    /// Corner vertices per cell, `2^N`.
    #[inline]
    pub const fn corners(self) -> usize {
        self.children()
    }

    /// The immutable lookup tables for this dimensionality.
    #[inline]
    pub fn tables(self) -> &'static TopologyTables {
        TopologyTables::for_dimension(self)
    }
}

impl TryFrom<usize> for Dimension {
    type Error = MeshError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Dimension::new(n)
    }
}

impl From<Dimension> for usize {
    fn from(d: Dimension) -> usize {
        d.get()
    }
}
