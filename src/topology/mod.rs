//! Topology building blocks: arena handles, per-dimension tables, cells, facets and edges.

pub mod cell;
pub mod cell_type;
pub mod dimension;
pub mod edge;
pub mod facet;
pub mod handle;
pub mod tables;

pub use cell::{BackgroundCell, PatternState};
pub use cell_type::CellType;
pub use dimension::Dimension;
pub use edge::Edge;
pub use facet::Facet;
pub use handle::{CellIndex, EdgeIndex, FacetIndex};
pub use tables::{ChildNeighborRule, TopologyTables};
