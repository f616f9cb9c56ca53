#![cfg_attr(docsrs, feature(doc_cfg))]
//! # background-mesh
//!
//! background-mesh is a distributed, adaptively refined background mesh for immersed and
//! level-set discretizations. Every process stores a forest of binary trees (1D), quadtrees
//! (2D) or octrees (3D) over a structured level-0 grid, with explicit neighbor, facet and edge
//! links between cells, and agrees with its neighbor processes on domain-wide ids.
//!
//! ## Features
//! - Table-driven neighbor derivation on refinement, constant work per neighbor slot
//! - Same-level neighborhoods of order 1 to 3
//! - Facets and (3D) edges with a unique owning cell
//! - Several activation patterns sharing one tree
//! - Compact pedigree paths naming a cell independently of local memory layout
//! - Pluggable communication backends (serial, threads, MPI) for id synchronization
//!
//! ## Determinism
//!
//! Domain ids are a function of `(level, ijk)` and global ids are assigned in domain id
//! order, so results do not depend on the order in which cells were created.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! background-mesh = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```

pub mod algs;
pub mod config;
pub mod debug_invariants;
pub mod forest;
pub mod mesh;
pub mod mesh_error;
pub mod pedigree;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::config::MeshConfig;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::forest::{Forest, RootSpec};
    pub use crate::mesh::{BackgroundMesh, SyncSummary, VertexKey};
    pub use crate::mesh_error::{InvariantKind, MeshError};
    pub use crate::pedigree::PedigreePath;
    pub use crate::topology::{
        BackgroundCell, CellIndex, CellType, Dimension, Edge, EdgeIndex, Facet, FacetIndex,
        PatternState,
    };
}
