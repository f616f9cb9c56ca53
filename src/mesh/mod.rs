//! Distributed background mesh driver.
//!
//! [`BackgroundMesh`] ties one rank's [`Forest`] to its place in the domain decomposition and
//! to a [`Communicator`]. Every collective method must be called by all ranks in the same
//! order; each method drains all of its messages before returning.
//!
//! A typical cycle:
//!
//! ```
//! use background_mesh::prelude::*;
//!
//! let config = MeshConfig::new(&[4, 4]);
//! let mut mesh = BackgroundMesh::new(config, NoComm)?;
//! let first = mesh.forest().roots()[0];
//! mesh.flag_for_refinement(first, 0)?;
//! mesh.perform_refinement(0)?;
//! let summary = mesh.synchronize(0)?;
//! assert_eq!(summary.cells, 16 - 1 + 4);
//! # Ok::<(), MeshError>(())
//! ```

mod decomposition;
mod numbering;
mod refinement;
mod vertices;

pub use decomposition::Decomposition;
pub use vertices::{VertexKey, VertexNumbering};

use crate::algs::communicator::{Communicator, SyncTags};
use crate::config::MeshConfig;
use crate::forest::Forest;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use crate::topology::handle::CellIndex;

/// Collective phases; each gets its own block of message tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum SyncPhase {
    Refinement = 0,
    Facets = 1,
    Edges = 2,
    Cells = 3,
    Vertices = 4,
}

/// Global entity counts after a full [`BackgroundMesh::synchronize`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cells: u64,
    pub facets: u64,
    /// Zero below three dimensions.
    pub edges: u64,
    pub vertices: u64,
}

/// One rank's part of a distributed background mesh.
pub struct BackgroundMesh<C: Communicator> {
    config: MeshConfig,
    comm: C,
    decomposition: Decomposition,
    proc_neighbors: Vec<usize>,
    forest: Forest,
    vertices: VertexNumbering,
}

impl<C: Communicator> BackgroundMesh<C> {
    /// Builds this rank's level-0 cells: the owned box, the aura around it and the padding
    /// layers next to it.
    pub fn new(config: MeshConfig, comm: C) -> Result<Self, MeshError> {
        config.validate()?;
        let dim = config.dimension()?;
        let decomposition = Decomposition::new(&config, comm.rank(), comm.size())?;
        let forest = Forest::from_roots(
            dim,
            &decomposition.padded_extent(),
            config.activation_patterns,
            decomposition.local_roots(),
        )?
        .with_max_level(config.max_refinement_level);
        let proc_neighbors = decomposition.proc_neighbors(comm.size());
        log::info!(
            "rank {}/{}: {}D background mesh with {} roots, proc grid {:?}, neighbors {:?}",
            comm.rank(),
            comm.size(),
            dim.get(),
            forest.roots().len(),
            decomposition.proc_dims(),
            proc_neighbors
        );
        Ok(BackgroundMesh {
            config,
            comm,
            decomposition,
            proc_neighbors,
            forest,
            vertices: VertexNumbering::default(),
        })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    /// Ranks this rank exchanges messages with, ascending.
    pub fn proc_neighbors(&self) -> &[usize] {
        &self.proc_neighbors
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Direct access for local edits. Structural changes must be mirrored on every rank
    /// storing the affected cells.
    pub fn forest_mut(&mut self) -> &mut Forest {
        &mut self.forest
    }

    pub fn cell_type(&self) -> CellType {
        CellType::for_dimension(self.forest.dimension())
    }

    /// Owned, non-padding cells active on `pattern`, in domain id order.
    pub fn owned_active_cells(&self, pattern: usize) -> Result<Vec<CellIndex>, MeshError> {
        let me = self.rank();
        let mut cells: Vec<CellIndex> = self
            .forest
            .active_cells(pattern)?
            .into_iter()
            .filter(|&c| {
                let cell = &self.forest[c];
                cell.owner() == me && !cell.is_padding()
            })
            .collect();
        cells.sort_by_key(|&c| self.forest[c].domain_id());
        Ok(cells)
    }

    /// Rebuilds every facet of the forest.
    pub fn create_facets(&mut self) -> Result<usize, MeshError> {
        self.forest.create_all_facets()
    }

    /// Rebuilds every edge of a 3D forest.
    pub fn create_edges(&mut self) -> Result<usize, MeshError> {
        self.forest.create_all_edges()
    }

    /// Creates facets (and edges in 3D) and assigns domain-wide ids to facets, edges, the
    /// active cells of `pattern` and their vertices.
    pub fn synchronize(&mut self, pattern: usize) -> Result<SyncSummary, MeshError> {
        self.create_facets()?;
        let facets = self.synchronize_facet_ids()?;
        let edges = if self.forest.dimension().get() == 3 {
            self.create_edges()?;
            self.synchronize_edge_ids()?
        } else {
            0
        };
        let cells = self.update_domain_indices(pattern)?;
        let vertices = self.number_vertices(pattern)?;
        let summary = SyncSummary {
            cells,
            facets,
            edges,
            vertices,
        };
        log::info!("rank {}: synchronized {:?}", self.rank(), summary);
        Ok(summary)
    }

    pub(crate) fn tags(&self, phase: SyncPhase) -> SyncTags {
        SyncTags::from_base(self.config.sync_tag().offset(4 * phase as u16))
    }
}
