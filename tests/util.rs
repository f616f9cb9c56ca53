#![allow(dead_code)]
use background_mesh::{
    algs::communicator::RayonComm,
    config::MeshConfig,
    forest::Forest,
    mesh::BackgroundMesh,
    topology::{CellIndex, Dimension},
};

/// Uniform single-pattern forest over `extent` level-0 cells.
pub fn forest(extent: &[u64]) -> Forest {
    let dim = Dimension::new(extent.len()).unwrap();
    Forest::uniform(dim, extent, 1).unwrap()
}

/// Runs `f` once per rank of a fresh `size`-rank world, each rank on its own thread, and
/// returns the results in rank order.
pub fn run_ranks<R, F>(size: usize, config: &MeshConfig, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(BackgroundMesh<RayonComm>) -> R + Sync,
{
    let world = RayonComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                let f = &f;
                let cfg = config.clone();
                s.spawn(move || f(BackgroundMesh::new(cfg, comm).unwrap()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Cell at `ijk` on `level`, panicking if it is not stored.
pub fn at(forest: &Forest, level: u8, ijk: [u64; 3]) -> CellIndex {
    forest
        .locate(level, &ijk)
        .unwrap_or_else(|| panic!("no cell at level {level} {ijk:?}"))
}

