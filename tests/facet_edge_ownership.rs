//! Every facet and edge is stored once and owned by exactly one cell.
mod util;

use background_mesh::debug_invariants::DebugInvariants;
use background_mesh::forest::Forest;
use std::collections::HashMap;
use util::{at, forest};

fn check_facets(f: &Forest) {
    let mut owners: HashMap<usize, usize> = HashMap::new();
    for cell in f.cells() {
        for (slot, fi) in cell.facets().iter().enumerate() {
            let fi = fi.expect("every slot filled after create_all_facets");
            let facet = f.facet(fi).unwrap();
            assert_eq!(facet.slot_on(cell.memory_index()), Some(slot));
            if cell.owns_facet(slot) {
                *owners.entry(fi.get()).or_default() += 1;
                assert_eq!(facet.master(), cell.memory_index());
            }
        }
    }
    assert_eq!(owners.len(), f.number_of_facets());
    assert!(owners.values().all(|&n| n == 1));
}

#[test]
fn facets_of_a_graded_quadtree() {
    let mut f = forest(&[3, 3]);
    let c = at(&f, 0, [1, 1, 0]);
    let kids = f.refine_on_pattern(c, 0).unwrap();
    f.refine_on_pattern(kids[3], 0).unwrap();
    f.create_all_facets().unwrap();
    check_facets(&f);
    f.validate_invariants().unwrap();

    // transition facets are owned by the finer cell and have no slave
    let fine = at(&f, 1, [2, 2, 0]);
    let west = f[fine].facet(0).unwrap().unwrap();
    let facet = f.facet(west).unwrap();
    assert_eq!(facet.master(), fine);
    assert!(facet.is_boundary());

    // same-level facets point at both sides, lower domain id first
    let left = at(&f, 1, [2, 3, 0]);
    let right = at(&f, 1, [3, 3, 0]);
    let shared = f[left].facet(1).unwrap().unwrap();
    let facet = f.facet(shared).unwrap();
    assert_eq!(facet.master(), left);
    assert_eq!(facet.slave(), Some(right));
    assert_eq!(facet.index_on_slave(), Some(0));
}

#[test]
fn rebuilding_facets_is_stable() {
    let mut f = forest(&[2, 2]);
    f.refine_on_pattern(at(&f, 0, [0, 1, 0]), 0).unwrap();
    let first = f.create_all_facets().unwrap();
    let second = f.create_all_facets().unwrap();
    assert_eq!(first, second);
    assert_eq!(f.number_of_facets(), first);
    check_facets(&f);
}

#[test]
fn edges_of_a_refined_octree() {
    let mut f = forest(&[2, 1, 1]);
    f.refine_on_pattern(at(&f, 0, [0, 0, 0]), 0).unwrap();
    f.create_all_facets().unwrap();
    f.create_all_edges().unwrap();
    f.validate_invariants().unwrap();

    let mut owned = 0;
    for cell in f.cells() {
        for (e, ei) in cell.edges().iter().enumerate() {
            let edge = f.edge(ei.expect("edge slot filled")).unwrap();
            assert!(edge.contains(cell.memory_index()));
            assert!(edge.count() <= 4);
            if cell.owns_edge(e) {
                owned += 1;
                assert_eq!(edge.owner_cell(), cell.memory_index());
                assert_eq!(edge.index_on_owner(), e);
            }
        }
    }
    assert_eq!(owned, f.number_of_edges());

    // the centre edge of the refined cell along z is shared by all four lower children
    let child = at(&f, 1, [0, 0, 0]);
    // edge 8 + 3: along z, high in x and y
    let centre = f[child].edge(11).unwrap().unwrap();
    assert_eq!(f.edge(centre).unwrap().count(), 4);
}

#[test]
fn discarding_children_releases_their_entities() {
    let mut f = forest(&[2, 2, 1]);
    let a = at(&f, 0, [0, 0, 0]);
    f.refine_on_pattern(a, 0).unwrap();
    f.create_all_facets().unwrap();
    f.create_all_edges().unwrap();
    let facets = f.number_of_facets();

    f.coarsen_on_pattern(a, 0).unwrap();
    assert_eq!(f.discard_children(a).unwrap(), 8);
    assert!(!f[a].has_children());
    assert!(f.number_of_facets() < facets);
    assert_eq!(f.len(), 4);
    f.validate_invariants().unwrap();

    // the coarse grid is complete again after a rebuild
    f.create_all_facets().unwrap();
    f.create_all_edges().unwrap();
    // 2x2x1 cells: 3*2*1 + 2*3*1 + 2*2*2 facets
    assert_eq!(f.number_of_facets(), 6 + 6 + 8);
}
