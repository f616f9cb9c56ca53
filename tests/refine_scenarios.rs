//! Refinement scenarios on small uniform grids.
mod util;

use background_mesh::debug_invariants::DebugInvariants;
use background_mesh::topology::tables::child_from_bits;
use background_mesh::topology::PatternState;
use util::{at, forest};

#[test]
fn two_by_two_refine_one_corner() {
    let mut f = forest(&[2, 2]);
    let a = at(&f, 0, [0, 0, 0]);
    f.refine_on_pattern(a, 0).unwrap();

    assert_eq!(f.count_elements_on_level(0), 4);
    assert_eq!(f.count_elements_on_level(1), 4);
    assert_eq!(f.count_descendants(a).unwrap(), 1 + 4);
    f.validate_invariants().unwrap();

    // a's east children see the coarse neighbor until it is refined too
    let b = at(&f, 0, [1, 0, 0]);
    let a_east = at(&f, 1, [1, 0, 0]);
    assert_eq!(f[a_east].neighbor(1).unwrap(), Some(b));

    f.refine_on_pattern(b, 0).unwrap();
    let b_west = at(&f, 1, [2, 0, 0]);
    assert_eq!(f[a_east].neighbor(1).unwrap(), Some(b_west));
    assert_eq!(f[b_west].neighbor(0).unwrap(), Some(a_east));
    let a_ne = at(&f, 1, [1, 1, 0]);
    let b_nw = at(&f, 1, [2, 1, 0]);
    assert_eq!(f[a_ne].neighbor(1).unwrap(), Some(b_nw));
    // diagonal (+1, -1) from a's upper east child
    let slot = f.tables().slot_of(&[1, -1, 0]).unwrap();
    assert_eq!(f[a_ne].neighbor(slot).unwrap(), Some(b_west));
    f.validate_invariants().unwrap();
}

#[test]
fn single_hexahedron_children_see_only_siblings() {
    let mut f = forest(&[1, 1, 1]);
    let root = f.roots()[0];
    let children = f.refine_on_pattern(root, 0).unwrap();
    assert_eq!(children.len(), 8);

    let tables = f.tables();
    for (k, &c) in children.iter().enumerate() {
        let bits = [k & 1, (k >> 1) & 1, (k >> 2) & 1];
        for s in 0..26 {
            let off = tables.neighbor_offset(s);
            let target: Vec<i64> = (0..3).map(|a| bits[a] as i64 + off[a] as i64).collect();
            let inside = target.iter().all(|&t| (0..=1).contains(&t));
            let got = f[c].neighbor(s).unwrap();
            if inside {
                let sibling = child_from_bits(&[target[0], target[1], target[2]]);
                assert_eq!(got, Some(children[sibling]), "child {k} slot {s}");
            } else {
                assert_eq!(got, None, "child {k} slot {s}");
            }
        }
    }
}

#[test]
fn fan_out_and_pattern_states_hold_after_mixed_refinement() {
    let mut f = forest(&[3, 2]);
    let c = at(&f, 0, [1, 1, 0]);
    let kids = f.refine_on_pattern(c, 0).unwrap();
    f.refine_on_pattern(kids[0], 0).unwrap();
    f.refine_on_pattern(at(&f, 0, [0, 0, 0]), 0).unwrap();

    for cell in f.cells() {
        if cell.has_children() {
            assert_eq!(cell.number_of_children(), 4);
        }
        let st = cell.state(0).unwrap();
        assert!(!(cell.is_active(0) && cell.is_refined(0)));
        if cell.has_children() && st != PatternState::Refined {
            panic!("cell {} has children but is {st:?}", cell.domain_id());
        }
    }
    f.validate_invariants().unwrap();
}

#[test]
fn same_level_neighbors_are_symmetric() {
    let mut f = forest(&[3, 3]);
    for ijk in [[0, 0, 0], [1, 0, 0], [1, 1, 0]] {
        let c = at(&f, 0, ijk);
        f.refine_on_pattern(c, 0).unwrap();
    }
    let tables = f.tables();
    for cell in f.cells() {
        for (s, n) in cell.neighbors().iter().enumerate() {
            let Some(n) = *n else { continue };
            if f[n].level() == cell.level() {
                assert_eq!(
                    f[n].neighbor(tables.opposite(s)).unwrap(),
                    Some(cell.memory_index())
                );
            } else {
                assert!(f[n].level() < cell.level());
            }
        }
    }
}

#[test]
fn neighborhood_orders_grow_the_stencil() {
    let f = forest(&[7, 7]);
    let centre = at(&f, 0, [3, 3, 0]);
    for order in 1..=3 {
        let hood = f.neighbors_from_same_level(centre, order).unwrap();
        let side = 2 * order + 1;
        assert_eq!(hood.len(), side * side - 1);
        assert!(hood.iter().all(Option::is_some));
    }
    // near the corner the stencil is clipped by the domain
    let corner = at(&f, 0, [0, 0, 0]);
    let hood = f.neighbors_from_same_level(corner, 2).unwrap();
    assert_eq!(hood.iter().flatten().count(), 3 * 3 - 1);
    assert!(f.neighbors_from_same_level(corner, 4).is_err());
}
