use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use background_mesh::forest::Forest;
use background_mesh::pedigree::PedigreePath;
use background_mesh::topology::{CellIndex, Dimension};

/// Refines every active cell of a uniform grid `levels` times.
fn refine_uniformly(dim: Dimension, extent: &[u64], levels: u8) -> Forest {
    let mut f = Forest::uniform(dim, extent, 1).expect("valid grid");
    for _ in 0..levels {
        for c in f.active_cells(0).expect("pattern 0") {
            f.refine_on_pattern(c, 0).expect("refinable");
        }
    }
    f
}

fn bench_refine(c: &mut Criterion) {
    let mut group = c.benchmark_group("refine");
    for &levels in &[2u8, 3u8] {
        group.bench_with_input(BenchmarkId::new("quad_8x8", levels), &levels, |b, &l| {
            b.iter(|| black_box(refine_uniformly(Dimension::Two, &[8, 8], l)))
        });
        group.bench_with_input(BenchmarkId::new("oct_4x4x4", levels), &levels, |b, &l| {
            b.iter(|| black_box(refine_uniformly(Dimension::Three, &[4, 4, 4], l)))
        });
    }
    group.finish();
}

fn bench_facets(c: &mut Criterion) {
    let mut f = refine_uniformly(Dimension::Three, &[4, 4, 4], 2);
    c.bench_function("create_all_facets_oct", |b| {
        b.iter(|| black_box(f.create_all_facets().expect("facets")))
    });
    c.bench_function("create_all_edges_oct", |b| {
        b.iter(|| black_box(f.create_all_edges().expect("edges")))
    });
}

fn bench_pedigree(c: &mut Criterion) {
    let f = refine_uniformly(Dimension::Three, &[2, 2, 2], 4);
    let leaves: Vec<CellIndex> = f.active_cells(0).expect("pattern 0");
    c.bench_function("pedigree_round_trip", |b| {
        b.iter(|| {
            for &leaf in &leaves {
                let p = PedigreePath::encode(&f, leaf).expect("encode");
                black_box(p.decode(&f).expect("decode"));
            }
        })
    });
}

fn bench_neighborhood(c: &mut Criterion) {
    let f = refine_uniformly(Dimension::Two, &[8, 8], 2);
    let cells = f.active_cells(0).expect("pattern 0");
    let mut group = c.benchmark_group("neighbors_from_same_level");
    for order in 1..=3usize {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &o| {
            b.iter(|| {
                for &cell in &cells {
                    black_box(f.neighbors_from_same_level(cell, o).expect("order"));
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_refine, bench_facets, bench_pedigree, bench_neighborhood);
criterion_main!(benches);
