// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tether_index::{Aabb2D, Backend, BvhProxyTree, FlatProxyTree, Proxy, ProxyTree};

fn gen_grid_rects(n: usize, cell: f64) -> Vec<Aabb2D<f64>> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            out.push(Aabb2D::<f64>::from_xywh(
                x as f64 * cell,
                y as f64 * cell,
                cell * 0.8,
                cell * 0.8,
            ));
        }
    }
    out
}

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1_u64 << 53) as f64)
    }
}

fn gen_clustered_rects(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<Aabb2D<f64>> {
    let mut rng = Rng(0xC1A5_7E55_9999_ABCD);
    let centers: Vec<_> = (0..n_clusters)
        .map(|_| (rng.next_f64() * 2000.0, rng.next_f64() * 2000.0))
        .collect();
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    for (cx, cy) in centers {
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            out.push(Aabb2D::<f64>::from_xywh(cx + dx, cy + dy, 1.0, 1.0));
        }
    }
    out
}

fn fill<B: Backend<f64>>(tree: &mut ProxyTree<f64, u32, B>, rects: &[Aabb2D<f64>]) -> Vec<Proxy> {
    rects
        .iter()
        .enumerate()
        .map(|(i, r)| tree.create_proxy(*r, i as u32))
        .collect()
}

fn count_hits<B: Backend<f64>>(
    tree: &ProxyTree<f64, u32, B>,
    q: Aabb2D<f64>,
    approximate: bool,
) -> usize {
    let mut hits = 0;
    tree.query(q, approximate, |_, _| {
        hits += 1;
        true
    });
    hits
}

fn bench_build_and_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_query");
    for &n in &[32_usize, 64, 128] {
        let rects = gen_grid_rects(n, 1.0);
        let q = Aabb2D::<f64>::from_xywh(10.0, 10.0, 20.0, 20.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("flatvec_n{n}"), |b| {
            b.iter_batched(
                || FlatProxyTree::<f64, u32>::new(0.1),
                |mut tree| {
                    fill(&mut tree, &rects);
                    black_box(count_hits(&tree, q, false));
                },
                BatchSize::SmallInput,
            );
        });
        group.bench_function(format!("bvh_n{n}"), |b| {
            b.iter_batched(
                || BvhProxyTree::<f64, u32>::new(0.1),
                |mut tree| {
                    fill(&mut tree, &rects);
                    black_box(count_hits(&tree, q, false));
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

// Small jitters stay inside the fattened boxes; only some proxies reinsert.
fn bench_jitter_moves(c: &mut Criterion) {
    let mut group = c.benchmark_group("jitter_moves");
    let rects = gen_grid_rects(64, 1.0);
    group.throughput(Throughput::Elements(rects.len() as u64));
    group.bench_function("bvh_margin_0.1", |b| {
        b.iter_batched(
            || {
                let mut tree = BvhProxyTree::<f64, u32>::new(0.1);
                let proxies = fill(&mut tree, &rects);
                (tree, proxies)
            },
            |(mut tree, proxies)| {
                let mut moved = 0;
                for (j, (p, r)) in proxies.iter().zip(&rects).enumerate() {
                    let d = ((j % 7) as f64 - 3.0) * 0.05;
                    let next = Aabb2D::new(r.min_x + d, r.min_y, r.max_x + d, r.max_y);
                    if tree.move_proxy(*p, next, (d, 0.0)) {
                        moved += 1;
                    }
                }
                black_box(moved);
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_many_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_queries");
    let rects = gen_clustered_rects(16, 256, 128.0);
    let mut bvh = BvhProxyTree::<f64, u32>::new(0.1);
    fill(&mut bvh, &rects);
    let mut flat = FlatProxyTree::<f64, u32>::new(0.1);
    fill(&mut flat, &rects);
    let queries: Vec<_> = (0..256)
        .map(|q| {
            let (x, y) = ((q % 16) as f64 * 125.0, (q / 16) as f64 * 125.0);
            Aabb2D::<f64>::from_xywh(x, y, 64.0, 64.0)
        })
        .collect();
    for approximate in [false, true] {
        let mode = if approximate { "approximate" } else { "exact" };
        group.bench_function(format!("bvh_{mode}"), |b| {
            b.iter(|| queries.iter().map(|q| count_hits(&bvh, *q, approximate)).sum::<usize>());
        });
        group.bench_function(format!("flatvec_{mode}"), |b| {
            b.iter(|| queries.iter().map(|q| count_hits(&flat, *q, approximate)).sum::<usize>());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_and_query, bench_jitter_moves, bench_many_queries);
criterion_main!(benches);
