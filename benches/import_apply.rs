use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use index_remap::prelude::*;

fn shuffled_partition(n: u64, seed: u64) -> Arc<IndexPartition> {
    let mut ids: Vec<u64> = (0..n).collect();
    ids.shuffle(&mut SmallRng::seed_from_u64(seed));
    Arc::new(IndexPartition::from_global_ids(None, ids, 0, &NoComm).expect("valid ids"))
}

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");
    for &n in &[1_000u64, 100_000] {
        let source = Arc::new(IndexPartition::contiguous(None, n as usize, 0, &NoComm).expect("partition"));
        let target = shuffled_partition(n, 7);
        group.bench_with_input(BenchmarkId::new("serial_import", n), &n, |b, _| {
            b.iter(|| black_box(Import::new(source.clone(), target.clone(), &NoComm).expect("import")));
        });
    }
    group.finish();
}

fn bench_repeated_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("do_import");
    for &(n, cols) in &[(10_000u64, 1usize), (10_000, 4), (100_000, 1)] {
        let source = Arc::new(IndexPartition::contiguous(None, n as usize, 0, &NoComm).expect("partition"));
        let target = shuffled_partition(n, 11);
        let import = Import::new(source.clone(), target.clone(), &NoComm).expect("import");
        let x = MultiVector::from_fn(source, cols, |g, c| g as f64 + c as f64).expect("source vector");
        let mut y = MultiVector::<f64>::new(target, cols).expect("target vector");

        group.bench_function(BenchmarkId::new(format!("n{n}"), cols), |b| {
            b.iter(|| {
                y.do_import(&x, &import, CombineMode::Replace, &NoComm)
                    .expect("transfer");
                black_box(y.get(0, 0).expect("entry"));
            });
        });
    }
    group.finish();
}

fn bench_threaded_halo(c: &mut Criterion) {
    let mut group = c.benchmark_group("threaded_halo");
    let ranks = 4;
    let per_rank = 5_000u64;
    group.bench_function(BenchmarkId::new("ranks", ranks), |b| {
        b.iter(|| {
            let world = RayonComm::world(ranks);
            std::thread::scope(|s| {
                for comm in &world {
                    s.spawn(move || {
                        let r = comm.rank() as u64;
                        let mine = Arc::new(
                            IndexPartition::uniform(per_rank * ranks as u64, 0, comm).expect("partition"),
                        );
                        // own block plus one ghost on each side
                        let lo = (r * per_rank).saturating_sub(1);
                        let hi = ((r + 1) * per_rank + 1).min(per_rank * ranks as u64);
                        let halo = Arc::new(
                            IndexPartition::from_global_ids(None, (lo..hi).collect(), 0, comm).expect("halo"),
                        );
                        let import = Import::new(mine.clone(), halo.clone(), comm).expect("import");
                        let x = MultiVector::from_fn(mine, 1, |g, _| g as f64).expect("vector");
                        let mut y = MultiVector::<f64>::new(halo, 1).expect("vector");
                        y.do_import(&x, &import, CombineMode::Replace, comm).expect("transfer");
                        black_box(y.get(0, 0).expect("entry"));
                    });
                }
            });
        });
    });
    group.finish();
}

criterion_group!(benches, bench_plan_build, bench_repeated_import, bench_threaded_halo);
criterion_main!(benches);
