use std::sync::Arc;

use index_remap::prelude::*;

mod util;
use util::{listed, neighbors, run_ranks, uniform};

#[test]
fn classification_covers_target() {
    run_ranks(3, |comm| {
        let source = Arc::new(IndexPartition::contiguous(None, 10, 0, comm).unwrap());
        let target = uniform(15, comm);
        let import = Import::new(source, target.clone(), comm).unwrap();
        assert_eq!(
            import.num_same() + import.num_permute() + import.num_remote(),
            target.local_count()
        );
    });
}

#[test]
fn single_owner_source_to_one_id_per_rank() {
    let results = run_ranks(2, |comm| {
        let source = if comm.rank() == 0 { listed((0..10).collect(), comm) } else { listed(vec![], comm) };
        let target = listed(vec![comm.rank() as u64], comm);
        let import = Import::new(source.clone(), target.clone(), comm).unwrap();

        let x = MultiVector::<f64>::from_fn(source, 1, |g, _| 100.0 + g as f64).unwrap();
        let mut y = MultiVector::<f64>::new(target, 1).unwrap();
        y.do_import(&x, &import, CombineMode::Replace, comm).unwrap();
        (
            import.num_same(),
            import.num_remote(),
            import.remote_pids().to_vec(),
            y.get(0, 0).unwrap(),
        )
    });
    assert_eq!(results[0], (1, 0, vec![], 100.0));
    assert_eq!(results[1], (0, 1, vec![0], 101.0));
}

fn expected_neighbor_counts(comm: &RayonComm) -> (usize, usize, usize) {
    let r = comm.rank();
    let end = r == 0 || r == comm.size() - 1;
    let same = usize::from(r == 0);
    let permute = usize::from(r != 0);
    let remote = if end { 1 } else { 2 };
    (same, permute, remote)
}

fn value_of(gid: GlobalId) -> i64 {
    3 * gid as i64 + 1
}

#[test]
fn neighbors_forward() {
    run_ranks(4, |comm| {
        let mine = uniform(4, comm);
        let halo = neighbors(comm);
        let import = Import::new(mine.clone(), halo.clone(), comm).unwrap();

        let (same, permute, remote) = expected_neighbor_counts(comm);
        assert_eq!(import.num_same(), same);
        assert_eq!(import.num_permute(), permute);
        assert_eq!(import.num_remote(), remote);
        assert_eq!(import.num_export(), remote);

        let mv_mine = MultiVector::from_fn(mine.clone(), 2, |g, c| value_of(g) * (c as i64 + 1)).unwrap();
        let mut mv_halo = MultiVector::<i64>::new(halo.clone(), 2).unwrap();
        mv_halo.do_import(&mv_mine, &import, CombineMode::Replace, comm).unwrap();
        for (lid, gid) in halo.global_ids().enumerate() {
            assert_eq!(mv_halo.get(lid, 0).unwrap(), value_of(gid));
            assert_eq!(mv_halo.get(lid, 1).unwrap(), 2 * value_of(gid));
        }

        // sum every copy back onto its owner
        let mut summed = MultiVector::<i64>::new(mine, 2).unwrap();
        summed.do_export(&mv_halo, &import, CombineMode::Add, comm).unwrap();
        let copies = if remote == 1 { 2 } else { 3 };
        let gid = comm.rank() as u64;
        assert_eq!(summed.get(0, 0).unwrap(), copies * value_of(gid));
        assert_eq!(summed.get(0, 1).unwrap(), 2 * copies * value_of(gid));
    });
}

#[test]
fn neighbors_backward() {
    run_ranks(4, |comm| {
        let mine = uniform(4, comm);
        let halo = neighbors(comm);
        let export = Export::new(halo.clone(), mine.clone(), comm).unwrap();

        let (same, permute, remote) = expected_neighbor_counts(comm);
        assert_eq!(export.num_same(), same);
        assert_eq!(export.num_permute(), permute);
        assert_eq!(export.num_export(), remote);
        assert_eq!(export.num_remote(), remote);

        let mv_mine = MultiVector::from_fn(mine.clone(), 1, |g, _| value_of(g)).unwrap();
        let mut mv_halo = MultiVector::<i64>::new(halo.clone(), 1).unwrap();
        mv_halo.do_import(&mv_mine, &export, CombineMode::Replace, comm).unwrap();
        for (lid, gid) in halo.global_ids().enumerate() {
            assert_eq!(mv_halo.get(lid, 0).unwrap(), value_of(gid));
        }

        let mut summed = MultiVector::<i64>::new(mine, 1).unwrap();
        summed.do_export(&mv_halo, &export, CombineMode::Add, comm).unwrap();
        let copies = if remote == 1 { 2 } else { 3 };
        assert_eq!(summed.get(0, 0).unwrap(), copies * value_of(comm.rank() as u64));
    });
}

#[test]
fn abs_max_keeps_largest_magnitude_with_its_sign() {
    run_ranks(4, |comm| {
        let mine = uniform(4, comm);
        let halo = neighbors(comm);
        let import = Import::new(mine.clone(), halo.clone(), comm).unwrap();

        // each rank writes its own entry as 1 and its neighbors' as -(rank + 5)
        let r = comm.rank() as u64;
        let contributions =
            MultiVector::from_fn(halo, 1, |g, _| if g == r { 1.0 } else { -(r as f64 + 5.0) }).unwrap();
        let mut reduced = MultiVector::<f64>::new(mine, 1).unwrap();
        reduced
            .do_export(&contributions, &import, CombineMode::AbsMax, comm)
            .unwrap();
        // the highest-ranked neighbor holding this id wins
        let winner = if r + 1 < comm.size() as u64 { r + 1 } else { r - 1 };
        assert_eq!(reduced.get(0, 0).unwrap(), -(winner as f64 + 5.0));
    });
}

#[test]
fn abs_max_over_untouched_entries() {
    // source holds {r}, destination {r, (r + 1) % n}; the second entry is never sent
    let results = run_ranks(3, |comm| {
        let r = comm.rank() as u64;
        let n = comm.size() as u64;
        let src_part = uniform(n, comm);
        let dst_part = listed(vec![r, (r + 1) % n], comm);
        let export = Export::new(src_part.clone(), dst_part.clone(), comm).unwrap();
        let mut src = MultiVector::<f64>::new(src_part, 1).unwrap();
        src.put_scalar(-1.0);
        let mut dst = MultiVector::<f64>::new(dst_part, 1).unwrap();
        dst.put_scalar(-3.0);
        dst.do_export(&src, &export, CombineMode::AbsMax, comm).unwrap();
        (dst.get(0, 0).unwrap(), dst.get(1, 0).unwrap())
    });
    for r in results {
        assert_eq!(r, (-1.0, -3.0));
    }
}

#[test]
fn export_reverse_reports_owner_rank() {
    run_ranks(4, |comm| {
        let r = comm.rank() as u64;
        let from_ids: Vec<u64> = match r {
            0 => (0..=6).collect(),
            1 => (7..=12).collect(),
            2 => (13..=18).collect(),
            _ => (19..=24).collect(),
        };
        let to_ids: Vec<u64> = (0..25).filter(|g| g % 4 == r).collect();
        let from = listed(from_ids, comm);
        let to = listed(to_ids, comm);

        let importer = Import::new(from.clone(), to.clone(), comm).unwrap();
        let mut to_vec = MultiVector::<i64>::new(to, 1).unwrap();
        to_vec.put_scalar(r as i64);
        let mut from_vec = MultiVector::<i64>::new(from.clone(), 1).unwrap();
        from_vec.put_scalar(-1);
        from_vec
            .do_export(&to_vec, &importer, CombineMode::Replace, comm)
            .unwrap();

        for (lid, gid) in from.global_ids().enumerate() {
            assert_eq!(from_vec.get(lid, 0).unwrap(), (gid % 4) as i64, "gid {gid}");
        }
    });
}

#[test]
fn unmapped_target_id_fails_on_every_rank() {
    let results = run_ranks(3, |comm| {
        let source = uniform(6, comm);
        let mut ids: Vec<u64> = source.global_ids().collect();
        if comm.rank() == 1 {
            ids.push(100);
        }
        let target = listed(ids, comm);
        Import::new(source, target, comm).map(|_| ())
    });
    assert_eq!(results[0], Err(RemapError::PeerFailure { rank: 1 }));
    assert_eq!(
        results[1],
        Err(RemapError::UnmappedIdentifier { gid: 100, count: 1 })
    );
    assert_eq!(results[2], Err(RemapError::PeerFailure { rank: 1 }));
}

#[test]
fn export_with_unmapped_source_id_fails() {
    let results = run_ranks(2, |comm| {
        let source = uniform(4, comm);
        let target = listed(if comm.rank() == 0 { vec![0, 1, 2] } else { vec![] }, comm);
        Export::new(source, target, comm).map(|_| ())
    });
    assert_eq!(results[0], Err(RemapError::PeerFailure { rank: 1 }));
    assert_eq!(
        results[1],
        Err(RemapError::UnmappedIdentifier { gid: 3, count: 1 })
    );
}

#[test]
fn one_pattern_many_transfers() {
    run_ranks(3, |comm| {
        let source = uniform(12, comm);
        let target = util::round_robin(12, comm);
        let import = Import::new(source.clone(), target.clone(), comm).unwrap();
        for round in 0..5i64 {
            let x = MultiVector::from_fn(source.clone(), 1, |g, _| g as i64 * round).unwrap();
            let mut y = MultiVector::<i64>::new(target.clone(), 1).unwrap();
            y.do_import(&x, &import, CombineMode::Replace, comm).unwrap();
            for (lid, gid) in target.global_ids().enumerate() {
                assert_eq!(y.get(lid, 0).unwrap(), gid as i64 * round);
            }
        }
    });
}
