#![cfg(feature = "mpi-support")]
//! Run under `mpirun -n <p>`; a single process exercises the serial path.

use std::sync::Arc;

use index_remap::prelude::*;

// MPI can be initialized once per process, so everything lives in one test.
#[test]
fn mpi_import_export_round_trip() {
    let comm = MpiComm::new().expect("MPI init");
    let p = comm.size() as u64;
    let r = comm.rank() as u64;

    let source = Arc::new(IndexPartition::uniform(8 * p, 0, &comm).unwrap());
    let target = Arc::new(
        IndexPartition::from_global_ids(None, (0..8 * p).filter(|g| g % p == r).collect(), 0, &comm).unwrap(),
    );
    let import = Import::new(source.clone(), target.clone(), &comm).unwrap();
    assert_eq!(
        import.num_same() + import.num_permute() + import.num_remote(),
        target.local_count()
    );

    let x = MultiVector::from_fn(source.clone(), 2, |g, c| g as f64 * 10.0 + c as f64).unwrap();
    let mut y = MultiVector::<f64>::new(target.clone(), 2).unwrap();
    y.do_import(&x, &import, CombineMode::Replace, &comm).unwrap();
    for (lid, gid) in target.global_ids().enumerate() {
        assert_eq!(y.get(lid, 1).unwrap(), gid as f64 * 10.0 + 1.0);
    }

    let mut back = MultiVector::<f64>::new(source, 2).unwrap();
    back.do_export(&y, &import, CombineMode::Add, &comm).unwrap();
    assert_eq!(back.column(0).unwrap(), x.column(0).unwrap());

    comm.barrier().unwrap();
}
