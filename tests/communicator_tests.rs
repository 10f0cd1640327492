use index_remap::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};

mod util;
use util::run_ranks;

#[test]
fn rayon_round_trip() {
    let tag = CommTag::new(0x1000);
    let world = RayonComm::world(2);

    let msg = b"hello";
    world[0].isend(1, tag.as_u16(), msg);

    let mut buf = [0u8; 5];
    let h = world[1].irecv(0, tag.as_u16(), &mut buf);
    assert_eq!(&h.wait().unwrap(), msg);
}

#[test]
fn rayon_fifo_order() {
    let tag = CommTag::new(0x1001);
    let world = RayonComm::world(2);

    for i in 0..10u8 {
        world[0].isend(1, tag.as_u16(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        out.push(world[1].irecv(0, tag.as_u16(), &mut b).wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
fn tags_do_not_mix() {
    let world = RayonComm::world(2);
    world[0].isend(1, 1, &[1]);
    world[0].isend(1, 2, &[2]);
    let mut b = [0u8; 1];
    assert_eq!(world[1].irecv(0, 2, &mut b).wait().unwrap(), vec![2]);
    assert_eq!(world[1].irecv(0, 1, &mut b).wait().unwrap(), vec![1]);
}

#[test]
fn allgather_four_ranks() {
    let gathered = run_ranks(4, |comm| {
        let mut out = vec![0u8; 8];
        let me = comm.rank() as u8;
        comm.allgather(&[me, me * 2], &mut out).unwrap();
        out
    });
    for g in gathered {
        assert_eq!(g, vec![0, 0, 1, 2, 2, 4, 3, 6]);
    }
}

#[test]
fn repeated_barriers_stay_in_step() {
    let done = run_ranks(3, |comm| {
        for _ in 0..20 {
            comm.barrier().unwrap();
        }
        true
    });
    assert!(done.into_iter().all(|d| d));
}

#[test]
fn no_comm_is_a_group_of_one() {
    assert_eq!(NoComm.rank(), 0);
    assert_eq!(NoComm.size(), 1);
    assert!(NoComm.is_no_comm());
}
