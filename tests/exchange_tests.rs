use std::collections::HashMap;

use background_mesh::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
use background_mesh::algs::exchange::{exchange_bytes, exchange_sizes};
use background_mesh::algs::wire::{decode_requests, encode_requests};
use background_mesh::algs::IdRequest;
use background_mesh::mesh_error::MeshError;
use background_mesh::pedigree::PedigreePath;
use background_mesh::topology::Dimension;

#[test]
fn commtag_offset_wraps() {
    let t = CommTag::new(u16::MAX).offset(1);
    assert_eq!(t.as_u16(), 0);
}

#[test]
fn zero_neighbors() {
    let lengths: HashMap<usize, usize> = HashMap::new();
    let res = exchange_sizes(&lengths, &NoComm, CommTag::new(0x10), &[]);
    assert!(res.unwrap().is_empty());
}

#[test]
fn truncation_is_ok() {
    let world = RayonComm::world(2);
    world[0].isend(1, 9, &[1, 2, 3, 4, 5, 6]);
    let mut b = [0u8; 4];
    let got = world[1].irecv(0, 9, &mut b).wait().unwrap();
    assert_eq!(got, vec![1, 2, 3, 4]);
}

#[test]
fn malformed_size_is_reported_after_draining() {
    let tag = CommTag::new(0x12);
    let world = RayonComm::world(3);
    // rank 1 sends a 3-byte count, rank 2 a proper one
    world[1].isend(0, tag.as_u16(), &[1, 2, 3]);
    world[2].isend(0, tag.as_u16(), &0u32.to_le_bytes());

    let lengths: HashMap<usize, usize> = HashMap::new();
    let err = exchange_sizes(&lengths, &world[0], tag, &[1, 2]).unwrap_err();
    assert_eq!(
        err,
        MeshError::BufferSizeMismatch {
            neighbor: 1,
            expected: 4,
            got: 3
        }
    );
    // our own counts went out to both neighbors
    let mut b = [0u8; 4];
    assert_eq!(world[1].irecv(0, tag.as_u16(), &mut b).wait(), Some(vec![0; 4]));
    assert_eq!(world[2].irecv(0, tag.as_u16(), &mut b).wait(), Some(vec![0; 4]));
}

#[test]
fn payloads_cross_a_ring() {
    let size = 4;
    let world = RayonComm::world(size);
    let got: Vec<HashMap<usize, Vec<u8>>> = std::thread::scope(|s| {
        let hs: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let me = comm.rank();
                    let left = (me + size - 1) % size;
                    let right = (me + 1) % size;
                    let mut out = HashMap::new();
                    out.insert(right, vec![me as u8; me + 1]);
                    exchange_bytes(&out, comm, CommTag::new(20), CommTag::new(21), &[left, right])
                        .unwrap()
                })
            })
            .collect();
        hs.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (me, incoming) in got.iter().enumerate() {
        let left = (me + size - 1) % size;
        let right = (me + 1) % size;
        assert_eq!(incoming[&left], vec![left as u8; left + 1]);
        assert!(incoming[&right].is_empty());
    }
}

#[test]
fn request_streams_survive_the_wire() {
    let dim = Dimension::Three;
    let requests: Vec<IdRequest> = (0..5u8)
        .map(|level| IdRequest {
            path: PedigreePath::from_parts(
                7 + level as u64,
                level * 4,
                &vec![0xdead_beef; (level as usize * 12).div_ceil(32)],
                dim,
            )
            .unwrap(),
            slot: level as u32,
        })
        .collect();
    let bytes = encode_requests(&requests);
    assert_eq!(decode_requests(&bytes, dim).unwrap(), requests);
    assert!(decode_requests(&bytes[..bytes.len() - 1], dim).is_err());
    assert!(decode_requests(&[], dim).unwrap().is_empty());
}
