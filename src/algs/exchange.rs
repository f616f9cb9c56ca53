//! Symmetric point-to-point exchange with neighbor ranks.
//!
//! Every exchange runs in two stages: byte counts first, then the payloads. Both stages post
//! all receives and sends before waiting, and every handle is drained before returning, even
//! when an error was detected; the first error is reported.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshError;
use std::collections::HashMap;

/// Exchanges payload sizes with every rank in `neighbors`. A neighbor without an entry in
/// `lengths` is told to expect nothing. Returns `neighbor → incoming length`.
pub fn exchange_sizes<C>(
    lengths: &HashMap<usize, usize>,
    comm: &C,
    tag: CommTag,
    neighbors: &[usize],
) -> Result<HashMap<usize, usize>, MeshError>
where
    C: Communicator,
{
    let mut recv_size = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(
            nbr,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.push((nbr, h));
    }

    let mut pending_sends = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let count = WireCount::new(lengths.get(&nbr).copied().unwrap_or(0));
        pending_sends.push(comm.isend(nbr, tag.as_u16(), cast_slice(std::slice::from_ref(&count))));
    }

    let mut sizes_in = HashMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recv_size {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                let mut cnt = WireCount::new(0);
                cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                sizes_in.insert(nbr, cnt.get());
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(MeshError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: std::mem::size_of::<WireCount>(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshError::CommError {
                    neighbor: nbr,
                    message: format!("failed to receive size from rank {nbr}"),
                });
            }
            _ => {}
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

/// Sends `outgoing[nbr]` to every neighbor and returns what each neighbor sent back.
/// Neighbors absent from `outgoing` receive an empty message.
pub fn exchange_bytes<C>(
    outgoing: &HashMap<usize, Vec<u8>>,
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
    neighbors: &[usize],
) -> Result<HashMap<usize, Vec<u8>>, MeshError>
where
    C: Communicator,
{
    let lengths: HashMap<usize, usize> = outgoing.iter().map(|(&r, v)| (r, v.len())).collect();
    let sizes = exchange_sizes(&lengths, comm, size_tag, neighbors)?;

    let mut recvs = Vec::new();
    for &nbr in neighbors {
        let len = sizes.get(&nbr).copied().unwrap_or(0);
        if len > 0 {
            let mut buf = vec![0u8; len];
            recvs.push((nbr, len, comm.irecv(nbr, data_tag.as_u16(), &mut buf)));
        }
    }
    let mut pending_sends = Vec::new();
    for &nbr in neighbors {
        if let Some(data) = outgoing.get(&nbr).filter(|d| !d.is_empty()) {
            pending_sends.push(comm.isend(nbr, data_tag.as_u16(), data));
        }
    }

    let mut incoming: HashMap<usize, Vec<u8>> = neighbors.iter().map(|&n| (n, Vec::new())).collect();
    let mut maybe_err = None;
    for (nbr, len, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == len => {
                incoming.insert(nbr, data);
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(MeshError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: len,
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshError::CommError {
                    neighbor: nbr,
                    message: format!("failed to receive {len} bytes from rank {nbr}"),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::RayonComm;

    #[test]
    fn ring_exchange() {
        let world = RayonComm::world(3);
        let got: Vec<HashMap<usize, Vec<u8>>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let me = comm.rank();
                        let nbrs: Vec<usize> = (0..3).filter(|&r| r != me).collect();
                        let mut out = HashMap::new();
                        // only send to the next rank; the previous one gets an empty message
                        out.insert((me + 1) % 3, vec![me as u8; me + 1]);
                        exchange_bytes(&out, comm, CommTag::new(10), CommTag::new(11), &nbrs)
                            .unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(got[1][&0], vec![0]);
        assert_eq!(got[2][&1], vec![1, 1]);
        assert_eq!(got[0][&2], vec![2, 2, 2]);
        assert!(got[0][&1].is_empty());
    }
}
