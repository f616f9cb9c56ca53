//! Pedigree-based id reconciliation between neighbor ranks.
//!
//! A rank that stores a copy of a shared entity it does not own asks the owner for the id:
//! it sends `(pedigree of a cell touching the entity, local slot of the entity on that
//! cell)`. The owner decodes the pedigree in its own forest, reads the id from the slot and
//! replies with the ids in request order.

use crate::algs::communicator::{Communicator, SyncTags};
use crate::algs::exchange::exchange_bytes;
use crate::algs::wire::{decode_ids, decode_requests, encode_ids, encode_requests};
use crate::mesh_error::MeshError;
use crate::pedigree::PedigreePath;
use crate::topology::dimension::Dimension;
use std::collections::HashMap;

/// One id request: the entity seen from `path`'s cell through local slot `slot`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdRequest {
    pub path: PedigreePath,
    pub slot: u32,
}

/// Sends `requests[nbr]` to each neighbor, answers the neighbors' requests with `resolve`
/// and returns the answers to our own requests, in request order.
///
/// `resolve(requesting_rank, request)` runs on the owner side. Every rank in `neighbors`
/// must call this collectively with the same tags.
pub fn reconcile_ids<C, F>(
    comm: &C,
    tags: SyncTags,
    dim: Dimension,
    neighbors: &[usize],
    requests: &HashMap<usize, Vec<IdRequest>>,
    mut resolve: F,
) -> Result<HashMap<usize, Vec<u64>>, MeshError>
where
    C: Communicator,
    F: FnMut(usize, &IdRequest) -> Result<u64, MeshError>,
{
    let outgoing: HashMap<usize, Vec<u8>> = requests
        .iter()
        .filter(|(_, r)| !r.is_empty())
        .map(|(&nbr, r)| (nbr, encode_requests(r)))
        .collect();
    let incoming = exchange_bytes(&outgoing, comm, tags.sizes, tags.requests, neighbors)?;

    let mut replies: HashMap<usize, Vec<u8>> = HashMap::new();
    let mut maybe_err = None;
    for (&nbr, bytes) in &incoming {
        let answered = decode_requests(bytes, dim).and_then(|reqs| {
            reqs.iter()
                .map(|r| resolve(nbr, r))
                .collect::<Result<Vec<u64>, MeshError>>()
        });
        match answered {
            Ok(ids) => {
                replies.insert(nbr, encode_ids(&ids));
            }
            Err(e) => {
                // still take part in the reply round so the requester is not left waiting
                maybe_err.get_or_insert(e);
                replies.insert(nbr, Vec::new());
            }
        }
    }
    let answers = exchange_bytes(&replies, comm, tags.sizes, tags.replies, neighbors)?;
    if let Some(e) = maybe_err {
        return Err(e);
    }

    let mut out = HashMap::new();
    for (&nbr, reqs) in requests {
        if reqs.is_empty() {
            continue;
        }
        let bytes = answers.get(&nbr).map(Vec::as_slice).unwrap_or(&[]);
        let ids = decode_ids(bytes);
        if ids.len() != reqs.len() {
            return Err(MeshError::BufferSizeMismatch {
                neighbor: nbr,
                expected: reqs.len() * 8,
                got: bytes.len(),
            });
        }
        out.insert(nbr, ids);
    }
    log::debug!(
        "rank {}: reconciled {} ids with {} neighbors",
        comm.rank(),
        out.values().map(Vec::len).sum::<usize>(),
        neighbors.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{CommTag, RayonComm};

    #[test]
    fn owner_answers_in_request_order() {
        let world = RayonComm::world(2);
        let tags = SyncTags::from_base(CommTag::new(40));
        let answers: Vec<HashMap<usize, Vec<u64>>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let me = comm.rank();
                        let other = 1 - me;
                        let mut requests = HashMap::new();
                        if me == 0 {
                            let reqs = [3u32, 1, 2]
                                .iter()
                                .map(|&slot| IdRequest {
                                    path: PedigreePath::from_parts(5, 0, &[], Dimension::Two)
                                        .unwrap(),
                                    slot,
                                })
                                .collect();
                            requests.insert(other, reqs);
                        }
                        reconcile_ids(comm, tags, Dimension::Two, &[other], &requests, |from, r| {
                            assert_eq!(from, 0);
                            Ok(r.path.root_domain_id() * 100 + r.slot as u64)
                        })
                        .unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(answers[0][&1], vec![503, 501, 502]);
        assert!(answers[1].is_empty());
    }
}
