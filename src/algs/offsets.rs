//! Global offset tables built from per-rank counts.

use crate::algs::communicator::Communicator;

/// Per-rank counts of several entity kinds, gathered in rank order.
///
/// Rank `r`'s owned entities of kind `k` get the ids `offset(r, k) .. offset(r, k) +
/// count(r, k)`; ids of different ranks never overlap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    kinds: usize,
    counts: Vec<u64>,
}

impl OffsetTable {
    /// Builds a table from rank-major counts (`counts[rank * kinds + kind]`).
    pub fn from_counts(kinds: usize, counts: Vec<u64>) -> Self {
        debug_assert!(kinds > 0 && counts.len() % kinds == 0);
        OffsetTable { kinds, counts }
    }

    pub fn ranks(&self) -> usize {
        self.counts.len() / self.kinds
    }

    pub fn count(&self, rank: usize, kind: usize) -> u64 {
        self.counts[rank * self.kinds + kind]
    }

    /// Sum of the counts of all lower ranks.
    pub fn offset(&self, rank: usize, kind: usize) -> u64 {
        (0..rank).map(|r| self.count(r, kind)).sum()
    }

    /// Sum over all ranks.
    pub fn total(&self, kind: usize) -> u64 {
        (0..self.ranks()).map(|r| self.count(r, kind)).sum()
    }
}

/// Gathers `local_counts` (one entry per kind) from every rank.
pub fn gather_offsets<C: Communicator>(comm: &C, local_counts: &[u64]) -> OffsetTable {
    let kinds = local_counts.len().max(1);
    let n_ranks = comm.size().max(1);
    let mut send = vec![0u8; kinds * 8];
    for (chunk, c) in send.chunks_exact_mut(8).zip(local_counts) {
        chunk.copy_from_slice(&c.to_le_bytes());
    }
    let mut recvbuf = vec![0u8; n_ranks * kinds * 8];
    comm.allgather(&send, &mut recvbuf);

    let counts = recvbuf
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw)
        })
        .collect();
    OffsetTable::from_counts(kinds, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn prefix_sums_per_kind() {
        let t = OffsetTable::from_counts(2, vec![3, 1, 4, 0, 2, 5]);
        assert_eq!(t.ranks(), 3);
        assert_eq!(t.offset(0, 0), 0);
        assert_eq!(t.offset(2, 0), 7);
        assert_eq!(t.offset(2, 1), 1);
        assert_eq!(t.total(1), 6);
    }

    #[test]
    fn serial_table_is_the_local_counts() {
        let t = gather_offsets(&NoComm, &[4, 9]);
        assert_eq!(t.count(0, 1), 9);
        assert_eq!(t.offset(0, 1), 0);
    }

    #[test]
    fn gathered_in_rank_order() {
        let world = RayonComm::world(2);
        let tables: Vec<OffsetTable> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| s.spawn(move || gather_offsets(c, &[10 + c.rank() as u64])))
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(tables[0], tables[1]);
        assert_eq!(tables[1].offset(1, 0), 10);
        assert_eq!(tables[0].total(0), 21);
    }
}
