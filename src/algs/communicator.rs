//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Handles are waitable but non-blocking; callers
//! post every receive and send of a phase first and only then wait, so symmetric exchanges
//! never deadlock. Between one pair of ranks, messages with the same tag arrive in the order
//! they were sent.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `by` steps after this one.
    #[inline]
    pub const fn offset(self, by: u16) -> Self {
        CommTag(self.0.wrapping_add(by))
    }
}

/// Tag reserved for the point-to-point fallback of [`Communicator::allgather`].
pub const ALLGATHER_TAG: CommTag = CommTag(u16::MAX);

/// Tags of one synchronization round, assigned at fixed offsets from a base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncTags {
    /// Byte counts preceding every payload.
    pub sizes: CommTag,
    /// Pedigree requests.
    pub requests: CommTag,
    /// Resolved ids answering the requests.
    pub replies: CommTag,
    /// Refinement flags exchanged while growing the queue.
    pub flags: CommTag,
}

impl SyncTags {
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            requests: base.offset(1),
            replies: base.offset(2),
            flags: base.offset(3),
        }
    }
}

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Posts a receive of exactly `buf.len()` bytes. The data is returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Gathers `sendbuf` from every rank into `recvbuf`, in rank order. All ranks pass
    /// buffers of the same length; `recvbuf.len() == size() * sendbuf.len()`.
    fn allgather(&self, sendbuf: &[u8], recvbuf: &mut [u8]) {
        let me = self.rank();
        let n = sendbuf.len();
        let tag = ALLGATHER_TAG.as_u16();
        let mut recvs = Vec::with_capacity(self.size());
        for peer in (0..self.size()).filter(|&p| p != me) {
            let mut scratch = vec![0u8; n];
            recvs.push((peer, self.irecv(peer, tag, &mut scratch)));
        }
        let sends: Vec<_> = (0..self.size())
            .filter(|&p| p != me)
            .map(|peer| self.isend(peer, tag, sendbuf))
            .collect();
        recvbuf[me * n..(me + 1) * n].copy_from_slice(sendbuf);
        for (peer, h) in recvs {
            if let Some(data) = h.wait() {
                let len = data.len().min(n);
                recvbuf[peer * n..peer * n + len].copy_from_slice(&data[..len]);
            }
        }
        for s in sends {
            let _ = s.wait();
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator for serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allgather(&self, sendbuf: &[u8], recvbuf: &mut [u8]) {
        recvbuf[..sendbuf.len()].copy_from_slice(sendbuf);
    }
}

// --- RayonComm: ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

/// Receive handle polling the shared mailbox.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let len = self.len.min(bytes.len());
                    return Some(bytes[..len].to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

/// In-process communicator: each rank is a thread holding one handle of a shared world.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// Handles for every rank of a new world of `size` ranks.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::new());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::mesh_error::MeshError;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Communicator over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initializes MPI. Fails if MPI was already initialized.
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize().ok_or_else(|| MeshError::CommError {
                neighbor: 0,
                message: "MPI is already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Request over a buffer leaked for the lifetime of the request and reclaimed by `wait`.
    pub struct MpiHandle {
        request: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
        receive: bool,
    }

    // SAFETY: the buffer is owned exclusively by this handle.
    unsafe impl Send for MpiHandle {}

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.request.wait();
            // SAFETY: `buf` came from `Box::leak` and the request that borrowed it completed.
            let data = unsafe { Box::from_raw(self.buf) };
            self.receive.then(|| data.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let data: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = data;
            // SAFETY: the leaked buffer outlives the request; it is freed only after `wait`.
            let shared: &'static [u8] = unsafe { &*ptr };
            let request = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, shared, tag as i32);
            MpiHandle {
                request,
                buf: ptr,
                receive: false,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let data: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = data;
            // SAFETY: as above; no other reference to the buffer exists until `wait`.
            let target: &'static mut [u8] = unsafe { &mut *ptr };
            let request = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, target, tag as i32);
            MpiHandle {
                request,
                buf: ptr,
                receive: true,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn allgather(&self, sendbuf: &[u8], recvbuf: &mut [u8]) {
            self.world.all_gather_into(sendbuf, recvbuf);
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_spaced_from_base() {
        let t = SyncTags::from_base(CommTag::new(100));
        assert_eq!(t.sizes.as_u16(), 100);
        assert_eq!(t.replies.as_u16(), 102);
        assert_eq!(t.flags.as_u16(), 103);
    }

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let mut recv_buf = [0u8; 4];
        let h = world[1].irecv(0, 7, &mut recv_buf);
        world[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = h.wait().expect("data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(recv_buf, [1, 2, 3, 4]);
    }

    #[test]
    fn same_tag_messages_keep_their_order() {
        let world = RayonComm::world(2);
        world[0].isend(1, 3, &[1]);
        world[0].isend(1, 3, &[2]);
        let mut b = [0u8; 1];
        assert_eq!(world[1].irecv(0, 3, &mut b).wait(), Some(vec![1]));
        assert_eq!(world[1].irecv(0, 3, &mut b).wait(), Some(vec![2]));
    }

    #[test]
    fn allgather_over_threads() {
        let world = RayonComm::world(3);
        let results: Vec<Vec<u8>> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut out = vec![0u8; 3 * 2];
                        let me = comm.rank() as u8;
                        comm.allgather(&[me, me * 10], &mut out);
                        out
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert_eq!(r, vec![0, 0, 1, 10, 2, 20]);
        }
    }

    #[test]
    fn serial_allgather_copies_through() {
        let mut out = [0u8; 2];
        NoComm.allgather(&[5, 6], &mut out);
        assert_eq!(out, [5, 6]);
    }
}
