//! Communication and synchronization building blocks.

pub mod communicator;
pub mod exchange;
pub mod offsets;
pub mod reconcile;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm, SyncTags, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use offsets::{OffsetTable, gather_offsets};
pub use reconcile::{IdRequest, reconcile_ids};
