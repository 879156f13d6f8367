//! Worker-group coordination.
//!
//! A run consists of a fixed group of worker processes, one of which (rank 0)
//! is the coordinator. Workers meet at rendezvous barriers and receive the
//! coordinator's decisions through broadcasts; nothing that requires
//! inspecting the shared working tree is ever recomputed on other ranks.
//!
//! Transports implement [`Communicator`]:
//!
//! - [`SoloCommunicator`] for single-process runs,
//! - [`local::LocalGroup`] for several workers as threads of one process,
//! - `mpi::MpiCommunicator` (cargo feature `mpi`) for MPI jobs.

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const COORDINATOR_RANK: usize = 0;

#[derive(Debug, Error)]
pub enum CommError {
    #[error("Worker group is disconnected: {0}")]
    Disconnected(String),
    #[error("Coordinator broadcast carried no payload")]
    MissingPayload,
    #[error("Failed to encode broadcast value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to decode broadcast value: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Communication backend unavailable: {0}")]
    Unavailable(String),
}

pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Blocks until every worker of the group has called it. There is no
    /// timeout.
    fn barrier(&self) -> Result<(), CommError>;

    /// Distributes the coordinator's bytes to all workers. The coordinator
    /// passes `Some`, everyone else `None`; all ranks return the same bytes.
    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError>;
}

/// A group of one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloCommunicator;

impl Communicator for SoloCommunicator {
    fn rank(&self) -> usize {
        COORDINATOR_RANK
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        payload.ok_or(CommError::MissingPayload)
    }
}

pub struct WorkerGroup {
    comm: Box<dyn Communicator>,
}

impl WorkerGroup {
    pub fn new(comm: Box<dyn Communicator>) -> Self {
        Self { comm }
    }

    pub fn solo() -> Self {
        Self::new(Box::new(SoloCommunicator))
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR_RANK
    }

    pub fn barrier(&self) -> Result<(), CommError> {
        self.comm.barrier()
    }

    /// Sends `value` from the coordinator to every worker. Non-coordinators
    /// pass `None` and receive the coordinator's copy.
    pub fn broadcast<T>(&self, value: Option<&T>) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned,
    {
        let payload = match (self.is_coordinator(), value) {
            (true, Some(value)) => Some(serde_json::to_vec(value).map_err(CommError::Encode)?),
            (true, None) => return Err(CommError::MissingPayload),
            (false, _) => None,
        };
        let bytes = self.comm.broadcast_bytes(payload)?;
        serde_json::from_slice(&bytes).map_err(CommError::Decode)
    }

    /// Evaluates `compute` on the coordinator only, hands the result to every
    /// worker and synchronizes the group afterwards.
    pub fn agree<T, F>(&self, compute: F) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let local = self.is_coordinator().then(compute);
        let value = self.broadcast(local.as_ref())?;
        self.barrier()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_group_is_its_own_coordinator() {
        let group = WorkerGroup::solo();
        assert!(group.is_coordinator());
        assert_eq!(group.size(), 1);
        assert_eq!(group.agree(|| vec![1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn coordinator_without_value_is_an_error() {
        let group = WorkerGroup::solo();
        assert!(matches!(
            group.broadcast::<u32>(None),
            Err(CommError::MissingPayload)
        ));
    }
}
