use super::{COORDINATOR_RANK, CommError, Communicator};
use ::mpi::environment::Universe;
use ::mpi::topology::SimpleCommunicator;
use ::mpi::traits::*;

/// `MPI_COMM_WORLD` of an MPI job. Finalizes MPI when dropped.
pub struct MpiCommunicator {
    world: SimpleCommunicator,
    _universe: Universe,
}

impl MpiCommunicator {
    pub fn initialize() -> Result<Self, CommError> {
        let universe = ::mpi::initialize()
            .ok_or_else(|| CommError::Unavailable("MPI was already initialized".to_string()))?;
        let world = universe.world();
        Ok(Self {
            world,
            _universe: universe,
        })
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        let root = self.world.process_at_rank(COORDINATOR_RANK as i32);
        let is_root = self.rank() == COORDINATOR_RANK;

        let mut len: u64 = match (&payload, is_root) {
            (Some(bytes), true) => bytes.len() as u64,
            (None, true) => return Err(CommError::MissingPayload),
            (_, false) => 0,
        };
        root.broadcast_into(&mut len);

        let mut buffer = match payload {
            Some(bytes) if is_root => bytes,
            _ => vec![0u8; len as usize],
        };
        root.broadcast_into(&mut buffer[..]);
        Ok(buffer)
    }
}
