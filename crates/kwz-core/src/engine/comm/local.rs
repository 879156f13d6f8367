use super::{CommError, Communicator, WorkerGroup};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

struct Shared {
    barrier: Barrier,
    slot: Mutex<Option<Vec<u8>>>,
}

/// In-process worker group whose members run on separate threads.
pub struct LocalGroup;

impl LocalGroup {
    pub fn spawn(size: usize) -> Vec<LocalCommunicator> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slot: Mutex::new(None),
        });
        (0..size)
            .map(|rank| LocalCommunicator {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Runs `worker` once per rank on scoped threads and collects the
    /// results in rank order.
    pub fn run<R, F>(size: usize, worker: F) -> Vec<thread::Result<R>>
    where
        R: Send,
        F: Fn(WorkerGroup) -> R + Sync,
    {
        let comms = Self::spawn(size);
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let worker = &worker;
                    scope.spawn(move || worker(WorkerGroup::new(Box::new(comm))))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        })
    }
}

pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        if self.rank == super::COORDINATOR_RANK {
            let mut slot = self
                .shared
                .slot
                .lock()
                .map_err(|e| CommError::Disconnected(e.to_string()))?;
            *slot = payload;
        }
        self.shared.barrier.wait();
        let received = self
            .shared
            .slot
            .lock()
            .map_err(|e| CommError::Disconnected(e.to_string()))?
            .clone();
        // Keep the slot stable until every rank has read it.
        self.shared.barrier.wait();
        received.ok_or(CommError::MissingPayload)
    }
}
