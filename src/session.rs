use log::info;

use crate::stream_path::StreamPath;
use crate::worker::WorkerHandle;

/// One live stream and the workers it owns.
#[derive(Debug)]
pub struct Session {
    id: String,
    path: StreamPath,
    local_worker: WorkerHandle,
    restream_workers: Vec<WorkerHandle>,
}

impl Session {
    pub fn new(
        id: String,
        path: StreamPath,
            local_worker: WorkerHandle,
        restream_workers: Vec<WorkerHandle>,
    ) -> Self {
        Session {
            id,
            path,
            local_worker,
            restream_workers,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &StreamPath {
        &self.path
    }

    /// Signals every owned worker, local format first. Returns how many
    /// signals were issued.
    pub fn terminate_workers(&mut self) -> usize {
        let issued = std::iter::once(&mut self.local_worker)
            .chain(self.restream_workers.iter_mut())
            .map(|worker| worker.terminate())
            .filter(|issued| *issued)
            .count();
        info!("[{}] terminated {issued} worker(s) for {}", self.id, self.path);
        issued
    }

    pub fn summary(&self) -> ActiveSession {
        ActiveSession {
            session_id: self.id.clone(),
            application: self.path.application().to_string(),
            stream_name: self.path.stream_name().to_string(),
            playback_locator: self.path.playback_locator(),
            stream_path: self.path.to_string(),
        }
    }
}

/// Point-in-time view of a live session for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: String,
    pub application: String,
    pub stream_name: String,
    pub playback_locator: String,
    pub stream_path: String,
}
