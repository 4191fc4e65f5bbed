//! Session lifecycle driven by the ingest server's publish events.
//!
//! Events travel over one ordered channel to a single actor task, which is
//! the only writer of the [`SessionRegistry`]. Queries read the registry
//! directly and never wait on the actor.

use std::collections::HashMap;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use crate::restream;
use crate::session::{ActiveSession, Session};
use crate::settings::SettingsStore;
use crate::stream_path::{StreamPath, MANIFEST_NAME};
use crate::transcode;
use crate::worker::{Launcher, WorkerHandle, WorkerRole, WorkerSpec};

const EVENT_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    SessionStart {
        session_id: String,
        stream_path: String,
        params: HashMap<String, String>,
    },
    SessionEnd {
        session_id: String,
        stream_path: String,
        params: HashMap<String, String>,
    },
}

enum Command {
    Event(IngestEvent, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct Orchestrator<L, S> {
    config: Config,
    launcher: L,
    settings: S,
    registry: SessionRegistry,
}

impl<L, S> Orchestrator<L, S>
where
    L: Launcher,
    S: SettingsStore,
{
    pub fn new(config: Config, launcher: L, settings: S) -> Self {
        Orchestrator {
            config,
            launcher,
            settings,
            registry: SessionRegistry::new(),
        }
    }

    /// Starts the event loop. It runs until [`OrchestratorHandle::shutdown`]
    /// or until every handle is dropped, and terminates all remaining
    /// sessions before returning.
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let handle = OrchestratorHandle {
            tx,
            registry: self.registry.clone(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }

    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Event(event, done) => {
                    self.handle(event).await;
                    let _ = done.send(());
                }
                Command::Shutdown(done) => {
                    self.terminate_all().await;
                    let _ = done.send(());
                    return;
                }
            }
        }
        self.terminate_all().await;
    }

    async fn handle(&self, event: IngestEvent) {
        match event {
            IngestEvent::SessionStart {
                session_id,
                stream_path,
                params,
            } => {
                info!("session start id={session_id} path={stream_path} params={params:?}");
                self.start_session(session_id, &stream_path).await;
            }
            IngestEvent::SessionEnd {
                session_id,
                stream_path,
                params,
            } => {
                info!("session end id={session_id} path={stream_path} params={params:?}");
                self.end_session(&session_id).await;
            }
        }
    }

    async fn start_session(&self, session_id: String, stream_path: &str) {
        let path: StreamPath = match stream_path.parse() {
            Ok(path) => path,
            Err(e) => {
                warn!("[{session_id}] {e}, session not started");
                return;
            }
        };

        if self.registry.contains(&session_id).await {
            warn!("[{session_id}] already live, ignoring repeated start for {path}");
            return;
        }

        let output_dir = path.output_dir(&self.config.media_root);
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            error!("[{session_id}] cannot create {}: {e}", output_dir.display());
        }

        let source = path.ingest_url(&self.config.ingest_url);
        let playlist = output_dir.join(MANIFEST_NAME);
        info!("[{session_id}] transcoding {source} -> {}", playlist.display());
        let local_worker = self.launch(
            &session_id,
            WorkerRole::LocalFormat,
            transcode::hls_args(&source, &playlist, self.config.hls_list_size),
        );

        let targets = match self.settings.load().await {
            Ok(settings) => restream::resolve(&settings.restream_configs),
            Err(e) => {
                warn!("[{session_id}] {e}, restreaming disabled for this session");
                Vec::new()
            }
        };

        // Relays pull from the ingest address too; they do not wait for the
        // local-format worker.
        let restream_workers = targets
            .into_iter()
            .map(|target| {
                info!("[{session_id}] restreaming to [{}]", target.name);
                debug!("[{session_id}] [{}] -> {}", target.name, target.final_url);
                self.launch(
                    &session_id,
                    WorkerRole::Restream { name: target.name },
                    transcode::relay_args(&source, &target.final_url),
                )
            })
            .collect();

        let session = Session::new(session_id, path, local_worker, restream_workers);
        if let Err(mut rejected) = self.registry.insert(session).await {
            warn!("[{}] lost insert race, stopping its workers", rejected.id());
            rejected.terminate_workers();
        }
    }

    async fn end_session(&self, session_id: &str) {
        match self.registry.remove(session_id).await {
            Some(mut session) => {
                info!("[{session_id}] cleaning up workers for {}", session.path());
                session.terminate_workers();
            }
            None => debug!("[{session_id}] not live, nothing to clean up"),
        }
    }

    async fn terminate_all(&self) {
        let sessions = self.registry.drain().await;
        if !sessions.is_empty() {
            info!("shutting down {} live session(s)", sessions.len());
        }
        for mut session in sessions {
            session.terminate_workers();
        }
    }

    /// Spawn failures leave an inert slot behind instead of aborting the
    /// session.
    fn launch(&self, session_id: &str, role: WorkerRole, args: Vec<String>) -> WorkerHandle {
        let spec = WorkerSpec {
            session_id: session_id.to_string(),
            role: role.clone(),
            program: self.config.ffmpeg_path.clone(),
            args,
        };
        self.launcher.launch(spec).unwrap_or_else(|e| {
            error!("[{session_id}] {e}");
            WorkerHandle::inert(role)
        })
    }
}

/// Cheap to clone; every clone feeds the same event loop.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
    registry: SessionRegistry,
}

impl OrchestratorHandle {
    /// Resolves once the event has been handled. Fails only when the
    /// orchestrator is no longer running.
    pub async fn dispatch(&self, event: IngestEvent) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Event(event, done_tx))
            .await
            .map_err(|_| Error::Closed)?;
        done_rx.await.map_err(|_| Error::Closed)
    }

    pub async fn session_start(
        &self,
        session_id: impl Into<String>,
        stream_path: impl Into<String>,
        params: HashMap<String, String>,
    ) -> Result<()> {
        self.dispatch(IngestEvent::SessionStart {
            session_id: session_id.into(),
            stream_path: stream_path.into(),
            params,
        })
        .await
    }

    pub async fn session_end(
        &self,
        session_id: impl Into<String>,
        stream_path: impl Into<String>,
        params: HashMap<String, String>,
    ) -> Result<()> {
        self.dispatch(IngestEvent::SessionEnd {
            session_id: session_id.into(),
            stream_path: stream_path.into(),
            params,
        })
        .await
    }

    pub async fn list_active_sessions(&self) -> Vec<ActiveSession> {
        self.registry.snapshot().await
    }

    /// Terminates every live session and stops the event loop.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}
