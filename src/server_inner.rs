use tonic::{Request, Response, Status};

use crate::error::Error;
use crate::orchestrator::{IngestEvent, OrchestratorHandle};
use crate::service::{
    session_orchestrator_server::SessionOrchestrator, ActiveSession, ListActiveSessionsRequest,
    ListActiveSessionsResponse, SessionEvent, SessionEventResponse,
};

/// gRPC face of the orchestrator, called by the ingest server.
pub struct ServerInner {
    orchestrator: OrchestratorHandle,
}

impl ServerInner {
    pub fn new(orchestrator: OrchestratorHandle) -> Self {
        ServerInner { orchestrator }
    }

    async fn deliver(&self, event: IngestEvent) -> Result<Response<SessionEventResponse>, Status> {
        match self.orchestrator.dispatch(event).await {
            Ok(()) => Ok(Response::new(SessionEventResponse {})),
            Err(e @ Error::Closed) => Err(Status::unavailable(e.to_string())),
            Err(e) => Err(Status::internal(e.to_string())),
        }
    }
}

#[tonic::async_trait]
impl SessionOrchestrator for ServerInner {
    async fn session_start(
        &self,
        request: Request<SessionEvent>,
    ) -> Result<Response<SessionEventResponse>, Status> {
        let SessionEvent {
            session_id,
            stream_path,
            params,
        } = request.into_inner();

        self.deliver(IngestEvent::SessionStart {
            session_id,
            stream_path,
            params,
        })
        .await
    }

    async fn session_end(
        &self,
        request: Request<SessionEvent>,
    ) -> Result<Response<SessionEventResponse>, Status> {
        let SessionEvent {
            session_id,
            stream_path,
            params,
        } = request.into_inner();

        self.deliver(IngestEvent::SessionEnd {
            session_id,
            stream_path,
            params,
        })
        .await
    }

    async fn list_active_sessions(
        &self,
        _request: Request<ListActiveSessionsRequest>,
    ) -> Result<Response<ListActiveSessionsResponse>, Status> {
        let sessions = self
            .orchestrator
            .list_active_sessions()
            .await
            .into_iter()
            .map(|session| ActiveSession {
                session_id: session.session_id,
                application: session.application,
                stream_name: session.stream_name,
                playback_locator: session.playback_locator,
                stream_path: session.stream_path,
            })
            .collect();

        Ok(Response::new(ListActiveSessionsResponse { sessions }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tonic::Code;

    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use crate::orchestrator::Orchestrator;
    use crate::settings::{Settings, SettingsStore};
    use crate::worker::{Launcher, WorkerHandle, WorkerSpec};

    struct NoWorkers;

    impl Launcher for NoWorkers {
        fn launch(&self, spec: WorkerSpec) -> Result<WorkerHandle> {
            Ok(WorkerHandle::inert(spec.role))
        }
    }

    struct NoSettings;

    #[async_trait]
    impl SettingsStore for NoSettings {
        async fn load(&self) -> Result<Settings> {
            Ok(Settings::default())
        }
    }

    fn event(session_id: &str, stream_path: &str) -> Request<SessionEvent> {
        Request::new(SessionEvent {
            session_id: session_id.to_string(),
            stream_path: stream_path.to_string(),
            params: HashMap::from([("token".to_string(), "t".to_string())]),
        })
    }

    #[tokio::test]
    async fn lifecycle_over_rpc() {
        let media = tempfile::tempdir().unwrap();
        let root = media.path().to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| (key == "MEDIA_ROOT").then(|| root.clone())).unwrap();
        let (orchestrator, _) = Orchestrator::new(config, NoWorkers, NoSettings).spawn();
        let server = ServerInner::new(orchestrator.clone());

        server.session_start(event("9", "/live/stream")).await.unwrap();
        let listed = server
            .list_active_sessions(Request::new(ListActiveSessionsRequest {}))
            .await
            .unwrap()
            .into_inner()
            .sessions;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, "9");
        assert_eq!(listed[0].stream_path, "/live/stream");
        assert_eq!(listed[0].playback_locator, "/live/stream/index.m3u8");

        server.session_end(event("9", "/live/stream")).await.unwrap();
        let listed = server
            .list_active_sessions(Request::new(ListActiveSessionsRequest {}))
            .await
            .unwrap()
            .into_inner()
            .sessions;
        assert!(listed.is_empty());

        orchestrator.shutdown().await;
        let status = server
            .session_start(event("10", "/live/stream"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
