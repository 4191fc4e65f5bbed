use dotenv::dotenv;
use log::info;
use tonic::transport::Server;

use stream_orchestrator::config::Config;
use stream_orchestrator::orchestrator::Orchestrator;
use stream_orchestrator::server_inner::ServerInner;
use stream_orchestrator::service::session_orchestrator_server::SessionOrchestratorServer;
use stream_orchestrator::settings::JsonSettingsStore;
use stream_orchestrator::worker::ProcessLauncher;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr;
    info!(
        "pulling streams from {}, writing playback to {}",
        config.ingest_url,
        config.media_root.display()
    );

    let settings = JsonSettingsStore::new(&config.settings_path);
    let (orchestrator, event_loop) = Orchestrator::new(config, ProcessLauncher, settings).spawn();
    let server = ServerInner::new(orchestrator.clone());

    info!("session events accepted on {listen_addr}");
    Server::builder()
        .add_service(SessionOrchestratorServer::new(server))
        .serve_with_shutdown(listen_addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    orchestrator.shutdown().await;
    event_loop.await?;
    Ok(())
}
