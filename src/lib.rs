pub mod service {
    tonic::include_proto!("orchestrator");
}

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod restream;
pub mod server_inner;
pub mod session;
pub mod settings;
pub mod stream_path;
pub mod transcode;
pub mod worker;
