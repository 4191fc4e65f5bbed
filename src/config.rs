use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// gRPC address the ingest server delivers session events to.
    pub listen_addr: SocketAddr,
    pub ffmpeg_path: PathBuf,
    /// Root of the locally served playback tree.
    pub media_root: PathBuf,
    pub settings_path: PathBuf,
    /// Base address workers pull published streams from.
    pub ingest_url: String,
    /// Number of segments kept in the rolling playlist.
    pub hls_list_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listen = var("ORCHESTRATOR_LISTEN_ADDR", "[::1]:50051");
        let listen_addr = listen
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("ORCHESTRATOR_LISTEN_ADDR {listen:?}: {e}")))?
            .next()
            .ok_or_else(|| Error::Config(format!("ORCHESTRATOR_LISTEN_ADDR {listen:?} resolves to nothing")))?;

        let list_size = var("HLS_LIST_SIZE", "3");
        let hls_list_size = match list_size.parse::<u32>() {
            Ok(size) if size > 0 => size,
            _ => {
                return Err(Error::Config(format!(
                    "HLS_LIST_SIZE must be a positive integer, got {list_size:?}"
                )))
            }
        };

        let ingest_url = var("INGEST_URL", "rtmp://localhost:1935");
        if ingest_url.trim().is_empty() {
            return Err(Error::Config("INGEST_URL is empty".to_string()));
        }

        Ok(Config {
            listen_addr,
            ffmpeg_path: var("FFMPEG_PATH", "ffmpeg").into(),
            media_root: var("MEDIA_ROOT", "media").into(),
            settings_path: var("SETTINGS_PATH", "data/settings.json").into(),
            ingest_url,
            hls_list_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.listen_addr, "[::1]:50051".parse().unwrap());
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.settings_path, PathBuf::from("data/settings.json"));
        assert_eq!(config.ingest_url, "rtmp://localhost:1935");
        assert_eq!(config.hls_list_size, 3);
    }

    #[test]
    fn overrides() {
        let config = config_with(&[
            ("ORCHESTRATOR_LISTEN_ADDR", "127.0.0.1:6000"),
            ("MEDIA_ROOT", "/srv/media"),
            ("HLS_LIST_SIZE", "6"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.hls_list_size, 6);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_with(&[("HLS_LIST_SIZE", "0")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_with(&[("HLS_LIST_SIZE", "many")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_with(&[("ORCHESTRATOR_LISTEN_ADDR", "not an address")]),
            Err(Error::Config(_))
        ));
    }
}
