//! Read side of the settings store: only what session start needs.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::restream::RestreamTarget;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(
        default,
        rename = "restreamConfigs",
        deserialize_with = "lenient_targets"
    )]
    pub restream_configs: Vec<RestreamTarget>,
}

/// Keeps every entry that deserializes and drops the rest.
fn lenient_targets<'de, D>(deserializer: D) -> std::result::Result<Vec<RestreamTarget>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!("ignoring malformed restream entry: {e}");
                None
            }
        })
        .collect())
}

#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    /// A snapshot of the current settings.
    async fn load(&self) -> Result<Settings>;
}

/// Settings persisted as a JSON document by the admin surface.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSettingsStore { path: path.into() }
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self) -> Result<Settings> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                return Err(Error::SettingsRead(format!("{}: {e}", self.path.display())));
            }
        };

        serde_json::from_slice(&raw)
            .map_err(|e| Error::SettingsRead(format!("{}: {e}", self.path.display())))
    }
}
