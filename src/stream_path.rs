use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;

/// Manifest file written by the local-format worker in each stream directory.
pub const MANIFEST_NAME: &str = "index.m3u8";

/// `/{application}/{stream_name}` as announced by the ingest server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPath {
    application: String,
    stream_name: String,
}

impl StreamPath {
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Directory the local-format worker writes into.
    pub fn output_dir(&self, media_root: &Path) -> PathBuf {
        media_root.join(&self.application).join(&self.stream_name)
    }

    pub fn playback_locator(&self) -> String {
        format!("{self}/{MANIFEST_NAME}")
    }

    /// Address workers pull the live stream from.
    pub fn ingest_url(&self, ingest_base: &str) -> String {
        format!("{}{self}", ingest_base.trim_end_matches('/'))
    }
}

impl FromStr for StreamPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| Error::MalformedIdentity {
            path: path.to_string(),
            reason,
        };

        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| malformed("missing leading '/'"))?;
        let segments: Vec<&str> = rest.split('/').collect();
        let (application, stream_name) = match segments.as_slice() {
            [application, stream_name] => (*application, *stream_name),
            _ => return Err(malformed("expected exactly two segments")),
        };
        for segment in [application, stream_name] {
            if segment.is_empty() {
                return Err(malformed("empty segment"));
            }
            if segment == "." || segment == ".." {
                return Err(malformed("relative segment"));
            }
        }

        Ok(StreamPath {
            application: application.to_string(),
            stream_name: stream_name.to_string(),
        })
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.application, self.stream_name)
    }
}
