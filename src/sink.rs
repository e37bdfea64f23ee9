//! Operation log sink
//!
//! Each completed operation is written as one pretty-printed JSON document
//! under the configured logs directory:
//! `<logs.dir>/<utc-timestamp>-<operation>-<uuid>.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors writing an operation log
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Envelope around one operation's payload
#[derive(Debug, Serialize)]
pub struct OperationLog<'a, T: Serialize> {
    pub id: String,
    pub operation: &'a str,
    pub recorded_at: DateTime<Utc>,
    pub tool_version: &'static str,
    pub payload: &'a T,
}

impl<'a, T: Serialize> OperationLog<'a, T> {
    pub fn new(operation: &'a str, payload: &'a T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            recorded_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            payload,
        }
    }

    /// File name under the logs directory
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.json",
            self.recorded_at.format("%Y%m%dT%H%M%S%.3fZ"),
            sanitize(self.operation),
            self.id
        )
    }

    /// Write atomically (write-then-rename) into `dir`, creating it if needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, SinkError> {
        let json = serde_json::to_string_pretty(self)?;

        fs::create_dir_all(dir).map_err(|source| SinkError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(self.file_name());
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|source| SinkError::Io {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), operation = self.operation, "wrote operation log");
        Ok(path)
    }
}

/// Keep operation names filesystem-friendly.
fn sanitize(operation: &str) -> String {
    operation
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Payload {
        answer: u32,
    }

    #[test]
    fn test_write_to_dir() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("nested/logs");
        let payload = Payload { answer: 42 };

        let log = OperationLog::new("boot", &payload);
        let path = log.write_to_dir(&logs).unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("-boot-"));
        assert!(name.ends_with(&format!("{}.json", log.id)));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["operation"], "boot");
        assert_eq!(written["payload"]["answer"], 42);

        // no temp file left behind
        let entries = fs::read_dir(&logs).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unique_names() {
        let payload = Payload { answer: 1 };
        let a = OperationLog::new("test", &payload);
        let b = OperationLog::new("test", &payload);
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("devices resolve"), "devices_resolve");
        assert_eq!(sanitize("../x"), "___x");
    }

    #[test]
    fn test_unwritable_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain-file");
        fs::write(&file, "x").unwrap();
        let payload = Payload { answer: 1 };
        let result = OperationLog::new("boot", &payload).write_to_dir(&file.join("sub"));
        assert!(matches!(result, Err(SinkError::Io { .. })));
    }
}
