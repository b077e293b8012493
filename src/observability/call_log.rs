//! Per-run call logs.
//!
//! Each server run owns a fresh directory. Every forwarded call appends one
//! line to `<dir>/<service>.log`. The directory is removed at shutdown unless
//! the server was told to keep its logs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{ProxyError, ProxyResult};

/// One forwarded call.
#[derive(Debug, Clone)]
pub struct CallRecord<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub target: &'a str,
    pub status: u16,
    pub elapsed: Duration,
}

impl fmt::Display for CallRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        write!(
            f,
            "{} {} {} -> {} {} {}ms",
            timestamp,
            self.method,
            self.path,
            self.target,
            self.status,
            self.elapsed.as_millis()
        )
    }
}

/// Handle onto the run's log directory.
#[derive(Debug, Clone)]
pub struct CallLog {
    dir: Arc<PathBuf>,
}

impl CallLog {
    /// Create a fresh directory under `parent`, or under the system temp dir.
    pub fn create(parent: Option<&Path>) -> ProxyResult<Self> {
        let parent = parent
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let dir = parent.join(format!("dev-proxy-{}", Uuid::new_v4()));

        std::fs::create_dir_all(&dir).map_err(|source| ProxyError::LogDir {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}.log", service))
    }

    /// Append a call to the service's file. Failures are logged, not returned.
    pub async fn record(&self, service: &str, call: &CallRecord<'_>) {
        let path = self.file_for(service);
        let line = format!("{}\n", call);

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(path = ?path, error = %e, "Failed to write call log");
        }
    }

    /// Delete the directory and everything in it.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(self.dir.as_path()) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_append_per_service() {
        let log = CallLog::create(None).unwrap();
        let call = CallRecord {
            method: "GET",
            path: "/v1/api/health",
            target: "http://localhost:4000/health",
            status: 200,
            elapsed: Duration::from_millis(3),
        };

        log.record("api", &call).await;
        log.record("api", &call).await;

        let contents = std::fs::read_to_string(log.file_for("api")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("GET /v1/api/health -> http://localhost:4000/health 200"));

        log.remove().unwrap();
        assert!(!log.dir().exists());
    }

    #[test]
    fn each_run_gets_its_own_directory() {
        let a = CallLog::create(None).unwrap();
        let b = CallLog::create(None).unwrap();
        assert_ne!(a.dir(), b.dir());
        a.remove().unwrap();
        b.remove().unwrap();
        assert!(a.remove().is_ok());
    }
}
