//! Built-in capability collecting Windows prefetch metadata.
//!
//! Records are built from file-system metadata only; the prefetch binary
//! format is not parsed.

use std::path::{Path, PathBuf};

use akf_rpc::{JsonRpcError, RpcService, parse_params};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default location of prefetch files on a Windows guest.
pub const DEFAULT_PREFETCH_DIR: &str = r"C:\Windows\Prefetch";

/// Method names exposed by [`ArtifactService`].
pub mod methods {
    /// `collect_prefetch_dir {folder?} -> [PrefetchRecord]`
    pub const COLLECT_PREFETCH_DIR: &str = "collect_prefetch_dir";
    /// `collect_prefetch_file {path} -> PrefetchRecord | null`
    pub const COLLECT_PREFETCH_FILE: &str = "collect_prefetch_file";
}

/// Metadata of one prefetch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchRecord {
    /// Full path on the guest.
    pub path: String,
    /// File name, e.g. `CHROME.EXE-5B7B4A0D.pf`.
    pub file_name: String,
    /// Executable name derived from the file name, e.g. `CHROME.EXE`.
    pub executable: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct DirParams {
    #[serde(default)]
    folder: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FileParams {
    path: PathBuf,
}

/// Serves prefetch collection over JSON-RPC.
#[derive(Debug, Clone)]
pub struct ArtifactService {
    prefetch_dir: PathBuf,
}

impl Default for ArtifactService {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactService {
    /// Service reading the system prefetch folder.
    pub fn new() -> Self {
        Self {
            prefetch_dir: PathBuf::from(DEFAULT_PREFETCH_DIR),
        }
    }

    /// Use a different default folder.
    pub fn with_prefetch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prefetch_dir = dir.into();
        self
    }

    /// Collect every `.pf` file in `folder` (or the default folder), sorted
    /// by file name.
    pub async fn collect_prefetch_dir(&self, folder: Option<&Path>) -> std::io::Result<Vec<PrefetchRecord>> {
        let folder = folder.unwrap_or(&self.prefetch_dir);
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_prefetch_file(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            records.push(record_for(&path, &metadata));
        }

        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        tracing::debug!(folder = %folder.display(), count = records.len(), "collected prefetch files");
        Ok(records)
    }

    /// Collect one prefetch file. Missing or empty files yield `None`.
    pub async fn collect_prefetch_file(&self, path: &Path) -> std::io::Result<Option<PrefetchRecord>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if !metadata.is_file() || metadata.len() == 0 {
            return Ok(None);
        }
        Ok(Some(record_for(path, &metadata)))
    }
}

fn is_prefetch_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pf"))
}

fn record_for(path: &Path, metadata: &std::fs::Metadata) -> PrefetchRecord {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Prefetch names are `<EXECUTABLE>-<8 hex digit path hash>.pf`
    let executable = match stem.rsplit_once('-') {
        Some((exe, _hash)) if !exe.is_empty() => exe.to_string(),
        _ => stem,
    };

    PrefetchRecord {
        path: path.display().to_string(),
        file_name,
        executable,
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    }
}

fn io_failure(path: &Path, e: std::io::Error) -> JsonRpcError {
    JsonRpcError::internal(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl RpcService for ArtifactService {
    fn name(&self) -> &str {
        crate::capability::ARTIFACT_SERVICE
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            methods::COLLECT_PREFETCH_DIR => {
                let DirParams { folder } = parse_params(params)?;
                let target = folder.as_deref().unwrap_or(&self.prefetch_dir);
                let records = self
                    .collect_prefetch_dir(Some(target))
                    .await
                    .map_err(|e| io_failure(target, e))?;
                serde_json::to_value(records).map_err(|e| JsonRpcError::internal(e.to_string()))
            }
            methods::COLLECT_PREFETCH_FILE => {
                let FileParams { path } = parse_params(params)?;
                let record = self
                    .collect_prefetch_file(&path)
                    .await
                    .map_err(|e| io_failure(&path, e))?;
                serde_json::to_value(record).map_err(|e| JsonRpcError::internal(e.to_string()))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CHROME.EXE-5B7B4A0D.pf"), b"MAM\x04data").unwrap();
        std::fs::write(dir.path().join("MSEDGE.EXE-1A2B3C4D.PF"), b"MAM").unwrap();
        std::fs::write(dir.path().join("Layout.ini"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.pf")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_collect_dir_filters_and_sorts() {
        let dir = fixture();
        let service = ArtifactService::new().with_prefetch_dir(dir.path());

        let records = service.collect_prefetch_dir(None).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.executable.as_str()).collect();
        assert_eq!(names, vec!["CHROME.EXE", "MSEDGE.EXE"]);
        assert_eq!(records[0].size, 8);
        assert!(records[0].modified.is_some());
    }

    #[tokio::test]
    async fn test_collect_file_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("EMPTY.EXE-00000000.pf");
        std::fs::write(&empty, b"").unwrap();

        let service = ArtifactService::new();
        assert_eq!(service.collect_prefetch_file(&empty).await.unwrap(), None);
        assert_eq!(
            service
                .collect_prefetch_file(&dir.path().join("absent.pf"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_rpc_dir_with_explicit_folder() {
        let dir = fixture();
        let service = ArtifactService::new();

        let value = service
            .handle(
                methods::COLLECT_PREFETCH_DIR,
                Some(json!({ "folder": dir.path() })),
            )
            .await
            .unwrap();
        let records: Vec<PrefetchRecord> = serde_json::from_value(value).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_rpc_missing_folder_is_internal_error() {
        let service = ArtifactService::new().with_prefetch_dir("/nonexistent/akf/prefetch");
        let err = service
            .handle(methods::COLLECT_PREFETCH_DIR, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, JsonRpcError::INTERNAL_ERROR);
        assert!(err.message.contains("/nonexistent/akf/prefetch"));
    }

    #[test]
    fn test_executable_without_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NOTEPAD.pf");
        std::fs::write(&path, b"x").unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(record_for(&path, &metadata).executable, "NOTEPAD");
    }
}
