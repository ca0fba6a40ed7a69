//! Managed upload storage.
//!
//! [`UploadStore`] is the interface the archive writer registers files
//! through.  The default implementation is [`LocalUploadStore`], which keeps
//! each upload as a directory with a JSON manifest.  To target a remote
//! repository, implement [`UploadStore`] for a client type and hand it to
//! [`ArchiveWriter`](crate::archive::ArchiveWriter).
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::runtime::types::WorkflowError;

pub const MANIFEST_FILE_NAME: &str = "upload.json";
pub const RAW_DIR_NAME: &str = "raw";

/// A change applied to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    /// Copy `path` into the upload under `target_dir`.  A temporary source
    /// is removed once it has been registered.
    Add {
        path: PathBuf,
        target_dir: String,
        temporary: bool,
    },
}

/// Effect of an `Add` operation on the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    Updated,
    /// The upload already held a byte-identical file.
    Unchanged,
}

/// Result of one file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    /// Path of the file relative to the upload's raw directory.
    pub path: String,
    pub outcome: AddOutcome,
}

pub trait UploadStore: Send + Sync + 'static {
    /// Fail with `UploadNotFound` or `AccessDenied` unless `user_id` may read
    /// the upload.
    fn check_read_access(
        &self,
        upload_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), WorkflowError>> + Send;

    /// Apply `operations` to the upload and reprocess it.  With
    /// `only_updated_files` set, unchanged files are left unprocessed.
    fn process_upload(
        &self,
        upload_id: &str,
        operations: Vec<FileOperation>,
        only_updated_files: bool,
    ) -> impl Future<Output = Result<Vec<ProcessedFile>, WorkflowError>> + Send;
}

/// A file registered in an upload manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub temporary: bool,
    pub processed: bool,
    pub size: u64,
    pub added_at: DateTime<Utc>,
}

/// Contents of `upload.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub upload_id: String,
    pub main_author: String,
    #[serde(default)]
    pub coauthors: Vec<String>,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    pub created_at: DateTime<Utc>,
}

impl UploadManifest {
    pub fn can_read(&self, user_id: &str) -> bool {
        self.main_author == user_id
            || self.coauthors.iter().any(|u| u == user_id)
            || self.reviewers.iter().any(|u| u == user_id)
    }
}

/// Filesystem-backed upload store.
///
/// Layout: `<root>/<upload_id>/upload.json` plus `<root>/<upload_id>/raw/`.
#[derive(Debug, Clone)]
pub struct LocalUploadStore {
    root: PathBuf,
    /// Serializes manifest read-modify-write cycles.
    lock: Arc<Mutex<()>>,
}

impl LocalUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(upload_id)
    }

    /// Directory that raw file names of the upload resolve against.
    pub fn raw_dir(&self, upload_id: &str) -> PathBuf {
        self.upload_dir(upload_id).join(RAW_DIR_NAME)
    }

    /// Provision an empty upload owned by `main_author`.
    pub async fn create_upload(
        &self,
        upload_id: &str,
        main_author: &str,
        coauthors: Vec<String>,
    ) -> Result<UploadManifest, WorkflowError> {
        if !is_upload_id(upload_id) {
            return Err(WorkflowError::io(format!("invalid upload id '{upload_id}'")));
        }
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(self.raw_dir(upload_id))
            .await
            .map_err(WorkflowError::io)?;

        let manifest = UploadManifest {
            upload_id: upload_id.to_owned(),
            main_author: main_author.to_owned(),
            coauthors,
            reviewers: Vec::new(),
            files: Vec::new(),
            created_at: Utc::now(),
        };
        self.write_manifest(&manifest).await?;
        info!(upload_id, main_author, "upload created");
        Ok(manifest)
    }

    pub async fn manifest(&self, upload_id: &str) -> Result<UploadManifest, WorkflowError> {
        if !is_upload_id(upload_id) {
            return Err(WorkflowError::UploadNotFound {
                upload_id: upload_id.to_owned(),
            });
        }
        let path = self.upload_dir(upload_id).join(MANIFEST_FILE_NAME);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowError::UploadNotFound {
                    upload_id: upload_id.to_owned(),
                });
            }
            Err(e) => return Err(WorkflowError::io(e)),
        };
        serde_json::from_slice(&bytes).map_err(WorkflowError::io)
    }

    async fn write_manifest(&self, manifest: &UploadManifest) -> Result<(), WorkflowError> {
        let path = self
            .upload_dir(&manifest.upload_id)
            .join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(manifest).map_err(WorkflowError::io)?;
        tokio::fs::write(path, json).await.map_err(WorkflowError::io)
    }

    async fn apply_add(
        &self,
        manifest: &mut UploadManifest,
        source: &Path,
        target_dir: &str,
        temporary: bool,
        only_updated_files: bool,
    ) -> Result<ProcessedFile, WorkflowError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| WorkflowError::io(format!("not a file: {}", source.display())))?;
        let relative = relative_target(target_dir, &file_name)?;
        let dest = self.raw_dir(&manifest.upload_id).join(&relative);

        let bytes = match tokio::fs::read(source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowError::MissingFile {
                    path: source.display().to_string(),
                });
            }
            Err(e) => return Err(WorkflowError::io(e)),
        };

        let outcome = match tokio::fs::read(&dest).await {
            Ok(existing) if existing == bytes => AddOutcome::Unchanged,
            Ok(_) => AddOutcome::Updated,
            Err(_) => AddOutcome::Added,
        };

        if outcome != AddOutcome::Unchanged {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(WorkflowError::io)?;
            }
            tokio::fs::write(&dest, &bytes)
                .await
                .map_err(WorkflowError::io)?;
        }
        if temporary {
            tokio::fs::remove_file(source)
                .await
                .map_err(WorkflowError::io)?;
        }

        let reprocess = !only_updated_files || outcome != AddOutcome::Unchanged;
        let now = Utc::now();
        match manifest.files.iter_mut().find(|f| f.path == relative) {
            Some(entry) => {
                entry.size = bytes.len() as u64;
                entry.temporary = temporary;
                if reprocess {
                    entry.processed = true;
                    entry.added_at = now;
                }
            }
            None => manifest.files.push(ManifestFile {
                path: relative.clone(),
                temporary,
                processed: true,
                size: bytes.len() as u64,
                added_at: now,
            }),
        }

        debug!(upload_id = %manifest.upload_id, path = %relative, ?outcome, "file registered");
        Ok(ProcessedFile {
            path: relative,
            outcome,
        })
    }
}

impl UploadStore for LocalUploadStore {
    async fn check_read_access(&self, upload_id: &str, user_id: &str) -> Result<(), WorkflowError> {
        let manifest = self.manifest(upload_id).await?;
        if manifest.can_read(user_id) {
            Ok(())
        } else {
            Err(WorkflowError::AccessDenied {
                upload_id: upload_id.to_owned(),
                user_id: user_id.to_owned(),
            })
        }
    }

    async fn process_upload(
        &self,
        upload_id: &str,
        operations: Vec<FileOperation>,
        only_updated_files: bool,
    ) -> Result<Vec<ProcessedFile>, WorkflowError> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.manifest(upload_id).await?;

        let mut processed = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation {
                FileOperation::Add {
                    path,
                    target_dir,
                    temporary,
                } => {
                    let file = self
                        .apply_add(&mut manifest, &path, &target_dir, temporary, only_updated_files)
                        .await?;
                    processed.push(file);
                }
            }
        }

        self.write_manifest(&manifest).await?;
        info!(upload_id, files = processed.len(), "upload processed");
        Ok(processed)
    }
}

/// Upload ids are a single normal path component below the store root.
fn is_upload_id(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `target_dir/file_name` as a normalized relative path.
fn relative_target(target_dir: &str, file_name: &str) -> Result<String, WorkflowError> {
    let mut parts = Vec::new();
    for component in Path::new(target_dir).join(file_name).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(WorkflowError::io(format!(
                    "invalid target path '{target_dir}/{file_name}'"
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_upload() -> (tempfile::TempDir, LocalUploadStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalUploadStore::new(dir.path().join("uploads"));
        store
            .create_upload("upload-1", "alice", vec!["bob".into()])
            .await
            .expect("create upload");
        (dir, store)
    }

    #[tokio::test]
    async fn access_follows_membership() {
        let (_dir, store) = store_with_upload().await;
        assert!(store.check_read_access("upload-1", "alice").await.is_ok());
        assert!(store.check_read_access("upload-1", "bob").await.is_ok());
        assert!(matches!(
            store.check_read_access("upload-1", "mallory").await,
            Err(WorkflowError::AccessDenied { .. })
        ));
        assert!(matches!(
            store.check_read_access("missing", "alice").await,
            Err(WorkflowError::UploadNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn identical_add_is_unchanged() {
        let (dir, store) = store_with_upload().await;
        let add = |content: &'static str| {
            let source = dir.path().join("result.json");
            std::fs::write(&source, content).expect("write source");
            FileOperation::Add {
                path: source,
                target_dir: "run-1".into(),
                temporary: true,
            }
        };

        let first = store
            .process_upload("upload-1", vec![add("{}")], true)
            .await
            .expect("first add");
        assert_eq!(first[0].outcome, AddOutcome::Added);
        assert_eq!(first[0].path, "run-1/result.json");
        assert!(!dir.path().join("result.json").exists());

        let second = store
            .process_upload("upload-1", vec![add("{}")], true)
            .await
            .expect("second add");
        assert_eq!(second[0].outcome, AddOutcome::Unchanged);

        let third = store
            .process_upload("upload-1", vec![add("{\"a\":1}")], true)
            .await
            .expect("third add");
        assert_eq!(third[0].outcome, AddOutcome::Updated);

        let manifest = store.manifest("upload-1").await.expect("manifest");
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].size, 7);
    }

    #[test]
    fn target_paths_cannot_escape() {
        assert!(relative_target("../other", "x.json").is_err());
        assert!(relative_target("/abs", "x.json").is_err());
        assert_eq!(relative_target("", "x.json").expect("plain"), "x.json");
        assert!(!is_upload_id("a/b"));
        assert!(!is_upload_id(".."));
        assert!(is_upload_id("upload-1"));
    }

    #[tokio::test]
    async fn malformed_upload_id_is_not_found() {
        let (_dir, store) = store_with_upload().await;
        for upload_id in ["../upload-1", "upload-1/raw", "/etc", ""] {
            assert!(matches!(
                store.manifest(upload_id).await,
                Err(WorkflowError::UploadNotFound { .. })
            ));
            assert!(matches!(
                store.check_read_access(upload_id, "alice").await,
                Err(WorkflowError::UploadNotFound { .. })
            ));
        }
        assert!(store.create_upload("a/b", "alice", Vec::new()).await.is_err());
    }
}
