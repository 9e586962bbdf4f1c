//! Scratch-directory filesystem (spec.md §4.3, the file-lifecycle
//! collaborator). Granting the `filesystem` capability fixes one root
//! directory for the isolate's whole lifetime; every guest-supplied path is
//! resolved against that root and rejected if it would escape it. No
//! directory-provider indirection -- the root is a plain `PathBuf` handed in
//! at isolate-creation time, same as the teacher's config-driven data
//! directories.

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::error_bridge::BridgeError;

const NOT_FOUND_ERROR: &str = "NotFoundError";

/// One entry from a directory listing.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FilesystemApi {
    root: PathBuf,
}

impl FilesystemApi {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Rejects any path that climbs out of the root via `..`, an absolute
    /// component, or a Windows drive prefix.
    fn resolve(&self, path: &str) -> Result<PathBuf, BridgeError> {
        let candidate = Path::new(path);
        let escapes = candidate
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes || path.is_empty() {
            return Err(BridgeError::Validation {
                name: isolate_protocol::error_codes::TYPE_ERROR,
                message: format!("path escapes the filesystem root: {path}"),
            });
        }
        Ok(self.root.join(candidate))
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, BridgeError> {
        let resolved = self.resolve(path)?;
        fs::read(&resolved).await.map_err(|_| not_found(path))
    }

    pub async fn write_file(&self, path: &str, contents: Vec<u8>) -> Result<(), BridgeError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        fs::write(&resolved, contents).await.map_err(io_error)
    }

    pub async fn delete_file(&self, path: &str) -> Result<(), BridgeError> {
        let resolved = self.resolve(path)?;
        fs::remove_file(&resolved).await.map_err(|_| not_found(path))
    }

    /// Lists the files directly under the root (non-recursive; no
    /// subdirectory nesting is exposed to guests in this pass).
    pub async fn list_dir(&self) -> Result<Vec<FileEntry>, BridgeError> {
        fs::create_dir_all(&self.root).await.map_err(io_error)?;
        let mut entries = fs::read_dir(&self.root).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let metadata = entry.metadata().await.map_err(io_error)?;
            if metadata.is_file() {
                files.push(FileEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: metadata.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

fn not_found(path: &str) -> BridgeError {
    BridgeError::Validation {
        name: NOT_FOUND_ERROR,
        message: format!("no such file: {path}"),
    }
}

fn io_error(err: std::io::Error) -> BridgeError {
    BridgeError::Validation {
        name: isolate_protocol::error_codes::OPERATION_ERROR,
        message: err.to_string(),
    }
}
