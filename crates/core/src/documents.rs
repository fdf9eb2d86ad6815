use crate::extractor::is_supported;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use walkdir::WalkDir;

/// Directory holding uploaded source files, keyed by file name. Saving a
/// name that already exists overwrites it.
///
/// Clones share one indexing lock. Uploads hold it shared from save until
/// their chunks are indexed; a reindex holds it exclusively from listing the
/// directory until the rebuild finishes.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    indexing: Arc<RwLock<()>>,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexing: Arc::new(RwLock::new(())),
        }
    }

    pub async fn upload_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.indexing.read().await
    }

    pub async fn reindex_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.indexing.write().await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<bool> {
        if tokio::fs::try_exists(&self.root).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(true)
    }

    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {file_name:?}"),
            )
        })?;

        self.ensure_root().await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub fn list(&self) -> Vec<PathBuf> {
        discover_documents(&self.root)
    }
}

/// Keeps only the final path component so uploads cannot escape the root.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let last = file_name
        .rsplit(|ch| ch == '/' || ch == '\\')
        .next()
        .map(str::trim)
        .unwrap_or_default();

    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return None;
    }
    Some(last.to_string())
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && is_supported(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
