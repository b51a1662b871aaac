use core::ops::Range;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use bridge_core::workspace::{Document, MemoryWorkspace, Workspace};

/// Workspace backed by files on disk. Documents are held in memory; edits
/// are written through and external changes are picked up by
/// [`FileWorkspace::poll_changes`].
#[derive(Clone)]
pub struct FileWorkspace {
    root: PathBuf,
    documents: MemoryWorkspace,
    /// Last content seen on disk, by URI.
    on_disk: Arc<RwLock<HashMap<String, String>>>,
}

impl core::fmt::Debug for FileWorkspace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileWorkspace")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FileWorkspace {
    /// Loads `files` (relative to `root`). `active` must be one of them; the
    /// first file is active otherwise.
    pub async fn open(root: &Path, files: &[String], active: Option<&str>) -> Result<Self> {
        let ws = Self {
            root: root.to_path_buf(),
            documents: MemoryWorkspace::new(),
            on_disk: Arc::new(RwLock::new(HashMap::new())),
        };
        for uri in files {
            let path = ws.path(uri);
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading workspace file {}", path.display()))?;
            ws.on_disk.write().await.insert(uri.clone(), text.clone());
            ws.documents.open(Document::new(uri.as_str(), text)).await;
        }
        if let Some(active) = active {
            ws.documents
                .set_active(active)
                .await
                .with_context(|| format!("activating {active}"))?;
        }
        info!(root = %root.display(), files = files.len(), "Workspace loaded");
        Ok(ws)
    }

    fn path(&self, uri: &str) -> PathBuf {
        self.root.join(uri)
    }

    /// Re-reads every open file and returns the documents whose content
    /// changed on disk since the last look.
    pub async fn poll_changes(&self) -> Vec<Document> {
        let mut changed = Vec::new();
        for doc in self.documents.open_documents().await {
            let text = match tokio::fs::read_to_string(self.path(&doc.uri)).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(document = %doc.uri, error = %e, "Failed to re-read workspace file");
                    continue;
                }
            };
            let mut on_disk = self.on_disk.write().await;
            if on_disk.get(&doc.uri) == Some(&text) {
                continue;
            }
            debug!(document = %doc.uri, len = text.len(), "Workspace file changed");
            on_disk.insert(doc.uri.clone(), text.clone());
            drop(on_disk);
            self.documents.set_text(&doc.uri, &text).await;
            if let Some(updated) = self.documents.document(&doc.uri).await {
                changed.push(updated);
            }
        }
        changed
    }

    async fn write_through(&self, uri: &str) -> Result<()> {
        let Some(doc) = self.documents.document(uri).await else {
            return Ok(());
        };
        let path = self.path(uri);
        tokio::fs::write(&path, &doc.text)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        self.on_disk.write().await.insert(doc.uri, doc.text);
        Ok(())
    }
}

#[async_trait]
impl Workspace for FileWorkspace {
    async fn active_document(&self) -> Option<Document> {
        self.documents.active_document().await
    }

    async fn open_documents(&self) -> Vec<Document> {
        self.documents.open_documents().await
    }

    async fn replace(&self, uri: &str, range: Range<usize>, text: &str) -> Result<()> {
        self.documents.replace(uri, range, text).await?;
        self.write_through(uri).await
    }

    async fn set_cursor(&self, uri: &str, offset: usize) -> Result<()> {
        self.documents.set_cursor(uri, offset).await
    }

    async fn read_clipboard(&self) -> Result<String> {
        self.documents.read_clipboard().await
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        self.documents.write_clipboard(text).await
    }

    async fn notify(&self, message: &str) {
        self.documents.notify(message).await;
    }
}
