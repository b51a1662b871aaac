use core::{fmt, ops::Range};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Snapshot of an open editor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: String,
    /// Last path segment of the URI.
    pub name: String,
    pub scheme: String,
    pub text: String,
    /// Byte offset of the input cursor.
    pub cursor: usize,
}

impl Document {
    /// Builds a document, deriving its name and scheme from `uri`. A URI
    /// without a scheme is treated as `file`.
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        let uri = uri.into();
        let scheme = uri
            .split_once("://")
            .map_or("file", |(scheme, _)| scheme)
            .to_owned();
        let name = uri
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&uri)
            .to_owned();
        Self {
            uri,
            name,
            scheme,
            text: text.into(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.lines().count().max(1)
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        self.name.rsplit_once('.').map_or("txt", |(_, ext)| ext)
    }
}

/// Editor capabilities the bridge needs.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn active_document(&self) -> Option<Document>;

    /// Every open document in tab order, the active one included.
    async fn open_documents(&self) -> Vec<Document>;

    /// Replaces the byte `range` of the document at `uri` with `text`.
    async fn replace(&self, uri: &str, range: Range<usize>, text: &str) -> Result<()>;

    async fn set_cursor(&self, uri: &str, offset: usize) -> Result<()>;

    async fn read_clipboard(&self) -> Result<String>;

    async fn write_clipboard(&self, text: &str) -> Result<()>;

    /// Shows a local notification to the editor user.
    async fn notify(&self, message: &str);

    async fn insert(&self, uri: &str, offset: usize, text: &str) -> Result<()> {
        self.replace(uri, offset..offset, text).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<Document>,
    active: Option<String>,
    clipboard: String,
    notifications: Vec<String>,
}

/// In-process workspace. Used directly in tests and as the document store
/// behind the file-backed workspace of the binary.
#[derive(Clone, Default)]
pub struct MemoryWorkspace {
    state: Arc<RwLock<MemoryState>>,
}

impl fmt::Debug for MemoryWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWorkspace").finish_non_exhaustive()
    }
}

impl MemoryWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) a document. The first document opened becomes
    /// active.
    pub async fn open(&self, doc: Document) {
        let mut state = self.state.write().await;
        if state.active.is_none() {
            state.active = Some(doc.uri.clone());
        }
        if let Some(existing) = state.documents.iter_mut().find(|d| d.uri == doc.uri) {
            *existing = doc;
        } else {
            state.documents.push(doc);
        }
    }

    pub async fn close(&self, uri: &str) {
        let mut state = self.state.write().await;
        state.documents.retain(|d| d.uri != uri);
        if state.active.as_deref() == Some(uri) {
            state.active = state.documents.first().map(|d| d.uri.clone());
        }
    }

    pub async fn set_active(&self, uri: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.documents.iter().any(|d| d.uri == uri) {
            bail!("document not open: {uri}");
        }
        state.active = Some(uri.to_owned());
        Ok(())
    }

    /// Replaces the whole text of an open document, keeping the cursor in
    /// bounds. Returns `false` when the document is not open.
    pub async fn set_text(&self, uri: &str, text: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(doc) = state.documents.iter_mut().find(|d| d.uri == uri) else {
            return false;
        };
        doc.text = text.to_owned();
        doc.cursor = doc.cursor.min(doc.text.len());
        while !doc.text.is_char_boundary(doc.cursor) {
            doc.cursor -= 1;
        }
        true
    }

    pub async fn document(&self, uri: &str) -> Option<Document> {
        let state = self.state.read().await;
        state.documents.iter().find(|d| d.uri == uri).cloned()
    }

    pub async fn notifications(&self) -> Vec<String> {
        self.state.read().await.notifications.clone()
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    async fn active_document(&self) -> Option<Document> {
        let state = self.state.read().await;
        let active = state.active.as_deref()?;
        state.documents.iter().find(|d| d.uri == active).cloned()
    }

    async fn open_documents(&self) -> Vec<Document> {
        self.state.read().await.documents.clone()
    }

    async fn replace(&self, uri: &str, range: Range<usize>, text: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.uri == uri)
            .ok_or_else(|| anyhow!("document not open: {uri}"))?;
        if range.start > range.end
            || range.end > doc.text.len()
            || !doc.text.is_char_boundary(range.start)
            || !doc.text.is_char_boundary(range.end)
        {
            bail!("edit range {range:?} is outside {uri}");
        }
        let removed = range.end - range.start;
        doc.text.replace_range(range.clone(), text);
        if doc.cursor >= range.end {
            doc.cursor = doc.cursor - removed + text.len();
        } else if doc.cursor > range.start {
            doc.cursor = range.start;
        }
        Ok(())
    }

    async fn set_cursor(&self, uri: &str, offset: usize) -> Result<()> {
        let mut state = self.state.write().await;
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.uri == uri)
            .ok_or_else(|| anyhow!("document not open: {uri}"))?;
        if offset > doc.text.len() || !doc.text.is_char_boundary(offset) {
            bail!("cursor offset {offset} is outside {uri}");
        }
        doc.cursor = offset;
        Ok(())
    }

    async fn read_clipboard(&self) -> Result<String> {
        Ok(self.state.read().await.clipboard.clone())
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        text.clone_into(&mut self.state.write().await.clipboard);
        Ok(())
    }

    async fn notify(&self, message: &str) {
        tracing::info!(message, "workspace notification");
        self.state
            .write()
            .await
            .notifications
            .push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_identity_from_uri() {
        let doc = Document::new("file:///home/me/notes/chat.md", "hi");
        assert_eq!(doc.scheme, "file");
        assert_eq!(doc.name, "chat.md");
        assert_eq!(doc.extension(), "md");

        let bare = Document::new("scratch", "");
        assert_eq!(bare.scheme, "file");
        assert_eq!(bare.name, "scratch");
        assert_eq!(bare.line_count(), 1);
    }

    #[tokio::test]
    async fn replace_moves_cursor_after_edit() {
        let ws = MemoryWorkspace::new();
        ws.open(Document::new("a.md", "hello world")).await;
        ws.set_cursor("a.md", 11).await.unwrap();

        ws.replace("a.md", 0..5, "goodbye").await.unwrap();
        let doc = ws.document("a.md").await.unwrap();
        assert_eq!(doc.text, "goodbye world");
        assert_eq!(doc.cursor, 13);

        assert!(ws.replace("a.md", 5..100, "x").await.is_err());
        assert!(ws.replace("missing.md", 0..0, "x").await.is_err());
    }

    #[tokio::test]
    async fn first_document_becomes_active() {
        let ws = MemoryWorkspace::new();
        assert!(ws.active_document().await.is_none());
        ws.open(Document::new("one.md", "1")).await;
        ws.open(Document::new("two.md", "2")).await;
        assert_eq!(ws.active_document().await.unwrap().uri, "one.md");

        ws.set_active("two.md").await.unwrap();
        ws.close("two.md").await;
        assert_eq!(ws.active_document().await.unwrap().uri, "one.md");
    }

    #[tokio::test]
    async fn clipboard_and_notifications() {
        let ws = MemoryWorkspace::new();
        ws.write_clipboard("copied").await.unwrap();
        assert_eq!(ws.read_clipboard().await.unwrap(), "copied");
        ws.notify("hello").await;
        assert_eq!(ws.notifications().await, ["hello"]);
    }
}
