use core::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::workspace::Document;

/// A context usage reading scraped from a chat document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSizeInfo {
    pub percentage: f64,
    pub source: &'static str,
    pub timestamp: OffsetDateTime,
}

/// Patterns tried in order; the first match with a value in `0..=100` wins.
const PATTERNS: &[(&str, &str)] = &[
    (r"(?i)context\s*size\s*:\s*(\d+(?:\.\d+)?)%", "context_label"),
    (r"(?i)(?:context|size|usage)\s*:?\s*(\d+(?:\.\d+)?)%", "usage_label"),
    (
        r"(?i)(\d+(?:\.\d+)?)%\s*(?:used|full|occupied|consumed)",
        "usage_suffix",
    ),
    (r"(\d+(?:\.\d+)?)%", "content_pattern"),
];

/// Remembers the last successful context-size reading.
#[derive(Clone)]
pub struct ContextSizeDetector {
    patterns: Arc<[(Regex, &'static str)]>,
    last: Arc<RwLock<Option<ContextSizeInfo>>>,
}

impl fmt::Debug for ContextSizeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSizeDetector").finish_non_exhaustive()
    }
}

impl ContextSizeDetector {
    pub fn new() -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|(p, source)| {
                Regex::new(p)
                    .map(|re| (re, *source))
                    .with_context(|| format!("compiling context pattern {p}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns: patterns.into(),
            last: Arc::new(RwLock::new(None)),
        })
    }

    /// Scans `text` for a usage percentage.
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<ContextSizeInfo> {
        self.patterns.iter().find_map(|(re, source)| {
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
                .find(|p| (0.0..=100.0).contains(p))
                .map(|percentage| ContextSizeInfo {
                    percentage,
                    source: *source,
                    timestamp: OffsetDateTime::now_utc(),
                })
        })
    }

    /// Re-reads `doc` and stores the reading if one is found. The previous
    /// reading is kept otherwise.
    pub async fn refresh(&self, doc: Option<&Document>) -> Option<ContextSizeInfo> {
        if let Some(info) = doc.and_then(|d| self.detect(&d.text)) {
            tracing::debug!(percentage = info.percentage, source = info.source, "context size detected");
            *self.last.write().await = Some(info);
        }
        self.current().await
    }

    pub async fn current(&self) -> Option<ContextSizeInfo> {
        self.last.read().await.clone()
    }

    pub async fn is_available(&self) -> bool {
        self.last.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_readings_take_priority() {
        let d = ContextSizeDetector::new().unwrap();
        let info = d
            .detect("Progress 12% done\nContext size: 85.4%")
            .unwrap();
        assert!((info.percentage - 85.4).abs() < f64::EPSILON);
        assert_eq!(info.source, "context_label");

        let info = d.detect("tokens: 70% used").unwrap();
        assert_eq!(info.source, "usage_suffix");

        let info = d.detect("just 42%").unwrap();
        assert_eq!(info.source, "content_pattern");
    }

    #[test]
    fn out_of_range_values_are_skipped() {
        let d = ContextSizeDetector::new().unwrap();
        assert!(d.detect("no numbers here").is_none());
        let info = d.detect("150% then 30%").unwrap();
        assert!((info.percentage - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn refresh_keeps_last_reading() {
        let d = ContextSizeDetector::new().unwrap();
        assert!(d.refresh(None).await.is_none());

        let doc = Document::new("chat.md", "Context: 55%");
        assert!(d.refresh(Some(&doc)).await.is_some());

        let empty = Document::new("chat.md", "nothing");
        let kept = d.refresh(Some(&empty)).await.unwrap();
        assert!((kept.percentage - 55.0).abs() < f64::EPSILON);
        assert!(d.is_available().await);
    }
}
