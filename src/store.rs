//! Durable per-document progress.
//!
//! One JSON file per document at `<root>/<key>/progress.json`:
//!
//! ```json
//! { "translated_texts": ["page 1 text", "\n\n> [ERROR] Page 2 ...", "page 3 text"] }
//! ```
//!
//! The list holds one entry per *attempted* page, so its length is the
//! resume point. Writes go to a sibling temp file first and are renamed into
//! place, so a crash mid-write leaves the previous state intact.

use crate::error::TranslateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationProgress {
    pub translated_texts: Vec<String>,
}

impl TranslationProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.translated_texts.push(text.into());
    }

    pub fn len(&self) -> usize {
        self.translated_texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translated_texts.is_empty()
    }

    /// 0-based index of the next page to translate.
    pub fn resume_point(&self) -> usize {
        self.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.translated_texts.last().map(String::as_str)
    }

    pub fn texts(&self) -> &[String] {
        &self.translated_texts
    }
}

/// Progress files under one root directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything for `key` (page images included).
    pub fn document_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.document_dir(key).join(PROGRESS_FILE)
    }

    /// Stored progress for `key`. Missing, unreadable and corrupt files all
    /// load as `None`.
    pub async fn load(&self, key: &str) -> Option<TranslationProgress> {
        let path = self.path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read {}: {}; starting fresh", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<TranslationProgress>(&raw) {
            Ok(progress) => {
                debug!("Loaded {} pages of progress from {}", progress.len(), path.display());
                Some(progress)
            }
            Err(e) => {
                warn!("Corrupt progress file {}: {}; starting fresh", path.display(), e);
                None
            }
        }
    }

    /// Persist `progress` for `key`. Returns only after the data is in place.
    pub async fn save(&self, key: &str, progress: &TranslationProgress) -> Result<(), TranslateError> {
        let dir = self.document_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| TranslateError::CreateDirFailed {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(PROGRESS_FILE);
        let json = serde_json::to_string_pretty(progress)
            .map_err(|e| TranslateError::Internal(format!("serialise progress: {e}")))?;
        let write_err = |source| TranslateError::ProgressWriteFailed {
            path: path.clone(),
            source,
        };

        let tmp = dir.join(format!("{PROGRESS_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;
        debug!("Saved {} pages of progress to {}", progress.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::error_placeholder;

    fn sample() -> TranslationProgress {
        let mut p = TranslationProgress::new();
        p.push("第一页\n\n$E = mc^2$");
        p.push(error_placeholder(2));
        p.push("引号 \"quoted\" and \\ backslash");
        p
    }

    #[tokio::test]
    async fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let progress = sample();
        store.save("paper", &progress).await.unwrap();
        assert_eq!(store.load("paper").await, Some(progress));
        assert!(!dir.path().join("paper/progress.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        assert_eq!(store.load("nothing-here").await, None);
    }

    #[tokio::test]
    async fn corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("paper")).unwrap();
        std::fs::write(store.path("paper"), "{\"translated_texts\": [\"trunc").unwrap();
        assert_eq!(store.load("paper").await, None);

        std::fs::write(store.path("paper"), "{\"pages\": 3}").unwrap();
        assert_eq!(store.load("paper").await, None);
    }

    #[tokio::test]
    async fn on_disk_format_is_a_single_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        store.save("paper", &sample()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path("paper")).unwrap()).unwrap();
        let obj = raw.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["translated_texts"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn resume_point_is_length() {
        let p = sample();
        assert_eq!(p.resume_point(), 3);
        assert!(p.last().unwrap().contains("backslash"));
    }
}
