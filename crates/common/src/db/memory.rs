//! In-memory `IdeaStore`
//!
//! Used for local development (`store.backend = "memory"`) and as the
//! store double in tests. Both collections live behind one write lock,
//! so the fragment check-and-insert is atomic.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{PromptFragment, Submission};
use crate::db::store::{FragmentInsert, IdeaStore};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct Collections {
    submissions: Vec<Submission>,
    fragments: Vec<PromptFragment>,
}

/// Process-local store; contents vanish with the process
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `AppError::Persistence`
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence {
                message: "store is rejecting writes".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IdeaStore for MemoryStore {
    async fn insert_submission(&self, idea: &str) -> Result<Submission> {
        self.check_writable()?;

        let submission = Submission {
            id: Uuid::now_v7(),
            idea: idea.to_string(),
            created_at: chrono::Utc::now().into(),
        };
        self.inner.write().await.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>> {
        Ok(self.inner.read().await.submissions.clone())
    }

    async fn find_prompt_fragment(&self, prompt_text: &str) -> Result<Option<PromptFragment>> {
        Ok(self
            .inner
            .read()
            .await
            .fragments
            .iter()
            .find(|f| f.prompt_text == prompt_text)
            .cloned())
    }

    async fn insert_prompt_fragment(&self, prompt_text: &str) -> Result<FragmentInsert> {
        self.check_writable()?;

        let mut inner = self.inner.write().await;
        if inner.fragments.iter().any(|f| f.prompt_text == prompt_text) {
            return Ok(FragmentInsert::Duplicate);
        }

        let fragment = PromptFragment {
            id: Uuid::now_v7(),
            prompt_text: prompt_text.to_string(),
            created_at: chrono::Utc::now().into(),
        };
        inner.fragments.push(fragment.clone());
        Ok(FragmentInsert::Inserted(fragment))
    }

    async fn list_prompt_fragments(&self) -> Result<Vec<PromptFragment>> {
        Ok(self.inner.read().await.fragments.clone())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_fragment_leaves_collection_unchanged() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert_prompt_fragment("Be kind.").await.unwrap(),
            FragmentInsert::Inserted(_)
        ));
        assert_eq!(
            store.insert_prompt_fragment("Be kind.").await.unwrap(),
            FragmentInsert::Duplicate
        );
        // Case-sensitive exact match
        assert!(matches!(
            store.insert_prompt_fragment("be kind.").await.unwrap(),
            FragmentInsert::Inserted(_)
        ));
        assert_eq!(store.list_prompt_fragments().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_long_fragment_dedups() {
        let store = MemoryStore::new();
        let long = "Respond thoroughly. ".repeat(400);
        assert!(matches!(
            store.insert_prompt_fragment(&long).await.unwrap(),
            FragmentInsert::Inserted(_)
        ));
        assert_eq!(
            store.insert_prompt_fragment(&long).await.unwrap(),
            FragmentInsert::Duplicate
        );
    }

    #[tokio::test]
    async fn test_submissions_keep_insertion_order() {
        let store = MemoryStore::new();
        for idea in ["first", "second", "third"] {
            store.insert_submission(idea).await.unwrap();
        }
        let ideas: Vec<String> = store
            .list_submissions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.idea)
            .collect();
        assert_eq!(ideas, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_find_prompt_fragment() {
        let store = MemoryStore::new();
        store.insert_prompt_fragment("Cite sources.").await.unwrap();
        assert!(store.find_prompt_fragment("Cite sources.").await.unwrap().is_some());
        assert!(store.find_prompt_fragment("Cite sources").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let store = MemoryStore::new();
        store.reject_writes(true);
        let err = store.insert_submission("idea").await.unwrap_err();
        assert!(matches!(err, AppError::Persistence { .. }));
        assert!(store.list_submissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_identical_fragments_insert_once() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_prompt_fragment("Be brief.").await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if let FragmentInsert::Inserted(_) = handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.list_prompt_fragments().await.unwrap().len(), 1);
    }
}
