//! Store abstraction consumed by the submission pipeline

use async_trait::async_trait;

use crate::db::models::{PromptFragment, Submission};
use crate::errors::Result;

/// Result of appending a prompt fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentInsert {
    Inserted(PromptFragment),
    /// A fragment with the exact same text already exists
    Duplicate,
}

/// Append-only submission log plus a unique set of prompt fragments.
///
/// Implementations assign ids and creation timestamps. Fragment
/// uniqueness must be enforced by the store itself so that concurrent
/// writers cannot both insert the same text.
#[async_trait]
pub trait IdeaStore: Send + Sync {
    /// Record a submission; failures are `AppError::Persistence`
    async fn insert_submission(&self, idea: &str) -> Result<Submission>;

    /// All submissions, oldest first
    async fn list_submissions(&self) -> Result<Vec<Submission>>;

    /// Exact-match lookup of a fragment
    async fn find_prompt_fragment(&self, prompt_text: &str) -> Result<Option<PromptFragment>>;

    /// Append a fragment unless the exact text is already present
    async fn insert_prompt_fragment(&self, prompt_text: &str) -> Result<FragmentInsert>;

    /// All fragments, oldest first
    async fn list_prompt_fragments(&self) -> Result<Vec<PromptFragment>>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &str;
}
