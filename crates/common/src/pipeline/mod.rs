//! Submission pipeline
//!
//! Sequences the store and the text service for one visitor idea:
//!
//! ```text
//! Validating -> Persisting -> Transforming(attempt 1..n) -> Deduplicating -> Done
//! ```
//!
//! Any stage can end in `Failed`. A successful `Persisting` is never
//! rolled back; failures after it surface as
//! `AppError::PromptUpdateFailed` carrying the saved submission id.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::db::models::{PromptFragment, Submission};
use crate::db::{FragmentInsert, IdeaStore};
use crate::errors::{AppError, Result};
use crate::llm::{GenerationError, TextGenerator};
use crate::metrics;
use crate::retry::RetryPolicy;

/// Instruction for turning one idea into a prompt fragment
pub const TRANSFORM_INSTRUCTION: &str = "Rewrite the following idea about how an AI assistant should behave \
    as one brief, standalone behavioral directive. It will be appended to an existing list of similar \
    directives, so keep it short and self-contained. Reply with the directive only.";

/// Instruction for merging every idea into one prompt
pub const COMBINE_INSTRUCTION: &str = "Combine the described AI behaviors below into a single system prompt \
    that achieves all of them while reducing complexity and eliminating redundancy and contradiction. \
    Reply with the combined prompt only, nothing else.";

/// Reply used when the chat model never produces text
pub const CHAT_FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";

/// Separator between fragments in the derived system prompt
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Default maximum idea length in characters
pub const DEFAULT_MAX_IDEA_CHARS: usize = 2000;

/// What happened to the fragment derived from a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    Appended(PromptFragment),
    /// Identical text was already in the fragment set
    AlreadyPresent(String),
}

impl FragmentOutcome {
    pub fn prompt_text(&self) -> &str {
        match self {
            FragmentOutcome::Appended(fragment) => &fragment.prompt_text,
            FragmentOutcome::AlreadyPresent(prompt_text) => prompt_text,
        }
    }
}

/// Result of `SubmissionPipeline::submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub submission: Submission,
    pub fragment: FragmentOutcome,
}

/// Result of `SubmissionPipeline::submit_and_combine`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineOutcome {
    pub submission: Submission,
    /// Transient; never persisted
    pub combined_prompt: String,
    pub idea_count: usize,
}

/// Orchestrates store writes and text service calls
pub struct SubmissionPipeline {
    store: Arc<dyn IdeaStore>,
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy<GenerationError>,
    max_idea_chars: usize,
}

impl SubmissionPipeline {
    /// Create a pipeline with the default retry policy (3 attempts, 1s base)
    pub fn new(store: Arc<dyn IdeaStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            retry: RetryPolicy::default(),
            max_idea_chars: DEFAULT_MAX_IDEA_CHARS,
        }
    }

    /// Create a pipeline using the `llm` and `pipeline` config sections
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn IdeaStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self::new(store, generator)
            .with_retry_policy(RetryPolicy::for_generation(
                config.llm.max_attempts,
                config.backoff_base(),
            ))
            .with_max_idea_chars(config.pipeline.max_idea_chars)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<GenerationError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_idea_chars(mut self, max: usize) -> Self {
        self.max_idea_chars = max;
        self
    }

    pub fn store(&self) -> &Arc<dyn IdeaStore> {
        &self.store
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Record an idea and fold it into the prompt fragment set
    pub async fn submit(&self, idea: &str) -> Result<SubmitOutcome> {
        debug!(stage = "validating", "Submit started");
        self.validate_idea(idea)?;

        let submission = self.persist(idea, "fragments").await?;

        match self.derive_fragment(idea).await {
            Ok(fragment) => {
                info!(
                    stage = "done",
                    submission_id = %submission.id,
                    appended = matches!(fragment, FragmentOutcome::Appended(_)),
                    "Submission processed"
                );
                Ok(SubmitOutcome { submission, fragment })
            }
            Err(err) => Err(self.after_persist_failure(submission.id, err)),
        }
    }

    /// Record an idea, then combine every stored idea into one prompt
    pub async fn submit_and_combine(&self, idea: &str) -> Result<CombineOutcome> {
        debug!(stage = "validating", "Submit (combine) started");
        self.validate_idea(idea)?;

        let submission = self.persist(idea, "combine").await?;

        let combined = async {
            let ideas: Vec<String> = self
                .store
                .list_submissions()
                .await?
                .into_iter()
                .map(|s| s.idea)
                .collect();
            debug!(stage = "combining", idea_count = ideas.len(), "Combining ideas");
            let prompt = self.combine(&ideas).await?;
            Ok::<_, AppError>((prompt, ideas.len()))
        }
        .await;

        match combined {
            Ok((combined_prompt, idea_count)) => {
                info!(
                    stage = "done",
                    submission_id = %submission.id,
                    idea_count,
                    "Submission combined"
                );
                Ok(CombineOutcome { submission, combined_prompt, idea_count })
            }
            Err(err) => Err(self.after_persist_failure(submission.id, err)),
        }
    }

    async fn persist(&self, idea: &str, strategy: &str) -> Result<Submission> {
        debug!(stage = "persisting", "Saving submission");
        let submission = self.store.insert_submission(idea).await.map_err(|err| {
            warn!(stage = "failed", error = %err, "Submission was not saved");
            err
        })?;
        metrics::record_submission(strategy);
        info!(submission_id = %submission.id, "Submission saved");
        Ok(submission)
    }

    async fn derive_fragment(&self, idea: &str) -> Result<FragmentOutcome> {
        debug!(stage = "transforming", "Deriving prompt fragment");
        let prompt_text = self.transform(idea).await?;

        debug!(stage = "deduplicating", "Checking for an identical fragment");
        if self.store.find_prompt_fragment(&prompt_text).await?.is_some() {
            metrics::record_fragment(false);
            return Ok(FragmentOutcome::AlreadyPresent(prompt_text));
        }

        match self.store.insert_prompt_fragment(&prompt_text).await? {
            FragmentInsert::Inserted(fragment) => {
                metrics::record_fragment(true);
                Ok(FragmentOutcome::Appended(fragment))
            }
            // Lost the race to a concurrent writer; the store's constraint decided
            FragmentInsert::Duplicate => {
                metrics::record_fragment(false);
                Ok(FragmentOutcome::AlreadyPresent(prompt_text))
            }
        }
    }

    fn after_persist_failure(&self, submission_id: uuid::Uuid, err: AppError) -> AppError {
        let cause = format!("{:?}", err.code());
        warn!(
            stage = "failed",
            submission_id = %submission_id,
            error = %err,
            "Submission saved but prompt update failed"
        );
        metrics::record_prompt_update_failure(&cause);
        AppError::PromptUpdateFailed {
            submission_id,
            source: Box::new(err),
        }
    }

    // ========================================================================
    // Text service operations
    // ========================================================================

    /// Turn one idea into a prompt fragment
    pub async fn transform(&self, idea: &str) -> Result<String> {
        self.validate_idea(idea)?;
        self.generate("transform", TRANSFORM_INSTRUCTION, idea)
            .await
            .map_err(Into::into)
    }

    /// Merge ideas into a single prompt
    pub async fn combine(&self, ideas: &[String]) -> Result<String> {
        let input = format_idea_list(ideas);
        if input.is_empty() {
            return Err(AppError::Validation {
                message: "at least one non-empty idea is required".to_string(),
                field: Some("ideas".to_string()),
            });
        }
        self.generate("combine", COMBINE_INSTRUCTION, &input)
            .await
            .map_err(Into::into)
    }

    /// Reply to a chat message under the given (or derived) system prompt
    pub async fn chat(&self, message: &str, system_prompt: Option<&str>) -> Result<String> {
        if message.trim().is_empty() {
            return Err(AppError::Validation {
                message: "message must not be empty".to_string(),
                field: Some("message".to_string()),
            });
        }

        // A blank override counts as no override
        let instructions = match system_prompt.map(str::trim).filter(|p| !p.is_empty()) {
            Some(prompt) => prompt.to_string(),
            None => self.concatenated_system_prompt().await?,
        };

        match self.generate("chat", &instructions, message).await {
            Ok(reply) => Ok(reply),
            Err(GenerationError::Empty) => Ok(CHAT_FALLBACK_REPLY.to_string()),
            Err(err) => Err(err.into()),
        }
    }

    /// One text service operation under the retry policy; output is trimmed
    /// and empty output counts as a retryable failure
    async fn generate(
        &self,
        purpose: &str,
        instruction: &str,
        input: &str,
    ) -> std::result::Result<String, GenerationError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        let result = self
            .retry
            .run(|| {
                attempts += 1;
                let attempt = attempts;
                async move {
                    debug!(purpose, attempt, "Calling text service");
                    let generation = self.generator.generate(instruction, input).await?;
                    let text = generation.text.trim();
                    if text.is_empty() {
                        return Err(GenerationError::Empty);
                    }
                    Ok(text.to_string())
                }
            })
            .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.label(),
        };
        metrics::record_generation(purpose, started.elapsed().as_secs_f64(), attempts, outcome);

        if let Err(err) = &result {
            warn!(purpose, attempts, error = %err, "Text service call failed");
        }
        result
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fragments in creation order, blanks and duplicates dropped, joined by a blank line
    pub async fn concatenated_system_prompt(&self) -> Result<String> {
        let fragments = self.store.list_prompt_fragments().await?;
        Ok(concatenate_fragments(fragments.iter().map(|f| f.prompt_text.as_str())))
    }

    /// Number of distinct non-blank fragments
    pub async fn fragment_count(&self) -> Result<usize> {
        let fragments = self.store.list_prompt_fragments().await?;
        Ok(distinct_fragments(fragments.iter().map(|f| f.prompt_text.as_str())).len())
    }

    /// All submissions, oldest first
    pub async fn timeline(&self) -> Result<Vec<Submission>> {
        self.store.list_submissions().await
    }

    fn validate_idea(&self, idea: &str) -> Result<()> {
        if idea.trim().is_empty() {
            return Err(AppError::Validation {
                message: "idea must not be empty".to_string(),
                field: Some("idea".to_string()),
            });
        }

        let chars = idea.chars().count();
        if chars > self.max_idea_chars {
            return Err(AppError::Validation {
                message: format!(
                    "idea is {} characters; the limit is {}",
                    chars, self.max_idea_chars
                ),
                field: Some("idea".to_string()),
            });
        }

        Ok(())
    }
}

fn distinct_fragments<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = std::collections::HashSet::new();
    texts
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .filter(|text| seen.insert(*text))
        .collect()
}

/// Join fragments with a blank line, keeping the first occurrence of each
pub fn concatenate_fragments<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    distinct_fragments(texts).join(FRAGMENT_SEPARATOR)
}

/// One `- idea` line per non-blank idea
pub fn format_idea_list(ideas: &[String]) -> String {
    ideas
        .iter()
        .map(|idea| idea.trim())
        .filter(|idea| !idea.is_empty())
        .map(|idea| format!("- {}", idea))
        .collect::<Vec<_>>()
        .join("\n")
}
