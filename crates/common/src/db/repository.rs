//! Repository pattern for database operations
//!
//! Postgres-backed `IdeaStore`. Fragment uniqueness relies on the
//! `prompt_fragments_prompt_text_key` unique index over `md5(prompt_text)`
//! (a plain btree index caps entries at about 2.7 KB): inserts use
//! `ON CONFLICT DO NOTHING` and zero affected rows means "already there".

use crate::db::models::*;
use crate::db::store::{FragmentInsert, IdeaStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use uuid::Uuid;

/// Expression behind the `prompt_fragments_prompt_text_key` unique index
const PROMPT_HASH: &str = "md5(prompt_text)";
const PROMPT_HASH_MATCH: &str = "md5(prompt_text) = md5($1)";

/// New submission row; `created_at` is left to the column default.
/// Ids are UUIDv7 so they sort by creation time within equal timestamps.
fn submission_row(idea: &str) -> SubmissionActiveModel {
    SubmissionActiveModel {
        id: Set(Uuid::now_v7()),
        idea: Set(idea.to_string()),
        created_at: NotSet,
    }
}

fn fragment_row(id: Uuid, prompt_text: &str) -> PromptFragmentActiveModel {
    PromptFragmentActiveModel {
        id: Set(id),
        prompt_text: Set(prompt_text.to_string()),
        created_at: NotSet,
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }
}

#[async_trait]
impl IdeaStore for Repository {
    // ========================================================================
    // Submission Operations
    // ========================================================================

    async fn insert_submission(&self, idea: &str) -> Result<Submission> {
        let submission = SubmissionEntity::insert(submission_row(idea))
            .exec_with_returning(self.conn())
            .await
            .map_err(|e| AppError::Persistence { message: e.to_string() })?;

        tracing::debug!(submission_id = %submission.id, "Submission row inserted");
        Ok(submission)
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>> {
        SubmissionEntity::find()
            .order_by_asc(SubmissionColumn::CreatedAt)
            .order_by_asc(SubmissionColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Prompt Fragment Operations
    // ========================================================================

    async fn find_prompt_fragment(&self, prompt_text: &str) -> Result<Option<PromptFragment>> {
        PromptFragmentEntity::find()
            .filter(Expr::cust_with_values(PROMPT_HASH_MATCH, [prompt_text]))
            .filter(PromptFragmentColumn::PromptText.eq(prompt_text))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_prompt_fragment(&self, prompt_text: &str) -> Result<FragmentInsert> {
        let id = Uuid::now_v7();
        let rows = PromptFragmentEntity::insert(fragment_row(id, prompt_text))
            .on_conflict(
                OnConflict::new()
                    .expr(Expr::cust(PROMPT_HASH))
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await
            .map_err(|e| AppError::Persistence {
                message: format!("prompt fragment insert failed: {}", e),
            })?;

        if rows == 0 {
            return Ok(FragmentInsert::Duplicate);
        }

        // Re-read for the store-assigned created_at
        PromptFragmentEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .map(FragmentInsert::Inserted)
            .ok_or_else(|| AppError::Persistence {
                message: format!("prompt fragment {} vanished after insert", id),
            })
    }

    async fn list_prompt_fragments(&self) -> Result<Vec<PromptFragment>> {
        PromptFragmentEntity::find()
            .order_by_asc(PromptFragmentColumn::CreatedAt)
            .order_by_asc(PromptFragmentColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue;

    #[test]
    fn test_rows_leave_timestamp_to_store() {
        let row = submission_row("be kind");
        assert!(matches!(row.created_at, ActiveValue::NotSet));
        assert_eq!(row.id.clone().unwrap().get_version_num(), 7);

        let row = fragment_row(Uuid::now_v7(), "Be kind.");
        assert!(matches!(row.created_at, ActiveValue::NotSet));
        assert_eq!(row.prompt_text.clone().unwrap(), "Be kind.");
    }

    #[test]
    fn test_row_ids_follow_creation_order() {
        let first = submission_row("a").id.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = submission_row("b").id.unwrap();
        assert!(first < second);
    }
}
