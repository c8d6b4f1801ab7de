//! Database layer for IdeaForge
//!
//! Provides:
//! - SeaORM entity models
//! - The `IdeaStore` abstraction with Postgres and in-memory backends
//! - Connection pool management
//! - Schema bootstrap

pub mod models;
mod memory;
mod repository;
mod store;

pub use memory::MemoryStore;
pub use repository::Repository;
pub use store::{FragmentInsert, IdeaStore};

use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Bundled schema, applied statement by statement
const INIT_SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    primary: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let primary = Database::connect(opts)
            .await
            .map_err(|e| AppError::Persistence {
                message: format!("Failed to connect to database: {}", e)
            })?;

        info!("Database connection established");

        Ok(Self { primary })
    }

    /// Connection used for every query
    pub fn conn(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Create tables and indexes if they are missing
    pub async fn run_migrations(&self) -> Result<()> {
        let statements = schema_statements(INIT_SCHEMA);
        for statement in &statements {
            self.primary.execute_unprepared(statement).await?;
        }
        info!(statements = statements.len(), "Schema applied");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::Persistence {
                message: format!("Database ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Split a SQL script into executable statements, dropping `--` comments
fn schema_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the store selected by `store.backend`
pub async fn create_store(config: &AppConfig) -> Result<Arc<dyn IdeaStore>> {
    match config.store.backend.as_str() {
        "postgres" => {
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.run_migrations().await?;
            }
            Ok(Arc::new(Repository::new(pool)))
        }
        "memory" => {
            tracing::warn!("Using in-memory store; submissions are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown store.backend '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements() {
        let statements = schema_statements(INIT_SCHEMA);
        assert_eq!(statements.len(), 5);
        assert!(statements.iter().all(|s| !s.starts_with("--")));
        assert!(statements
            .iter()
            .any(|s| s.contains("UNIQUE INDEX") && s.contains("md5(prompt_text)")));
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".to_string();
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }
}
