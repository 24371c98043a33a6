use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Source texts, one row per (author, title)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works (
            id TEXT PRIMARY KEY,
            author TEXT NOT NULL,
            title TEXT NOT NULL,
            source_file TEXT NOT NULL,
            text_content TEXT NOT NULL,
            dedup_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(author, title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One conversation per user and work
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            author TEXT NOT NULL,
            title TEXT NOT NULL,
            transcript_json TEXT NOT NULL DEFAULT '[]',
            summary TEXT,
            creativity INTEGER CHECK (creativity BETWEEN 0 AND 10),
            logic INTEGER CHECK (logic BETWEEN 0 AND 10),
            empathy INTEGER CHECK (empathy BETWEEN 0 AND 10),
            expression INTEGER CHECK (expression BETWEEN 0 AND 10),
            insight INTEGER CHECK (insight BETWEEN 0 AND 10),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(username, title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_author ON works(author)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
