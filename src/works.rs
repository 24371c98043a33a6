//! Storage of cleansed works.
//!
//! One row per `(author, title)`. Re-ingesting a work replaces its text in
//! place and keeps the original row id.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::models::{CleansedWork, StoredWork};

/// Insert or update a work, returning its id.
pub async fn upsert_work(
    pool: &SqlitePool,
    author: &str,
    source_file: &str,
    work: &CleansedWork,
) -> Result<String> {
    let title = work.title.trim();
    let body = work.body();

    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    let id: String = sqlx::query_scalar(
        r#"
        INSERT INTO works (id, author, title, source_file, text_content, dedup_hash, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(author, title) DO UPDATE SET
            source_file = excluded.source_file,
            text_content = excluded.text_content,
            dedup_hash = excluded.dedup_hash,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(author)
    .bind(title)
    .bind(source_file)
    .bind(&body)
    .bind(&dedup_hash)
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn get_work(pool: &SqlitePool, author: &str, title: &str) -> Result<Option<StoredWork>> {
    let row = sqlx::query(
        "SELECT id, author, title, source_file, text_content, updated_at \
         FROM works WHERE author = ? AND title = ?",
    )
    .bind(author)
    .bind(title)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| StoredWork {
        id: row.get("id"),
        author: row.get("author"),
        title: row.get("title"),
        source_file: row.get("source_file"),
        text_content: row.get("text_content"),
        updated_at: row.get("updated_at"),
    }))
}

/// `(title, line count)` for every work by `author`, ordered by title.
pub async fn list_titles(pool: &SqlitePool, author: &str) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT title, text_content FROM works WHERE author = ? ORDER BY title",
    )
    .bind(author)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let text: String = row.get("text_content");
            (row.get("title"), text.lines().count() as i64)
        })
        .collect())
}

/// `litc works`: list the configured author's stored works.
pub async fn run_works(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let titles = list_titles(&pool, &config.author.name).await?;
    pool.close().await;

    if titles.is_empty() {
        println!("No works stored for {}. Run `litc ingest` first.", config.author.name);
        return Ok(());
    }
    println!("{} ({} works)", config.author.name, titles.len());
    for (title, lines) in &titles {
        println!("  {}  [{} lines]", title, lines);
    }
    Ok(())
}

/// `litc show <title>`: print a stored work's cleansed text.
pub async fn run_show(config: &Config, title: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let work = get_work(&pool, &config.author.name, title).await?;
    pool.close().await;

    let Some(work) = work else {
        bail!("work not found: {} / {}", config.author.name, title);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&work)?);
    } else {
        println!("# {} ({})", work.title, work.author);
        println!("source: {}", work.source_file);
        println!();
        println!("{}", work.text_content);
    }
    Ok(())
}
