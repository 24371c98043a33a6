//! Conversation records.
//!
//! A record is identified either by its numeric id or by the
//! `(username, title)` pair, which is unique. Writes are a single
//! `INSERT ... ON CONFLICT DO UPDATE` statement, so two sessions writing the
//! same key cannot produce a duplicate row.
//!
//! Fields left as `None` in a [`RecordUpdate`] keep their stored value.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

use crate::config::Config;
use crate::db;
use crate::models::{ConversationRecord, Message, Scores};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Id(i64),
    Pair { username: String, title: String },
}

impl RecordKey {
    pub fn pair(username: &str, title: &str) -> Self {
        RecordKey::Pair {
            username: username.to_string(),
            title: title.to_string(),
        }
    }
}

/// Fields to write. `None` leaves the column untouched on update.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub transcript: Option<Vec<Message>>,
    pub summary: Option<String>,
    pub scores: Option<Scores>,
}

const COLUMNS: &str = "id, username, author, title, transcript_json, summary, \
     creativity, logic, empathy, expression, insight, created_at, updated_at";

const UPDATE_SET: &str = r#"
    author = excluded.author,
    transcript_json = COALESCE(?4, conversations.transcript_json),
    summary = COALESCE(excluded.summary, conversations.summary),
    creativity = COALESCE(excluded.creativity, conversations.creativity),
    logic = COALESCE(excluded.logic, conversations.logic),
    empathy = COALESCE(excluded.empathy, conversations.empathy),
    expression = COALESCE(excluded.expression, conversations.expression),
    insight = COALESCE(excluded.insight, conversations.insight),
    updated_at = excluded.updated_at
"#;

/// Insert or update the record for `(username, title)`. Returns its id.
pub async fn upsert_record(
    pool: &SqlitePool,
    username: &str,
    author: &str,
    title: &str,
    update: &RecordUpdate,
) -> Result<i64> {
    let sql = format!(
        r#"
        INSERT INTO conversations (username, author, title, transcript_json, summary,
            creativity, logic, empathy, expression, insight, created_at, updated_at)
        VALUES (?1, ?2, ?3, COALESCE(?4, '[]'), ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        ON CONFLICT(username, title) DO UPDATE SET {}
        RETURNING id
        "#,
        UPDATE_SET
    );

    let query = bind_fields(sqlx::query_scalar(&sql), username, author, title, update)?;
    let id: i64 = query
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to upsert record for {} / {}", username, title))?;
    Ok(id)
}

/// Insert or update the record with a given id.
///
/// Fails if another record already holds `(username, title)`.
pub async fn upsert_record_by_id(
    pool: &SqlitePool,
    id: i64,
    username: &str,
    author: &str,
    title: &str,
    update: &RecordUpdate,
) -> Result<i64> {
    let sql = format!(
        r#"
        INSERT INTO conversations (username, author, title, transcript_json, summary,
            creativity, logic, empathy, expression, insight, created_at, updated_at, id)
        VALUES (?1, ?2, ?3, COALESCE(?4, '[]'), ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            title = excluded.title,
            {}
        RETURNING id
        "#,
        UPDATE_SET
    );

    let query = bind_fields(sqlx::query_scalar(&sql), username, author, title, update)?;
    let id: i64 = query
        .bind(id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to upsert record {}", id))?;
    Ok(id)
}

type ScalarQuery<'q> =
    sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_fields<'q>(
    query: ScalarQuery<'q>,
    username: &str,
    author: &str,
    title: &str,
    update: &RecordUpdate,
) -> Result<ScalarQuery<'q>> {
    let transcript_json = update
        .transcript
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let score = |pick: fn(&Scores) -> u8| update.scores.as_ref().map(|s| i64::from(pick(s)));

    Ok(query
        .bind(username.to_string())
        .bind(author.to_string())
        .bind(title.to_string())
        .bind(transcript_json)
        .bind(update.summary.clone())
        .bind(score(|s| s.creativity))
        .bind(score(|s| s.logic))
        .bind(score(|s| s.empathy))
        .bind(score(|s| s.expression))
        .bind(score(|s| s.insight))
        .bind(chrono::Utc::now().timestamp()))
}

pub async fn get_record(pool: &SqlitePool, key: &RecordKey) -> Result<Option<ConversationRecord>> {
    let row = match key {
        RecordKey::Id(id) => {
            sqlx::query(&format!("SELECT {} FROM conversations WHERE id = ?", COLUMNS))
                .bind(id)
                .fetch_optional(pool)
                .await?
        }
        RecordKey::Pair { username, title } => {
            sqlx::query(&format!(
                "SELECT {} FROM conversations WHERE username = ? AND title = ?",
                COLUMNS
            ))
            .bind(username)
            .bind(title)
            .fetch_optional(pool)
            .await?
        }
    };

    row.as_ref().map(record_from_row).transpose()
}

/// All records, newest first, optionally for one user.
pub async fn list_records(
    pool: &SqlitePool,
    username: Option<&str>,
) -> Result<Vec<ConversationRecord>> {
    let rows = match username {
        Some(user) => {
            sqlx::query(&format!(
                "SELECT {} FROM conversations WHERE username = ? ORDER BY updated_at DESC, id DESC",
                COLUMNS
            ))
            .bind(user)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM conversations ORDER BY updated_at DESC, id DESC",
                COLUMNS
            ))
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(record_from_row).collect()
}

fn record_from_row(row: &SqliteRow) -> Result<ConversationRecord> {
    let transcript_json: String = row.get("transcript_json");
    let transcript: Vec<Message> =
        serde_json::from_str(&transcript_json).context("stored transcript is not valid JSON")?;

    let axes: [Option<i64>; 5] = [
        row.get("creativity"),
        row.get("logic"),
        row.get("empathy"),
        row.get("expression"),
        row.get("insight"),
    ];
    let scores = match axes {
        [Some(c), Some(l), Some(em), Some(ex), Some(i)] => Some(Scores {
            creativity: u8::try_from(c)?,
            logic: u8::try_from(l)?,
            empathy: u8::try_from(em)?,
            expression: u8::try_from(ex)?,
            insight: u8::try_from(i)?,
        }),
        _ => None,
    };

    Ok(ConversationRecord {
        id: Some(row.get("id")),
        username: row.get("username"),
        author: row.get("author"),
        title: row.get("title"),
        transcript,
        summary: row.get("summary"),
        scores,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Parse `creativity,logic,empathy,expression,insight`, e.g. `6,7,8,5,9`.
pub fn parse_scores(s: &str) -> Result<Scores> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid scores '{}'", s))?;
    let [creativity, logic, empathy, expression, insight] = values[..] else {
        bail!("expected 5 comma-separated scores, got {}", values.len());
    };
    let scores = Scores {
        creativity,
        logic,
        empathy,
        expression,
        insight,
    };
    if let Some((field, value)) = scores.as_array().into_iter().find(|(_, v)| *v > Scores::MAX) {
        bail!("{} = {} is outside 0-{}", field, value, Scores::MAX);
    }
    Ok(scores)
}

/// Arguments of `litc record`.
#[derive(Debug, Clone)]
pub struct RecordArgs {
    pub id: Option<i64>,
    pub username: String,
    pub title: String,
    pub summary: Option<String>,
    /// JSON file holding a `[{"role": ..., "content": ...}]` transcript.
    pub transcript: Option<PathBuf>,
    pub scores: Option<Scores>,
}

/// `litc record`: write a record from the command line.
pub async fn run_record(config: &Config, args: &RecordArgs) -> Result<()> {
    let transcript = match &args.transcript {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(
                serde_json::from_str::<Vec<Message>>(&text)
                    .with_context(|| format!("{} is not a transcript", path.display()))?,
            )
        }
        None => None,
    };
    let update = RecordUpdate {
        transcript,
        summary: args.summary.clone(),
        scores: args.scores,
    };

    let pool = db::connect(config).await?;
    let author = &config.author.name;
    let id = match args.id {
        Some(id) => {
            upsert_record_by_id(&pool, id, &args.username, author, &args.title, &update).await?
        }
        None => upsert_record(&pool, &args.username, author, &args.title, &update).await?,
    };
    pool.close().await;

    println!("record {} saved ({} / {})", id, args.username, args.title);
    Ok(())
}

/// `litc records`: list records, or print one as JSON with `--id`.
pub async fn run_records(config: &Config, username: Option<&str>, id: Option<i64>) -> Result<()> {
    let pool = db::connect(config).await?;

    if let Some(id) = id {
        let record = get_record(&pool, &RecordKey::Id(id)).await?;
        pool.close().await;
        let Some(record) = record else {
            bail!("record not found: {}", id);
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let records = list_records(&pool, username).await?;
    pool.close().await;

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in &records {
        let turns = record
            .transcript
            .iter()
            .filter(|m| m.role != crate::models::Role::System)
            .count();
        let scores = record
            .scores
            .map(|s| {
                s.as_array()
                    .iter()
                    .map(|(_, v)| v.to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {}  {}  turns={}  scores={}  summary={}",
            record.id.unwrap_or_default(),
            record.username,
            record.title,
            turns,
            scores,
            if record.summary.is_some() { "yes" } else { "no" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    async fn pool() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = crate::db::connect_at(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, pool)
    }

    fn summary(text: &str) -> RecordUpdate {
        RecordUpdate {
            summary: Some(text.to_string()),
            ..Default::default()
        }
    }

    async fn count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_upsert_updates_same_row() {
        let (_tmp, pool) = pool().await;

        let first = upsert_record(&pool, "a", "芥川龍之介", "T", &summary("first"))
            .await
            .unwrap();
        let second = upsert_record(&pool, "a", "芥川龍之介", "T", &summary("second"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(count(&pool).await, 1);
        let record = get_record(&pool, &RecordKey::pair("a", "T"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.summary.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let (_tmp, pool) = pool().await;
        let transcript = vec![Message::user("羅生門の下人について"), Message::assistant("ふむ")];
        let scores = Scores {
            creativity: 7,
            logic: 5,
            empathy: 8,
            expression: 6,
            insight: 9,
        };

        upsert_record(
            &pool,
            "a",
            "芥川龍之介",
            "羅生門",
            &RecordUpdate {
                transcript: Some(transcript.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        upsert_record(
            &pool,
            "a",
            "芥川龍之介",
            "羅生門",
            &RecordUpdate {
                scores: Some(scores),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let record = get_record(&pool, &RecordKey::pair("a", "羅生門"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.transcript, transcript);
        assert_eq!(record.scores, Some(scores));
        assert_eq!(record.summary, None);
    }

    #[tokio::test]
    async fn new_record_has_empty_transcript_and_no_scores() {
        let (_tmp, pool) = pool().await;
        let id = upsert_record(&pool, "b", "芥川龍之介", "河童", &summary("s"))
            .await
            .unwrap();
        let record = get_record(&pool, &RecordKey::Id(id)).await.unwrap().unwrap();
        assert!(record.transcript.is_empty());
        assert!(record.scores.is_none());
        assert_eq!(record.username, "b");
    }

    #[tokio::test]
    async fn upsert_by_id_updates_in_place() {
        let (_tmp, pool) = pool().await;
        let id = upsert_record(&pool, "a", "芥川龍之介", "T", &summary("one"))
            .await
            .unwrap();

        let same = upsert_record_by_id(&pool, id, "a", "芥川龍之介", "T", &summary("two"))
            .await
            .unwrap();
        assert_eq!(same, id);
        assert_eq!(count(&pool).await, 1);

        let fresh = upsert_record_by_id(&pool, 42, "c", "芥川龍之介", "鼻", &summary("x"))
            .await
            .unwrap();
        assert_eq!(fresh, 42);
        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test]
    async fn upsert_by_id_reports_duplicate_pair() {
        let (_tmp, pool) = pool().await;
        upsert_record(&pool, "a", "芥川龍之介", "T", &summary("one"))
            .await
            .unwrap();
        let other = upsert_record(&pool, "b", "芥川龍之介", "U", &summary("two"))
            .await
            .unwrap();

        // Moving record `other` onto ("a", "T") collides with the first record.
        let result = upsert_record_by_id(&pool, other, "a", "芥川龍之介", "T", &summary("x")).await;
        assert!(result.is_err());
        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test]
    async fn list_filters_by_user() {
        let (_tmp, pool) = pool().await;
        upsert_record(&pool, "a", "芥川龍之介", "T", &summary("1")).await.unwrap();
        upsert_record(&pool, "a", "芥川龍之介", "U", &summary("2")).await.unwrap();
        upsert_record(&pool, "b", "芥川龍之介", "T", &summary("3")).await.unwrap();

        assert_eq!(list_records(&pool, Some("a")).await.unwrap().len(), 2);
        assert_eq!(list_records(&pool, None).await.unwrap().len(), 3);
        assert!(list_records(&pool, Some("z")).await.unwrap().is_empty());
    }

    #[test]
    fn scores_parse_from_comma_list() {
        let scores = parse_scores("6, 7,8,5,10").unwrap();
        assert_eq!(scores.logic, 7);
        assert_eq!(scores.insight, 10);

        assert!(parse_scores("6,7,8,5").is_err());
        assert!(parse_scores("6,7,8,5,11").is_err());
        assert!(parse_scores("6,7,x,5,9").is_err());
    }
}
