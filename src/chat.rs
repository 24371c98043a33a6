//! Reading conversations about a stored work.
//!
//! Each operation loads the record for `(username, title)`, talks to the
//! [`ChatProvider`] once, and writes back only the field it produced.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::llm::{self, ChatProvider};
use crate::models::{Message, Role};
use crate::records::{self, RecordKey, RecordUpdate};
use crate::score::{self, ScoreCard};
use crate::works;

/// Who is talking about which work.
#[derive(Debug, Clone)]
pub struct ChatContext<'a> {
    pub author: &'a str,
    pub username: &'a str,
    pub title: &'a str,
    /// Characters of the work's text included in the persona prompt.
    pub excerpt_chars: usize,
}

fn persona_prompt(author: &str, title: &str, excerpt: &str) -> String {
    format!(
        "あなたは{author}本人として、作品『{title}』について読者と語り合います。\
作品の洞察を示し、テーマを論じ、登場人物を分析し、考えさせる問いを投げかけてください。\
共感した点、印象に残った場面やフレーズ、自分が登場人物ならどうするか、得た教訓などを尋ね、\
一つの問いについて少なくとも三回は掘り下げてから次の話題に移ってください。\
読者の読書体験を尊重し、否定的な言葉は避けてください。\
口調は{author}に似せ、応答は200文字以内の会話形式で行ってください。\n\n\
以下は作品本文の抜粋です。\n{excerpt}"
    )
}

/// Send one user message and return the persona's reply.
pub async fn chat_turn(
    pool: &SqlitePool,
    provider: &dyn ChatProvider,
    ctx: &ChatContext<'_>,
    user_input: &str,
) -> Result<String> {
    if user_input.trim().is_empty() {
        bail!("message must not be empty");
    }

    let existing = records::get_record(pool, &RecordKey::pair(ctx.username, ctx.title)).await?;
    let mut transcript = existing.map(|r| r.transcript).unwrap_or_default();

    if !transcript.iter().any(|m| m.role == Role::System) {
        let work = works::get_work(pool, ctx.author, ctx.title)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "work not found: {} / {} (run `litc ingest` first)",
                    ctx.author,
                    ctx.title
                )
            })?;
        let excerpt: String = work.text_content.chars().take(ctx.excerpt_chars).collect();
        transcript.insert(0, Message::system(persona_prompt(ctx.author, ctx.title, &excerpt)));
    }

    transcript.push(Message::user(user_input));
    let reply = provider.complete(&transcript).await?;
    transcript.push(Message::assistant(reply.clone()));

    tracing::debug!(
        username = ctx.username,
        title = ctx.title,
        turns = transcript.len(),
        model = provider.model_name(),
        "chat turn complete"
    );

    records::upsert_record(
        pool,
        ctx.username,
        ctx.author,
        ctx.title,
        &RecordUpdate {
            transcript: Some(transcript),
            ..Default::default()
        },
    )
    .await?;

    Ok(reply)
}

async fn load_dialogue(pool: &SqlitePool, ctx: &ChatContext<'_>) -> Result<Vec<Message>> {
    let record = records::get_record(pool, &RecordKey::pair(ctx.username, ctx.title))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no conversation for {} / {}", ctx.username, ctx.title))?;

    if !record.transcript.iter().any(|m| m.role == Role::User) {
        bail!("conversation for {} / {} has no user turns", ctx.username, ctx.title);
    }
    Ok(record.transcript)
}

/// Summarize the conversation and store the summary.
pub async fn summarize(
    pool: &SqlitePool,
    provider: &dyn ChatProvider,
    ctx: &ChatContext<'_>,
) -> Result<String> {
    let transcript = load_dialogue(pool, ctx).await?;

    let prompt = vec![
        Message::system("あなたは熟練した会話の要約者です。"),
        Message::user(format!(
            "これまでの会話を以下の形式で要約してください:\n\n{}",
            score::render_dialogue(&transcript)
        )),
    ];
    let summary = provider.complete(&prompt).await?;

    records::upsert_record(
        pool,
        ctx.username,
        ctx.author,
        ctx.title,
        &RecordUpdate {
            summary: Some(summary.clone()),
            ..Default::default()
        },
    )
    .await?;

    Ok(summary)
}

/// Score the conversation and store the five scores.
///
/// A malformed reply is returned as an error and nothing is stored.
pub async fn score_conversation(
    pool: &SqlitePool,
    provider: &dyn ChatProvider,
    ctx: &ChatContext<'_>,
) -> Result<ScoreCard> {
    let transcript = load_dialogue(pool, ctx).await?;

    let reply = provider
        .complete(&score::scoring_prompt(&transcript))
        .await?;
    let card = score::parse_score_response(&reply)?;

    records::upsert_record(
        pool,
        ctx.username,
        ctx.author,
        ctx.title,
        &RecordUpdate {
            scores: Some(card.scores()),
            ..Default::default()
        },
    )
    .await?;

    Ok(card)
}

/// Which LLM-backed command to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Say(&'a str),
    Summarize,
    Score,
}

/// `litc chat` / `litc summarize` / `litc score`.
pub async fn run_chat_command(
    config: &Config,
    username: &str,
    title: &str,
    command: ChatCommand<'_>,
) -> Result<()> {
    let provider = llm::create_provider(&config.llm)?;
    let pool = db::connect(config).await?;
    let ctx = ChatContext {
        author: &config.author.name,
        username,
        title,
        excerpt_chars: config.llm.excerpt_chars,
    };

    let result = match command {
        ChatCommand::Say(message) => chat_turn(&pool, provider.as_ref(), &ctx, message)
            .await
            .map(|reply| println!("{}", reply)),
        ChatCommand::Summarize => summarize(&pool, provider.as_ref(), &ctx)
            .await
            .map(|summary| println!("{}", summary)),
        ChatCommand::Score => score_conversation(&pool, provider.as_ref(), &ctx)
            .await
            .map(|card| {
                for (field, value) in card.scores().as_array() {
                    println!("  {:<11} {:>2}", field, value);
                }
                if let Some(explanation) = &card.explanation {
                    println!("  {}", explanation);
                }
            }),
    };
    pool.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::{CleansedLine, CleansedWork};
    use crate::score::ScoreParseError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with canned answers and records what it was sent.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, messages: &[Message]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
        }
    }

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = crate::db::connect_at(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        let work = CleansedWork {
            title: "羅生門".to_string(),
            lines: vec![CleansedLine {
                index: 0,
                text: "ある日の暮方の事である。".to_string(),
            }],
        };
        works::upsert_work(&pool, "芥川龍之介", "rashomon.txt", &work)
            .await
            .unwrap();
        (tmp, pool)
    }

    fn ctx() -> ChatContext<'static> {
        ChatContext {
            author: "芥川龍之介",
            username: "a",
            title: "羅生門",
            excerpt_chars: 6,
        }
    }

    #[tokio::test]
    async fn chat_turns_accumulate_in_one_record() {
        let (_tmp, pool) = setup().await;
        let provider = ScriptedProvider::new(&["一つ目の返答", "二つ目の返答"]);

        let reply = chat_turn(&pool, &provider, &ctx(), "下人について").await.unwrap();
        assert_eq!(reply, "一つ目の返答");
        chat_turn(&pool, &provider, &ctx(), "老婆について").await.unwrap();

        let record = records::get_record(&pool, &RecordKey::pair("a", "羅生門"))
            .await
            .unwrap()
            .unwrap();
        let roles: Vec<Role> = record.transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert!(record.transcript[0].content.contains("ある日の暮方"));
        assert!(!record.transcript[0].content.contains("事である"));

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 4);
    }

    #[tokio::test]
    async fn chat_about_unknown_work_fails() {
        let (_tmp, pool) = setup().await;
        let provider = ScriptedProvider::new(&["unused"]);
        let mut context = ctx();
        context.title = "河童";
        let err = chat_turn(&pool, &provider, &context, "こんにちは").await.unwrap_err();
        assert!(err.to_string().contains("work not found"));
    }

    #[tokio::test]
    async fn summary_and_scores_are_stored() {
        let (_tmp, pool) = setup().await;
        let provider = ScriptedProvider::new(&[
            "返答",
            "下人の心の変化について話した。",
            r#"{"creativity": 6, "logic": 7, "empathy": 8, "expression": 5, "insight": 9, "explanation": "良い"}"#,
        ]);

        chat_turn(&pool, &provider, &ctx(), "下人の心の変化が面白い").await.unwrap();
        let summary = summarize(&pool, &provider, &ctx()).await.unwrap();
        let card = score_conversation(&pool, &provider, &ctx()).await.unwrap();
        assert_eq!(card.insight, 9);

        let record = records::get_record(&pool, &RecordKey::pair("a", "羅生門"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.summary.as_deref(), Some(summary.as_str()));
        assert_eq!(record.scores, Some(card.scores()));
        assert_eq!(record.transcript.len(), 3);

        let seen = provider.seen.lock().unwrap();
        assert!(seen[1][1].content.contains("ユーザー: 下人の心の変化が面白い"));
    }

    #[tokio::test]
    async fn malformed_score_reply_stores_nothing() {
        let (_tmp, pool) = setup().await;
        let provider = ScriptedProvider::new(&["返答", r#"{"creativity": 99}"#]);

        chat_turn(&pool, &provider, &ctx(), "感想です").await.unwrap();
        let err = score_conversation(&pool, &provider, &ctx()).await.unwrap_err();
        assert!(err.downcast_ref::<ScoreParseError>().is_some());

        let record = records::get_record(&pool, &RecordKey::pair("a", "羅生門"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.scores.is_none());
    }

    #[tokio::test]
    async fn summarize_without_conversation_fails() {
        let (_tmp, pool) = setup().await;
        let provider = ScriptedProvider::new(&[]);
        assert!(summarize(&pool, &provider, &ctx()).await.is_err());
    }
}
