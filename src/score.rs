//! Evaluation scores for a reading conversation.
//!
//! The LLM is asked to rate the user's side of the conversation on five
//! axes and answer with a JSON object. The reply is parsed into a
//! [`ScoreCard`]; anything else (missing or extra keys, non-integers,
//! values above 10, no JSON at all) is a [`ScoreParseError`].

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Message, Role, Scores};

#[derive(Error, Debug)]
pub enum ScoreParseError {
    #[error("no JSON object in response")]
    NoJsonObject,

    #[error("invalid score object: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("{field} = {value} is outside 0-{max}", max = Scores::MAX)]
    OutOfRange { field: &'static str, value: u8 },
}

/// A validated score response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreCard {
    pub creativity: u8,
    pub logic: u8,
    pub empathy: u8,
    pub expression: u8,
    pub insight: u8,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl ScoreCard {
    pub fn scores(&self) -> Scores {
        Scores {
            creativity: self.creativity,
            logic: self.logic,
            empathy: self.empathy,
            expression: self.expression,
            insight: self.insight,
        }
    }
}

/// Parse an LLM reply, tolerating prose or code fences around the object.
pub fn parse_score_response(text: &str) -> Result<ScoreCard, ScoreParseError> {
    let json = extract_json_object(text).ok_or(ScoreParseError::NoJsonObject)?;
    let card: ScoreCard = serde_json::from_str(json)?;

    for (field, value) in card.scores().as_array() {
        if value > Scores::MAX {
            return Err(ScoreParseError::OutOfRange { field, value });
        }
    }
    Ok(card)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

const SCORING_INSTRUCTIONS: &str = "あなたは読書対話の評価者です。\
以下の会話におけるユーザーの発言を、creativity（創造性）、logic（論理性）、\
empathy（共感力）、expression（表現力）、insight（洞察力）の5項目について\
0から10の整数で評価してください。\
回答は次の形式のJSONオブジェクトのみとし、それ以外の文章は出力しないでください: \
{\"creativity\": 0, \"logic\": 0, \"empathy\": 0, \"expression\": 0, \"insight\": 0, \"explanation\": \"短い講評\"}";

/// Build the scoring request for a transcript. System turns are left out.
pub fn scoring_prompt(transcript: &[Message]) -> Vec<Message> {
    vec![
        Message::system(SCORING_INSTRUCTIONS),
        Message::user(render_dialogue(transcript)),
    ]
}

/// Render the user/assistant turns as `ユーザー: …` / `AI: …` lines.
pub fn render_dialogue(transcript: &[Message]) -> String {
    let mut out = String::new();
    for msg in transcript {
        let speaker = match msg.role {
            Role::User => "ユーザー",
            Role::Assistant => "AI",
            Role::System => continue,
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&msg.content);
        out.push('\n');
    }
    out
}
