//! Aozora Bunko line cleanser.
//!
//! Takes the decoded lines of a single work, cuts out the body between the
//! header boilerplate and the `底本：` credit footer, and strips the markup
//! conventions of the format:
//!
//! | Markup | Example | Handling |
//! |--------|---------|----------|
//! | Ruby gloss | `羅生門《らしょうもん》` | span removed |
//! | Editorial note | `［＃「…」に傍点］` | span removed |
//! | Ruby boundary | `｜下人` | bar removed |
//! | Indentation | `　ある日の…` | full-width spaces removed |
//! | Scene divider | `―――`, `＊＊＊`, `×××` at line start | whole line removed |
//! | Stray marks | `―`, `…`, `※` | removed |
//! | Orphaned quotes | `「」` | removed |
//!
//! Lines are processed independently; an annotation that wraps onto the
//! next physical line is left as is.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

use crate::config::{CleanseMarkers, Config};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{CleansedLine, CleansedWork};

static RUBY_GLOSS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"《.*?》").unwrap());
static EDITORIAL_NOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"［.*?］").unwrap());
static SCENE_DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:―――|＊＊＊|×××).*$").unwrap());

const RUBY_BOUNDARY: char = '｜';
const IDEOGRAPHIC_SPACE: char = '\u{3000}';
const STRAY_MARKS: [char; 3] = ['―', '…', '※'];
const EMPTY_QUOTES: &str = "「」";

/// Everything the cleanser needs to know about one author's texts.
#[derive(Debug, Clone)]
pub struct CleanseConfig {
    pub author_name: String,
    pub markers: CleanseMarkers,
}

impl CleanseConfig {
    pub fn new(author_name: impl Into<String>) -> Self {
        Self {
            author_name: author_name.into(),
            markers: CleanseMarkers::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            author_name: config.author.name.clone(),
            markers: config.cleanse.clone(),
        }
    }
}

/// Cleanse a whole work: find the body, strip markup, keep the title.
pub fn cleanse_work<S: AsRef<str>>(
    lines: &[S],
    config: &CleanseConfig,
) -> PipelineResult<CleansedWork> {
    let title = lines
        .first()
        .map(|l| l.as_ref().to_string())
        .ok_or_else(|| PipelineError::MalformedSource("empty source".to_string()))?;

    let body = locate_body(lines, config)?;
    Ok(CleansedWork {
        title,
        lines: cleanse_body(&lines[body]),
    })
}

/// Find the `[start, end)` range of body lines.
///
/// The body starts after the second horizontal-rule line, or after the
/// first line naming the author when the source has no rule at all. It
/// ends before the first credit line.
pub fn locate_body<S: AsRef<str>>(
    lines: &[S],
    config: &CleanseConfig,
) -> PipelineResult<Range<usize>> {
    let rule = config.markers.rule_marker.as_str();
    let rules: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.as_ref().contains(rule))
        .map(|(i, _)| i)
        .collect();

    let start = match rules.as_slice() {
        [] => {
            let author_line = lines
                .iter()
                .position(|l| l.as_ref().contains(config.author_name.as_str()))
                .ok_or_else(|| {
                    PipelineError::MalformedSource(format!(
                        "no horizontal rule and no line naming {}",
                        config.author_name
                    ))
                })?;
            author_line + 1
        }
        [_] => {
            return Err(PipelineError::MalformedSource(
                "only one horizontal rule before the body".to_string(),
            ))
        }
        [_, second, ..] => second + 1,
    };

    let credit = config.markers.credit_marker.as_str();
    let end = lines
        .iter()
        .position(|l| l.as_ref().contains(credit))
        .ok_or_else(|| PipelineError::MalformedSource(format!("no '{}' credit line", credit)))?;

    Ok(start..end.max(start))
}

/// Strip markup from body lines and drop what is left with one character
/// or less. Surviving lines keep their order and get dense indices.
pub fn cleanse_body<S: AsRef<str>>(lines: &[S]) -> Vec<CleansedLine> {
    lines
        .iter()
        .map(|l| cleanse_line(l.as_ref()))
        .filter(|text| text.chars().count() > 1)
        .enumerate()
        .map(|(index, text)| CleansedLine { index, text })
        .collect()
}

/// Apply the substitution chain to one line until nothing more changes.
///
/// A single pass can expose a new match (`―＊＊＊` only becomes a scene
/// divider once the leading `―` is gone), so the chain is repeated. Every
/// step only deletes characters, which bounds the loop.
pub fn cleanse_line(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let next = substitute(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn substitute(line: &str) -> String {
    let text = RUBY_GLOSS.replace_all(line, "");
    let text = EDITORIAL_NOTE.replace_all(&text, "");
    let text = text.replace([RUBY_BOUNDARY, IDEOGRAPHIC_SPACE], "");

    if text.chars().count() == 1 || SCENE_DIVIDER.is_match(&text) {
        return String::new();
    }

    text.replace(STRAY_MARKS, "").replace(EMPTY_QUOTES, "")
}
