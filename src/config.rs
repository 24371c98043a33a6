//! TOML configuration.
//!
//! Everything the pipeline needs (author identity, marker strings, output
//! locations, LLM and object-storage settings) is read from one file and
//! passed explicitly into each entry point.
//!
//! ```toml
//! [db]
//! path = "./data/literary.sqlite"
//!
//! [author]
//! id = "000879"
//! name = "芥川龍之介"
//!
//! [output]
//! dir = "./out_000879"
//! write_title = true
//! write_header = true
//! save_utf8_org = true
//! delimiter = "tab"
//!
//! [archive]
//! source = "https://www.aozora.gr.jp/cards/000879/files/127_ruby_150.zip"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [s3]
//! bucket = "literary-companion"
//! region = "ap-northeast-1"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub author: AuthorConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub cleanse: CleanseMarkers,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Aozora Bunko author identity, as written on the author's card page.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthorConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Add a `title` column to the cleansed output.
    #[serde(default = "default_true")]
    pub write_title: bool,
    /// Emit a header row (`text`, `title`).
    #[serde(default = "default_true")]
    pub write_header: bool,
    /// Also save the decoded original text as UTF-8.
    #[serde(default = "default_true")]
    pub save_utf8_org: bool,
    #[serde(default)]
    pub delimiter: Delimiter,
}

impl OutputConfig {
    pub fn org_dir(&self) -> PathBuf {
        self.dir.join("org")
    }

    pub fn edit_dir(&self) -> PathBuf {
        self.dir.join("edit")
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Tab => '\t',
            Delimiter::Comma => ',',
        }
    }
}

/// Boilerplate marker strings delimiting the body of an Aozora text.
#[derive(Debug, Deserialize, Clone)]
pub struct CleanseMarkers {
    #[serde(default = "default_rule_marker")]
    pub rule_marker: String,
    #[serde(default = "default_credit_marker")]
    pub credit_marker: String,
}

impl Default for CleanseMarkers {
    fn default() -> Self {
        Self {
            rule_marker: default_rule_marker(),
            credit_marker: default_credit_marker(),
        }
    }
}

fn default_rule_marker() -> String {
    "-".repeat(55)
}
fn default_credit_marker() -> String {
    "底本：".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Local path or `http(s)://` URL of the zip archive.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}
fn default_max_entry_bytes() -> u64 {
    32 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many characters of the stored work text go into the persona prompt.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_excerpt_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.author.name.trim().is_empty() {
        bail!("author.name must not be empty");
    }
    if config.cleanse.rule_marker.is_empty() || config.cleanse.credit_marker.is_empty() {
        bail!("cleanse markers must not be empty");
    }
    if config.archive.max_entry_bytes == 0 {
        bail!("archive.max_entry_bytes must be > 0");
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if let Some(s3) = &config.s3 {
        if s3.bucket.is_empty() {
            bail!("s3.bucket must not be empty");
        }
    }

    Ok(())
}
