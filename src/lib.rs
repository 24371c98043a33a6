//! # Literary Companion
//!
//! Turns an author's Aozora Bunko archives into clean, line-oriented text
//! and keeps per-user reading conversations about those works.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Archive  │──▶│ Encoding │──▶│ Cleanse  │──▶│  Sinks   │
//! │ zip/URL  │   │ SJIS/UTF8│   │ markers  │   │ TSV+SQL  │
//! └──────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                   │
//!                                   ┌───────────────┤
//!                                   ▼               ▼
//!                              ┌──────────┐   ┌──────────┐
//!                              │   Chat   │   │    S3    │
//!                              │  score   │   │   push   │
//!                              └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! litc init                              # create database
//! litc ingest                            # archive.source from the config
//! litc works                             # list stored titles
//! litc chat --user a --title 羅生門 "下人の心の動きが気になります"
//! litc score --user a --title 羅生門
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`archive`] | Fetching, unpacking, and discovering texts |
//! | [`encoding`] | Shift_JIS / UTF-8 detection and decoding |
//! | [`cleanse`] | Body location and markup removal |
//! | [`sink`] | Delimited output files |
//! | [`ingest`] | One extraction + cleanse pass |
//! | [`works`] | Stored works |
//! | [`records`] | Conversation records |
//! | [`llm`] | Chat-completion providers |
//! | [`chat`] | Persona chat, summary, and scoring |
//! | [`score`] | Score response parsing |
//! | [`s3`] | Upload to S3 |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod archive;
pub mod chat;
pub mod cleanse;
pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod records;
pub mod s3;
pub mod score;
pub mod sink;
pub mod works;
