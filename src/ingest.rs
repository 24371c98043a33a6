//! Ingestion pipeline orchestration.
//!
//! One pass: archive → extract → discover texts → decode → cleanse → file
//! sink → `works` table. Every pass unpacks into its own temporary arena.
//! A file that fails to decode or has no recognizable body is logged and
//! skipped; any other error aborts the pass.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::archive::{self, ExtractionArena};
use crate::cleanse::{self, CleanseConfig};
use crate::config::Config;
use crate::db;
use crate::encoding;
use crate::error::PipelineResult;
use crate::models::CleansedWork;
use crate::models::Work;
use crate::progress::{IngestEvent, ProgressReporter};
use crate::sink;
use crate::works;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Archive path or URL; overrides `archive.source`.
    pub source: Option<String>,
    /// Decode and cleanse, but write nothing.
    pub dry_run: bool,
    /// Clear the output directories before writing.
    pub clean: bool,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub archive: String,
    pub files_found: usize,
    pub works_written: usize,
    pub lines_written: usize,
    /// Files skipped because of a per-file error, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

fn resolve_source_arg(config: &Config, source: Option<&str>) -> Result<String> {
    source
        .map(str::to_string)
        .or_else(|| config.archive.source.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no archive given: pass --source or set archive.source in the config")
        })
}

/// `litc ingest`: run one pass and print a summary.
pub async fn run_ingest(
    config: &Config,
    opts: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let report = ingest_archive(config, &pool, opts, progress).await?;
    pool.close().await;

    if opts.dry_run {
        println!("ingest {} (dry-run)", report.archive);
    } else {
        println!("ingest {}", report.archive);
    }
    println!("  text files found: {}", report.files_found);
    println!("  works written: {}", report.works_written);
    println!("  lines written: {}", report.lines_written);
    println!("  skipped: {}", report.skipped.len());
    for (path, reason) in &report.skipped {
        println!("    {}: {}", path.display(), reason);
    }
    println!("ok");
    Ok(())
}

/// Run one extraction + cleanse pass and return what happened.
pub async fn ingest_archive(
    config: &Config,
    pool: &SqlitePool,
    opts: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let source = resolve_source_arg(config, opts.source.as_deref())?;
    let arena = ExtractionArena::new()?;

    progress.report(IngestEvent::Extracting {
        archive: source.clone(),
    });
    let archive_path = archive::resolve_source(&source, &arena).await?;
    let extract_dir = arena.extract_dir();
    archive::extract_zip(&archive_path, &extract_dir, config.archive.max_entry_bytes)?;

    let texts = archive::find_texts(
        &extract_dir,
        &config.archive.include_globs,
        &config.archive.exclude_globs,
    )?;
    if texts.is_empty() {
        tracing::warn!(archive = %source, "no text files found in archive");
    }

    let org_dir = config.output.org_dir();
    let edit_dir = config.output.edit_dir();
    if opts.clean && !opts.dry_run {
        archive::clear_dir(&org_dir)?;
        archive::clear_dir(&edit_dir)?;
    }

    let cleanse_config = CleanseConfig::from_config(config);
    let mut report = IngestReport {
        archive: source,
        files_found: texts.len(),
        ..Default::default()
    };
    let total = texts.len() as u64;

    for (i, path) in texts.iter().enumerate() {
        let source_file = path
            .strip_prefix(&extract_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        progress.report(IngestEvent::Cleansing {
            file: source_file.clone(),
            n: i as u64 + 1,
            total,
        });

        let (work, cleansed) = match load_and_cleanse(path, &cleanse_config) {
            Ok(pair) => pair,
            Err(e) if e.is_per_file() => {
                tracing::warn!(file = %source_file, error = %e, "skipping file");
                report.skipped.push((PathBuf::from(&source_file), e.to_string()));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            file = %source_file,
            encoding = work.encoding,
            title = %cleansed.title,
            lines = cleansed.lines.len(),
            "cleansed"
        );

        if !opts.dry_run {
            write_outputs(config, &work, &cleansed, &org_dir, &edit_dir)?;
            works::upsert_work(pool, &config.author.name, &source_file, &cleansed)
                .await
                .with_context(|| format!("failed to store {}", source_file))?;
        }

        report.works_written += 1;
        report.lines_written += cleansed.lines.len();
    }

    tracing::info!(
        works = report.works_written,
        skipped = report.skipped.len(),
        dry_run = opts.dry_run,
        "ingest pass complete"
    );
    Ok(report)
}

fn load_and_cleanse(path: &Path, config: &CleanseConfig) -> PipelineResult<(Work, CleansedWork)> {
    let work = encoding::read_work(path)?;
    let cleansed = cleanse::cleanse_work(&work.lines(), config)?;
    Ok((work, cleansed))
}

fn write_outputs(
    config: &Config,
    work: &Work,
    cleansed: &CleansedWork,
    org_dir: &Path,
    edit_dir: &Path,
) -> Result<()> {
    if config.output.save_utf8_org {
        let path = sink::write_original(work, org_dir, &config.output)
            .with_context(|| format!("failed to write original under {}", org_dir.display()))?;
        tracing::debug!(path = %path.display(), "original written");
    }
    let path = sink::write_cleansed(&work.stem(), cleansed, edit_dir, &config.output)
        .with_context(|| format!("failed to write cleansed text under {}", edit_dir.display()))?;
    tracing::debug!(path = %path.display(), "cleansed text written");
    Ok(())
}

/// `litc extract`: unpack an archive into `dest` after clearing it.
pub async fn run_extract(config: &Config, source: Option<&str>, dest: &Path) -> Result<()> {
    let source = resolve_source_arg(config, source)?;
    if dest.is_file() {
        bail!("destination is a file: {}", dest.display());
    }

    let arena = ExtractionArena::new()?;
    let archive_path = archive::resolve_source(&source, &arena).await?;
    archive::clear_dir(dest)?;
    let files = archive::extract_zip(&archive_path, dest, config.archive.max_entry_bytes)?;

    println!("extract {}", source);
    for file in &files {
        println!("  {}", file.strip_prefix(dest).unwrap_or(file).display());
    }
    println!("  files: {}", files.len());
    println!("ok");
    Ok(())
}
