//! File sink for pipeline output.
//!
//! For a source file `127_ruby_150.txt` two files are written:
//!
//! - `org/127_ruby_150_org_utf-8.tsv`: the decoded original, one line per row
//! - `edit/127_ruby_150_clns_utf-8.txt`: the cleansed lines, with an optional
//!   `title` column
//!
//! Fields are quoted only when they contain the delimiter, a double quote,
//! or a line break.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::config::{Delimiter, OutputConfig};
use crate::models::{CleansedWork, Work};

const ORIGINAL_SUFFIX: &str = "_org_utf-8.tsv";
const CLEANSED_SUFFIX: &str = "_clns_utf-8.txt";

pub fn original_file_name(stem: &str) -> String {
    format!("{}{}", stem, ORIGINAL_SUFFIX)
}

pub fn cleansed_file_name(stem: &str) -> String {
    format!("{}{}", stem, CLEANSED_SUFFIX)
}

/// Write the decoded original as a single-column TSV.
pub fn write_original(work: &Work, dir: &Path, output: &OutputConfig) -> std::io::Result<PathBuf> {
    let mut out = String::with_capacity(work.text.len() + 16);
    if output.write_header {
        out.push_str("text\n");
    }
    for line in work.lines() {
        out.push_str(&quote_field(line, Delimiter::Tab));
        out.push('\n');
    }

    let path = dir.join(original_file_name(&work.stem()));
    write_file(&path, &out)?;
    Ok(path)
}

/// Write the cleansed lines, optionally with the work title on every row.
pub fn write_cleansed(
    stem: &str,
    work: &CleansedWork,
    dir: &Path,
    output: &OutputConfig,
) -> std::io::Result<PathBuf> {
    let delimiter = output.delimiter;
    let sep = delimiter.as_char();
    let title = quote_field(&work.title, delimiter);

    let mut out = String::new();
    if output.write_header {
        out.push_str("text");
        if output.write_title {
            out.push(sep);
            out.push_str("title");
        }
        out.push('\n');
    }
    for line in &work.lines {
        out.push_str(&quote_field(&line.text, delimiter));
        if output.write_title {
            out.push(sep);
            out.push_str(&title);
        }
        out.push('\n');
    }

    let path = dir.join(cleansed_file_name(stem));
    write_file(&path, &out)?;
    Ok(path)
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

fn quote_field(field: &str, delimiter: Delimiter) -> Cow<'_, str> {
    let needs_quotes = field.contains(delimiter.as_char())
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
