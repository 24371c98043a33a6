//! Ingest progress reporting.
//!
//! Progress goes to **stderr** so the summary printed on stdout stays
//! parseable for scripts.

use std::io::Write;

/// One progress event from an ingest pass.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// The archive is being fetched or unpacked. Total unknown.
    Extracting { archive: String },
    /// `n` of `total` text files have been processed.
    Cleansing { file: String, n: u64, total: u64 },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly lines: `ingest  cleansing  3 / 12 files  (rashomon.txt)`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Extracting { archive } => {
                format!("ingest  extracting {}...\n", archive)
            }
            IngestEvent::Cleansing { file, n, total } => format!(
                "ingest  cleansing  {} / {} files  ({})\n",
                format_number(*n),
                format_number(*total),
                file
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Extracting { archive } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "archive": archive,
            }),
            IngestEvent::Cleansing { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "cleansing",
                "file": file,
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
