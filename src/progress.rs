//! Bulk import progress reporting.
//!
//! Reports how many commit-plan entries have been written during
//! `catrec import` so users see how much is left on large files. Progress
//! is emitted on **stderr** so stdout stays parseable for scripts.

use std::io::Write;
use std::str::FromStr;

/// A single progress event for an import.
#[derive(Clone, Debug)]
pub enum ImportProgressEvent {
    /// The file was parsed into `rows` data rows.
    Parsed { file: String, rows: u64 },
    /// `n` plan entries written out of `total`.
    Applying { file: String, n: u64, total: u64 },
}

/// Reports import progress. Implementations write to stderr (human or JSON).
pub trait ImportProgressReporter: Send + Sync {
    fn report(&self, event: ImportProgressEvent);
}

/// Human-friendly progress on stderr: "import stock.csv  applying  1,234 / 5,000 rows".
pub struct StderrProgress;

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Parsed { file, rows } => {
                format!("import {}  parsed {} rows", file, thousands(*rows))
            }
            ImportProgressEvent::Applying { file, n, total } => format!(
                "import {}  applying  {} / {} rows",
                file,
                thousands(*n),
                thousands(*total)
            ),
        };
        emit(&line);
    }
}

/// One JSON object per event, tagged `"event": "progress"`.
pub struct JsonProgress;

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        let obj = match &event {
            ImportProgressEvent::Parsed { file, rows } => serde_json::json!({
                "event": "progress",
                "file": file,
                "phase": "parsed",
                "rows": rows
            }),
            ImportProgressEvent::Applying { file, n, total } => serde_json::json!({
                "event": "progress",
                "file": file,
                "phase": "applying",
                "n": n,
                "total": total
            }),
        };
        emit(&obj.to_string());
    }
}

pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn emit(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", line);
    let _ = err.flush();
}

/// `12345` → `"12,345"`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Where `catrec import` sends progress. Both active modes use stderr.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human on an interactive stderr, silent when redirected.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}': expected off, human, or json",
                other
            )),
        }
    }
}
