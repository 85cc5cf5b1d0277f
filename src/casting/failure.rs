//! Failure bundles: a directory per failed cast holding what is needed to
//! reproduce it.

use chrono::{DateTime, Utc};
use hlscast_av::EncoderBackend;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub reason: String,
    pub source: PathBuf,
    pub subtitle: Option<PathBuf>,
    pub encoder: Option<EncoderBackend>,
    pub exit: Option<String>,
    pub command: Option<String>,
    pub settings: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Write `report` and the captured encoder output under `root`.
///
/// The bundle directory is `<timestamp>_<source stem>`, suffixed `_1`, `_2`,
/// ... if that name is taken.
pub fn write_failure_bundle(
    root: &Path,
    report: &FailureReport,
    log_lines: &[String],
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;

    let stem = report
        .source
        .file_stem()
        .map(|s| sanitize(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "cast".to_string());
    let base = format!("{}_{}", report.timestamp.format("%Y%m%d_%H%M%S"), stem);

    let mut dir = root.join(&base);
    let mut n = 1;
    while dir.exists() {
        dir = root.join(format!("{}_{}", base, n));
        n += 1;
    }
    std::fs::create_dir(&dir)?;

    let metadata = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    std::fs::write(dir.join("metadata.json"), metadata)?;

    let mut log = log_lines.join("\n");
    log.push('\n');
    std::fs::write(dir.join("encoder.log"), log)?;

    Ok(dir)
}

/// Keep ASCII alphanumerics, `-` and `_`; collapse the rest to `_`.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').chars().take(64).collect()
}
