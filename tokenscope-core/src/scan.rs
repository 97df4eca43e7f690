//! Scan pipeline
//!
//! Discovers session files under the log root, fans extraction out across
//! a rayon pool, and merges the results in discovery order so the output
//! is deterministic regardless of worker count.
//!
//! # Error Handling
//!
//! A missing log root is the only fatal condition. Unreadable files are
//! logged, counted in the outcome, and skipped; everything inside a file
//! degrades further down the pipeline.

use crate::aggregate::Aggregate;
use crate::cost::PricingTier;
use crate::decode;
use crate::error::{Error, Result};
use crate::extract;
use crate::types::SessionSummary;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// One discovered session file and the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    /// Name of the directory under `projects/` containing the file
    pub project: String,
}

/// What to scan and how.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Log root, typically `~/.claude`
    pub root: PathBuf,
    /// Worker threads; 0 lets rayon pick
    pub workers: usize,
    /// Tier used for per-session costs
    pub default_tier: PricingTier,
}

/// Everything a scan produced.
#[derive(Debug)]
pub struct ScanOutcome {
    pub aggregate: Aggregate,
    pub files_scanned: u64,
    pub files_unreadable: u64,
}

/// Enumerate session files: `<root>/projects/*/*.jsonl`, sorted by path.
///
/// Fails only when `<root>/projects` does not exist.
pub fn discover_log_files(root: &Path) -> Result<Vec<LogFile>> {
    let projects_dir = root.join("projects");
    if !projects_dir.is_dir() {
        return Err(Error::MissingRoot(projects_dir));
    }

    let pattern = projects_dir.join("*").join("*.jsonl");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| Error::Scan(format!("non-UTF-8 log root: {}", projects_dir.display())))?;

    let mut files = Vec::new();
    for entry in glob::glob(pattern).map_err(|e| Error::Scan(e.to_string()))? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let project = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        files.push(LogFile { path, project });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(count = files.len(), root = %root.display(), "discovered session files");
    Ok(files)
}

/// Run a full scan.
pub fn scan(options: &ScanOptions) -> Result<ScanOutcome> {
    scan_with_cancel(options, &AtomicBool::new(false))
}

/// Run a full scan, checking `cancel` between files. When the flag is
/// raised the scan stops promptly with [`Error::Cancelled`] and no partial
/// output.
pub fn scan_with_cancel(options: &ScanOptions, cancel: &AtomicBool) -> Result<ScanOutcome> {
    let files = discover_log_files(&options.root)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .map_err(|e| Error::Scan(e.to_string()))?;

    // par_iter + collect preserves input order, which keeps the merge
    // below deterministic.
    let extracted: Vec<Option<SessionSummary>> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                extract_one(file, &options.default_tier)
            })
            .collect()
    });

    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let mut aggregate = Aggregate::new();
    let mut files_unreadable = 0u64;
    for session in extracted {
        match session {
            Some(session) => {
                aggregate.merge(session);
            }
            None => files_unreadable += 1,
        }
    }

    tracing::info!(
        files = files.len(),
        unreadable = files_unreadable,
        sessions = aggregate.session_count,
        dropped = aggregate.dropped_sessions,
        "scan complete"
    );

    Ok(ScanOutcome {
        aggregate,
        files_scanned: files.len() as u64,
        files_unreadable,
    })
}

fn extract_one(file: &LogFile, tier: &PricingTier) -> Option<SessionSummary> {
    let events = match decode::decode_file(&file.path) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };
    Some(extract::extract_session(&file.project, tier, events))
}
