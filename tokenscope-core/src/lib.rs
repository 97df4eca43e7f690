//! # tokenscope-core
//!
//! Core library for tokenscope - a usage and cost analyzer for Claude Code
//! conversation logs.
//!
//! This library provides:
//! - A forgiving JSONL decoder and per-file session extraction
//! - A tiered cost model for token traffic
//! - Deterministic aggregation into temporal, tool, delegate and project rollups
//! - Heuristic insights explaining expensive sessions and usage-wide patterns
//! - A serializable report shaped for JSON output and the HTML dashboard
//!
//! ## Architecture
//!
//! Data flows through four stages:
//! - **Discover:** enumerate `projects/*/*.jsonl` under the log root
//! - **Extract:** fold each file's events into a frozen session summary (parallel)
//! - **Aggregate:** merge summaries into rollups in discovery order
//! - **Report:** rank, round and diagnose into the final artifact
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokenscope_core::{scan, Config, Report, ScanOptions};
//!
//! let config = Config::load().expect("failed to load config");
//! let options = ScanOptions {
//!     root: config.claude_dir(),
//!     workers: config.scan.workers,
//!     default_tier: config.pricing.default_tier().expect("unknown tier"),
//! };
//! let outcome = scan(&options).expect("scan failed");
//! let report = Report::build(
//!     &outcome.aggregate,
//!     outcome.files_scanned,
//!     outcome.files_unreadable,
//!     &config.pricing.resolve_tiers(),
//!     &config.pricing.default_tier,
//!     &config.report,
//! );
//! println!("{}", serde_json::to_string_pretty(&report).unwrap());
//! ```

// Re-export commonly used items at the crate root
pub use aggregate::{Aggregate, WeekComparison};
pub use config::Config;
pub use cost::PricingTier;
pub use error::{Error, Result};
pub use report::{Report, ReportLimits};
pub use scan::{scan, scan_with_cancel, ScanOptions, ScanOutcome};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod config;
pub mod cost;
pub mod decode;
pub mod error;
pub mod extract;
pub mod format;
pub mod insight;
pub mod logging;
pub mod report;
pub mod scan;
pub mod types;
