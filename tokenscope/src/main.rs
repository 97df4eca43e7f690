//! tokenscope - usage and cost analyzer for Claude Code conversation logs
//!
//! Scans `~/.claude/projects/*/*.jsonl`, aggregates token usage into a
//! report, and writes it as JSON or as a self-contained HTML dashboard.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokenscope_core::format::{format_cost, format_tokens};
use tokenscope_core::{scan, Config, Report, ScanOptions};

/// Dashboard template; the report JSON is substituted in before writing.
const HTML_TEMPLATE: &str = include_str!("../assets/template.html");
const DATA_PLACEHOLDER: &str = "__DATA_PLACEHOLDER__";

#[derive(Parser)]
#[command(name = "tokenscope")]
#[command(about = "Analyze Claude Code token usage and cost")]
#[command(version)]
struct Args {
    /// Claude log directory (default: ~/.claude, or scan.claude_dir from config)
    #[arg(short = 'd', long)]
    claude_dir: Option<PathBuf>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Pricing tier for per-session costs (overrides config)
    #[arg(short, long)]
    tier: Option<String>,

    /// Worker threads for extraction; 0 picks automatically
    #[arg(short, long)]
    workers: Option<usize>,

    /// Suppress the summary printed to stderr
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// The full report as pretty-printed JSON
    Json,
    /// A self-contained HTML dashboard with the report embedded
    Html,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(tier) = &args.tier {
        config.pricing.default_tier = tier.clone();
    }

    // Initialize logging
    let _log_guard =
        tokenscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let root = args.claude_dir.clone().unwrap_or_else(|| config.claude_dir());
    let options = ScanOptions {
        root: root.clone(),
        workers: args.workers.unwrap_or(config.scan.workers),
        default_tier: config.pricing.default_tier()?,
    };

    tracing::info!(root = %root.display(), workers = options.workers, "starting scan");
    let outcome = scan(&options)
        .with_context(|| format!("failed to scan {}", root.display()))?;

    let report = Report::build(
        &outcome.aggregate,
        outcome.files_scanned,
        outcome.files_unreadable,
        &config.pricing.resolve_tiers(),
        &config.pricing.default_tier,
        &config.report,
    );

    let rendered = render(&report, args.format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if !args.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{rendered}"),
    }

    if !args.quiet {
        print_summary(&report);
    }

    Ok(())
}

fn render(report: &Report, format: Format) -> Result<String> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    Ok(match format {
        Format::Json => json,
        Format::Html => HTML_TEMPLATE.replace(DATA_PLACEHOLDER, &json),
    })
}

/// Print a short run summary to stderr so piping stdout stays clean.
fn print_summary(report: &Report) {
    let s = &report.summary;
    eprintln!(
        "Scanned {} files: {} sessions across {} projects ({} empty, {} unreadable)",
        s.files_scanned, s.session_count, s.project_count, s.dropped_sessions, s.files_unreadable
    );
    eprintln!(
        "Tokens: {} in / {} out, cache hit rate {:.1}%",
        format_tokens(report.tokens.input),
        format_tokens(report.tokens.output),
        s.cache_hit_rate
    );
    eprintln!(
        "Tool calls: {} across {} tools ({} errors), delegate calls: {} ({} servers, {} sub-agent types)",
        s.tool_calls, s.unique_tools, s.tool_errors, s.delegate_calls, s.unique_servers,
        s.unique_subagents
    );
    for tier in &report.costs.tiers {
        let marker = if tier.name == report.costs.default_tier {
            " (default)"
        } else {
            ""
        };
        eprintln!("Cost at {}{}: {}", tier.name, marker, format_cost(tier.total));
    }
    if report.costs.projected_monthly > 0.0 {
        eprintln!(
            "Projected monthly: {}",
            format_cost(report.costs.projected_monthly)
        );
    }
    for insight in &report.insights {
        eprintln!("Insight: {} - {}", insight.title, insight.detail);
    }
}
