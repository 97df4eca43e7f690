//! Report assembly
//!
//! [`Report`] is the single serializable artifact of a scan: every ranked
//! view, time series and insight, shaped for JSON output and for embedding
//! into the HTML dashboard. Building it consumes nothing; the same
//! [`Aggregate`](crate::aggregate::Aggregate) can be rendered repeatedly.
//!
//! Rounding happens here and nowhere upstream: totals to 2 decimal places,
//! percentages to 1. Per-session costs were already rounded to 4 at
//! extraction time.

use crate::aggregate::{
    ranked_counts, Aggregate, DurationStats, SubagentSample, WeekComparison,
};
use crate::cost::{self, CostComponents, PricingTier};
use crate::insight::{self, GlobalInsight, SessionInsight};
use crate::types::TokenTally;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How many rows each ranked list keeps. Everything beyond a limit is
/// dropped from the report, not summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLimits {
    pub tools: usize,
    pub errors: usize,
    pub retries: usize,
    pub sequences: usize,
    pub projects: usize,
    pub expensive_sessions: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            tools: 20,
            errors: 10,
            retries: 10,
            sequences: 15,
            projects: 20,
            expensive_sessions: 20,
        }
    }
}

// ============================================
// Report rows
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub files_scanned: u64,
    pub files_unreadable: u64,
    pub session_count: u64,
    pub dropped_sessions: u64,
    pub project_count: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub delegate_calls: u64,
    /// Distinct tool names seen, before any ranked-list truncation
    pub unique_tools: u64,
    /// Distinct MCP server names seen
    pub unique_servers: u64,
    /// Distinct sub-agent types seen
    pub unique_subagents: u64,
    /// Cache reads over reads-plus-input, percent, 1 dp
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCost {
    pub name: String,
    /// Total at this tier, 2 dp
    pub total: f64,
    pub components: CostComponents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    /// Grand totals re-priced at every configured tier
    pub tiers: Vec<TierCost>,
    /// The tier per-session costs were computed at
    pub default_tier: String,
    /// Recent daily average extrapolated to 30 days, 2 dp
    pub projected_monthly: f64,
    /// Twice the mean positive session cost, 2 dp
    pub anomaly_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRow {
    pub name: String,
    pub calls: u64,
    pub errors: u64,
    pub retries: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRow {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRow {
    pub name: String,
    pub calls: u64,
    /// Function name → calls, ranked
    pub functions: Vec<CountRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentRow {
    pub name: String,
    pub calls: u64,
    pub samples: Vec<SubagentSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub tokens: TokenTally,
    pub sessions: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRow {
    pub hour: u8,
    pub sessions: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayRow {
    pub weekday: String,
    pub sessions: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    /// Opaque project identifier (encoded directory name)
    pub id: String,
    /// Human-readable name derived from the identifier
    pub display_name: String,
    pub session_count: u64,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpensiveSession {
    pub id: String,
    pub project: String,
    pub date: Option<NaiveDate>,
    pub cost: f64,
    pub tokens: TokenTally,
    pub turns: u64,
    pub duration_minutes: u64,
    /// Strictly above the anomaly threshold
    pub anomalous: bool,
    pub insight: SessionInsight,
}

/// Compact per-session row for the full session table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub project: String,
    pub date: Option<NaiveDate>,
    pub tokens: u64,
    pub cost: f64,
    pub turns: u64,
    pub user_messages: u64,
    pub duration_minutes: u64,
    pub errors: u64,
    pub active_hours: Vec<u8>,
}

// ============================================
// Report
// ============================================

/// The complete scan artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub tokens: TokenTally,
    pub costs: CostReport,
    pub week_over_week: WeekComparison,
    pub tools: Vec<ToolRow>,
    pub tool_errors: Vec<CountRow>,
    pub tool_retries: Vec<CountRow>,
    pub sequences: Vec<CountRow>,
    pub servers: Vec<ServerRow>,
    pub subagents: Vec<SubagentRow>,
    pub daily: Vec<DailyRow>,
    pub hourly: Vec<HourlyRow>,
    pub weekdays: Vec<WeekdayRow>,
    pub durations: DurationStats,
    pub projects: Vec<ProjectRow>,
    pub expensive_sessions: Vec<ExpensiveSession>,
    pub sessions: Vec<SessionRow>,
    pub insights: Vec<GlobalInsight>,
}

const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl Report {
    /// Assemble a report from an aggregate.
    ///
    /// `tiers` is the full configured tier table; the grand totals are
    /// re-priced at each. `default_tier` names the tier used for the
    /// per-session costs already baked into the aggregate.
    pub fn build(
        agg: &Aggregate,
        files_scanned: u64,
        files_unreadable: u64,
        tiers: &[PricingTier],
        default_tier: &str,
        limits: &ReportLimits,
    ) -> Report {
        let anomaly_threshold = agg.anomaly_threshold();

        Report {
            generated_at: Utc::now(),
            summary: Summary {
                files_scanned,
                files_unreadable,
                session_count: agg.session_count,
                dropped_sessions: agg.dropped_sessions,
                project_count: agg.projects.len() as u64,
                tool_calls: agg.tools.total_calls(),
                tool_errors: agg.tools.total_errors(),
                delegate_calls: agg.sessions.iter().map(|s| s.delegates.len() as u64).sum(),
                unique_tools: agg.tools.calls.len() as u64,
                unique_servers: agg.servers.len() as u64,
                unique_subagents: agg.subagents.len() as u64,
                cache_hit_rate: cost::round1(agg.cache_hit_rate()),
            },
            tokens: agg.totals,
            costs: cost_report(agg, tiers, default_tier, anomaly_threshold),
            week_over_week: agg.week_comparison(),
            tools: tool_rows(agg, limits.tools),
            tool_errors: count_rows(&agg.tools.errors, limits.errors),
            tool_retries: count_rows(&agg.tools.retries, limits.retries),
            sequences: count_rows(&agg.sequences, limits.sequences),
            servers: server_rows(agg),
            subagents: subagent_rows(agg),
            daily: daily_rows(agg),
            hourly: hourly_rows(agg),
            weekdays: weekday_rows(agg),
            durations: agg.duration_stats(),
            projects: project_rows(agg, limits.projects),
            expensive_sessions: expensive_sessions(
                agg,
                anomaly_threshold,
                limits.expensive_sessions,
            ),
            sessions: session_rows(agg),
            insights: insight::diagnose_global(agg),
        }
    }
}

fn cost_report(
    agg: &Aggregate,
    tiers: &[PricingTier],
    default_tier: &str,
    anomaly_threshold: f64,
) -> CostReport {
    let tiers = tiers
        .iter()
        .map(|tier| {
            let components = cost::cost_components(&agg.totals, tier);
            TierCost {
                name: tier.name.clone(),
                total: cost::round2(components.total),
                components,
            }
        })
        .collect();

    CostReport {
        tiers,
        default_tier: default_tier.to_string(),
        projected_monthly: cost::round2(agg.projected_monthly_cost()),
        anomaly_threshold: cost::round2(anomaly_threshold),
    }
}

fn tool_rows(agg: &Aggregate, limit: usize) -> Vec<ToolRow> {
    ranked_counts(&agg.tools.calls, limit)
        .into_iter()
        .map(|(name, calls)| ToolRow {
            errors: agg.tools.errors.get(&name).copied().unwrap_or(0),
            retries: agg.tools.retries.get(&name).copied().unwrap_or(0),
            name,
            calls,
        })
        .collect()
}

fn count_rows(map: &std::collections::BTreeMap<String, u64>, limit: usize) -> Vec<CountRow> {
    ranked_counts(map, limit)
        .into_iter()
        .map(|(name, count)| CountRow { name, count })
        .collect()
}

fn server_rows(agg: &Aggregate) -> Vec<ServerRow> {
    let mut rows: Vec<ServerRow> = agg
        .servers
        .iter()
        .map(|(name, usage)| ServerRow {
            name: name.clone(),
            calls: usage.calls,
            functions: count_rows(&usage.functions, usize::MAX),
        })
        .collect();
    rows.sort_by(|a, b| b.calls.cmp(&a.calls));
    rows
}

fn subagent_rows(agg: &Aggregate) -> Vec<SubagentRow> {
    let mut rows: Vec<SubagentRow> = agg
        .subagents
        .iter()
        .map(|(name, usage)| SubagentRow {
            name: name.clone(),
            calls: usage.calls,
            samples: usage.samples.clone(),
        })
        .collect();
    rows.sort_by(|a, b| b.calls.cmp(&a.calls));
    rows
}

fn daily_rows(agg: &Aggregate) -> Vec<DailyRow> {
    agg.daily
        .iter()
        .map(|(date, bucket)| DailyRow {
            date: *date,
            tokens: bucket.tokens,
            sessions: bucket.sessions,
            cost: cost::round2(bucket.cost),
        })
        .collect()
}

fn hourly_rows(agg: &Aggregate) -> Vec<HourlyRow> {
    agg.hourly
        .iter()
        .enumerate()
        .map(|(hour, bucket)| HourlyRow {
            hour: hour as u8,
            sessions: bucket.sessions,
            cost: cost::round2(bucket.cost),
        })
        .collect()
}

fn weekday_rows(agg: &Aggregate) -> Vec<WeekdayRow> {
    agg.weekdays
        .iter()
        .zip(WEEKDAY_LABELS)
        .map(|(bucket, label)| WeekdayRow {
            weekday: label.to_string(),
            sessions: bucket.sessions,
            cost: cost::round2(bucket.cost),
        })
        .collect()
}

fn project_rows(agg: &Aggregate, limit: usize) -> Vec<ProjectRow> {
    let mut rows: Vec<ProjectRow> = agg
        .projects
        .iter()
        .map(|(id, rollup)| ProjectRow {
            id: id.clone(),
            display_name: project_display_name(id),
            session_count: rollup.sessions.len() as u64,
            tokens: rollup.tokens,
            cost: cost::round2(rollup.cost),
        })
        .collect();
    rows.sort_by(|a, b| b.tokens.cmp(&a.tokens));
    rows.truncate(limit);
    rows
}

fn expensive_sessions(
    agg: &Aggregate,
    anomaly_threshold: f64,
    limit: usize,
) -> Vec<ExpensiveSession> {
    let mut sessions: Vec<&crate::types::SessionSummary> = agg.sessions.iter().collect();
    sessions.sort_by(|a, b| b.cost.total_cmp(&a.cost).then_with(|| a.id.cmp(&b.id)));

    sessions
        .into_iter()
        .take(limit)
        .map(|session| ExpensiveSession {
            id: session.id.clone(),
            project: session.project.clone(),
            date: session.first_ts.map(|ts| ts.date_naive()),
            cost: session.cost,
            tokens: session.tokens,
            turns: session.turns,
            duration_minutes: session.duration_minutes,
            anomalous: anomaly_threshold > 0.0 && session.cost > anomaly_threshold,
            insight: insight::diagnose_session(session),
        })
        .collect()
}

fn session_rows(agg: &Aggregate) -> Vec<SessionRow> {
    agg.sessions
        .iter()
        .map(|session| SessionRow {
            id: session.id.clone(),
            project: session.project.clone(),
            date: session.first_ts.map(|ts| ts.date_naive()),
            tokens: session.tokens.total(),
            cost: session.cost,
            turns: session.turns,
            user_messages: session.user_messages,
            duration_minutes: session.duration_minutes,
            errors: session.tools.total_errors(),
            active_hours: session.active_hours.iter().copied().collect(),
        })
        .collect()
}

/// Derive a readable project name from the encoded directory name.
///
/// Claude encodes the project's absolute path by replacing separators with
/// `-`, so `-Users-jo-dev-widget` becomes `widget` and a bare home
/// directory becomes `~ (home)`. Names that do not look path-encoded pass
/// through unchanged.
pub fn project_display_name(id: &str) -> String {
    if !id.starts_with('-') {
        return id.to_string();
    }

    let segments: Vec<&str> = id.split('-').filter(|s| !s.is_empty()).collect();
    match segments.last() {
        // "-Users-jo" style: just a home directory
        _ if segments.len() <= 2 => "~ (home)".to_string(),
        Some(last) => (*last).to_string(),
        None => id.to_string(),
    }
}
