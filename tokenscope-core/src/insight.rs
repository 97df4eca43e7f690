//! Heuristic insights
//!
//! Two layers of threshold rules over the aggregated data:
//!
//! - [`diagnose_session`] explains why one session was expensive. The rules
//!   run in a fixed priority order and the first match wins, so every
//!   session gets exactly one diagnosis.
//! - [`diagnose_global`] surfaces usage-wide patterns; each rule fires
//!   independently and contributes zero or one insight.
//!
//! All thresholds are fixed constants. They are heuristics, not billing
//! facts, and the messages are phrased as observations.

use crate::aggregate::{ranked_counts, Aggregate, TrendDirection};
use crate::format::format_tokens;
use serde::{Deserialize, Serialize};

// Session-layer thresholds
const OUTPUT_RATIO: f64 = 0.30;
const CACHE_RATE_FLOOR: f64 = 0.50;
const CACHE_VOLUME_FLOOR: u64 = 100_000;
const TURN_LIMIT: u64 = 50;
const DELEGATE_LIMIT: usize = 5;
const TASK_LIMIT: u64 = 10;
const READ_LIMIT: u64 = 100;
const LARGE_OUTPUT_FLOOR: u64 = 500_000;

// Global-layer thresholds
const WEEKDAY_IMBALANCE_RATIO: f64 = 2.0;
const TREND_CHANGE_PERCENT: f64 = 20.0;
const RETRY_LOOP_FLOOR: u64 = 10;
const FAILING_TOOL_FLOOR: u64 = 5;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// ============================================
// Session layer
// ============================================

/// Why one session was expensive. Ordered by diagnostic priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionInsightKind {
    /// Output tokens exceed 30% of input
    HeavyOutput,
    /// Low cache hit rate on a high-volume session
    ColdCache,
    /// Long back-and-forth conversation
    ManyTurns,
    /// Many distinct delegate calls
    HeavyDelegation,
    /// Many sub-agent spawns
    ManyTasks,
    /// Very high read/search tool volume
    HeavyReads,
    /// Large by sheer output volume, no specific cause
    LargeSession,
    /// Nothing stands out; the prompts themselves are the place to look
    ReviewPrompts,
}

/// One session diagnosis: a machine-readable kind plus a human sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInsight {
    pub kind: SessionInsightKind,
    pub message: String,
}

fn insight(kind: SessionInsightKind, message: String) -> SessionInsight {
    SessionInsight { kind, message }
}

/// Explain why `session` was expensive. First matching rule wins.
pub fn diagnose_session(session: &crate::types::SessionSummary) -> SessionInsight {
    let tokens = &session.tokens;

    if tokens.output as f64 > tokens.input as f64 * OUTPUT_RATIO {
        return insight(
            SessionInsightKind::HeavyOutput,
            format!(
                "output volume is unusually high ({} out vs {} in); generated content drove the cost",
                format_tokens(tokens.output),
                format_tokens(tokens.input)
            ),
        );
    }

    let cache_denominator = tokens.input + tokens.cache_read;
    if cache_denominator > CACHE_VOLUME_FLOOR {
        let rate = tokens.cache_read as f64 / cache_denominator as f64;
        if rate < CACHE_RATE_FLOOR {
            return insight(
                SessionInsightKind::ColdCache,
                format!(
                    "cache hit rate was only {:.0}% on {} of input traffic; most context was re-sent at full price",
                    rate * 100.0,
                    format_tokens(cache_denominator)
                ),
            );
        }
    }

    if session.turns > TURN_LIMIT {
        return insight(
            SessionInsightKind::ManyTurns,
            format!(
                "{} assistant turns; long conversations re-send their growing context every turn",
                session.turns
            ),
        );
    }

    if session.delegates.len() > DELEGATE_LIMIT {
        return insight(
            SessionInsightKind::HeavyDelegation,
            format!(
                "{} delegate calls (MCP tools and sub-agents); each carries its own context",
                session.delegates.len()
            ),
        );
    }

    if session.task_spawns() > TASK_LIMIT {
        return insight(
            SessionInsightKind::ManyTasks,
            format!(
                "{} sub-agent spawns; every spawned task starts with a fresh copy of its instructions",
                session.task_spawns()
            ),
        );
    }

    if session.read_style_calls() > READ_LIMIT {
        return insight(
            SessionInsightKind::HeavyReads,
            format!(
                "{} read/search tool calls; file contents accumulated into the context",
                session.read_style_calls()
            ),
        );
    }

    if tokens.output > LARGE_OUTPUT_FLOOR {
        return insight(
            SessionInsightKind::LargeSession,
            format!(
                "a large session by volume ({} output) with no single standout cause",
                format_tokens(tokens.output)
            ),
        );
    }

    insight(
        SessionInsightKind::ReviewPrompts,
        "no structural cause stands out; reviewing the prompts themselves may explain the cost"
            .to_string(),
    )
}

// ============================================
// Global layer
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalInsightKind {
    WeekdayImbalance,
    PeakHours,
    UsageRising,
    UsageFalling,
    RetryLoop,
    FailingTool,
}

/// One usage-wide observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalInsight {
    pub kind: GlobalInsightKind,
    pub title: String,
    pub detail: String,
}

/// Run every global rule over `agg`. Rules fire independently; the result
/// may be empty.
pub fn diagnose_global(agg: &Aggregate) -> Vec<GlobalInsight> {
    let mut insights = Vec::new();

    if let Some(i) = weekday_imbalance(agg) {
        insights.push(i);
    }
    if let Some(i) = peak_hours(agg) {
        insights.push(i);
    }
    if let Some(i) = usage_trend(agg) {
        insights.push(i);
    }
    if let Some(i) = retry_loop(agg) {
        insights.push(i);
    }
    if let Some(i) = failing_tool(agg) {
        insights.push(i);
    }

    insights
}

fn weekday_imbalance(agg: &Aggregate) -> Option<GlobalInsight> {
    let active: Vec<(usize, f64)> = agg
        .weekdays
        .iter()
        .enumerate()
        .filter(|(_, b)| b.cost > 0.0)
        .map(|(i, b)| (i, b.cost))
        .collect();
    if active.len() < 2 {
        return None;
    }

    let (max_day, max_cost) = active
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    let (min_day, min_cost) = active
        .iter()
        .copied()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();

    if max_cost / min_cost <= WEEKDAY_IMBALANCE_RATIO {
        return None;
    }

    Some(GlobalInsight {
        kind: GlobalInsightKind::WeekdayImbalance,
        title: format!("{}s cost the most", WEEKDAY_NAMES[max_day]),
        detail: format!(
            "{}s total ${:.2} against ${:.2} on {}s, more than double",
            WEEKDAY_NAMES[max_day], max_cost, min_cost, WEEKDAY_NAMES[min_day]
        ),
    })
}

fn peak_hours(agg: &Aggregate) -> Option<GlobalInsight> {
    let mut hours: Vec<(usize, f64)> = agg
        .hourly
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.cost))
        .collect();
    hours.sort_by(|a, b| b.1.total_cmp(&a.1));

    match hours.first() {
        Some((_, top)) if *top > 0.0 => {}
        _ => return None,
    }

    let top: Vec<String> = hours
        .iter()
        .take(3)
        .filter(|(_, cost)| *cost > 0.0)
        .map(|(hour, _)| format!("{hour:02}:00"))
        .collect();

    Some(GlobalInsight {
        kind: GlobalInsightKind::PeakHours,
        title: "Usage concentrates in a few hours".to_string(),
        detail: format!("the most expensive hours of the day are {}", top.join(", ")),
    })
}

fn usage_trend(agg: &Aggregate) -> Option<GlobalInsight> {
    let comparison = agg.week_comparison();
    if !comparison.available || comparison.change_percent.abs() <= TREND_CHANGE_PERCENT {
        return None;
    }

    let (kind, title) = match comparison.direction {
        TrendDirection::Up => (GlobalInsightKind::UsageRising, "Usage is rising"),
        TrendDirection::Down => (GlobalInsightKind::UsageFalling, "Usage is falling"),
        TrendDirection::Flat => return None,
    };

    Some(GlobalInsight {
        kind,
        title: title.to_string(),
        detail: format!(
            "the last 7 active days cost ${:.2}, {:+.0}% against ${:.2} the week before",
            comparison.current_cost, comparison.change_percent, comparison.previous_cost
        ),
    })
}

fn retry_loop(agg: &Aggregate) -> Option<GlobalInsight> {
    let (name, count) = ranked_counts(&agg.tools.retries, 1).into_iter().next()?;
    if count <= RETRY_LOOP_FLOOR {
        return None;
    }

    Some(GlobalInsight {
        kind: GlobalInsightKind::RetryLoop,
        title: format!("{name} is retried in loops"),
        detail: format!(
            "{name} was re-invoked back-to-back {count} times; repeated identical calls often mean the tool keeps failing to produce what was needed"
        ),
    })
}

fn failing_tool(agg: &Aggregate) -> Option<GlobalInsight> {
    let (name, count) = ranked_counts(&agg.tools.errors, 1).into_iter().next()?;
    if count <= FAILING_TOOL_FLOOR {
        return None;
    }

    Some(GlobalInsight {
        kind: GlobalInsightKind::FailingTool,
        title: format!("{name} fails often"),
        detail: format!("{name} returned {count} error results across the scanned sessions"),
    })
}
