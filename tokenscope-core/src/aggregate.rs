//! Aggregation
//!
//! Folds frozen [`SessionSummary`] values into one [`Aggregate`] in a
//! deterministic merge order (discovery order of the underlying files).
//! Every rollup is backed by a `BTreeMap`, so ranked views derived from
//! them break ties by name ascending no matter how the scan was
//! parallelized.
//!
//! The drop-empty invariant lives here: a session with zero input and zero
//! output tokens contributes to the dropped-session count and to nothing
//! else.

use crate::types::{SessionSummary, TokenTally, ToolCallStats};
use chrono::{Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// At most this many sub-agent spawn samples are retained per sub-agent
/// type, deduplicated by description.
pub const MAX_SUBAGENT_SAMPLES: usize = 10;

/// Days of history required before a week-over-week comparison is made.
const WEEK_COMPARISON_MIN_DAYS: usize = 14;

/// Recent window, in days, used for the monthly cost projection.
const PROJECTION_WINDOW_DAYS: usize = 7;

/// A session whose cost exceeds this multiple of the mean session cost is
/// flagged as anomalous.
const ANOMALY_MULTIPLIER: f64 = 2.0;

// ============================================
// Rollup buckets
// ============================================

/// Tokens, session count and cost for one time bucket (a day, an hour of
/// day, or a weekday).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub tokens: TokenTally,
    pub sessions: u64,
    pub cost: f64,
}

impl TimeBucket {
    fn add_session(&mut self, session: &SessionSummary) {
        self.tokens.add(&session.tokens);
        self.sessions += 1;
        self.cost += session.cost;
    }
}

/// Per-MCP-server call rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerUsage {
    /// Total calls into this server
    pub calls: u64,
    /// Function name → call count
    pub functions: BTreeMap<String, u64>,
}

/// One retained sub-agent spawn sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentSample {
    pub session_id: String,
    pub description: String,
    pub prompt: String,
}

/// Per-sub-agent-type rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubagentUsage {
    /// Total spawns of this sub-agent type
    pub calls: u64,
    /// Retained spawn samples, capped and deduplicated by description
    pub samples: Vec<SubagentSample>,
}

/// One session's row within a project rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSession {
    /// First 8 characters of the session id
    pub id_prefix: String,
    /// Calendar date of the session's first timestamp
    pub date: Option<NaiveDate>,
    pub cost: f64,
    /// Conversation tokens (input + output)
    pub tokens: u64,
    pub turns: u64,
    pub duration_minutes: u64,
    pub errors: u64,
}

/// Per-project rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRollup {
    pub sessions: Vec<ProjectSession>,
    /// Conversation tokens across the project's sessions
    pub tokens: u64,
    pub cost: f64,
}

// ============================================
// Week-over-week
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Cost comparison of the most recent 7 distinct active days against the
/// 7 before them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekComparison {
    /// Whether 14 distinct active days were available
    pub available: bool,
    pub current_cost: f64,
    pub previous_cost: f64,
    pub current_tokens: u64,
    pub previous_tokens: u64,
    /// Percent change in cost; 0 when unavailable or previous is zero
    pub change_percent: f64,
    pub direction: TrendDirection,
}

impl Default for WeekComparison {
    fn default() -> Self {
        Self {
            available: false,
            current_cost: 0.0,
            previous_cost: 0.0,
            current_tokens: 0,
            previous_tokens: 0,
            change_percent: 0.0,
            direction: TrendDirection::Flat,
        }
    }
}

// ============================================
// Aggregate
// ============================================

/// All rollups over the sessions of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Grand token totals over non-empty sessions
    pub totals: TokenTally,
    /// Sessions merged into the rollups
    pub session_count: u64,
    /// Empty sessions excluded from every rollup
    pub dropped_sessions: u64,
    /// Tool calls/errors/retries merged across sessions
    pub tools: ToolCallStats,
    /// MCP server name → usage
    pub servers: BTreeMap<String, ServerUsage>,
    /// Sub-agent type → usage
    pub subagents: BTreeMap<String, SubagentUsage>,
    /// Calendar date → bucket (sessions without timestamps are absent here)
    pub daily: BTreeMap<NaiveDate, TimeBucket>,
    /// Hour of day (0-23), keyed by the session's first timestamp
    pub hourly: Vec<TimeBucket>,
    /// Weekday, Monday-first
    pub weekdays: Vec<TimeBucket>,
    /// Sequence edge ("A -> B") → count
    pub sequences: BTreeMap<String, u64>,
    /// Session durations in minutes, merge order
    pub durations: Vec<u64>,
    /// Project identifier → rollup
    pub projects: BTreeMap<String, ProjectRollup>,
    /// The merged sessions themselves, merge order
    pub sessions: Vec<SessionSummary>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self {
            hourly: vec![TimeBucket::default(); 24],
            weekdays: vec![TimeBucket::default(); 7],
            ..Default::default()
        }
    }

    /// Fold one session into every rollup. Returns `false` when the session
    /// was empty and therefore dropped.
    pub fn merge(&mut self, session: SessionSummary) -> bool {
        if session.is_empty() {
            self.dropped_sessions += 1;
            tracing::debug!(session = %session.id, "dropping empty session");
            return false;
        }

        self.totals.add(&session.tokens);
        self.session_count += 1;
        self.tools.merge(&session.tools);

        self.merge_delegates(&session);
        self.merge_time_buckets(&session);

        for edge in &session.edges {
            *self.sequences.entry(edge.clone()).or_insert(0) += 1;
        }
        if session.duration_minutes > 0 {
            self.durations.push(session.duration_minutes);
        }

        let project = self.projects.entry(session.project.clone()).or_default();
        project.tokens += session.tokens.total();
        project.cost += session.cost;
        project.sessions.push(ProjectSession {
            id_prefix: session.id.chars().take(8).collect(),
            date: session.first_ts.map(|ts| ts.date_naive()),
            cost: session.cost,
            tokens: session.tokens.total(),
            turns: session.turns,
            duration_minutes: session.duration_minutes,
            errors: session.tools.total_errors(),
        });

        self.sessions.push(session);
        true
    }

    fn merge_delegates(&mut self, session: &SessionSummary) {
        use crate::types::DelegateKind;

        for call in &session.delegates {
            match call.kind {
                DelegateKind::McpServer => {
                    let server = self.servers.entry(call.target.clone()).or_default();
                    server.calls += 1;
                    if let Some(function) = &call.function {
                        *server.functions.entry(function.clone()).or_insert(0) += 1;
                    }
                }
                DelegateKind::Subagent => {
                    let usage = self.subagents.entry(call.target.clone()).or_default();
                    usage.calls += 1;

                    let duplicate = usage
                        .samples
                        .iter()
                        .any(|s| s.description == call.description);
                    if !duplicate && usage.samples.len() < MAX_SUBAGENT_SAMPLES {
                        usage.samples.push(SubagentSample {
                            session_id: session.id.clone(),
                            description: call.description.clone(),
                            prompt: call.prompt.clone(),
                        });
                    }
                }
            }
        }
    }

    fn merge_time_buckets(&mut self, session: &SessionSummary) {
        let Some(first) = session.first_ts else {
            return;
        };
        let date = first.date_naive();
        self.daily.entry(date).or_default().add_session(session);
        self.weekdays[date.weekday().num_days_from_monday() as usize].add_session(session);
        self.hourly[first.hour() as usize].add_session(session);
    }

    // ============================================
    // Derived metrics
    // ============================================

    /// Cache hit rate as a percentage: reads over reads-plus-input.
    /// Zero when no input traffic exists.
    pub fn cache_hit_rate(&self) -> f64 {
        let denominator = self.totals.input + self.totals.cache_read;
        if denominator == 0 {
            return 0.0;
        }
        self.totals.cache_read as f64 / denominator as f64 * 100.0
    }

    /// Compare the most recent 7 distinct active days against the 7 before
    /// them. Unavailable (all-zero, flat) with fewer than 14 distinct days.
    pub fn week_comparison(&self) -> WeekComparison {
        let dates: Vec<&NaiveDate> = self.daily.keys().collect();
        if dates.len() < WEEK_COMPARISON_MIN_DAYS {
            return WeekComparison::default();
        }

        let split = dates.len() - 7;
        let (previous_days, current_days) = (&dates[split - 7..split], &dates[split..]);

        let sum = |days: &[&NaiveDate]| -> (f64, u64) {
            days.iter().fold((0.0, 0), |(cost, tokens), date| {
                let bucket = &self.daily[date];
                (cost + bucket.cost, tokens + bucket.tokens.total())
            })
        };
        let (previous_cost, previous_tokens) = sum(previous_days);
        let (current_cost, current_tokens) = sum(current_days);

        let (change_percent, direction) = if previous_cost == 0.0 {
            (0.0, TrendDirection::Flat)
        } else {
            let change = (current_cost - previous_cost) / previous_cost * 100.0;
            let direction = if change > 0.0 {
                TrendDirection::Up
            } else if change < 0.0 {
                TrendDirection::Down
            } else {
                TrendDirection::Flat
            };
            (change, direction)
        };

        WeekComparison {
            available: true,
            current_cost,
            previous_cost,
            current_tokens,
            previous_tokens,
            change_percent,
            direction,
        }
    }

    /// Average daily cost over the most recent active days, extrapolated to
    /// a 30-day month. Zero with no daily history.
    pub fn projected_monthly_cost(&self) -> f64 {
        if self.daily.is_empty() {
            return 0.0;
        }
        let recent: Vec<f64> = self
            .daily
            .values()
            .rev()
            .take(PROJECTION_WINDOW_DAYS)
            .map(|bucket| bucket.cost)
            .collect();
        recent.iter().sum::<f64>() / recent.len() as f64 * 30.0
    }

    /// Cost above which a session counts as anomalous: twice the mean cost
    /// of sessions with a positive cost. Zero when no session cost anything.
    pub fn anomaly_threshold(&self) -> f64 {
        let costs: Vec<f64> = self
            .sessions
            .iter()
            .map(|s| s.cost)
            .filter(|c| *c > 0.0)
            .collect();
        if costs.is_empty() {
            return 0.0;
        }
        costs.iter().sum::<f64>() / costs.len() as f64 * ANOMALY_MULTIPLIER
    }

    /// Duration distribution over sessions that had timestamps.
    pub fn duration_stats(&self) -> DurationStats {
        if self.durations.is_empty() {
            return DurationStats::default();
        }

        let mut sorted = self.durations.clone();
        sorted.sort_unstable();

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        let median = if sorted.len() % 2 == 1 {
            sorted[sorted.len() / 2] as f64
        } else {
            (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) as f64 / 2.0
        };

        let mut buckets = DurationStats::empty_buckets();
        for minutes in &sorted {
            let index = match minutes {
                0..=4 => 0,
                5..=14 => 1,
                15..=29 => 2,
                30..=59 => 3,
                _ => 4,
            };
            buckets[index].1 += 1;
        }

        DurationStats {
            count: sorted.len() as u64,
            mean_minutes: mean,
            median_minutes: median,
            min_minutes: min,
            max_minutes: max,
            buckets,
        }
    }
}

/// Duration distribution summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: u64,
    pub mean_minutes: f64,
    pub median_minutes: f64,
    pub min_minutes: u64,
    pub max_minutes: u64,
    /// Bucket label → session count, fixed order
    pub buckets: Vec<(String, u64)>,
}

impl DurationStats {
    fn empty_buckets() -> Vec<(String, u64)> {
        ["<5", "5-15", "15-30", "30-60", ">=60"]
            .iter()
            .map(|label| (label.to_string(), 0))
            .collect()
    }
}

/// Rank a name→count map: count descending, name ascending on ties,
/// truncated to `limit`.
pub fn ranked_counts(map: &BTreeMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    // BTreeMap iteration is name-ascending, so a stable sort by count alone
    // preserves the tie-break.
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DelegateCall, DelegateKind};
    use chrono::{TimeZone, Utc};

    fn session(id: &str, input: u64, output: u64, cost: f64) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            project: "proj".to_string(),
            tokens: TokenTally {
                input,
                output,
                cache_read: 0,
                cache_creation: 0,
            },
            tools: ToolCallStats::default(),
            delegates: Vec::new(),
            edges: Vec::new(),
            turns: 1,
            user_messages: 1,
            first_ts: None,
            last_ts: None,
            duration_minutes: 0,
            active_hours: Default::default(),
            cost,
        }
    }

    fn dated(mut s: SessionSummary, date: &str) -> SessionSummary {
        let ts = format!("{date}T10:00:00Z").parse().unwrap();
        s.first_ts = Some(ts);
        s.last_ts = Some(ts);
        s.duration_minutes = 1;
        s.active_hours.insert(10);
        s
    }

    #[test]
    fn test_empty_sessions_are_dropped() {
        let mut agg = Aggregate::new();
        let mut empty = session("empty", 0, 0, 0.0);
        empty.tokens.cache_read = 9999;

        assert!(!agg.merge(empty));
        assert!(agg.merge(session("real", 10, 5, 0.01)));

        assert_eq!(agg.session_count, 1);
        assert_eq!(agg.dropped_sessions, 1);
        assert_eq!(agg.totals.input, 10);
        assert!(agg.projects["proj"].sessions.len() == 1);
    }

    #[test]
    fn test_daily_buckets_sum_to_totals() {
        let mut agg = Aggregate::new();
        agg.merge(dated(session("a", 100, 50, 1.0), "2025-06-02"));
        agg.merge(dated(session("b", 200, 25, 2.0), "2025-06-02"));
        agg.merge(dated(session("c", 300, 10, 3.0), "2025-06-03"));

        let daily_tokens: u64 = agg.daily.values().map(|b| b.tokens.total()).sum();
        assert_eq!(daily_tokens, agg.totals.total());

        let june2 = &agg.daily[&NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()];
        assert_eq!(june2.sessions, 2);
        assert!((june2.cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekday_buckets_are_monday_first() {
        let mut agg = Aggregate::new();
        // 2025-06-02 is a Monday
        agg.merge(dated(session("a", 100, 50, 1.0), "2025-06-02"));
        agg.merge(dated(session("b", 100, 50, 1.0), "2025-06-08"));

        assert_eq!(agg.weekdays[0].sessions, 1);
        assert_eq!(agg.weekdays[6].sessions, 1);
    }

    #[test]
    fn test_hourly_bucket_uses_first_timestamp() {
        let mut agg = Aggregate::new();
        let mut s = session("a", 100, 50, 1.0);
        s.first_ts = Some(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap());
        s.last_ts = Some(Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap());
        s.active_hours.extend([9, 11]);
        agg.merge(s);

        assert_eq!(agg.hourly[9].sessions, 1);
        assert_eq!(agg.hourly[11].sessions, 0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let mut agg = Aggregate::new();
        assert_eq!(agg.cache_hit_rate(), 0.0);

        let mut s = session("a", 300, 50, 1.0);
        s.tokens.cache_read = 700;
        agg.merge(s);
        assert!((agg.cache_hit_rate() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_week_comparison_needs_fourteen_days() {
        let mut agg = Aggregate::new();
        for day in 1..=13 {
            agg.merge(dated(
                session(&format!("s{day}"), 100, 50, 1.0),
                &format!("2025-06-{day:02}"),
            ));
        }
        let comparison = agg.week_comparison();
        assert!(!comparison.available);
        assert_eq!(comparison.direction, TrendDirection::Flat);
        assert_eq!(comparison.change_percent, 0.0);
    }

    #[test]
    fn test_week_comparison_rising() {
        let mut agg = Aggregate::new();
        for day in 1..=7 {
            agg.merge(dated(
                session(&format!("p{day}"), 100, 50, 1.0),
                &format!("2025-06-{day:02}"),
            ));
        }
        for day in 8..=14 {
            agg.merge(dated(
                session(&format!("c{day}"), 100, 50, 2.0),
                &format!("2025-06-{day:02}"),
            ));
        }

        let comparison = agg.week_comparison();
        assert!(comparison.available);
        assert!((comparison.previous_cost - 7.0).abs() < 1e-9);
        assert!((comparison.current_cost - 14.0).abs() < 1e-9);
        assert!((comparison.change_percent - 100.0).abs() < 1e-9);
        assert_eq!(comparison.direction, TrendDirection::Up);
    }

    #[test]
    fn test_anomaly_threshold_is_twice_the_mean() {
        let mut agg = Aggregate::new();
        agg.merge(session("a", 10, 5, 1.0));
        agg.merge(session("b", 10, 5, 1.0));
        agg.merge(session("c", 10, 5, 4.02));

        // mean = 2.006..., threshold = 4.013...
        let threshold = agg.anomaly_threshold();
        assert!((threshold - 4.0133333333).abs() < 1e-6);
        // Exactly-at-threshold is not anomalous; strictly above is.
        assert!(4.02 > threshold);
        assert!(1.0 < threshold);
    }

    #[test]
    fn test_subagent_samples_capped_and_deduplicated() {
        let mut agg = Aggregate::new();
        for i in 0..(MAX_SUBAGENT_SAMPLES + 5) {
            let mut s = session(&format!("s{i}"), 10, 5, 0.01);
            s.delegates.push(DelegateCall {
                kind: DelegateKind::Subagent,
                target: "explorer".to_string(),
                function: None,
                description: format!("task {}", i.min(2)), // only 3 distinct
                prompt: String::new(),
            });
            agg.merge(s);
        }

        let usage = &agg.subagents["explorer"];
        assert_eq!(usage.calls as usize, MAX_SUBAGENT_SAMPLES + 5);
        assert_eq!(usage.samples.len(), 3);
    }

    #[test]
    fn test_duration_stats_and_buckets() {
        let mut agg = Aggregate::new();
        for (i, minutes) in [2u64, 10, 20, 45, 90].iter().enumerate() {
            let mut s = session(&format!("s{i}"), 10, 5, 0.01);
            s.duration_minutes = *minutes;
            agg.merge(s);
        }

        let stats = agg.duration_stats();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min_minutes, 2);
        assert_eq!(stats.max_minutes, 90);
        assert_eq!(stats.median_minutes, 20.0);
        for (label, count) in &stats.buckets {
            assert_eq!(*count, 1, "bucket {label} should hold one session");
        }
    }

    #[test]
    fn test_ranked_counts_ties_break_by_name() {
        let mut map = BTreeMap::new();
        map.insert("Write".to_string(), 5);
        map.insert("Bash".to_string(), 5);
        map.insert("Read".to_string(), 9);
        map.insert("Edit".to_string(), 1);

        let ranked = ranked_counts(&map, 3);
        assert_eq!(
            ranked,
            vec![
                ("Read".to_string(), 9),
                ("Bash".to_string(), 5),
                ("Write".to_string(), 5),
            ]
        );
    }
}
