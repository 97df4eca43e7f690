//! Core domain types for tokenscope
//!
//! These types represent the canonical data model that the extractor and
//! aggregator operate on.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One reconstructed conversation; exactly one input file |
//! | **Project** | The encoded directory under `projects/` a session's file lives in |
//! | **Delegate call** | An invocation of a namespaced (MCP-style) tool or a `Task` sub-agent spawn |
//! | **Sequence edge** | An ordered pair recording that one tool invocation immediately followed another |
//! | **Cache read / cache creation** | Token categories billed at a discount / premium relative to input |
//!
//! A [`SessionSummary`] is mutable only while its file is being scanned; once
//! the extractor finishes, it is frozen and treated as read-only everywhere
//! downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================
// Token accounting
// ============================================

/// Token counts for one session or one rollup bucket.
///
/// Accumulated by addition only; never decremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTally {
    /// Input tokens (includes cache reads; the cost model subtracts them)
    pub input: u64,
    /// Output tokens
    pub output: u64,
    /// Tokens served from the prompt cache
    pub cache_read: u64,
    /// Tokens written into the prompt cache
    pub cache_creation: u64,
}

impl TokenTally {
    /// Conversation volume: input + output, excluding cache traffic.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }

    /// Fold another tally into this one.
    pub fn add(&mut self, other: &TokenTally) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_creation += other.cache_creation;
    }

    /// True when the session carried no conversation tokens at all.
    ///
    /// Sessions for which this holds are excluded from every rollup
    /// (the drop-empty invariant). Cache-only traffic does not count.
    pub fn is_empty(&self) -> bool {
        self.input == 0 && self.output == 0
    }
}

// ============================================
// Tool bookkeeping
// ============================================

/// Per-tool call, error and consecutive-retry counts.
///
/// Backed by `BTreeMap` so iteration order (and therefore every ranked list
/// built from these maps) is deterministic: ties rank by name ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStats {
    /// Tool name → invocation count
    pub calls: BTreeMap<String, u64>,
    /// Tool name → error-result count (only id-correlated errors)
    pub errors: BTreeMap<String, u64>,
    /// Tool name → count of invocations that immediately repeated the
    /// previous invocation of the same tool
    pub retries: BTreeMap<String, u64>,
    /// Error results whose call id was never seen in this scan
    pub unattributed_errors: u64,
}

impl ToolCallStats {
    /// Record one invocation of `name`.
    pub fn record_call(&mut self, name: &str) {
        *self.calls.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Record one error result. When the correlating call was seen, the
    /// error is also attributed to that tool; otherwise it only counts
    /// toward the generic total.
    pub fn record_error(&mut self, name: Option<&str>) {
        match name {
            Some(name) => *self.errors.entry(name.to_string()).or_insert(0) += 1,
            None => self.unattributed_errors += 1,
        }
    }

    /// Record one back-to-back repeat of `name`.
    pub fn record_retry(&mut self, name: &str) {
        *self.retries.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Total invocations across all tools.
    pub fn total_calls(&self) -> u64 {
        self.calls.values().sum()
    }

    /// Total error results, attributed or not.
    pub fn total_errors(&self) -> u64 {
        self.errors.values().sum::<u64>() + self.unattributed_errors
    }

    /// Fold another stats block into this one.
    pub fn merge(&mut self, other: &ToolCallStats) {
        for (name, count) in &other.calls {
            *self.calls.entry(name.clone()).or_insert(0) += count;
        }
        for (name, count) in &other.errors {
            *self.errors.entry(name.clone()).or_insert(0) += count;
        }
        for (name, count) in &other.retries {
            *self.retries.entry(name.clone()).or_insert(0) += count;
        }
        self.unattributed_errors += other.unattributed_errors;
    }
}

// ============================================
// Delegates
// ============================================

/// What kind of external capability a delegate call invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegateKind {
    /// Namespaced MCP-style tool (`mcp__server__function`)
    McpServer,
    /// `Task` tool spawning a sub-agent
    Subagent,
}

/// One invocation of a namespaced tool or a sub-agent spawn.
///
/// `description` and `prompt` are length-truncated at capture time; the
/// truncation is lossy and intentional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateCall {
    /// Server or sub-agent kind
    pub kind: DelegateKind,
    /// MCP server name, or declared sub-agent type for `Task` spawns
    pub target: String,
    /// Function within the server, when the tool name carried one
    pub function: Option<String>,
    /// Truncated task description (sub-agent spawns only)
    pub description: String,
    /// Truncated task prompt (sub-agent spawns only)
    pub prompt: String,
}

// ============================================
// Session summary
// ============================================

/// Everything extracted from one session file.
///
/// Built incrementally by the extractor, frozen when the file's event
/// sequence is exhausted. `cost` is computed exactly once at finalization,
/// from the run's default pricing tier, rounded to 4 decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier; first non-null `sessionId` seen wins
    pub id: String,
    /// Opaque project identifier derived from the file's location
    pub project: String,
    /// Token totals across all events, regardless of role
    pub tokens: TokenTally,
    /// Per-tool call/error/retry bookkeeping
    pub tools: ToolCallStats,
    /// Delegate calls in file order
    pub delegates: Vec<DelegateCall>,
    /// Sequence edges (`"A -> B"`, simplified names), file-scoped
    pub edges: Vec<String>,
    /// Assistant messages
    pub turns: u64,
    /// User messages
    pub user_messages: u64,
    /// First valid timestamp observed
    pub first_ts: Option<DateTime<Utc>>,
    /// Last valid timestamp observed
    pub last_ts: Option<DateTime<Utc>>,
    /// Whole minutes between first and last timestamp; at least 1 when any
    /// timestamp is present, 0 when none are
    pub duration_minutes: u64,
    /// Hours of day (0-23) with at least one timestamped event
    pub active_hours: BTreeSet<u8>,
    /// Session cost at the default pricing tier, rounded to 4 dp
    pub cost: f64,
}

impl SessionSummary {
    /// True when the session carries no input and no output tokens.
    /// Such sessions are dropped from every rollup.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of `Task` sub-agent spawns.
    pub fn task_spawns(&self) -> u64 {
        self.delegates
            .iter()
            .filter(|d| d.kind == DelegateKind::Subagent)
            .count() as u64
    }

    /// Calls to read/search/glob-style tools.
    pub fn read_style_calls(&self) -> u64 {
        const READ_STYLE_TOOLS: [&str; 4] = ["Read", "Grep", "Glob", "LS"];
        READ_STYLE_TOOLS
            .iter()
            .filter_map(|name| self.tools.calls.get(*name))
            .sum()
    }
}
