//! Session extraction
//!
//! Consumes one file's decoded event sequence and produces one frozen
//! [`SessionSummary`]. One input file is exactly one session; no
//! cross-file continuation is attempted.
//!
//! # Error Handling
//!
//! Nothing in this module is fatal. Every malformed sub-structure degrades
//! to "ignore this field/event":
//!
//! - **Unrecognized record shapes**: the event is skipped.
//! - **Malformed content blocks**: skipped individually; the surrounding
//!   blocks in the same message still count.
//! - **Missing fields**: defaulted via `#[serde(default)]`; absence is a
//!   valid state, not an error.
//! - **Unparsable timestamps**: ignored for time-span and hour bucketing
//!   only; the rest of the event is still processed.
//! - **Uncorrelated error results**: counted toward the generic error
//!   total only.

use crate::cost::{self, PricingTier};
use crate::types::{DelegateCall, DelegateKind, SessionSummary, TokenTally, ToolCallStats};
use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

/// Reserved tool name that spawns a sub-agent.
pub const TASK_TOOL: &str = "Task";
/// Separator marking a namespaced (MCP-style) tool name.
const NAMESPACE_SEPARATOR: &str = "__";
/// Collapsed token used for namespaced tools in sequence edges.
const COLLAPSED_DELEGATE_NAME: &str = "MCP";

/// Delegate descriptions are cut at this many characters when captured.
pub const DESCRIPTION_MAX_CHARS: usize = 120;
/// Delegate prompts are cut at this many characters when captured.
pub const PROMPT_MAX_CHARS: usize = 240;

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// One decoded log line. Uses `#[serde(default)]` liberally so missing
/// fields never fail deserialization.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    session_id: Option<String>,
    timestamp: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    // Items are decoded one by one so a malformed block only loses itself
    Blocks(Vec<serde_json::Value>),
    // Anything else (numbers, objects)
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
    },
    Text {
        #[serde(default)]
        #[allow(dead_code)]
        text: String,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_creation: Option<RawCacheCreation>,
}

/// Nested cache-creation block with per-TTL granularities. These add to
/// `cache_creation` on top of the flat field.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawCacheCreation {
    ephemeral_5m_input_tokens: Option<u64>,
    ephemeral_1h_input_tokens: Option<u64>,
}

// ============================================
// Extractor
// ============================================

/// Folds one file's decoded events into a [`SessionSummary`].
pub struct SessionExtractor {
    project: String,
    tier: PricingTier,

    id: Option<String>,
    tokens: TokenTally,
    tools: ToolCallStats,
    delegates: Vec<DelegateCall>,
    edges: Vec<String>,
    turns: u64,
    user_messages: u64,
    first_ts: Option<DateTime<Utc>>,
    last_ts: Option<DateTime<Utc>>,
    active_hours: BTreeSet<u8>,

    // tool_use_id → tool name, for best-effort error correlation
    call_ids: HashMap<String, String>,
    // Raw name of the previous tool invocation (retry + edge tracking)
    last_tool: Option<String>,
}

impl SessionExtractor {
    /// Create an extractor for one file. `project` is the opaque project
    /// identifier derived from the file's location; `tier` prices the
    /// session cost at finalization.
    pub fn new(project: impl Into<String>, tier: &PricingTier) -> Self {
        Self {
            project: project.into(),
            tier: tier.clone(),
            id: None,
            tokens: TokenTally::default(),
            tools: ToolCallStats::default(),
            delegates: Vec::new(),
            edges: Vec::new(),
            turns: 0,
            user_messages: 0,
            first_ts: None,
            last_ts: None,
            active_hours: BTreeSet::new(),
            call_ids: HashMap::new(),
            last_tool: None,
        }
    }

    /// Process one decoded event. Events that do not deserialize into the
    /// expected shape are ignored.
    pub fn push(&mut self, event: serde_json::Value) {
        let record: RawRecord = match serde_json::from_value(event) {
            Ok(record) => record,
            Err(e) => {
                tracing::trace!(error = %e, "skipping event with unexpected shape");
                return;
            }
        };

        // Session id: first non-null value wins, later ids are ignored.
        if self.id.is_none() {
            self.id = record.session_id;
        }

        if let Some(ts) = record.timestamp.as_deref().and_then(parse_timestamp) {
            if self.first_ts.is_none() {
                self.first_ts = Some(ts);
            }
            self.last_ts = Some(ts);
            self.active_hours.insert(ts.hour() as u8);
        }

        let Some(message) = record.message else {
            return;
        };

        match message.role.as_deref() {
            Some("assistant") => self.turns += 1,
            Some("user") => self.user_messages += 1,
            _ => {}
        }

        // Token accounting applies regardless of role.
        if let Some(usage) = &message.usage {
            self.tokens.add(&usage_tally(usage));
        }

        if let Some(RawContent::Blocks(items)) = message.content {
            for item in items {
                let block: ContentBlock = match serde_json::from_value(item) {
                    Ok(block) => block,
                    Err(e) => {
                        tracing::trace!(error = %e, "skipping malformed content block");
                        continue;
                    }
                };
                match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        self.record_tool_use(&id, &name, &input);
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                    } => {
                        if is_error {
                            let name = self.call_ids.get(&tool_use_id).cloned();
                            self.tools.record_error(name.as_deref());
                        }
                    }
                    ContentBlock::Text { .. } | ContentBlock::Unknown => {}
                }
            }
        }
    }

    fn record_tool_use(&mut self, id: &str, name: &str, input: &serde_json::Value) {
        let name = if name.is_empty() { "unknown" } else { name };
        self.tools.record_call(name);

        if !id.is_empty() {
            self.call_ids.insert(id.to_string(), name.to_string());
        }

        if let Some(previous) = &self.last_tool {
            // Retry detection is adjacency-only and uses raw names.
            if previous == name {
                self.tools.record_retry(name);
            }
            self.edges
                .push(format!("{} -> {}", simplify(previous), simplify(name)));
        }
        self.last_tool = Some(name.to_string());

        if name == TASK_TOOL {
            self.delegates.push(subagent_call(input));
        } else if let Some((server, function)) = parse_namespaced(name) {
            self.delegates.push(DelegateCall {
                kind: DelegateKind::McpServer,
                target: server,
                function,
                description: String::new(),
                prompt: String::new(),
            });
        }
    }

    /// Freeze the session. After this point the summary is read-only and
    /// its cost has been computed exactly once.
    pub fn finish(self) -> SessionSummary {
        let duration_minutes = match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) => {
                let minutes = last.signed_duration_since(first).num_minutes();
                minutes.max(1) as u64
            }
            _ => 0,
        };

        let cost = cost::round4(cost::cost(&self.tokens, &self.tier));

        SessionSummary {
            id: self.id.unwrap_or_else(|| "unknown".to_string()),
            project: self.project,
            tokens: self.tokens,
            tools: self.tools,
            delegates: self.delegates,
            edges: self.edges,
            turns: self.turns,
            user_messages: self.user_messages,
            first_ts: self.first_ts,
            last_ts: self.last_ts,
            duration_minutes,
            active_hours: self.active_hours,
            cost,
        }
    }
}

/// Run a full extraction pass over one file's decoded events.
pub fn extract_session(
    project: &str,
    tier: &PricingTier,
    events: impl IntoIterator<Item = serde_json::Value>,
) -> SessionSummary {
    let mut extractor = SessionExtractor::new(project, tier);
    for event in events {
        extractor.push(event);
    }
    extractor.finish()
}

/// Parse an ISO-8601 timestamp, tolerating a trailing literal `Z`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Sum a usage block into a tally. Absent fields default to zero; the
/// nested cache-creation granularities add on top of the flat field.
fn usage_tally(usage: &RawUsage) -> TokenTally {
    let mut cache_creation = usage.cache_creation_input_tokens.unwrap_or(0);
    if let Some(nested) = &usage.cache_creation {
        cache_creation += nested.ephemeral_5m_input_tokens.unwrap_or(0);
        cache_creation += nested.ephemeral_1h_input_tokens.unwrap_or(0);
    }

    TokenTally {
        input: usage.input_tokens.unwrap_or(0),
        output: usage.output_tokens.unwrap_or(0),
        cache_read: usage.cache_read_input_tokens.unwrap_or(0),
        cache_creation,
    }
}

/// Split a namespaced tool name into server and optional function.
///
/// `mcp__linear__create_issue` → `("linear", Some("create_issue"))`;
/// a non-`mcp__` name containing the separator splits at its first
/// occurrence. Plain tool names return `None`.
pub fn parse_namespaced(name: &str) -> Option<(String, Option<String>)> {
    let rest = name.strip_prefix("mcp__").unwrap_or(name);
    if !name.contains(NAMESPACE_SEPARATOR) && rest == name {
        return None;
    }

    let (server, function) = match rest.split_once(NAMESPACE_SEPARATOR) {
        Some((server, function)) => (server, Some(function)),
        None => (rest, None),
    };

    if server.is_empty() {
        return None;
    }
    Some((
        server.to_string(),
        function.filter(|f| !f.is_empty()).map(str::to_string),
    ))
}

/// Collapse namespaced tool names to a single generic token for sequence
/// edges; plain names pass through unchanged.
fn simplify(name: &str) -> &str {
    if name.contains(NAMESPACE_SEPARATOR) {
        COLLAPSED_DELEGATE_NAME
    } else {
        name
    }
}

/// Build a sub-agent delegate call from a `Task` tool input.
fn subagent_call(input: &serde_json::Value) -> DelegateCall {
    let target = input
        .get("subagent_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let description = truncate_chars(
        input.get("description").and_then(|v| v.as_str()).unwrap_or(""),
        DESCRIPTION_MAX_CHARS,
    );
    let prompt = truncate_chars(
        input.get("prompt").and_then(|v| v.as_str()).unwrap_or(""),
        PROMPT_MAX_CHARS,
    );

    DelegateCall {
        kind: DelegateKind::Subagent,
        target,
        function: None,
        description,
        prompt,
    }
}

/// Truncate to at most `max` characters, on a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tier() -> PricingTier {
        PricingTier::new("sonnet", 3.0, 15.0)
    }

    fn assistant_event(content: serde_json::Value) -> serde_json::Value {
        json!({
            "sessionId": "sess-1",
            "timestamp": "2025-06-02T10:15:00Z",
            "message": { "role": "assistant", "content": content }
        })
    }

    fn tool_use(id: &str, name: &str) -> serde_json::Value {
        json!({ "type": "tool_use", "id": id, "name": name, "input": {} })
    }

    #[test]
    fn test_session_id_first_wins() {
        let events = vec![
            json!({ "timestamp": "2025-06-02T10:00:00Z" }),
            json!({ "sessionId": "first" }),
            json!({ "sessionId": "second" }),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.id, "first");
    }

    #[test]
    fn test_missing_session_id_defaults_to_unknown() {
        let summary = extract_session("proj", &tier(), vec![json!({})]);
        assert_eq!(summary.id, "unknown");
    }

    #[test]
    fn test_turn_and_user_message_counts() {
        let events = vec![
            json!({ "message": { "role": "user", "content": "hello" } }),
            json!({ "message": { "role": "assistant", "content": "hi" } }),
            json!({ "message": { "role": "assistant", "content": "more" } }),
            json!({ "message": { "role": "system" } }),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.user_messages, 1);
    }

    #[test]
    fn test_usage_accumulates_regardless_of_role() {
        let events = vec![
            json!({ "message": { "role": "assistant", "usage": {
                "input_tokens": 100, "output_tokens": 50,
                "cache_read_input_tokens": 10, "cache_creation_input_tokens": 5
            }}}),
            json!({ "message": { "role": "user", "usage": { "input_tokens": 7 } } }),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.tokens.input, 107);
        assert_eq!(summary.tokens.output, 50);
        assert_eq!(summary.tokens.cache_read, 10);
        assert_eq!(summary.tokens.cache_creation, 5);
    }

    #[test]
    fn test_nested_cache_creation_granularities() {
        let events = vec![json!({ "message": { "role": "assistant", "usage": {
            "cache_creation_input_tokens": 100,
            "cache_creation": {
                "ephemeral_5m_input_tokens": 30,
                "ephemeral_1h_input_tokens": 12
            }
        }}})];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.tokens.cache_creation, 142);
    }

    #[test]
    fn test_sequence_edges_adjacent_pairs_only() {
        let events = vec![assistant_event(json!([
            tool_use("1", "Read"),
            tool_use("2", "Edit"),
            tool_use("3", "Bash"),
        ]))];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.edges, vec!["Read -> Edit", "Edit -> Bash"]);
    }

    #[test]
    fn test_edges_span_events_within_one_file() {
        let events = vec![
            assistant_event(json!([tool_use("1", "Read")])),
            assistant_event(json!([tool_use("2", "Edit")])),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.edges, vec!["Read -> Edit"]);
    }

    #[test]
    fn test_edges_collapse_namespaced_names() {
        let events = vec![assistant_event(json!([
            tool_use("1", "mcp__linear__create_issue"),
            tool_use("2", "Read"),
        ]))];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.edges, vec!["MCP -> Read"]);
    }

    #[test]
    fn test_retry_requires_adjacency() {
        let events = vec![assistant_event(json!([
            tool_use("1", "Bash"),
            tool_use("2", "Bash"),
            tool_use("3", "Read"),
            tool_use("4", "Bash"),
        ]))];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.tools.retries.get("Bash"), Some(&1));
        assert_eq!(summary.tools.calls.get("Bash"), Some(&3));
    }

    #[test]
    fn test_error_correlation_by_call_id() {
        let events = vec![
            assistant_event(json!([tool_use("call-7", "Bash")])),
            json!({ "message": { "role": "user", "content": [
                { "type": "tool_result", "tool_use_id": "call-7", "is_error": true },
                { "type": "tool_result", "tool_use_id": "never-seen", "is_error": true },
                { "type": "tool_result", "tool_use_id": "call-7", "is_error": false },
            ]}}),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.tools.errors.get("Bash"), Some(&1));
        assert_eq!(summary.tools.unattributed_errors, 1);
        assert_eq!(summary.tools.total_errors(), 2);
    }

    #[test]
    fn test_subagent_capture_with_truncation() {
        let long_prompt = "p".repeat(PROMPT_MAX_CHARS + 50);
        let events = vec![assistant_event(json!([{
            "type": "tool_use", "id": "1", "name": "Task",
            "input": {
                "subagent_type": "explorer",
                "description": "map the repo",
                "prompt": long_prompt,
            }
        }]))];
        let summary = extract_session("proj", &tier(), events);

        assert_eq!(summary.delegates.len(), 1);
        let call = &summary.delegates[0];
        assert_eq!(call.kind, DelegateKind::Subagent);
        assert_eq!(call.target, "explorer");
        assert_eq!(call.description, "map the repo");
        assert_eq!(call.prompt.chars().count(), PROMPT_MAX_CHARS);
    }

    #[test]
    fn test_mcp_delegate_grouping() {
        let events = vec![assistant_event(json!([
            tool_use("1", "mcp__linear__create_issue"),
            tool_use("2", "mcp__linear"),
        ]))];
        let summary = extract_session("proj", &tier(), events);

        assert_eq!(summary.delegates.len(), 2);
        assert_eq!(summary.delegates[0].target, "linear");
        assert_eq!(
            summary.delegates[0].function.as_deref(),
            Some("create_issue")
        );
        assert_eq!(summary.delegates[1].function, None);
    }

    #[test]
    fn test_parse_namespaced() {
        assert_eq!(
            parse_namespaced("mcp__github__search_code"),
            Some(("github".to_string(), Some("search_code".to_string())))
        );
        assert_eq!(
            parse_namespaced("plugin__refresh"),
            Some(("plugin".to_string(), Some("refresh".to_string())))
        );
        assert_eq!(parse_namespaced("Bash"), None);
        assert_eq!(parse_namespaced("mcp__"), None);
    }

    #[test]
    fn test_timestamps_and_duration() {
        let events = vec![
            json!({ "timestamp": "2025-06-02T10:00:00Z" }),
            json!({ "timestamp": "not a timestamp" }),
            json!({ "timestamp": "2025-06-02T12:34:10+00:00" }),
        ];
        let summary = extract_session("proj", &tier(), events);

        assert!(summary.first_ts.is_some());
        // 2h34m10s floors to 154 whole minutes
        assert_eq!(summary.duration_minutes, 154);
        assert!(summary.active_hours.contains(&10));
        assert!(summary.active_hours.contains(&12));
        assert_eq!(summary.active_hours.len(), 2);
    }

    #[test]
    fn test_duration_floor_of_one_minute() {
        let events = vec![
            json!({ "timestamp": "2025-06-02T10:00:00Z" }),
            json!({ "timestamp": "2025-06-02T10:00:05Z" }),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.duration_minutes, 1);
    }

    #[test]
    fn test_no_timestamps_means_zero_duration() {
        let summary = extract_session("proj", &tier(), vec![json!({})]);
        assert_eq!(summary.duration_minutes, 0);
    }

    #[test]
    fn test_session_cost_rounded_to_four_places() {
        let events = vec![json!({ "message": { "usage": {
            "input_tokens": 123_456, "output_tokens": 7_890
        }}})];
        let summary = extract_session("proj", &tier(), events);

        // 123_456/1e6*3 + 7_890/1e6*15 = 0.370368 + 0.11835
        assert_eq!(summary.cost, 0.4887);
    }

    #[test]
    fn test_malformed_block_only_loses_itself() {
        let events = vec![assistant_event(json!([
            tool_use("1", "Read"),
            { "type": "tool_use", "id": "2", "name": 123 },
            tool_use("3", "Edit"),
        ]))];
        let summary = extract_session("proj", &tier(), events);

        assert_eq!(summary.tools.calls.get("Read"), Some(&1));
        assert_eq!(summary.tools.calls.get("Edit"), Some(&1));
        assert_eq!(summary.tools.total_calls(), 2);
        // The surviving blocks still form an edge with each other.
        assert_eq!(summary.edges, vec!["Read -> Edit"]);
    }

    #[test]
    fn test_malformed_events_are_ignored() {
        let events = vec![
            json!(42),
            json!("just a string"),
            json!({ "message": { "role": 17 } }),
            json!({ "message": { "role": "assistant", "content": "plain text" } }),
        ];
        let summary = extract_session("proj", &tier(), events);
        assert_eq!(summary.turns, 1);
    }
}
