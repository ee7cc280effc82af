use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::settings::LlmConfig;
use crate::db::models::{CandidateContext, Entry};
use crate::llm::client::{call_llm, LlmError};
use crate::search::engine::SearchHit;
use crate::search::filter::is_internal_command;

/// Tool names too common in history to discriminate between candidates.
const GENERIC_TOOL_WORDS: &[&str] = &[
    "git", "bash", "zsh", "fish", "python", "pip", "pipx", "node", "npm", "pnpm", "yarn", "docker",
    "kubectl", "kube", "ssh", "curl", "wget",
];

const RANKING_INSTRUCTIONS: &str = "You are a CLI command retrieval assistant. You receive a JSON object with the user's \
natural language 'query' and a list of previously executed 'commands'. Identify the commands most relevant to the query. \
Prefer commands that likely succeeded (exit_code 0) and whose cwd or tags match the intent. \
You MUST choose only ids from the provided 'commands' list; never invent ids. \
If 'tokens' is non-empty, only select commands whose command string contains at least one of those tokens (case-insensitive). \
Favor favorites only when they are relevant to the query. \
Return a JSON array of objects with fields: id (integer), score (number from 0 to 10, 10 is best), reason (short string). \
Output the JSON array only: no prose, no prefixes or suffixes, no code fences.";

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)\s*```").expect("static regex"));

/// Why the external ranking step produced nothing usable. Every variant sends
/// the caller down the local ranking path.
#[derive(Debug, Error)]
pub enum RankingFailure {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("ranking timed out after {0:?}")]
    Timeout(Duration),
    #[error("ranking response did not contain a JSON array")]
    Malformed,
    #[error("ranking response was an empty list")]
    Empty,
}

/// Bounded context sent to the ranking collaborator.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankRequest {
    pub query: String,
    #[serde(rename = "commands")]
    pub candidates: Vec<CandidateContext>,
    #[serde(rename = "tokens")]
    pub action_tokens: Vec<String>,
}

impl RankRequest {
    pub fn new(query: &str, candidates: &[Entry], action_tokens: Vec<String>) -> Self {
        Self {
            query: query.to_string(),
            candidates: candidates.iter().map(CandidateContext::from).collect(),
            action_tokens,
        }
    }
}

/// One scored pick returned by the collaborator. Higher scores are better.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub id: i64,
    pub score: f64,
    pub reason: String,
}

#[async_trait]
pub trait RankingClient: Send + Sync {
    /// Return the collaborator's raw reply for `request`.
    async fn rank(&self, request: &RankRequest) -> Result<String, RankingFailure>;
}

/// Ranking collaborator backed by the configured LLM provider.
pub struct LlmRankingClient {
    config: LlmConfig,
}

impl LlmRankingClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RankingClient for LlmRankingClient {
    async fn rank(&self, request: &RankRequest) -> Result<String, RankingFailure> {
        let payload = serde_json::to_string(request).map_err(|_| RankingFailure::Malformed)?;
        Ok(call_llm(&self.config, RANKING_INSTRUCTIONS, &payload).await?)
    }
}

/// Query tokens that remain after removing generic tool names and short words.
pub fn action_tokens(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| t.chars().count() >= 4 && !GENERIC_TOOL_WORDS.contains(&t.as_str()))
        .cloned()
        .collect()
}

/// Keep candidates whose command contains an action token. When there are no
/// action tokens, or none of the candidates would survive, returns `None` and
/// the caller keeps the unfiltered set.
pub fn filter_by_action_tokens(candidates: &[Entry], actions: &[String]) -> Option<Vec<Entry>> {
    if actions.is_empty() {
        return None;
    }
    let kept: Vec<Entry> = candidates
        .iter()
        .filter(|e| {
            let command = e.command.to_lowercase();
            actions.iter().any(|t| command.contains(t.as_str()))
        })
        .cloned()
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}

/// Parse a collaborator reply into scored items.
///
/// Code fences are stripped, then the whole payload is tried as JSON, then the
/// outermost `[...]` span. Individual items missing an id or a numeric score
/// are skipped.
pub fn parse_ranking(text: &str) -> Result<Vec<RankedItem>, RankingFailure> {
    let unfenced = CODE_FENCE_RE.replace_all(text, "$1");
    let trimmed = unfenced.trim();

    let array = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        _ => extract_array(trimmed).ok_or(RankingFailure::Malformed)?,
    };

    if array.is_empty() {
        return Err(RankingFailure::Empty);
    }

    Ok(array.iter().filter_map(parse_item).collect())
}

fn extract_array(text: &str) -> Option<Vec<Value>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn parse_item(item: &Value) -> Option<RankedItem> {
    let obj = item.as_object()?;
    let id = match obj.get("id")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let score = match obj.get("score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(RankedItem { id, score, reason })
}

/// Turn parsed items into final hits against the submitted candidates.
///
/// Unknown ids and internal commands are dropped, then items below
/// `min_score`. One hit per command string survives (highest score, then
/// highest id). Output is sorted by score, then id, both descending.
pub fn select_ranked(
    items: Vec<RankedItem>,
    submitted: &[Entry],
    min_score: f64,
    limit: usize,
) -> Vec<SearchHit> {
    let by_id: HashMap<i64, &Entry> = submitted.iter().map(|e| (e.id, e)).collect();

    let mut best: HashMap<&str, (RankedItem, &Entry)> = HashMap::new();
    for item in items {
        let Some(&entry) = by_id.get(&item.id) else {
            continue;
        };
        if is_internal_command(&entry.command) || item.score < min_score {
            continue;
        }
        let replace = match best.get(entry.command.as_str()) {
            Some((prev, _)) => {
                item.score > prev.score || (item.score == prev.score && item.id > prev.id)
            }
            None => true,
        };
        if replace {
            best.insert(entry.command.as_str(), (item, entry));
        }
    }

    let mut picked: Vec<(RankedItem, &Entry)> = best.into_values().collect();
    picked.sort_by(|(a, _), (b, _)| b.score.total_cmp(&a.score).then(b.id.cmp(&a.id)));

    picked
        .into_iter()
        .take(limit)
        .map(|(item, entry)| SearchHit {
            entry: entry.clone(),
            score: Some(item.score),
            reason: Some(item.reason).filter(|r| !r.trim().is_empty()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tags::TagSet;

    fn e(id: i64, command: &str) -> Entry {
        Entry {
            id,
            command: command.to_string(),
            cwd: Some("/srv".to_string()),
            exit_code: Some(0),
            timestamp: 1_700_000_000_000 + id,
            tags: TagSet::from_labels(["ops"]),
        }
    }

    fn item(id: i64, score: f64) -> RankedItem {
        RankedItem {
            id,
            score,
            reason: format!("reason {id}"),
        }
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_action_tokens_drop_generic_and_short() {
        assert_eq!(
            action_tokens(&tokens(&["git", "docker", "rebase", "log", "prune"])),
            tokens(&["rebase", "prune"])
        );
        assert!(action_tokens(&tokens(&["git", "docker", "ssh"])).is_empty());
    }

    #[test]
    fn test_action_filter_narrows() {
        let candidates = vec![e(1, "git commit -m wip"), e(2, "git tag v1")];
        let kept = filter_by_action_tokens(&candidates, &tokens(&["commit"])).unwrap();
        assert_eq!(kept.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_action_filter_skipped_when_it_would_empty() {
        let candidates = vec![e(1, "git commit"), e(2, "git tag")];
        assert!(filter_by_action_tokens(&candidates, &tokens(&["release"])).is_none());
        assert!(filter_by_action_tokens(&candidates, &[]).is_none());
    }

    #[test]
    fn test_request_serializes_reduced_entries() {
        let request = RankRequest::new("restart nginx", &[e(3, "nginx -s reload")], tokens(&["restart"]));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "restart nginx");
        assert_eq!(json["tokens"][0], "restart");
        let cmd = &json["commands"][0];
        assert_eq!(cmd["id"], 3);
        assert_eq!(cmd["command"], "nginx -s reload");
        assert_eq!(cmd["cwd"], "/srv");
        assert_eq!(cmd["exit_code"], 0);
        assert_eq!(cmd["tags"][0], "ops");
        assert!(cmd["timestamp"].is_string());
    }

    #[test]
    fn test_parse_plain_array() {
        let items = parse_ranking(r#"[{"id": 4, "score": 8.5, "reason": "exact"}]"#).unwrap();
        assert_eq!(
            items,
            vec![RankedItem {
                id: 4,
                score: 8.5,
                reason: "exact".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_code_fenced() {
        let text = "```json\n[{\"id\": 1, \"score\": 7, \"reason\": \"r\"}]\n```";
        assert_eq!(parse_ranking(text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_array_inside_prose() {
        let text = "Sure! Here you go: [{\"id\": \"12\", \"score\": \"6.5\"}] Hope that helps.";
        let items = parse_ranking(text).unwrap();
        assert_eq!(items[0].id, 12);
        assert_eq!(items[0].score, 6.5);
        assert_eq!(items[0].reason, "");
    }

    #[test]
    fn test_parse_drops_bad_items_individually() {
        let text = r#"[
            {"id": 1, "score": 9},
            {"id": "x", "score": 9},
            {"id": 2, "score": "high"},
            {"score": 5},
            {"id": 3},
            "junk",
            {"id": 4.0, "score": 4}
        ]"#;
        let ids: Vec<i64> = parse_ranking(text).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_ranking("no json here"), Err(RankingFailure::Malformed)));
        assert!(matches!(parse_ranking("{\"id\": 1}"), Err(RankingFailure::Malformed)));
        assert!(matches!(parse_ranking("[]"), Err(RankingFailure::Empty)));
        assert!(matches!(parse_ranking("```json\n[]\n```"), Err(RankingFailure::Empty)));
    }

    #[test]
    fn test_select_drops_unknown_ids() {
        let hits = select_ranked(vec![item(999, 9.0)], &[e(1, "make")], 3.0, 10);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_select_applies_threshold() {
        let submitted = vec![e(1, "make"), e(2, "make test"), e(3, "make lint")];
        let hits = select_ranked(
            vec![item(1, 2.9), item(2, 3.0), item(3, 9.0)],
            &submitted,
            3.0,
            10,
        );
        let ids: Vec<i64> = hits.iter().map(|h| h.entry.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(hits.iter().all(|h| h.score.unwrap() >= 3.0));
    }

    #[test]
    fn test_select_dedups_by_command() {
        let submitted = vec![e(1, "make"), e(2, "make"), e(3, "make"), e(4, "ls")];
        let hits = select_ranked(
            vec![item(1, 8.0), item(2, 5.0), item(3, 8.0), item(4, 8.0)],
            &submitted,
            3.0,
            10,
        );
        let ids: Vec<i64> = hits.iter().map(|h| h.entry.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_select_sorts_and_limits() {
        let submitted = vec![e(1, "a1"), e(2, "b2"), e(3, "c3"), e(4, "d4")];
        let hits = select_ranked(
            vec![item(1, 5.0), item(2, 9.0), item(3, 5.0), item(4, 7.0)],
            &submitted,
            0.0,
            3,
        );
        let ids: Vec<i64> = hits.iter().map(|h| h.entry.id).collect();
        assert_eq!(ids, vec![2, 4, 3]);
        assert_eq!(hits[0].reason.as_deref(), Some("reason 2"));
    }

    #[test]
    fn test_select_skips_internal_commands() {
        let hits = select_ranked(vec![item(1, 9.0)], &[e(1, "repty ai deploy")], 0.0, 10);
        assert!(hits.is_empty());
    }
}
