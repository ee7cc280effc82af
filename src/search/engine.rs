use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::settings::Config;
use crate::db::models::Entry;
use crate::db::schema::Store;
use crate::llm::ranker::{
    action_tokens, filter_by_action_tokens, parse_ranking, select_ranked, RankRequest,
    RankingClient, RankingFailure,
};

use super::merge::{drop_internal, merge_candidates};
use super::normalize::normalize_query;
use super::query::{build_match_expression, MatchMode};
use super::rank::rank_local;

/// One entry in a result list, with the collaborator's explanation when the
/// list came from AI ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry: Entry,
    pub score: Option<f64>,
    pub reason: Option<String>,
}

impl SearchHit {
    pub fn local(entry: Entry) -> Self {
        Self {
            entry,
            score: None,
            reason: None,
        }
    }
}

/// Which path produced a result list.
#[derive(Debug, Clone, PartialEq)]
pub enum RankSource {
    Local,
    Ai,
    /// AI ranking failed; the list is the local ranking of the same candidates.
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub source: RankSource,
}

/// Candidates gathered for one AI query, already merged, filtered and
/// locally ranked.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub tokens: Vec<String>,
    pub candidates: Vec<Entry>,
}

/// Retrieval pipeline over one store handle and one configuration value.
pub struct SearchEngine<'a> {
    store: &'a Store,
    config: &'a Config,
    timeout: Duration,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self {
            store,
            config,
            timeout: Duration::from_secs(config.ai.timeout_secs),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Local search: strict prefix match on the raw terms plus tag matches,
    /// merged and ranked deterministically.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let tokens = normalize_query(query);
        let tag_rows = self
            .store
            .search_by_tags(&tokens, limit)
            .context("Tag search failed")?;

        let fts_limit = limit
            .saturating_mul(3)
            .max(self.config.search.fts_candidate_floor);
        let fts_rows = match build_match_expression(query, MatchMode::All, true) {
            Some(expr) => self
                .store
                .search_fts(&expr, fts_limit)
                .context("Full-text search failed")?,
            None => Vec::new(),
        };
        debug!(query, tag_rows = tag_rows.len(), fts_rows = fts_rows.len(), "local search");

        let candidates = drop_internal(merge_candidates(tag_rows, fts_rows));
        Ok(rank_local(candidates, &tokens)
            .into_iter()
            .take(limit)
            .map(SearchHit::local)
            .collect())
    }

    /// Gather the candidate set for AI ranking.
    ///
    /// Uses the normalized tokens (or the raw query when none survive), first
    /// with AND, relaxing to OR when AND finds nothing. There is no recency
    /// fallback: no text or tag match means no candidates.
    pub fn ai_candidates(&self, query: &str, limit: usize) -> Result<CandidateSet> {
        let tokens = normalize_query(query);
        let cleaned = tokens.join(" ");
        let terms = if cleaned.is_empty() { query } else { cleaned.as_str() };

        let max = self.config.ai.max_candidates.max(1);
        let fts_limit = limit.saturating_mul(3).min(max);
        let tag_limit = limit.saturating_mul(2).min(max);

        let mut fts_rows = match build_match_expression(terms, MatchMode::All, true) {
            Some(expr) => self.store.search_fts(&expr, fts_limit)?,
            None => Vec::new(),
        };
        if fts_rows.is_empty() {
            if let Some(expr) = build_match_expression(terms, MatchMode::Any, true) {
                info!(query, "no AND matches, relaxing to OR");
                fts_rows = self.store.search_fts(&expr, fts_limit)?;
            }
        }
        let tag_rows = self.store.search_by_tags(&tokens, tag_limit)?;
        debug!(query, tag_rows = tag_rows.len(), fts_rows = fts_rows.len(), "ai candidates");

        let candidates = rank_local(drop_internal(merge_candidates(tag_rows, fts_rows)), &tokens);
        Ok(CandidateSet { tokens, candidates })
    }

    /// AI-ranked search. Any collaborator failure falls back to the local
    /// ranking of the same candidate set.
    pub async fn ai_search(
        &self,
        query: &str,
        limit: usize,
        client: &dyn RankingClient,
    ) -> Result<SearchOutcome> {
        let set = self.ai_candidates(query, limit)?;
        if set.candidates.is_empty() {
            return Ok(SearchOutcome {
                hits: Vec::new(),
                source: RankSource::Local,
            });
        }

        let actions = action_tokens(&set.tokens);
        let mut submitted = match filter_by_action_tokens(&set.candidates, &actions) {
            Some(narrowed) => narrowed,
            None => {
                if !actions.is_empty() {
                    debug!(?actions, "action-token filter would drop everything, skipping");
                }
                set.candidates.clone()
            }
        };
        submitted.truncate(self.config.ai.max_candidates.max(1));

        let request = RankRequest::new(query, &submitted, actions);
        let ranked = match tokio::time::timeout(self.timeout, client.rank(&request)).await {
            Ok(reply) => reply.and_then(|text| parse_ranking(&text)),
            Err(_) => Err(RankingFailure::Timeout(self.timeout)),
        };

        match ranked {
            Ok(items) => Ok(SearchOutcome {
                hits: select_ranked(items, &submitted, self.config.ai.min_score, limit),
                source: RankSource::Ai,
            }),
            Err(failure) => {
                warn!(error = %failure, "AI ranking failed, using local ranking");
                Ok(SearchOutcome {
                    hits: set
                        .candidates
                        .into_iter()
                        .take(limit)
                        .map(SearchHit::local)
                        .collect(),
                    source: RankSource::Fallback {
                        reason: failure.to_string(),
                    },
                })
            }
        }
    }

    /// Most recent commands, one row per command text, without our own
    /// invocations.
    pub fn recent(&self, limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self
            .store
            .recent_distinct(limit)?
            .into_iter()
            .map(SearchHit::local)
            .collect())
    }
}
