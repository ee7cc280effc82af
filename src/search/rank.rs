use crate::db::models::Entry;
use crate::db::tags::tokens_match_parts;

/// Local relevance key. Derived `Ord` compares lexicographically, so a tag
/// match always beats no match and a matched favorite beats a plain match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalScore {
    pub tag_match: bool,
    pub favorite_match: bool,
}

pub fn local_score(entry: &Entry, tokens: &[String]) -> LocalScore {
    let tag_match = !tokens.is_empty() && tokens_match_parts(tokens, &entry.tags.match_parts());
    LocalScore {
        tag_match,
        favorite_match: tag_match && entry.tags.is_favorite(),
    }
}

/// Deterministic ranking used on its own and as the fallback for AI search.
/// The sort is stable: equal scores keep their incoming order.
pub fn rank_local(mut candidates: Vec<Entry>, tokens: &[String]) -> Vec<Entry> {
    candidates.sort_by_cached_key(|e| std::cmp::Reverse(local_score(e, tokens)));
    candidates
}
