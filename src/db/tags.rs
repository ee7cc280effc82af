use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub const FAVORITE_TAG: &str = "favorite";
pub const DESC_PREFIX: &str = "desc:";

static INLINE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#tag\s+([A-Za-z0-9_\-:./]+)").expect("static regex"));

/// Unordered set of labels attached to a command entry.
///
/// Persisted as a sorted, comma-joined string, or NULL when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the stored column value. Blank members are ignored.
    pub fn parse(stored: Option<&str>) -> Self {
        let mut set = Self::new();
        if let Some(s) = stored {
            for part in s.split(',') {
                set.insert(part);
            }
        }
        set
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for label in labels {
            set.insert(label.as_ref());
        }
        set
    }

    /// Add a label. Returns false if it was already present or blank.
    /// Commas would break the stored form, so they become spaces.
    pub fn insert(&mut self, label: &str) -> bool {
        let cleaned = label.replace(',', " ");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return false;
        }
        self.0.insert(cleaned.to_string())
    }

    /// Remove every label equal to `label` ignoring case.
    pub fn remove_ignore_case(&mut self, label: &str) -> bool {
        let needle = label.trim().to_lowercase();
        let before = self.0.len();
        self.0.retain(|t| t.to_lowercase() != needle);
        self.0.len() != before
    }

    pub fn extend(&mut self, other: &TagSet) {
        for t in &other.0 {
            self.0.insert(t.clone());
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_favorite(&self) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(FAVORITE_TAG))
    }

    /// Lowercased labels used for matching, with each `desc:` payload
    /// appended as a part of its own.
    pub fn match_parts(&self) -> Vec<String> {
        let mut parts = Vec::with_capacity(self.0.len());
        for tag in &self.0 {
            let lower = tag.to_lowercase();
            if let Some(payload) = lower.strip_prefix(DESC_PREFIX) {
                let payload = payload.trim().to_string();
                parts.push(lower.clone());
                if !payload.is_empty() {
                    parts.push(payload);
                }
            } else {
                parts.push(lower);
            }
        }
        parts
    }

    /// Stored form: sorted and comma-joined, `None` when empty.
    pub fn to_stored(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.iter().cloned().collect::<Vec<_>>().join(","))
        }
    }
}

/// Extract `#tag <label>` markers embedded in a command line.
pub fn parse_inline_tags(command: &str) -> Vec<String> {
    INLINE_TAG_RE
        .captures_iter(command)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Substring match in either direction between query tokens and tag parts.
pub fn tokens_match_parts(tokens: &[String], parts: &[String]) -> bool {
    tokens.iter().any(|token| {
        parts
            .iter()
            .any(|part| part.contains(token.as_str()) || token.contains(part.as_str()))
    })
}
