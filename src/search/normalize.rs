use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "to", "in", "on", "with", "and", "or", "command", "commands",
    "please", "find", "show", "me", "file", "files",
];

/// Tokenize a natural-language query into lowercase match tokens.
///
/// Short words and stopwords are dropped. Each surviving word also contributes
/// cheap morphological variants (`building` -> `build`, `builde`; `containers`
/// -> `container`). Order follows first appearance; duplicates are removed.
pub fn normalize_query(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for m in WORD_RE.find_iter(&lowered) {
        let word = m.as_str();
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        for variant in variants(word) {
            if seen.insert(variant.clone()) {
                out.push(variant);
            }
        }
    }

    out
}

fn variants(word: &str) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    set.insert(word.to_string());

    let len = word.chars().count();
    if len >= 5 {
        if let Some(stem) = word.strip_suffix("ing") {
            set.insert(stem.to_string());
            set.insert(format!("{stem}e"));
        }
    }
    if len >= 4 {
        if let Some(singular) = word.strip_suffix('s') {
            set.insert(singular.to_string());
        }
    }

    set
}
