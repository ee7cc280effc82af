/// How terms of an FTS5 match expression are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every term must match.
    All,
    /// Any term may match.
    Any,
}

impl MatchMode {
    fn joiner(self) -> &'static str {
        match self {
            MatchMode::All => " AND ",
            MatchMode::Any => " OR ",
        }
    }
}

/// Build an FTS5 MATCH expression from a whitespace separated query.
///
/// Each term is wrapped in a quoted string so user input can never inject FTS
/// operators (`AND`, `NEAR`, `-`, column filters). With `prefix` set, each term
/// gets a trailing `*`. Terms without any alphanumeric character are dropped
/// since the tokenizer would reduce them to an empty phrase.
///
/// Returns `None` when no usable term remains.
pub fn build_match_expression(raw: &str, mode: MatchMode, prefix: bool) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| {
            if prefix {
                format!("\"{term}\"*")
            } else {
                format!("\"{term}\"")
            }
        })
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(mode.joiner()))
    }
}
