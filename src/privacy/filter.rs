/// Case-insensitive `*` glob patterns for commands that must never be stored.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<String>,
}

impl IgnoreList {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The first pattern matching `command`, if any.
    pub fn matching(&self, command: &str) -> Option<&str> {
        let text = command.trim().to_uppercase();
        self.patterns
            .iter()
            .find(|p| glob_match(&text, p))
            .map(String::as_str)
    }

    #[cfg(test)]
    pub fn is_ignored(&self, command: &str) -> bool {
        self.matching(command).is_some()
    }
}

/// `*` matches any run of characters, everything else matches literally.
fn glob_match(text: &str, pattern: &str) -> bool {
    let mut pieces = pattern.split('*');
    let Some(head) = pieces.next() else {
        return text.is_empty();
    };
    let rest: Vec<&str> = pieces.collect();
    let Some((tail, middle)) = rest.split_last() else {
        return text == pattern;
    };

    if !text.starts_with(head) {
        return false;
    }
    let mut remaining = &text[head.len()..];
    for piece in middle.iter().filter(|p| !p.is_empty()) {
        match remaining.find(piece) {
            Some(idx) => remaining = &remaining[idx + piece.len()..],
            None => return false,
        }
    }
    remaining.len() >= tail.len() && remaining.ends_with(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(patterns: &[&str]) -> IgnoreList {
        IgnoreList::new(&patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_exact_match() {
        assert!(list(&["export SECRET_KEY=abc"]).is_ignored("export SECRET_KEY=abc"));
        assert!(!list(&["export SECRET_KEY=abc"]).is_ignored("export SECRET_KEY=abcd"));
    }

    #[test]
    fn test_wildcard_match() {
        let l = list(&["export *SECRET*"]);
        assert!(l.is_ignored("export AWS_SECRET_KEY=xyz"));
        assert_eq!(l.matching("export AWS_SECRET_KEY=xyz"), Some("EXPORT *SECRET*"));
    }

    #[test]
    fn test_no_match() {
        assert!(!list(&["export *SECRET*"]).is_ignored("git status"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(list(&["export *KEY*"]).is_ignored("EXPORT my_key=123"));
    }

    #[test]
    fn test_anchored_ends() {
        let l = list(&["*AWS_SECRET*"]);
        assert!(l.is_ignored("AWS_SECRET_ACCESS_KEY=1 aws s3 ls"));
        // prefix and suffix may not overlap
        assert!(!list(&["ab*ba"]).is_ignored("aba"));
        assert!(list(&["ab*ba"]).is_ignored("abba"));
    }

    #[test]
    fn test_blank_patterns_are_ignored() {
        assert!(!list(&["", "   "]).is_ignored("ls"));
    }
}
