/// Prefixes that mark a command as internal: our own invocations and shell sourcing.
pub const INTERNAL_PREFIXES: [&str; 3] = ["repty ", "source ", ". "];

/// Returns true when a command must never show up in results.
///
/// The same predicate is registered as the `repty_internal` SQL function, so the
/// text index, the tag matcher and the in-memory pipeline all agree.
pub fn is_internal_command(command: &str) -> bool {
    let trimmed = command.trim();
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}
