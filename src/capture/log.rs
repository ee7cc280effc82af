use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::capture::state::{write_state, LastCommand};
use crate::config::settings::{Config, Paths};
use crate::db::models::NewEntry;
use crate::db::schema::Store;
use crate::db::tags::{parse_inline_tags, TagSet, DESC_PREFIX, FAVORITE_TAG};
use crate::privacy::filter::IgnoreList;
use crate::search::filter::is_internal_command;

/// What happened to one `repty log` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Stored(i64),
    SkippedEmpty,
    SkippedInternal,
    SkippedPrivate,
}

/// Arguments the shell hook passes for one finished command.
#[derive(Debug, Clone, Default)]
pub struct LogRequest {
    pub command: String,
    pub cwd: Option<String>,
    pub exit_code: Option<i32>,
    /// Comma separated labels from `--tags`.
    pub tags: Option<String>,
}

/// Build the entry for `request`, or say why it must not be stored.
///
/// Checks run on the trimmed text; the stored command is kept byte for byte.
pub fn prepare_entry(request: &LogRequest, ignore: &IgnoreList) -> Result<NewEntry, LogOutcome> {
    let command = request.command.trim();
    if command.is_empty() {
        return Err(LogOutcome::SkippedEmpty);
    }
    if is_internal_command(command) {
        return Err(LogOutcome::SkippedInternal);
    }
    if let Some(pattern) = ignore.matching(command) {
        debug!(pattern, "command matches ignore pattern");
        return Err(LogOutcome::SkippedPrivate);
    }

    let mut tags = TagSet::from_labels(parse_inline_tags(command));
    if let Some(extra) = request.tags.as_deref() {
        tags.extend(&TagSet::from_labels(extra.split(',')));
    }

    Ok(NewEntry {
        command: request.command.clone(),
        cwd: request.cwd.clone().filter(|c| !c.is_empty()),
        exit_code: request.exit_code,
        tags,
    })
}

/// Ingest one command from the shell hook and remember its id.
pub fn handle_log(
    store: &Store,
    config: &Config,
    paths: &Paths,
    request: &LogRequest,
) -> Result<LogOutcome> {
    let entry = match prepare_entry(request, &IgnoreList::new(&config.privacy.ignore_patterns)) {
        Ok(entry) => entry,
        Err(skipped) => return Ok(skipped),
    };

    let id = store.insert(&entry).context("Failed to record command")?;
    write_state(
        &paths.state(),
        &LastCommand {
            last_command_id: id,
            timestamp: Utc::now().timestamp_millis(),
            cwd: entry.cwd,
        },
    )?;
    debug!(id, "recorded command");
    Ok(LogOutcome::Stored(id))
}

/// Store a hand-picked command as a favorite with a description.
pub fn save_favorite(
    store: &Store,
    description: &str,
    command: &str,
    cwd: Option<String>,
) -> Result<i64> {
    anyhow::ensure!(!command.trim().is_empty(), "Command cannot be empty");
    anyhow::ensure!(
        !is_internal_command(command),
        "Refusing to save a repty or source command; it would never show up in results"
    );

    let mut tags = TagSet::from_labels([FAVORITE_TAG]);
    let description = description.trim();
    if !description.is_empty() {
        tags.insert(&format!("{DESC_PREFIX}{description}"));
    }

    let id = store
        .insert(&NewEntry {
            command: command.to_string(),
            cwd,
            exit_code: None,
            tags,
        })
        .context("Failed to save favorite")?;
    Ok(id)
}
