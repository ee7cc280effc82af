use std::collections::{HashMap, HashSet};

use crate::db::models::Entry;

use super::filter::is_internal_command;

/// Union tag-matched and full-text results into one candidate set.
///
/// Tag matches go first so they keep positional priority. Identical ids are
/// collapsed, then identical command strings: the newest entry for a command
/// wins and takes the slot of the first occurrence of that command.
pub fn merge_candidates(tag_rows: Vec<Entry>, fts_rows: Vec<Entry>) -> Vec<Entry> {
    let mut seen_ids = HashSet::new();
    let mut by_id: Vec<Entry> = Vec::with_capacity(tag_rows.len() + fts_rows.len());
    for entry in tag_rows.into_iter().chain(fts_rows) {
        if seen_ids.insert(entry.id) {
            by_id.push(entry);
        }
    }

    let mut slot_for_command: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Entry> = Vec::with_capacity(by_id.len());
    for entry in by_id {
        match slot_for_command.get(&entry.command) {
            Some(&slot) => {
                let current = &merged[slot];
                if (entry.timestamp, entry.id) > (current.timestamp, current.id) {
                    merged[slot] = entry;
                }
            }
            None => {
                slot_for_command.insert(entry.command.clone(), merged.len());
                merged.push(entry);
            }
        }
    }
    merged
}

/// Drop internal commands. Applied on every retrieval path before ranking.
pub fn drop_internal(candidates: Vec<Entry>) -> Vec<Entry> {
    candidates
        .into_iter()
        .filter(|e| !is_internal_command(&e.command))
        .collect()
}
