use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::models::{Entry, NewEntry};
use super::schema::Store;
use super::tags::{tokens_match_parts, TagSet};

const ENTRY_COLUMNS: &str = "id, command, cwd, timestamp, exit_code, tags";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let tags: Option<String> = row.get(5)?;
    Ok(Entry {
        id: row.get(0)?,
        command: row.get(1)?,
        cwd: row.get(2)?,
        timestamp: row.get(3)?,
        exit_code: row.get(4)?,
        tags: TagSet::parse(tags.as_deref()),
    })
}

/// SQLite treats a negative LIMIT as "no limit".
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

impl Store {
    pub fn insert(&self, entry: &NewEntry) -> StoreResult<i64> {
        self.insert_at(entry, Utc::now().timestamp_millis())
    }

    pub fn insert_at(&self, entry: &NewEntry, timestamp: i64) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO commands (command, cwd, timestamp, exit_code, tags)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.command,
                entry.cwd,
                timestamp,
                entry.exit_code,
                entry.tags.to_stored(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM commands WHERE id = ?1");
        let entry = self
            .conn
            .query_row(&sql, params![id], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    pub fn recent(&self, limit: usize) -> StoreResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM commands
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Newest row per distinct command string, skipping our own invocations.
    pub fn recent_distinct(&self, limit: usize) -> StoreResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM commands
             WHERE id IN (
                 SELECT MAX(id) FROM commands
                 WHERE NOT repty_internal(command)
                 GROUP BY command
             )
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Everything, newest first, for export. `None` means no limit.
    pub fn all_for_export(&self, limit: Option<usize>) -> StoreResult<Vec<Entry>> {
        self.recent(limit.unwrap_or(usize::MAX))
    }

    /// Most recent entry that is not one of our own invocations.
    pub fn last_user_command(&self) -> StoreResult<Option<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM commands
             WHERE NOT repty_internal(command)
             ORDER BY id DESC
             LIMIT 1"
        );
        let entry = self.conn.query_row(&sql, [], row_to_entry).optional()?;
        Ok(entry)
    }

    pub fn count(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commands", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Full-text search over command text and tags.
    ///
    /// Returns at most one row per distinct command string (the newest), ordered
    /// by recency. Internal commands are excluded.
    pub fn search_fts(&self, expression: &str, limit: usize) -> StoreResult<Vec<Entry>> {
        match self.search_fts_windowed(expression, limit) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                debug!(error = %e, "window query failed, retrying with grouped dedup");
                Ok(self.search_fts_grouped(expression, limit)?)
            }
        }
    }

    fn search_fts_windowed(&self, expression: &str, limit: usize) -> rusqlite::Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "WITH matched AS (
                SELECT c.id, c.command, c.cwd, c.timestamp, c.exit_code, c.tags
                FROM commands c
                JOIN commands_fts f ON f.rowid = c.id
                WHERE commands_fts MATCH ?1
                  AND NOT repty_internal(c.command)
            ), ranked AS (
                SELECT *,
                       ROW_NUMBER() OVER (
                           PARTITION BY command
                           ORDER BY timestamp DESC, id DESC
                       ) AS rn
                FROM matched
            )
            SELECT id, command, cwd, timestamp, exit_code, tags
            FROM ranked
            WHERE rn = 1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![expression, sql_limit(limit)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Same result as the windowed variant for SQLite builds without window
    /// functions. Relies on ids growing with timestamps.
    fn search_fts_grouped(&self, expression: &str, limit: usize) -> rusqlite::Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "WITH matched AS (
                SELECT c.id, c.command
                FROM commands c
                JOIN commands_fts f ON f.rowid = c.id
                WHERE commands_fts MATCH ?1
                  AND NOT repty_internal(c.command)
            ), latest AS (
                SELECT command, MAX(id) AS max_id
                FROM matched
                GROUP BY command
            )
            SELECT c.id, c.command, c.cwd, c.timestamp, c.exit_code, c.tags
            FROM commands c
            JOIN latest l ON l.max_id = c.id
            ORDER BY c.timestamp DESC, c.id DESC
            LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![expression, sql_limit(limit)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entries whose tags fuzzy-match any token, newest id first, one per
    /// distinct command string.
    pub fn search_by_tags(&self, tokens: &[String], limit: usize) -> StoreResult<Vec<Entry>> {
        let tokens: Vec<String> = tokens
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM commands
             WHERE tags IS NOT NULL
               AND NOT repty_internal(command)
             ORDER BY id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let entry = row_to_entry(row)?;
            if !tokens_match_parts(&tokens, &entry.tags.match_parts()) {
                continue;
            }
            if !seen.insert(entry.command.clone()) {
                continue;
            }
            out.push(entry);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Add a tag. Errors with `NotFound` when the id does not exist.
    pub fn add_tag(&self, id: i64, tag: &str) -> StoreResult<TagSet> {
        let tx = self.conn.unchecked_transaction()?;
        let mut tags = self.load_tags(id)?.ok_or(StoreError::NotFound { id })?;
        if tags.insert(tag) {
            tx.execute(
                "UPDATE commands SET tags = ?1 WHERE id = ?2",
                params![tags.to_stored(), id],
            )?;
        }
        tx.commit()?;
        Ok(tags)
    }

    /// Remove a tag ignoring case. Returns false when nothing changed,
    /// including when the id does not exist.
    pub fn remove_tag(&self, id: i64, tag: &str) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(mut tags) = self.load_tags(id)? else {
            return Ok(false);
        };
        if !tags.remove_ignore_case(tag) {
            return Ok(false);
        }
        tx.execute(
            "UPDATE commands SET tags = ?1 WHERE id = ?2",
            params![tags.to_stored(), id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn load_tags(&self, id: i64) -> StoreResult<Option<TagSet>> {
        let stored: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT tags FROM commands WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored.map(|t| TagSet::parse(t.as_deref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().expect("in-memory store")
    }

    fn entry(command: &str, exit_code: Option<i32>, tags: &[&str]) -> NewEntry {
        NewEntry {
            command: command.to_string(),
            cwd: Some("/home/user/project".to_string()),
            exit_code,
            tags: TagSet::from_labels(tags),
        }
    }

    fn ids(entries: &[Entry]) -> Vec<i64> {
        entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_ids_increase() {
        let store = store();
        let a = store.insert(&entry("ls", Some(0), &[])).unwrap();
        let b = store.insert(&entry("ls", Some(0), &[])).unwrap();
        assert!(b > a);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_get_by_id_missing_is_none() {
        let store = store();
        assert!(store.get_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_fts_keeps_only_newest_duplicate() {
        let store = store();
        store.insert_at(&entry("git status", Some(0), &[]), 1_000).unwrap();
        let newer = store.insert_at(&entry("git status", Some(1), &[]), 2_000).unwrap();
        store.insert_at(&entry("docker ps", Some(0), &[]), 3_000).unwrap();

        let rows = store.search_fts("\"git\"* AND \"status\"*", 50).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, newer);
        assert_eq!(rows[0].exit_code, Some(1));
    }

    #[test]
    fn test_fts_orders_by_recency_with_id_tiebreak() {
        let store = store();
        let a = store.insert_at(&entry("cargo build", Some(0), &[]), 5_000).unwrap();
        let b = store.insert_at(&entry("cargo test", Some(0), &[]), 5_000).unwrap();
        let c = store.insert_at(&entry("cargo run", Some(0), &[]), 1_000).unwrap();

        let rows = store.search_fts("\"cargo\"*", 50).unwrap();
        assert_eq!(ids(&rows), vec![b, a, c]);
    }

    #[test]
    fn test_windowed_and_grouped_dedup_agree() {
        let store = store();
        for (i, cmd) in ["make", "make test", "make", "make install", "make test"]
            .iter()
            .enumerate()
        {
            store
                .insert_at(&entry(cmd, Some(0), &[]), 1_000 * (i as i64 + 1))
                .unwrap();
        }

        let windowed = store.search_fts_windowed("\"make\"*", 50).unwrap();
        let grouped = store.search_fts_grouped("\"make\"*", 50).unwrap();
        assert_eq!(windowed.len(), 3);
        assert_eq!(ids(&windowed), ids(&grouped));
    }

    #[test]
    fn test_fts_matches_tags_and_respects_limit() {
        let store = store();
        let tagged = store
            .insert(&entry("./run.sh", Some(0), &["deploy"]))
            .unwrap();
        store.insert(&entry("echo deployment", Some(0), &[])).unwrap();

        let rows = store.search_fts("\"deploy\"*", 1).unwrap();
        assert_eq!(rows.len(), 1);

        let rows = store.search_fts("\"deploy\"", 50).unwrap();
        assert_eq!(ids(&rows), vec![tagged]);
    }

    #[test]
    fn test_fts_excludes_internal_commands() {
        let store = store();
        store.insert(&entry("repty search git", Some(0), &[])).unwrap();
        store.insert(&entry("source git-prompt.sh", Some(0), &[])).unwrap();
        store.insert(&entry(". git-env", Some(0), &[])).unwrap();
        let keep = store.insert(&entry("git pull", Some(0), &[])).unwrap();

        let rows = store.search_fts("\"git\"*", 50).unwrap();
        assert_eq!(ids(&rows), vec![keep]);
    }

    #[test]
    fn test_tag_search_is_bidirectional_and_deduped() {
        let store = store();
        store
            .insert_at(&entry("kubectl get pods", Some(0), &["k8s"]), 1_000)
            .unwrap();
        let newer = store
            .insert_at(&entry("kubectl get pods", Some(0), &["k8s"]), 2_000)
            .unwrap();
        let fav = store
            .insert_at(
                &entry("./deploy.sh staging", None, &["favorite", "desc:deploy staging"]),
                3_000,
            )
            .unwrap();
        store
            .insert_at(&entry("repty tag add k8s", Some(0), &["k8s"]), 4_000)
            .unwrap();

        let rows = store.search_by_tags(&["k8spods".to_string()], 50).unwrap();
        assert_eq!(ids(&rows), vec![newer]);

        let rows = store.search_by_tags(&["Deploy".to_string()], 50).unwrap();
        assert_eq!(ids(&rows), vec![fav]);

        assert!(store.search_by_tags(&[], 50).unwrap().is_empty());
    }

    #[test]
    fn test_tag_add_is_idempotent_and_indexed() {
        let store = store();
        let id = store.insert(&entry("terraform apply", Some(0), &[])).unwrap();

        let once = store.add_tag(id, "infra").unwrap();
        let twice = store.add_tag(id, "infra").unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            store.get_by_id(id).unwrap().unwrap().tags.to_stored().as_deref(),
            Some("infra")
        );

        let rows = store.search_fts("\"infra\"", 10).unwrap();
        assert_eq!(ids(&rows), vec![id]);
    }

    #[test]
    fn test_tag_add_missing_id_is_not_found() {
        let store = store();
        let err = store.add_tag(99, "x").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 99 }));
    }

    #[test]
    fn test_tag_remove_is_case_insensitive_and_reindexes() {
        let store = store();
        let id = store
            .insert(&entry("terraform plan", Some(0), &["Infra", "prod"]))
            .unwrap();

        assert!(store.remove_tag(id, "infra").unwrap());
        assert!(!store.remove_tag(id, "infra").unwrap());
        assert!(store.search_fts("\"infra\"", 10).unwrap().is_empty());

        assert!(store.remove_tag(id, "PROD").unwrap());
        let stored: Option<String> = store
            .conn
            .query_row("SELECT tags FROM commands WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, None);
    }

    #[test]
    fn test_tag_remove_missing_id_is_noop() {
        let store = store();
        assert!(!store.remove_tag(7, "anything").unwrap());
    }

    #[test]
    fn test_index_row_removed_with_entry() {
        let store = store();
        let id = store.insert(&entry("htop", Some(0), &[])).unwrap();
        store
            .conn
            .execute("DELETE FROM commands WHERE id = ?1", [id])
            .unwrap();
        let n: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM commands_fts WHERE commands_fts MATCH 'htop'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_last_user_command_skips_internal() {
        let store = store();
        let id = store.insert(&entry("npm install", Some(0), &[])).unwrap();
        store.insert(&entry("repty tag add web", Some(0), &[])).unwrap();
        assert_eq!(store.last_user_command().unwrap().map(|e| e.id), Some(id));
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let store = store();
        let a = store.insert_at(&entry("a1", Some(0), &[]), 1_000).unwrap();
        let b = store.insert_at(&entry("b1", Some(0), &[]), 3_000).unwrap();
        let c = store.insert_at(&entry("c1", Some(0), &[]), 2_000).unwrap();
        assert_eq!(ids(&store.recent(2).unwrap()), vec![b, c]);
        assert_eq!(ids(&store.all_for_export(None).unwrap()), vec![b, c, a]);
    }

    #[test]
    fn test_recent_distinct_drops_repeats_and_internal() {
        let store = store();
        store.insert_at(&entry("make test", Some(1), &[]), 1_000).unwrap();
        let ls = store.insert_at(&entry("ls -la", Some(0), &[]), 2_000).unwrap();
        let make = store.insert_at(&entry("make test", Some(0), &[]), 3_000).unwrap();
        store.insert_at(&entry("repty recent", Some(0), &[]), 4_000).unwrap();

        let rows = store.recent_distinct(10).unwrap();
        assert_eq!(ids(&rows), vec![make, ls]);
        assert_eq!(rows[0].exit_code, Some(0));
        assert_eq!(store.recent(10).unwrap().len(), 4);
    }
}
