use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(
        "SQLite was built without FTS5 full-text search; install a SQLite with FTS5 enabled and run `repty setup` again"
    )]
    Fts5Unavailable,
    #[error("No command found with id={id}")]
    NotFound { id: i64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
