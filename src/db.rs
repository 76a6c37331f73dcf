//! Data access helpers for the persisted paper store.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::model::Document;

/// Errors opening or loading the persisted store. All of these are fatal
/// at startup: the query engine cannot operate without a loaded corpus.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database not found at {0} (run `papers index` first)")]
    Missing(PathBuf),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored document {id} has corrupt raw_json: {source}")]
    Corrupt {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
}

/// Open a read-only connection to the papers database.
pub fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if !path.exists() {
        return Err(StoreError::Missing(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Retrieve every paper as a parsed field map, ordered by id, with the id
/// injected back into the document.
pub fn fetch_all_documents(conn: &Connection) -> Result<Vec<Document>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, raw_json FROM papers ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        let mut document: Document =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt { id, source })?;
        document.insert("id".to_string(), id.into());
        documents.push(document);
    }
    Ok(documents)
}

/// Return the known column names of the `papers` table.
pub fn list_columns(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(papers)")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
