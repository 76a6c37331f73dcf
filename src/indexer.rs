//! Offline index builder.
//!
//! Reads the corpus JSON (a top-level map with a `results` list), flattens
//! every document, and writes a SQLite database with one column per field
//! observed anywhere in the corpus plus an FTS5 virtual table over
//! `search_blob`. The build is batch, not incremental: every run produces a
//! fresh store. The new database is assembled in a sibling temp file and
//! renamed over the target only on success, so a failed build leaves any
//! prior store untouched.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use thiserror::Error;

use crate::model::Document;
use crate::normalize::{NormalizeError, NormalizedRow, normalize_record};

/// Facet-like columns that get equality indexes when present. These are an
/// acceleration for point queries, not a correctness requirement: the query
/// engine re-validates matches in memory.
const INDEXED_COLUMNS: &[&str] = &["decision", "event_type", "session", "topic", "visible"];

/// Errors that abort an index build. The build is atomic: none of these
/// leave a partially written store behind.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to read corpus file {path}: {source}")]
    ReadCorpus {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus is not valid JSON: {0}")]
    ParseCorpus(#[from] serde_json::Error),

    #[error("unexpected corpus structure: {0}")]
    MalformedCorpus(String),

    #[error("record {index} is invalid: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: NormalizeError,
    },

    #[error("duplicate document id {0}")]
    DuplicateId(i64),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to write database at {path}: {source}")]
    WriteStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    pub documents: usize,
    pub columns: usize,
}

/// Build the search index from a corpus file. Destructive rebuild of the
/// store at `output` (replace-on-success).
pub fn build_index(input: &Path, output: &Path) -> Result<BuildSummary, BuildError> {
    let records = read_corpus(input)?;
    let rows = prepare_rows(&records)?;
    let summary = create_database(output, &rows)?;
    tracing::info!(
        documents = summary.documents,
        columns = summary.columns,
        output = %output.display(),
        "index build complete"
    );
    Ok(summary)
}

/// Parse the corpus file. The only accepted top-level shape is a map
/// containing a `results` list of document maps.
pub fn read_corpus(path: &Path) -> Result<Vec<Document>, BuildError> {
    let text = fs::read_to_string(path).map_err(|source| BuildError::ReadCorpus {
        path: path.to_path_buf(),
        source,
    })?;
    let payload: Value = serde_json::from_str(&text)?;

    let Some(results) = payload.as_object().and_then(|map| map.get("results")) else {
        return Err(BuildError::MalformedCorpus(
            "expected a top-level map with a 'results' list".to_string(),
        ));
    };
    let Some(entries) = results.as_array() else {
        return Err(BuildError::MalformedCorpus(
            "'results' must be a list".to_string(),
        ));
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match entry.as_object() {
            Some(map) => records.push(map.clone()),
            None => {
                return Err(BuildError::MalformedCorpus(format!(
                    "'results' entry {index} is not an object"
                )));
            }
        }
    }
    tracing::info!(entries = records.len(), "loaded corpus entries");
    Ok(records)
}

/// Normalize every record, failing the whole build on the first invalid
/// one. Runs before any database file is touched.
pub fn prepare_rows(records: &[Document]) -> Result<Vec<NormalizedRow>, BuildError> {
    let mut rows = Vec::with_capacity(records.len());
    let mut seen = BTreeSet::new();
    for (index, record) in records.iter().enumerate() {
        let row =
            normalize_record(record).map_err(|source| BuildError::InvalidRecord { index, source })?;
        if !seen.insert(row.id) {
            return Err(BuildError::DuplicateId(row.id));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Create the SQLite store: flattened `papers` table, `papers_fts`
/// inverted index, and secondary indexes for common filter columns.
fn create_database(path: &Path, rows: &[NormalizedRow]) -> Result<BuildSummary, BuildError> {
    // Column set is the union across the whole corpus, computed before any
    // row is written so every row has identical columns.
    let columns: Vec<String> = rows
        .iter()
        .flat_map(|row| row.columns.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let tmp_path = sibling_temp_path(path);
    remove_store_files(&tmp_path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| BuildError::WriteStore {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let result = write_database(&tmp_path, &columns, rows);
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    // Replace-on-success. Stale WAL sidecars of the previous store would
    // shadow the fresh file, so they go first.
    remove_sidecar_files(path)?;
    fs::rename(&tmp_path, path).map_err(|source| BuildError::WriteStore {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(BuildSummary {
        documents: rows.len(),
        // +1 for the id primary key.
        columns: columns.len() + 1,
    })
}

fn write_database(
    path: &Path,
    columns: &[String],
    rows: &[NormalizedRow],
) -> Result<(), BuildError> {
    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    let column_defs: Vec<String> = std::iter::once("id INTEGER PRIMARY KEY".to_string())
        .chain(columns.iter().map(|col| format!("\"{col}\" TEXT")))
        .collect();
    conn.execute(
        &format!("CREATE TABLE papers ({})", column_defs.join(", ")),
        [],
    )?;

    let quoted: Vec<String> = std::iter::once("id".to_string())
        .chain(columns.iter().map(|col| format!("\"{col}\"")))
        .collect();
    let placeholders: Vec<String> = (1..=quoted.len()).map(|i| format!("?{i}")).collect();
    let insert_sql = format!(
        "INSERT INTO papers ({}) VALUES ({})",
        quoted.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for row in rows {
            let mut params: Vec<SqlValue> = Vec::with_capacity(columns.len() + 1);
            params.push(SqlValue::Integer(row.id));
            for col in columns {
                params.push(to_sql_value(row.columns.get(col)));
            }
            stmt.execute(rusqlite::params_from_iter(params))?;
        }
    }
    tx.commit()?;

    conn.execute_batch(
        "CREATE VIRTUAL TABLE papers_fts USING fts5(
            search_blob,
            content='papers',
            content_rowid='id',
            tokenize='unicode61'
        );
        INSERT INTO papers_fts (rowid, search_blob)
            SELECT id, search_blob FROM papers;",
    )?;

    for col in INDEXED_COLUMNS {
        if columns.iter().any(|c| c == col) {
            conn.execute(
                &format!("CREATE INDEX idx_papers_{col} ON papers(\"{col}\")"),
                [],
            )?;
        }
    }

    // Fold the WAL back into the main file so the rename moves a complete,
    // self-contained store. Closing the last connection checkpoints and
    // removes the sidecar files; the explicit truncate keeps that prompt.
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    conn.close().map_err(|(_, err)| err)?;
    Ok(())
}

/// Map a normalized column value onto a SQLite value. Containers were
/// already stringified by the normalizer.
fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "papers.db".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_store_files(path: &Path) -> Result<(), BuildError> {
    if path.exists() {
        fs::remove_file(path).map_err(|source| BuildError::WriteStore {
            path: path.to_path_buf(),
            source,
        })?;
    }
    remove_sidecar_files(path)
}

fn remove_sidecar_files(path: &Path) -> Result<(), BuildError> {
    for suffix in ["-wal", "-shm"] {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        let sidecar = path.with_file_name(name);
        if sidecar.exists() {
            fs::remove_file(&sidecar).map_err(|source| BuildError::WriteStore {
                path: sidecar.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_corpus(dir: &TempDir, payload: &Value) -> PathBuf {
        let path = dir.path().join("corpus.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(payload.to_string().as_bytes()).unwrap();
        path
    }

    #[test]
    fn read_corpus_accepts_results_list() {
        let dir = TempDir::new().unwrap();
        let path = write_corpus(
            &dir,
            &json!({"results": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]}),
        );
        let records = read_corpus(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn read_corpus_rejects_other_shapes() {
        let dir = TempDir::new().unwrap();

        let path = write_corpus(&dir, &json!([{"id": 1}]));
        assert!(matches!(
            read_corpus(&path),
            Err(BuildError::MalformedCorpus(_))
        ));

        let path = write_corpus(&dir, &json!({"papers": []}));
        assert!(matches!(
            read_corpus(&path),
            Err(BuildError::MalformedCorpus(_))
        ));

        let path = write_corpus(&dir, &json!({"results": "nope"}));
        assert!(matches!(
            read_corpus(&path),
            Err(BuildError::MalformedCorpus(_))
        ));

        let path = write_corpus(&dir, &json!({"results": [42]}));
        assert!(matches!(
            read_corpus(&path),
            Err(BuildError::MalformedCorpus(_))
        ));
    }

    #[test]
    fn prepare_rows_fails_on_missing_id() {
        let records = vec![
            json!({"id": 1, "name": "ok"}).as_object().unwrap().clone(),
            json!({"name": "no id"}).as_object().unwrap().clone(),
        ];
        assert!(matches!(
            prepare_rows(&records),
            Err(BuildError::InvalidRecord { index: 1, .. })
        ));
    }

    #[test]
    fn prepare_rows_fails_on_duplicate_id() {
        let records = vec![
            json!({"id": 7, "name": "a"}).as_object().unwrap().clone(),
            json!({"id": 7, "name": "b"}).as_object().unwrap().clone(),
        ];
        assert!(matches!(
            prepare_rows(&records),
            Err(BuildError::DuplicateId(7))
        ));
    }

    #[test]
    fn failed_build_leaves_prior_store_untouched() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("papers.db");

        let good = write_corpus(&dir, &json!({"results": [{"id": 1, "name": "keep me"}]}));
        build_index(&good, &db).unwrap();
        let before = fs::read(&db).unwrap();

        let bad = write_corpus(&dir, &json!({"results": [{"name": "missing id"}]}));
        assert!(build_index(&bad, &db).is_err());
        assert_eq!(fs::read(&db).unwrap(), before);
    }

    #[test]
    fn build_creates_fts_and_secondary_indexes() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("papers.db");
        let corpus = write_corpus(
            &dir,
            &json!({"results": [
                {"id": 1, "name": "Alpha", "decision": "accept", "topic": "nlp"},
                {"id": 2, "name": "Beta", "decision": "reject"},
            ]}),
        );
        build_index(&corpus, &db).unwrap();

        let conn = Connection::open(&db).unwrap();
        let fts_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM papers_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_rows, 2);

        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='index' AND name LIKE 'idx_papers_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        // decision and topic are present in the corpus; the other
        // facet-like columns are not.
        assert_eq!(index_count, 2);
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("papers.db");

        let first = write_corpus(&dir, &json!({"results": [{"id": 1, "name": "old"}]}));
        build_index(&first, &db).unwrap();

        let second = write_corpus(
            &dir,
            &json!({"results": [{"id": 5, "name": "new"}, {"id": 6, "name": "newer"}]}),
        );
        let summary = build_index(&second, &db).unwrap();
        assert_eq!(summary.documents, 2);

        let conn = Connection::open(&db).unwrap();
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM papers ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![5, 6]);
    }
}
