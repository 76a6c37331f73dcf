//! Record normalization: flattening raw corpus documents for indexing.
//!
//! The corpus is heterogeneous JSON — any field, any document. This module
//! flattens one raw document into the column-shaped row persisted by the
//! index builder, and owns the load-time `_search` augmentation so that the
//! projections written at build time and the ones regenerated at load time
//! can never drift apart.
//!
//! Flattening rules:
//!
//! - Lists are stored both as JSON text (for inspection) and as a
//!   pipe-separated `_search` projection (for filtering and full text).
//! - Objects are stored as JSON text and contribute that text verbatim.
//! - Scalars are kept as-is; their string form joins the full-text blob.
//! - `search_blob` bundles every non-empty fragment, newline-joined, and is
//!   the sole input to the inverted index.
//! - `raw_json` keeps the pristine document so the loader can reconstruct
//!   exact structures without column-by-column reassembly.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::Document;

/// Delimiter between list items in `_search` projections.
pub const LIST_SEPARATOR: &str = " | ";

/// Suffix of the derived companion columns.
pub const SEARCH_SUFFIX: &str = "_search";

/// Errors raised while normalizing a single document.
///
/// Any of these rejects the whole build: ids must be complete and unique,
/// so silently skipping a record would corrupt the corpus.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("record is missing a numeric 'id' field")]
    MissingId,

    #[error("record 'id' is not convertible to an integer: {0}")]
    InvalidId(String),

    #[error("record 'id' must be non-negative, got {0}")]
    NegativeId(i64),
}

/// One flattened document, ready for insertion.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub id: i64,
    /// Every column except `id`: original fields (containers as JSON text),
    /// `_search` companions, `search_blob` and `raw_json`.
    pub columns: Map<String, Value>,
}

/// Flatten nested structures so SQLite can index them easily.
pub fn normalize_record(record: &Document) -> Result<NormalizedRow, NormalizeError> {
    let id = require_id(record)?;

    let mut columns = Map::new();
    let mut fragments: Vec<String> = Vec::new();

    for (key, value) in record {
        if key == "id" {
            continue;
        }

        match value {
            Value::Null => {
                columns.insert(key.clone(), Value::Null);
            }
            Value::Array(items) => {
                // Keep the original JSON plus a friendly text version for
                // search and filtering.
                columns.insert(key.clone(), Value::String(value.to_string()));
                let joined = join_list_items(items);
                if !joined.is_empty() {
                    fragments.push(joined.clone());
                }
                columns.insert(format!("{key}{SEARCH_SUFFIX}"), Value::String(joined));
            }
            Value::Object(_) => {
                let text = value.to_string();
                columns.insert(key.clone(), Value::String(text.clone()));
                fragments.push(text);
            }
            _ => {
                columns.insert(key.clone(), value.clone());
                fragments.push(value_token(value));
            }
        }
    }

    let blob = fragments
        .iter()
        .filter(|fragment| !fragment.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    columns.insert("search_blob".to_string(), Value::String(blob));
    columns.insert(
        "raw_json".to_string(),
        Value::String(Value::Object(record.clone()).to_string()),
    );

    Ok(NormalizedRow { id, columns })
}

/// Re-derive the `_search` companion fields on an in-memory document.
///
/// Runs at load time over the deserialized `raw_json` so that in-memory
/// filtering and the on-disk index agree on field names. Idempotent: the
/// companions it adds are plain strings, which the next pass leaves alone.
pub fn augment_document(record: &mut Document) {
    let mut companions: Vec<(String, String)> = Vec::new();
    for (key, value) in record.iter() {
        match value {
            Value::Array(items) => {
                companions.push((format!("{key}{SEARCH_SUFFIX}"), join_list_items(items)));
            }
            Value::Object(_) => {
                companions.push((format!("{key}{SEARCH_SUFFIX}"), value.to_string()));
            }
            _ => {}
        }
    }
    for (key, text) in companions {
        record.insert(key, Value::String(text));
    }
}

/// The string form of a single value, as used for search projections,
/// filter tokens and sort keys.
///
/// Bare strings stay unquoted; everything else renders as JSON text.
pub fn value_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Join list items for a `_search` projection, skipping nulls and empty
/// strings. An empty or all-empty list yields the empty string.
fn join_list_items(items: &[Value]) -> String {
    items
        .iter()
        .filter(|item| !item.is_null() && item.as_str() != Some(""))
        .map(value_token)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

fn require_id(record: &Document) -> Result<i64, NormalizeError> {
    let value = match record.get("id") {
        Some(v) if !v.is_null() => v,
        _ => return Err(NormalizeError::MissingId),
    };
    let id = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| NormalizeError::InvalidId(value.to_string()))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| NormalizeError::InvalidId(s.clone()))?,
        other => return Err(NormalizeError::InvalidId(other.to_string())),
    };
    if id < 0 {
        return Err(NormalizeError::NegativeId(id));
    }
    Ok(id)
}
