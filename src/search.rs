//! Query engine: full-text prefilter, structured filtering, ordering,
//! pagination.
//!
//! The pipeline for one search:
//!
//! 1. A non-empty query is tokenized and issued against the FTS index as a
//!    prefix-term AND match; the candidate set is exactly the ids returned.
//!    An empty query selects the whole corpus in id order.
//! 2. Candidates are filtered in memory: every filter field must match
//!    (AND across fields), any of a field's values may match (OR within a
//!    field), and a value matches when it occurs case-insensitively as a
//!    substring of a token derived from the document field.
//! 3. The surviving set is ordered: seeded deterministic shuffle for
//!    `sort_by == "random"`, otherwise a stable case-insensitive sort on
//!    the named field (default `name`).
//! 4. Pagination slices the ordered set; `total` is the filtered size
//!    before slicing.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rusqlite::Connection;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db::StoreError;
use crate::model::{Document, SearchRequest, SearchResponse, SortOrder};
use crate::normalize::{SEARCH_SUFFIX, value_token};
use crate::store::PaperStore;

/// Run one search against the loaded corpus.
pub(crate) fn execute(
    store: &PaperStore,
    request: &SearchRequest,
) -> Result<SearchResponse, StoreError> {
    let filters = normalize_filters(&request.filters);

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let mut matched: Vec<&Document> = match query {
        Some(q) => {
            let ids = fts_lookup(&store.conn, q)?;
            if ids.is_empty() {
                return Ok(empty_response(request));
            }
            ids.iter()
                .filter_map(|id| store.index_of.get(id).map(|&idx| &store.documents[idx]))
                .filter(|doc| matches_filters(doc, &filters))
                .collect()
        }
        None => store
            .documents
            .iter()
            .filter(|doc| matches_filters(doc, &filters))
            .collect(),
    };

    apply_sort(&mut matched, request);

    let total = matched.len();
    let start = (request.page.max(1) as usize - 1) * request.page_size as usize;
    let results: Vec<Document> = matched
        .into_iter()
        .skip(start)
        .take(request.page_size as usize)
        .cloned()
        .collect();

    Ok(SearchResponse {
        total,
        page: request.page,
        page_size: request.page_size,
        results,
    })
}

fn empty_response(request: &SearchRequest) -> SearchResponse {
    SearchResponse {
        total: 0,
        page: request.page,
        page_size: request.page_size,
        results: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Full-text prefilter
// ---------------------------------------------------------------------------

/// Convert a raw user query into an FTS5 match expression.
///
/// Maximal alphanumeric-plus-underscore runs become lowercased prefix
/// terms, AND-joined so partial matches work as the user types. Keeping
/// the expression this simple prevents FTS syntax errors from user input.
pub(crate) fn prepare_match_query(query: &str) -> Option<String> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|token| format!("{token}*"))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// Lowercased maximal `[alphanumeric_]` runs of the query. A query made
/// of punctuation only yields no tokens.
pub(crate) fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in query.to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Resolve the candidate ids for a query via the inverted index. Zero
/// tokens is defined as an empty search.
pub(crate) fn fts_lookup(conn: &Connection, query: &str) -> Result<Vec<i64>, StoreError> {
    let Some(match_expr) = prepare_match_query(query) else {
        return Ok(Vec::new());
    };
    let mut stmt =
        conn.prepare("SELECT rowid FROM papers_fts WHERE papers_fts MATCH ?1 ORDER BY rowid")?;
    let ids = stmt
        .query_map([&match_expr], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Structured filtering
// ---------------------------------------------------------------------------

/// Normalize raw filters: drop nulls, coerce single values to lists,
/// trim whitespace, discard empty strings. A field with nothing left is
/// dropped entirely rather than treated as "must be empty".
pub(crate) fn normalize_filters(raw: &BTreeMap<String, Value>) -> BTreeMap<String, Vec<String>> {
    let mut normalized = BTreeMap::new();
    for (key, value) in raw {
        let candidates: Vec<String> = match value {
            Value::Null => continue,
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().map(value_token).collect(),
            other => vec![value_token(other)],
        };
        let values: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.trim().to_string())
            .filter(|candidate| !candidate.is_empty())
            .collect();
        if !values.is_empty() {
            normalized.insert(key.clone(), values);
        }
    }
    normalized
}

/// The tokens a field value exposes to filter matching: scalars yield one
/// token, lists one per element, objects their JSON text.
fn field_tokens(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_token).collect(),
        other => vec![value_token(other)],
    }
}

/// A document matches when every filter field matches (AND across fields)
/// and at least one of a field's values occurs case-insensitively as a
/// substring of at least one field token (OR within a field). Documents
/// with no retrievable value for a filter field are excluded; the
/// `_search` companion stands in when the primary field is absent.
pub(crate) fn matches_filters(
    document: &Document,
    filters: &BTreeMap<String, Vec<String>>,
) -> bool {
    for (field, values) in filters {
        let primary = document.get(field).filter(|v| !v.is_null());
        let field_value = primary.or_else(|| {
            document
                .get(&format!("{field}{SEARCH_SUFFIX}"))
                .filter(|v| !v.is_null())
        });
        let Some(field_value) = field_value else {
            return false;
        };

        let tokens: Vec<String> = field_tokens(field_value)
            .iter()
            .map(|token| token.to_lowercase())
            .collect();
        let any_match = values.iter().any(|value| {
            let needle = value.to_lowercase();
            tokens.iter().any(|token| token.contains(&needle))
        });
        if !any_match {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn apply_sort(matched: &mut [&Document], request: &SearchRequest) {
    match request.sort_by.as_deref().map(str::trim) {
        Some("random") => {
            let seed = request.seed.clone().unwrap_or_else(|| "0".to_string());
            matched.sort_by_cached_key(|doc| shuffle_key(&seed, doc));
        }
        Some(field) if !field.is_empty() => match request.sort_order {
            SortOrder::Asc => matched.sort_by_cached_key(|doc| sort_key(doc, field)),
            SortOrder::Desc => matched.sort_by_cached_key(|doc| Reverse(sort_key(doc, field))),
        },
        _ => matched.sort_by_cached_key(|doc| sort_key(doc, "name")),
    }
}

/// Case-insensitive sort key for a field: list values sort by their first
/// element, null/absent sorts as the empty string. Both sorts here are
/// stable, so ties keep their prior relative order — required for
/// page-over-page consistency.
pub(crate) fn sort_key(document: &Document, field: &str) -> String {
    match document.get(field) {
        Some(Value::Array(items)) if !items.is_empty() => value_token(&items[0]).to_lowercase(),
        Some(Value::Null) | None => String::new(),
        Some(other) => value_token(other).to_lowercase(),
    }
}

/// Deterministic shuffle key: the most-significant 8 bytes of
/// `SHA-256("{seed}:{id}")` as an unsigned big-endian integer. Identical
/// `(seed, candidate-set)` pairs always produce the identical order; no
/// randomness source is consulted.
pub(crate) fn shuffle_key(seed: &str, document: &Document) -> u64 {
    let id = document
        .get("id")
        .map(value_token)
        .unwrap_or_default();
    let digest = Sha256::digest(format!("{seed}:{id}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
