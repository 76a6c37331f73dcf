//! In-memory view over the persisted dataset, with FTS acceleration.
//!
//! The store materializes every document at startup and never mutates them
//! afterwards; facet lists and the field type report are computed once here
//! and served for the process lifetime. The store is constructed explicitly
//! and handed to callers by reference — there is no process-wide singleton.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;

use crate::db::{self, StoreError};
use crate::model::{Document, FieldInfo, SchemaReport, SearchRequest, SearchResponse};
use crate::normalize::{augment_document, value_token};
use crate::search;

/// Facet fields and the bound on how many distinct values each reports.
const FACET_FIELDS: &[(&str, usize)] = &[
    ("decision", 50),
    ("event_type", 50),
    ("session", 100),
    ("topic", 100),
    ("keywords", 200),
    ("authors", 200),
];

/// Read-only corpus loaded into memory, plus the FTS-backed connection
/// used for full-text prefiltering.
#[derive(Debug)]
pub struct PaperStore {
    pub(crate) conn: Connection,
    pub(crate) documents: Vec<Document>,
    pub(crate) index_of: HashMap<i64, usize>,
    columns: Vec<String>,
    schema: SchemaReport,
}

impl PaperStore {
    /// Open the persisted store read-only and materialize the corpus.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open_connection(path)?;
        let mut documents = db::fetch_all_documents(&conn)?;
        for document in &mut documents {
            augment_document(document);
        }

        let index_of = documents
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| doc.get("id").and_then(Value::as_i64).map(|id| (id, idx)))
            .collect();
        let columns = db::list_columns(&conn)?;
        let schema = SchemaReport {
            fields: detect_field_types(&documents),
            facets: build_facets(&documents),
        };

        tracing::info!(
            documents = documents.len(),
            columns = columns.len(),
            "paper store loaded"
        );
        Ok(Self {
            conn,
            documents,
            index_of,
            columns,
            schema,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// All documents in corpus order (id ascending).
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Known column names of the persisted table.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch a single document by id.
    pub fn get(&self, id: i64) -> Option<&Document> {
        self.index_of.get(&id).map(|&idx| &self.documents[idx])
    }

    /// Field type report plus facet values, precomputed at load.
    pub fn schema(&self) -> &SchemaReport {
        &self.schema
    }

    /// Run one search: full-text prefilter, structured filters, ordering,
    /// pagination. See [`crate::search`] for the contract.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
        search::execute(self, request)
    }
}

/// Collect distinct values for commonly-used filters, each list bounded
/// and sorted. List-valued fields contribute every element.
fn build_facets(documents: &[Document]) -> BTreeMap<String, Vec<String>> {
    let mut facets: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for (field, _) in FACET_FIELDS {
        facets.insert(*field, BTreeSet::new());
    }

    for document in documents {
        for (field, limit) in FACET_FIELDS {
            let Some(value) = document.get(*field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let bucket = facets.get_mut(field).expect("facet field preregistered");
            match value {
                Value::Array(items) => {
                    for item in items {
                        if bucket.len() >= *limit {
                            break;
                        }
                        bucket.insert(value_token(item));
                    }
                }
                other => {
                    if bucket.len() < *limit {
                        bucket.insert(value_token(other));
                    }
                }
            }
        }
    }

    facets
        .into_iter()
        .map(|(field, values)| (field.to_string(), values.into_iter().collect()))
        .collect()
}

/// Classify every field by the runtime shape of its values, demoting a
/// field to `mixed` the moment two documents disagree.
fn detect_field_types(documents: &[Document]) -> Vec<FieldInfo> {
    let mut field_types: BTreeMap<String, &'static str> = BTreeMap::new();
    for document in documents {
        for (key, value) in document {
            if value.is_null() {
                continue;
            }
            let detected = detect_type(value);
            match field_types.get(key).copied() {
                Some(existing) if existing != detected => {
                    field_types.insert(key.clone(), "mixed");
                }
                Some(_) => {}
                None => {
                    field_types.insert(key.clone(), detected);
                }
            }
        }
    }
    field_types
        .into_iter()
        .map(|(name, field_type)| FieldInfo {
            name,
            field_type: field_type.to_string(),
        })
        .collect()
}

fn detect_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "float"
            }
        }
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        _ => "string",
    }
}
