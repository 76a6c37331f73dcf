//! Request/response contracts and shared document types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// One in-memory corpus document: an ordered field map. Fields hold the
/// full JSON value space (null, bool, number, string, array, object).
pub type Document = serde_json::Map<String, Value>;

/// Errors raised when a search request fails validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("page must be >= 1, got {0}")]
    InvalidPage(u32),

    #[error("page_size must be between 1 and {max}, got {given}")]
    InvalidPageSize { given: u32, max: u32 },

    #[error("sort_order must be 'asc' or 'desc', got {0:?}")]
    InvalidSortOrder(String),
}

/// Sort direction. Parsed case-insensitively; anything other than
/// asc/desc is rejected at the request boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(RequestError::InvalidSortOrder(s.to_string())),
        }
    }
}

impl TryFrom<String> for SortOrder {
    type Error = RequestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SortOrder> for String {
    fn from(order: SortOrder) -> Self {
        order.as_str().to_string()
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming payload for a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Full text query run against all fields.
    #[serde(default)]
    pub query: Option<String>,
    /// Field -> value(s) used for filtering. Values may be a string, a
    /// list, a number or a bool; nulls are dropped during normalization.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    /// 1-based page index.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Number of results per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Field name to sort by; `"random"` selects the seeded shuffle;
    /// omitted/empty defaults to `name`.
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    /// Seed for the deterministic shuffle when `sort_by == "random"`.
    #[serde(default)]
    pub seed: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            filters: BTreeMap::new(),
            page: default_page(),
            page_size: default_page_size(),
            sort_by: None,
            sort_order: SortOrder::Asc,
            seed: None,
        }
    }
}

impl SearchRequest {
    /// Validate bounds and trim the query, mirroring the request-boundary
    /// rules: `page >= 1`, `1 <= page_size <= MAX_PAGE_SIZE`, blank queries
    /// become absent.
    pub fn validated(mut self) -> Result<Self, RequestError> {
        if self.page < 1 {
            return Err(RequestError::InvalidPage(self.page));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(RequestError::InvalidPageSize {
                given: self.page_size,
                max: MAX_PAGE_SIZE,
            });
        }
        self.query = self
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        Ok(self)
    }
}

/// Outgoing payload for a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<Document>,
}

/// One entry of the field type report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Field classification plus precomputed facet values, both derived once
/// from the loaded corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub fields: Vec<FieldInfo>,
    pub facets: BTreeMap<String, Vec<String>>,
}
