//! Response-shape decoding for list endpoints.
//!
//! The backend returns lists either as a bare JSON array or wrapped in an
//! object under a named field. Both shapes are decoded here, once, at the API
//! boundary; anything else decodes to an empty list.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::MovieId;

/// Raw list response as returned by the backend
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListPayload {
    /// `[ ... ]`
    Bare(Vec<Value>),
    /// `{ "watchlist": [ ... ] }`, `{ "notifications": [ ... ], "total": n }`, ...
    Nested(NestedList),
    /// Anything else (null, scalar, object with mistyped fields)
    Unrecognized(Value),
}

/// Object wrapper around a list, checked in field priority order
#[derive(Debug, Clone, Deserialize)]
pub struct NestedList {
    #[serde(default)]
    watchlist: Option<Vec<Value>>,
    #[serde(default)]
    likes: Option<Vec<Value>>,
    #[serde(default)]
    notifications: Option<Vec<Value>>,
    #[serde(default)]
    comments: Option<Vec<Value>>,
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    recommendations: Option<Vec<Value>>,
    #[serde(default)]
    results: Option<Vec<Value>>,
}

impl NestedList {
    fn into_items(self) -> Option<Vec<Value>> {
        self.watchlist
            .or(self.likes)
            .or(self.notifications)
            .or(self.comments)
            .or(self.data)
            .or(self.recommendations)
            .or(self.results)
    }
}

impl ListPayload {
    /// Extracts the list items, decoding each one independently.
    ///
    /// Items that fail to decode are skipped rather than failing the whole
    /// list.
    pub fn into_items<T: DeserializeOwned>(self) -> Vec<T> {
        let raw = match self {
            ListPayload::Bare(items) => items,
            ListPayload::Nested(nested) => match nested.into_items() {
                Some(items) => items,
                None => {
                    tracing::warn!("List response object has no recognizable array field");
                    Vec::new()
                }
            },
            ListPayload::Unrecognized(value) => {
                tracing::warn!(kind = %value_kind(&value), "Unrecognized list response shape");
                Vec::new()
            }
        };

        let total = raw.len();
        let items: Vec<T> = raw
            .into_iter()
            .filter_map(|item| serde_json::from_value::<T>(item).ok())
            .collect();

        if items.len() < total {
            tracing::debug!(
                skipped = total - items.len(),
                kept = items.len(),
                "Dropped list items that failed to decode"
            );
        }

        items
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One row of the likes endpoint; only the movie id is kept
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LikeRecord {
    pub movie_id: MovieId,
}
