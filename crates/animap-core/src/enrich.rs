//! `crossIDs` merge of mapping-service records into dataset items.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};

use crate::tvdb::tvdb_id_of;

/// Dataset field holding an item's MyAnimeList id.
pub const MAL_ID_FIELD: &str = "myanimelist";

/// Output field carrying the extracted TheTVDB id (or `null`).
pub const TVDB_ID_FIELD: &str = "thetvdb";

/// The MyAnimeList id of a dataset item, normalized to a string.
///
/// Accepts a JSON integer or a non-empty string; anything else means the item
/// has no id to resolve.
pub fn mal_id_of(item: &Value) -> Option<String> {
    match item.get(MAL_ID_FIELD)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Distinct MyAnimeList ids across `items`, so each is resolved once.
pub fn collect_mal_ids(items: &[Value]) -> BTreeSet<String> {
    items.iter().filter_map(mal_id_of).collect()
}

/// Merge resolved records into every item.
///
/// Output item = `{...item, ...cross_ref, "thetvdb": extracted-or-null}`.
/// Items that are not objects pass through unchanged.
pub fn merge_items(items: &[Value], cross_refs: &HashMap<String, Value>) -> Vec<Value> {
    items
        .iter()
        .map(|item| merge_item(item, cross_refs))
        .collect()
}

fn merge_item(item: &Value, cross_refs: &HashMap<String, Value>) -> Value {
    let Value::Object(fields) = item else {
        return item.clone();
    };

    let mut merged: Map<String, Value> = fields.clone();
    if let Some(Value::Object(extra)) = mal_id_of(item).and_then(|id| cross_refs.get(&id)) {
        for (name, value) in extra {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged.insert(
        TVDB_ID_FIELD.to_string(),
        tvdb_id_of(item).map_or(Value::Null, Value::String),
    );

    Value::Object(merged)
}
