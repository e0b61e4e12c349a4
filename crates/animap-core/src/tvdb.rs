//! TheTVDB id extraction from dataset URLs.
//!
//! Dataset items link TheTVDB as `https://www.thetvdb.com/dereferrer/series/<id>`
//! or `.../dereferrer/season/<id>`. Both forms are reported under the same
//! `thetvdb` output field, so a season id is indistinguishable from a series id
//! downstream. Existing consumers depend on that conflation; keep it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Dataset field holding the TheTVDB URL.
pub const TVDB_URL_FIELD: &str = "thetvdb url";

static TVDB_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"series/(\d+)|season/(\d+)").unwrap());

/// Extract the numeric id from a TheTVDB URL.
///
/// The leftmost match wins; within it the series group is preferred over the
/// season group.
pub fn extract_tvdb_id(url: &str) -> Option<&str> {
    let caps = TVDB_ID_RE.captures(url)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

/// The extracted TheTVDB id of a dataset item, if its URL field yields one.
pub fn tvdb_id_of(item: &Value) -> Option<String> {
    item.get(TVDB_URL_FIELD)
        .and_then(Value::as_str)
        .and_then(extract_tvdb_id)
        .map(str::to_string)
}
