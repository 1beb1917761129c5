// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The event record shipped from inputs to outputs.
//!
//! An event is a flat JSON object with a small set of mandatory fields
//! (`@version`, `@timestamp`, `source`, `host`, `file`, `type`, `tags`,
//! `line`) plus whatever the input or the `add_field` configuration merges
//! in. The `type` field is the routing key used to bind inputs to outputs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single log event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Build a plain-format event from a raw text payload.
    ///
    /// `timestamp` is expected in `YYYY-MM-DDTHH:MM:SS.mmmZ` form (see
    /// [`crate::TimestampCache`]); `path` is the tailed file or a synthetic
    /// name for network inputs.
    pub fn plain(
        timestamp: &str,
        host: &str,
        path: &str,
        event_type: &str,
        tags: &[String],
        line: impl Into<String>,
    ) -> Self {
        let mut map = Map::new();
        map.insert("@version".into(), Value::from("1"));
        map.insert("@timestamp".into(), Value::from(timestamp));
        map.insert("source".into(), Value::from(format!("file://{}{}", host, path)));
        map.insert("host".into(), Value::from(host));
        map.insert("file".into(), Value::from(path));
        map.insert("type".into(), Value::from(event_type));
        map.insert(
            "tags".into(),
            Value::Array(tags.iter().map(|t| Value::from(t.as_str())).collect()),
        );
        map.insert("line".into(), Value::from(line.into()));
        Self(map)
    }

    /// Build an event from a pre-parsed JSON object (`format = "json"`
    /// inputs). The declared input type is only applied when the payload
    /// does not carry its own `type`.
    pub fn from_json_object(mut map: Map<String, Value>, declared_type: Option<&str>) -> Self {
        if !map.contains_key("type") {
            if let Some(t) = declared_type {
                map.insert("type".into(), Value::from(t));
            }
        }
        if !map.contains_key("@version") {
            map.insert("@version".into(), Value::from("1"));
        }
        Self(map)
    }

    /// The routing key, if present.
    pub fn event_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merge static `add_field` entries. Existing keys are overwritten,
    /// matching the enrichment order: input fields first, configuration last.
    pub fn merge_fields<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        for (k, v) in fields {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Append tags to the (possibly missing) `tags` array.
    pub fn extend_tags(&mut self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        let entry = self
            .0
            .entry("tags".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = entry {
            arr.extend(tags.iter().map(|t| Value::from(t.as_str())));
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        // A flat map of JSON values cannot fail to serialize.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Flatten to string pairs for the version-1 Lumberjack data frame.
    /// String values pass through as-is, everything else is JSON-encoded.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), s)
            })
            .collect()
    }

    /// Rebuild an event from decoded string pairs (version-1 data frame).
    /// `tags` is recovered as an array when it parses as one.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut map = Map::new();
        for (k, v) in pairs {
            if k == "tags" {
                if let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(&v) {
                    map.insert(k, Value::Array(arr));
                    continue;
                }
            }
            map.insert(k, Value::from(v));
        }
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
