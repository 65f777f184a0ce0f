//! Workflow context threaded through every agent
//!
//! The context is a persistent ordered map from string keys to JSON values:
//! - `clone()` is O(1) and yields an independent snapshot (structural sharing)
//! - typed reads and writes go through serde
//! - keys are added or overwritten, never removed by combinators
//! - every write marks its key; [`WorkflowContext::fork`] starts a clean
//!   write set, so a branch's output names exactly the keys it wrote

use crate::error::ContextError;
use im::{OrdMap, OrdSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key under which Parallel records per-branch failures
pub const ERRORS_KEY: &str = "errors";

/// Shared workflow state
///
/// Equality and serialization cover the values only, not the write set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowContext {
    values: OrdMap<String, Value>,
    #[serde(skip)]
    written: OrdSet<String>,
}

impl PartialEq for WorkflowContext {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl WorkflowContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no keys
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check key presence
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Snapshot for a branch: same values, empty write set
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            values: self.values.clone(),
            written: OrdSet::new(),
        }
    }

    /// Keys written since creation or the last [`fork`](Self::fork), in order
    pub fn written_keys(&self) -> impl Iterator<Item = &str> {
        self.written.iter().map(String::as_str)
    }

    /// Raw JSON value for a key
    #[inline]
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; `Ok(None)` when absent or explicitly null
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ContextError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Typed read that fails when the key is absent
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        self.get(key)?
            .ok_or_else(|| ContextError::MissingKey(key.to_string()))
    }

    /// Typed read with a fallback for absent keys
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ContextError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Boolean flag; absent or non-boolean values read as `false`
    #[inline]
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(Value::Bool(true)))
    }

    /// Typed write, overwriting any previous value
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ContextError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| ContextError::Encode {
            key: key.clone(),
            source,
        })?;
        self.put(key, value);
        Ok(())
    }

    /// Raw JSON write
    #[inline]
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.put(key.into(), value);
    }

    /// Builder-style typed write
    pub fn with<T: Serialize + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, ContextError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Write `value` only if the key is absent
    pub fn set_default(&mut self, key: &str, value: Value) {
        if !self.values.contains_key(key) {
            self.put(key.to_string(), value);
        }
    }

    /// Append to a list-valued key, creating the list if absent
    pub fn push<T: Serialize + ?Sized>(&mut self, key: &str, item: &T) -> Result<(), ContextError> {
        let item = serde_json::to_value(item).map_err(|source| ContextError::Encode {
            key: key.to_string(),
            source,
        })?;
        let mut list = match self.values.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(ContextError::Malformed {
                    key: key.to_string(),
                    expected: "a list",
                })
            }
        };
        list.push(item);
        self.put(key.to_string(), Value::Array(list));
        Ok(())
    }

    /// Record a branch failure under `errors[agent]`
    pub fn record_error(
        &mut self,
        agent: &str,
        message: impl Into<String>,
    ) -> Result<(), ContextError> {
        let mut errors = self.error_map()?;
        errors.insert(agent.to_string(), Value::String(message.into()));
        self.put(ERRORS_KEY.to_string(), Value::Object(errors));
        Ok(())
    }

    /// Recorded branch failures keyed by agent name
    #[must_use]
    pub fn errors(&self) -> BTreeMap<String, String> {
        match self.values.get(ERRORS_KEY) {
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(agent, message)| {
                    let text = message
                        .as_str()
                        .map_or_else(|| message.to_string(), str::to_string);
                    (agent.clone(), text)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Entries `self` wrote since creation or the last fork
    pub fn written_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.written
            .iter()
            .filter_map(|key| self.values.get(key).map(|value| (key.as_str(), value)))
    }

    /// Apply every key `output` wrote, even when the value equals ours
    ///
    /// Nested `errors` maps are unioned instead of replaced. Absorbed keys
    /// count as writes of `self`.
    pub fn absorb(&mut self, output: &WorkflowContext) -> Result<(), ContextError> {
        for (key, value) in output.written_entries() {
            if key == ERRORS_KEY {
                let Value::Object(entries) = value else {
                    return Err(ContextError::Malformed {
                        key: ERRORS_KEY.to_string(),
                        expected: "a map of agent name to message",
                    });
                };
                let mut errors = self.error_map()?;
                errors.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.put(ERRORS_KEY.to_string(), Value::Object(errors));
            } else {
                self.put(key.to_string(), value.clone());
            }
        }
        Ok(())
    }

    fn put(&mut self, key: String, value: Value) {
        self.written.insert(key.clone());
        self.values.insert(key, value);
    }

    fn error_map(&self) -> Result<Map<String, Value>, ContextError> {
        match self.values.get(ERRORS_KEY) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(entries)) => Ok(entries.clone()),
            Some(_) => Err(ContextError::Malformed {
                key: ERRORS_KEY.to_string(),
                expected: "a map of agent name to message",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_round_trip() {
        let mut ctx = WorkflowContext::new();
        ctx.insert("severity", "P2").unwrap();
        ctx.insert("attempts", &3_u32).unwrap();

        assert_eq!(ctx.get::<String>("severity").unwrap().as_deref(), Some("P2"));
        assert_eq!(ctx.require::<u32>("attempts").unwrap(), 3);
        assert!(ctx.get::<u32>("missing").unwrap().is_none());
    }

    #[test]
    fn require_reports_missing_key() {
        let ctx = WorkflowContext::new();
        let err = ctx.require::<String>("alert").unwrap_err();
        assert!(matches!(err, ContextError::MissingKey(key) if key == "alert"));
    }

    #[test]
    fn decode_mismatch_is_an_error() {
        let ctx = WorkflowContext::new().with("count", "three").unwrap();
        assert!(matches!(
            ctx.get::<u32>("count"),
            Err(ContextError::Decode { .. })
        ));
    }

    #[test]
    fn snapshots_are_independent() {
        let base = WorkflowContext::new().with("a", &1).unwrap();
        let mut branch = base.clone();
        branch.insert("a", &2).unwrap();
        branch.insert("b", &3).unwrap();

        assert_eq!(base.require::<i32>("a").unwrap(), 1);
        assert!(!base.contains_key("b"));
    }

    #[test]
    fn set_default_keeps_existing() {
        let mut ctx = WorkflowContext::new().with("n", &5).unwrap();
        ctx.set_default("n", json!(0));
        ctx.set_default("m", json!(0));
        assert_eq!(ctx.get_value("n"), Some(&json!(5)));
        assert_eq!(ctx.get_value("m"), Some(&json!(0)));
    }

    #[test]
    fn push_appends_and_rejects_scalars() {
        let mut ctx = WorkflowContext::new();
        ctx.push("actions", "restart").unwrap();
        ctx.push("actions", "scale").unwrap();
        assert_eq!(
            ctx.require::<Vec<String>>("actions").unwrap(),
            vec!["restart".to_string(), "scale".to_string()]
        );

        ctx.insert("flag", &true).unwrap();
        assert!(matches!(
            ctx.push("flag", "x"),
            Err(ContextError::Malformed { .. })
        ));
    }

    #[test]
    fn flag_reads_only_true_booleans() {
        let ctx = WorkflowContext::new()
            .with("yes", &true)
            .unwrap()
            .with("text", "true")
            .unwrap();
        assert!(ctx.flag("yes"));
        assert!(!ctx.flag("text"));
        assert!(!ctx.flag("absent"));
    }

    #[test]
    fn fork_tracks_only_its_own_writes() {
        let base = WorkflowContext::new().with("a", &1).unwrap().with("b", &2).unwrap();
        let mut out = base.fork();
        assert_eq!(out.written_keys().count(), 0);

        out.insert("b", &2).unwrap();
        out.insert("c", &30).unwrap();
        let written: Vec<&str> = out.written_keys().collect();
        assert_eq!(written, vec!["b", "c"]);
        assert_eq!(out.written_entries().count(), 2);
        assert_eq!(base.written_keys().count(), 2);
    }

    #[test]
    fn equality_ignores_write_set() {
        let ctx = WorkflowContext::new().with("a", &1).unwrap();
        assert_eq!(ctx.fork(), ctx);
    }

    #[test]
    fn absorb_applies_rewrites_of_unchanged_values() {
        let base = WorkflowContext::new().with("status", "pending").unwrap();
        let mut merged = base.fork();
        merged.insert("status", "done").unwrap();

        let mut output = base.fork();
        output.insert("status", "pending").unwrap();
        merged.absorb(&output).unwrap();
        assert_eq!(merged.require::<String>("status").unwrap(), "pending");
    }

    #[test]
    fn absorb_unions_error_maps() {
        let base = WorkflowContext::new();
        let mut merged = base.fork();
        merged.record_error("first", "boom").unwrap();

        let mut output = base.fork();
        output.record_error("nested", "bang").unwrap();
        merged.absorb(&output).unwrap();

        let errors = merged.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors["first"], "boom");
        assert_eq!(errors["nested"], "bang");
    }

    #[test]
    fn record_error_rejects_malformed_map() {
        let mut ctx = WorkflowContext::new().with(ERRORS_KEY, "oops").unwrap();
        assert!(ctx.record_error("agent", "msg").is_err());
    }
}
