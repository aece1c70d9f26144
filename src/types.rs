//! Core types for the reactive store.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Separator between path segments in leaf names.
pub const PATH_SEPARATOR: char = '.';

/// Default name of the tree root in leaf paths.
pub const DEFAULT_ROOT: &str = "store";

/// Join a parent path and a key into a dotted leaf path.
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, key)
    }
}

/// A leaf emission tagged with the leaf's path, as seen by middleware.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Dotted path from the tree root, e.g. `store.branch.leaf`.
    pub name: String,
    pub value: Value,
}

impl Envelope {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Decode the carried value.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// A single state mutation.
///
/// A reducer holds exactly one change (one insertion, one removal, one
/// increment) and may run more than once when several folds observe it.
pub struct Reducer<S> {
    f: Arc<dyn Fn(S) -> Result<S> + Send + Sync>,
}

impl<S> Clone for Reducer<S> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<S> fmt::Debug for Reducer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reducer({:p})", Arc::as_ptr(&self.f))
    }
}

impl<S> Reducer<S> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(S) -> Result<S> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Produce the next state from `state`.
    pub fn call(&self, state: S) -> Result<S> {
        (self.f)(state)
    }
}

/// An item of an update stream: either a whole state or a change to it.
#[derive(Clone, Debug)]
pub enum Update<S> {
    /// Replace the running state.
    Replace(S),
    /// Run a reducer against the running state.
    Reduce(Reducer<S>),
}

impl<S> Update<S> {
    /// Shorthand for `Update::Reduce(Reducer::new(f))`.
    pub fn reduce<F>(f: F) -> Self
    where
        F: Fn(S) -> Result<S> + Send + Sync + 'static,
    {
        Update::Reduce(Reducer::new(f))
    }
}

/// Short type name of a JSON value, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
