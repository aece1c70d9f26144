//! Specification trees and the live trees built from them.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::stream::{Item, Stream};
use crate::types::PATH_SEPARATOR;

type CreatorFn = dyn Fn(Option<Value>) -> Result<Stream<Value>> + Send + Sync;

/// Builds a leaf stream, optionally from a preloaded value.
#[derive(Clone)]
pub struct Creator {
    f: Arc<CreatorFn>,
}

impl Creator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Stream<Value>> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Adapt a creator over serde types.
    ///
    /// The preloaded value is decoded into `S` and every emitted `U` is
    /// encoded back to JSON. Decoding or encoding failures surface as
    /// [`StoreError::Serialization`].
    pub fn typed<S, U, F>(f: F) -> Self
    where
        S: DeserializeOwned + 'static,
        U: Serialize + Item,
        F: Fn(Option<S>) -> Stream<U> + Send + Sync + 'static,
    {
        Self::new(move |preloaded| {
            let state = preloaded.map(serde_json::from_value::<S>).transpose()?;
            Ok(f(state).try_map(|value| Ok(serde_json::to_value(value)?)))
        })
    }

    pub fn call(&self, preloaded: Option<Value>) -> Result<Stream<Value>> {
        (self.f)(preloaded)
    }
}

impl fmt::Debug for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Creator({:p})", Arc::as_ptr(&self.f))
    }
}

/// One node of a specification.
#[derive(Clone, Debug)]
pub enum SpecNode {
    /// A ready-made leaf stream.
    Stream(Stream<Value>),
    /// A leaf built from the preloaded value at its path.
    Creator(Creator),
    /// A nested mapping.
    Branch(Spec),
}

impl From<Stream<Value>> for SpecNode {
    fn from(stream: Stream<Value>) -> Self {
        SpecNode::Stream(stream)
    }
}

impl From<Creator> for SpecNode {
    fn from(creator: Creator) -> Self {
        SpecNode::Creator(creator)
    }
}

impl From<Spec> for SpecNode {
    fn from(spec: Spec) -> Self {
        SpecNode::Branch(spec)
    }
}

/// A declarative tree of leaf sources, keyed by name.
///
/// # Example
///
/// ```ignore
/// let spec = Spec::new()
///     .stream("simple", Stream::just(json!(1)))
///     .branch("nested", Spec::new().creator("count", |state| {
///         Ok(Stream::just(state.unwrap_or(json!(100))))
///     }));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Spec {
    nodes: BTreeMap<String, SpecNode>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node.
    pub fn node(mut self, key: impl Into<String>, node: impl Into<SpecNode>) -> Self {
        self.nodes.insert(key.into(), node.into());
        self
    }

    pub fn stream(self, key: impl Into<String>, stream: Stream<Value>) -> Self {
        self.node(key, SpecNode::Stream(stream))
    }

    pub fn creator<F>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Stream<Value>> + Send + Sync + 'static,
    {
        self.node(key, SpecNode::Creator(Creator::new(f)))
    }

    pub fn branch(self, key: impl Into<String>, spec: Spec) -> Self {
        self.node(key, SpecNode::Branch(spec))
    }

    pub fn get(&self, key: &str) -> Option<&SpecNode> {
        self.nodes.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, SpecNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The tree structure with every leaf rendered as `null`.
    pub fn shape(&self) -> Value {
        let mut shape = Map::new();
        for (key, node) in &self.nodes {
            let rendered = match node {
                SpecNode::Branch(spec) => spec.shape(),
                SpecNode::Stream(_) | SpecNode::Creator(_) => Value::Null,
            };
            shape.insert(key.clone(), rendered);
        }
        Value::Object(shape)
    }
}

impl<'a> IntoIterator for &'a Spec {
    type Item = (&'a String, &'a SpecNode);
    type IntoIter = btree_map::Iter<'a, String, SpecNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One node of a live tree.
#[derive(Clone, Debug)]
pub enum LiveNode {
    Leaf(Stream<Value>),
    Branch(LiveTree),
}

impl LiveNode {
    pub fn as_leaf(&self) -> Option<&Stream<Value>> {
        match self {
            LiveNode::Leaf(stream) => Some(stream),
            LiveNode::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&LiveTree> {
        match self {
            LiveNode::Branch(tree) => Some(tree),
            LiveNode::Leaf(_) => None,
        }
    }
}

/// A tree shaped like its specification, with a shared stream at every leaf.
///
/// Cloning is shallow: clones share the same leaf streams.
#[derive(Clone, Debug, Default)]
pub struct LiveTree {
    nodes: BTreeMap<String, LiveNode>,
}

impl LiveTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, node: LiveNode) -> Option<LiveNode> {
        self.nodes.insert(key.into(), node)
    }

    pub fn get(&self, key: &str) -> Option<&LiveNode> {
        self.nodes.get(key)
    }

    /// Look up a leaf by dotted path relative to this tree, e.g. `"a.b"`.
    pub fn leaf(&self, path: &str) -> Option<&Stream<Value>> {
        self.node_at(path).and_then(LiveNode::as_leaf)
    }

    /// Look up a branch by dotted path relative to this tree.
    pub fn branch(&self, path: &str) -> Option<&LiveTree> {
        self.node_at(path).and_then(LiveNode::as_branch)
    }

    fn node_at(&self, path: &str) -> Option<&LiveNode> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut node = self.nodes.get(segments.next()?)?;
        for segment in segments {
            node = node.as_branch()?.nodes.get(segment)?;
        }
        Some(node)
    }

    /// Copy every top-level entry of `other` over this tree.
    pub fn overlay(&mut self, other: LiveTree) {
        self.nodes.extend(other.nodes);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, LiveNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaves in the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .values()
            .map(|node| match node {
                LiveNode::Leaf(_) => 1,
                LiveNode::Branch(tree) => tree.leaf_count(),
            })
            .sum()
    }

    /// The tree structure with every leaf rendered as `null`.
    pub fn shape(&self) -> Value {
        let mut shape = Map::new();
        for (key, node) in &self.nodes {
            let rendered = match node {
                LiveNode::Branch(tree) => tree.shape(),
                LiveNode::Leaf(_) => Value::Null,
            };
            shape.insert(key.clone(), rendered);
        }
        Value::Object(shape)
    }
}

impl<'a> IntoIterator for &'a LiveTree {
    type Item = (&'a String, &'a LiveNode);
    type IntoIter = btree_map::Iter<'a, String, LiveNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lookup helper returning an error instead of `None`.
pub(crate) fn require_leaf(tree: &LiveTree, path: &str) -> Result<Stream<Value>> {
    tree.leaf(path)
        .cloned()
        .ok_or_else(|| StoreError::LeafNotFound(path.to_string()))
}
