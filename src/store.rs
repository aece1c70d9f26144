//! The store: a live tree of shared leaf streams built from a [`Spec`].

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::middleware::Middleware;
use crate::stream::Stream;
use crate::tree::{require_leaf, LiveNode, LiveTree, Spec, SpecNode};
use crate::types::{join_path, Envelope, DEFAULT_ROOT};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Name of the tree root in leaf paths.
    pub root: String,

    /// Preloaded state, mirrored by path onto the specification.
    pub preloaded: Option<Value>,

    /// Middlewares applied to every leaf, in order.
    pub middlewares: Vec<Middleware>,

    /// Whether ready-made stream leaves are seeded with their preloaded value.
    ///
    /// A seeded leaf emits the preloaded value first and drops the source's
    /// first emission, which is assumed to duplicate the seed. Creator leaves
    /// receive their preloaded value directly and are never seeded.
    pub seed_streams: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            preloaded: None,
            middlewares: Vec::new(),
            seed_streams: false,
        }
    }
}

/// A tree of shared leaf streams.
///
/// Every leaf is multicast, so subscribers anywhere in an application see
/// the same values instead of re-running the leaf's source. The tree can
/// grow after construction through [`add`](Store::add),
/// [`merge`](Store::merge) and [`attach`](Store::attach); new leaves pick up
/// the same preloaded state and middleware chain as the existing ones.
pub struct Store {
    config: StoreConfig,
    tree: RwLock<LiveTree>,
}

impl Store {
    pub fn new(spec: &Spec) -> Result<Self> {
        Self::with_config(spec, StoreConfig::default())
    }

    pub fn with_state(spec: &Spec, preloaded: Value) -> Result<Self> {
        Self::with_config(
            spec,
            StoreConfig {
                preloaded: Some(preloaded),
                ..Default::default()
            },
        )
    }

    pub fn with_middlewares(spec: &Spec, middlewares: Vec<Middleware>) -> Result<Self> {
        Self::with_config(
            spec,
            StoreConfig {
                middlewares,
                ..Default::default()
            },
        )
    }

    pub fn with_state_and_middlewares(
        spec: &Spec,
        preloaded: Value,
        middlewares: Vec<Middleware>,
    ) -> Result<Self> {
        Self::with_config(
            spec,
            StoreConfig {
                preloaded: Some(preloaded),
                middlewares,
                ..Default::default()
            },
        )
    }

    /// Build a store from a specification.
    ///
    /// Fails if a creator fails.
    pub fn with_config(spec: &Spec, config: StoreConfig) -> Result<Self> {
        let tree = initialize(&config, spec)?;
        debug!(
            root = %config.root,
            leaves = tree.leaf_count(),
            middlewares = config.middlewares.len(),
            "Store initialized"
        );

        Ok(Self {
            config,
            tree: RwLock::new(tree),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Snapshot of the live tree.
    ///
    /// The snapshot shares its leaf streams with the store, so the same leaf
    /// read twice is the same stream. Later extensions of the store are not
    /// reflected in an earlier snapshot.
    pub fn tree(&self) -> LiveTree {
        self.tree.read().clone()
    }

    /// Look up a leaf by dotted path below the root, e.g. `"nested1.nested2"`.
    pub fn leaf(&self, path: &str) -> Result<Stream<Value>> {
        require_leaf(&self.tree.read(), path)
    }

    // --- Extension ---

    /// Build `node` and install it as the top-level entry `key`.
    pub fn add(&self, key: impl Into<String>, node: impl Into<SpecNode>) -> Result<()> {
        let key = key.into();
        debug!(%key, "Adding store entry");
        self.merge(&Spec::new().node(key, node))
    }

    /// Build `spec` and overlay its top-level entries onto the tree.
    ///
    /// Entries with the same key are replaced; all others keep their leaves.
    pub fn merge(&self, spec: &Spec) -> Result<()> {
        // Creators run outside the lock.
        let fragment = initialize(&self.config, spec)?;
        debug!(
            keys = fragment.len(),
            leaves = fragment.leaf_count(),
            "Merging store fragment"
        );
        self.tree.write().overlay(fragment);
        Ok(())
    }

    /// Same as [`merge`](Store::merge).
    pub fn attach(&self, spec: &Spec) -> Result<()> {
        self.merge(spec)
    }
}

fn initialize(config: &StoreConfig, spec: &Spec) -> Result<LiveTree> {
    build(config, spec, config.preloaded.as_ref(), &config.root)
}

fn build(config: &StoreConfig, spec: &Spec, state: Option<&Value>, path: &str) -> Result<LiveTree> {
    let mut tree = LiveTree::new();

    for (key, node) in spec {
        let path = join_path(path, key);
        // `Value::get` yields None for non-objects; null counts as absent.
        let slice = state.and_then(|s| s.get(key)).filter(|v| !v.is_null());

        let live = match node {
            SpecNode::Creator(creator) => {
                let stream = creator.call(slice.cloned()).map_err(|e| {
                    warn!(%path, error = %e, "Creator failed");
                    e
                })?;
                LiveNode::Leaf(decorate(config, stream, None, &path))
            }
            SpecNode::Stream(stream) => {
                let seed = if config.seed_streams { slice.cloned() } else { None };
                LiveNode::Leaf(decorate(config, stream.clone(), seed, &path))
            }
            SpecNode::Branch(branch) => LiveNode::Branch(build(config, branch, slice, &path)?),
        };
        tree.insert(key.clone(), live);
    }

    Ok(tree)
}

/// Share a leaf, seed it, and run it through the middleware chain.
fn decorate(config: &StoreConfig, stream: Stream<Value>, seed: Option<Value>, path: &str) -> Stream<Value> {
    let shared = stream.share();

    let initialized = match seed {
        Some(seed) => shared.start_with(seed).filter_indexed(|_, index| index != 1),
        None => shared,
    };

    if config.middlewares.is_empty() {
        trace!(%path, "Leaf decorated");
        return initialized;
    }

    let name = path.to_string();
    let tagged = initialized.map(move |value| Envelope::new(name.clone(), value));
    let piped = config
        .middlewares
        .iter()
        .fold(tagged, |stream, middleware| middleware.apply(stream));
    trace!(%path, middlewares = config.middlewares.len(), "Leaf decorated");

    piped.map(|envelope: Envelope| envelope.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::stream::{Subject, Subscriber, DEFAULT_LISTEN_BUFFER};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn first(stream: &Stream<Value>) -> Value {
        stream.take(1).listen(DEFAULT_LISTEN_BUFFER).values().remove(0)
    }

    #[test]
    fn test_creator_receives_state_by_path() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let spec = Spec::new().branch(
            "a",
            Spec::new().creator("b", move |state| {
                *s.lock() = state.clone();
                Ok(Stream::just(state.unwrap_or(json!(0))))
            }),
        );

        let store = Store::with_state(&spec, json!({"a": {"b": 5}})).unwrap();

        assert_eq!(*seen.lock(), Some(json!(5)));
        assert_eq!(first(&store.leaf("a.b").unwrap()), json!(5));
    }

    #[test]
    fn test_null_and_scalar_state_count_as_absent() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);
        let spec = Spec::new()
            .creator("x", {
                let c = Arc::clone(&c);
                move |state| {
                    c.lock().push(state);
                    Ok(Stream::empty())
                }
            })
            .branch(
                "y",
                Spec::new().creator("z", move |state| {
                    c.lock().push(state);
                    Ok(Stream::empty())
                }),
            );

        Store::with_state(&spec, json!({"x": null, "y": 3})).unwrap();

        assert_eq!(*calls.lock(), vec![None, None]);
    }

    #[test]
    fn test_leaves_are_shared() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let subject = Subject::new();
        let counter = Arc::clone(&subscriptions);
        let source = subject.stream();
        let spec = Spec::new().stream(
            "n",
            Stream::new(move |down: Subscriber<Value>| {
                counter.fetch_add(1, Ordering::SeqCst);
                source.subscribe_with(down);
            }),
        );
        let store = Store::new(&spec).unwrap();
        let leaf = store.leaf("n").unwrap();

        let a = leaf.listen(8);
        let b = store.tree().leaf("n").unwrap().listen(8);
        subject.next(json!(1));

        assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
        assert_eq!(a.values(), vec![json!(1)]);
        assert_eq!(b.values(), vec![json!(1)]);
    }

    #[test]
    fn test_streams_are_not_seeded_by_default() {
        let spec = Spec::new().stream("simple", Stream::just(json!(1)));
        let store = Store::with_state(&spec, json!({"simple": 1000})).unwrap();

        assert_eq!(store.leaf("simple").unwrap().listen(8).values(), vec![json!(1)]);
    }

    #[test]
    fn test_seeded_stream_replaces_duplicate_first_value() {
        let spec = Spec::new().stream("n", Stream::of(vec![json!(0), json!(5)]));
        let config = StoreConfig {
            preloaded: Some(json!({"n": 0})),
            seed_streams: true,
            ..Default::default()
        };
        let store = Store::with_config(&spec, config).unwrap();

        assert_eq!(store.leaf("n").unwrap().listen(8).values(), vec![json!(0), json!(5)]);
    }

    #[test]
    fn test_seeded_stream_drops_first_value_even_when_it_differs() {
        let spec = Spec::new().stream("n", Stream::of(vec![json!(1), json!(2)]));
        let config = StoreConfig {
            preloaded: Some(json!({"n": 0})),
            seed_streams: true,
            ..Default::default()
        };
        let store = Store::with_config(&spec, config).unwrap();

        // The source's first value is suppressed whether or not it matches.
        assert_eq!(store.leaf("n").unwrap().listen(8).values(), vec![json!(0), json!(2)]);
    }

    #[test]
    fn test_middleware_sees_leaf_paths() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let record = Middleware::tap("record", move |envelope| s.lock().push(envelope.clone()));
        let spec = Spec::new()
            .branch("nested1", Spec::new().creator("nested2", |_| Ok(Stream::just(json!(100)))))
            .stream("simple", Stream::just(json!(1)));

        let store = Store::with_middlewares(&spec, vec![record]).unwrap();
        assert_eq!(first(&store.leaf("nested1.nested2").unwrap()), json!(100));
        assert_eq!(first(&store.leaf("simple").unwrap()), json!(1));

        assert_eq!(
            *seen.lock(),
            vec![
                Envelope::new("store.nested1.nested2", json!(100)),
                Envelope::new("store.simple", json!(1)),
            ]
        );
    }

    #[test]
    fn test_middlewares_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
        let m1 = Middleware::tap("m1", move |_| o1.lock().push("m1"));
        let m2 = Middleware::tap("m2", move |_| o2.lock().push("m2"));
        let spec = Spec::new().stream("a", Stream::just(json!(1)));

        let store = Store::with_middlewares(&spec, vec![m1, m2]).unwrap();
        store.leaf("a").unwrap().listen(8);

        assert_eq!(*order.lock(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_custom_root_in_paths() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let config = StoreConfig {
            root: "app".to_string(),
            middlewares: vec![Middleware::tap("record", move |e| s.lock().push(e.name.clone()))],
            ..Default::default()
        };
        let store = Store::with_config(&Spec::new().stream("a", Stream::just(json!(1))), config).unwrap();
        store.leaf("a").unwrap().listen(8);

        assert_eq!(*seen.lock(), vec!["app.a".to_string()]);
    }

    #[test]
    fn test_add_installs_entry_with_state() {
        let spec = Spec::new().stream("simple", Stream::just(json!(1)));
        let store = Store::with_state(&spec, json!({"extra": {"value": "preloaded"}})).unwrap();

        store
            .add(
                "extra",
                Spec::new().creator("value", |state| Ok(Stream::just(state.unwrap_or(json!("none"))))),
            )
            .unwrap();

        assert_eq!(store.tree().shape(), json!({"simple": null, "extra": {"value": null}}));
        assert_eq!(first(&store.leaf("extra.value").unwrap()), json!("preloaded"));
    }

    #[test]
    fn test_creator_failure_fails_construction() {
        let spec = Spec::new().creator("bad", |_| Err(StoreError::Creator("boom".into())));

        assert_eq!(
            Store::new(&spec).err(),
            Some(StoreError::Creator("boom".into()))
        );
    }

    #[test]
    fn test_failed_merge_leaves_tree_untouched() {
        let store = Store::new(&Spec::new().stream("a", Stream::just(json!(1)))).unwrap();
        let failing = Spec::new()
            .stream("b", Stream::just(json!(2)))
            .creator("c", |_| Err(StoreError::Creator("boom".into())));

        assert!(store.merge(&failing).is_err());
        assert_eq!(store.tree().shape(), json!({"a": null}));
    }

    #[test]
    fn test_missing_leaf() {
        let store = Store::new(&Spec::new()).unwrap();
        assert_eq!(
            store.leaf("nope").unwrap_err(),
            StoreError::LeafNotFound("nope".into())
        );
        assert!(store.tree().is_empty());
    }
}
