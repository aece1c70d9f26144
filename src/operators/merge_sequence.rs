//! Dynamic collections of streams.
//!
//! A collection starts from a seed that may mix live streams with raw
//! values. Raw values are turned into streams by a creator function; live
//! streams are kept as they are. After that, two channels drive membership:
//! inserts create a new member from a raw payload, removals drop one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::stream::{Item, Stream};
use crate::types::{value_kind, Reducer, Update};

const OPERATOR: &str = "merge_sequence";

/// Turns a raw value into a live stream.
pub type CreateFn<T> = Arc<dyn Fn(Value) -> Result<Stream<T>> + Send + Sync>;

/// One element of a seed: already live, or still raw.
#[derive(Clone, Debug)]
pub enum Member<T> {
    Live(Stream<T>),
    Raw(Value),
}

impl<T> From<Stream<T>> for Member<T> {
    fn from(stream: Stream<T>) -> Self {
        Member::Live(stream)
    }
}

impl<T> From<Value> for Member<T> {
    fn from(value: Value) -> Self {
        Member::Raw(value)
    }
}

/// The upstream value of [`merge_sequence`](Stream::merge_sequence).
///
/// `Other` holds anything that is neither an array nor an object and is
/// rejected when reconciled.
#[derive(Clone, Debug)]
pub enum Seed<T> {
    Sequence(Vec<Member<T>>),
    Map(BTreeMap<String, Member<T>>),
    Other(Value),
}

impl<T> Seed<T> {
    pub fn sequence<I, M>(members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<T>>,
    {
        Seed::Sequence(members.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, M>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: Into<Member<T>>,
    {
        Seed::Map(
            members
                .into_iter()
                .map(|(key, member)| (key.into(), member.into()))
                .collect(),
        )
    }
}

impl<T> From<Value> for Seed<T> {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Seed::Sequence(items.into_iter().map(Member::Raw).collect()),
            Value::Object(entries) => Seed::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Member::Raw(value)))
                    .collect(),
            ),
            other => Seed::Other(other),
        }
    }
}

/// A reconciled collection: every member is a stream.
///
/// Sequence members are positional and shift down on removal. Map keys stay
/// put until removed.
#[derive(Clone, Debug)]
pub enum Collection<T> {
    Sequence(Vec<Stream<T>>),
    Map(BTreeMap<String, Stream<T>>),
}

impl<T> Collection<T> {
    /// `"array"` or `"map"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Collection::Sequence(_) => "array",
            Collection::Map(_) => "map",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Collection::Sequence(members) => members.len(),
            Collection::Map(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_sequence(&self) -> Option<&[Stream<T>]> {
        match self {
            Collection::Sequence(members) => Some(members),
            Collection::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Stream<T>>> {
        match self {
            Collection::Map(members) => Some(members),
            Collection::Sequence(_) => None,
        }
    }
}

/// Payload of the insert channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Insert {
    /// Append a member created from the value (sequence mode).
    Push(Value),
    /// Create a member at the key, replacing any existing one (map mode).
    Set(String, Value),
}

impl From<Value> for Insert {
    fn from(value: Value) -> Self {
        Insert::Push(value)
    }
}

impl<K: Into<String>> From<(K, Value)> for Insert {
    fn from((key, value): (K, Value)) -> Self {
        Insert::Set(key.into(), value)
    }
}

/// Payload of the removal channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// Drop the member at this position (sequence mode). The position is
    /// resolved against the collection when the reducer runs.
    Index(usize),
    /// Drop the member at this key (map mode).
    Key(String),
}

impl From<usize> for Removal {
    fn from(index: usize) -> Self {
        Removal::Index(index)
    }
}

impl From<&str> for Removal {
    fn from(key: &str) -> Self {
        Removal::Key(key.to_string())
    }
}

impl From<String> for Removal {
    fn from(key: String) -> Self {
        Removal::Key(key)
    }
}

impl<T: Item> Stream<Seed<T>> {
    /// Reconcile every upstream seed into a [`Collection`] and keep it in
    /// sync with the insert and removal channels.
    ///
    /// For each seed, emits the reconciled collection as
    /// [`Update::Replace`], followed by one [`Update::Reduce`] per insert or
    /// removal event. Fold the result with [`apply`](Stream::apply).
    ///
    /// A seed that is neither a sequence nor a map fails the stream with
    /// [`StoreError::ShapeMismatch`]. An event whose payload does not fit the
    /// collection produces a reducer that fails with
    /// [`StoreError::PayloadMismatch`]. Creator errors surface from the
    /// reconciliation or from the insert reducer.
    pub fn merge_sequence<F>(
        &self,
        inserts: &Stream<Insert>,
        removals: &Stream<Removal>,
        create: F,
    ) -> Stream<Update<Collection<T>>>
    where
        F: Fn(Value) -> Result<Stream<T>> + Send + Sync + 'static,
    {
        let create: CreateFn<T> = Arc::new(create);
        let inserts = inserts.clone();
        let removals = removals.clone();

        self.try_merge_map(move |seed| {
            let baseline = reconcile(seed, &create)?;
            trace!(mode = baseline.kind(), len = baseline.len(), "Reconciled collection");

            let create = Arc::clone(&create);
            let inserted =
                inserts.map(move |insert| Update::Reduce(insert_reducer(insert, Arc::clone(&create))));
            let removed = removals.map(|removal| Update::Reduce(removal_reducer::<T>(removal)));

            Ok(Stream::merge_all(vec![
                Stream::just(Update::Replace(baseline)),
                inserted,
                removed,
            ]))
        })
    }
}

/// Replace every raw member with a created stream.
pub fn reconcile<T: Item>(seed: Seed<T>, create: &CreateFn<T>) -> Result<Collection<T>> {
    let realize = |member: Member<T>| match member {
        Member::Live(stream) => Ok(stream),
        Member::Raw(value) => create(value),
    };

    match seed {
        Seed::Sequence(members) => members
            .into_iter()
            .map(realize)
            .collect::<Result<Vec<_>>>()
            .map(Collection::Sequence),
        Seed::Map(members) => members
            .into_iter()
            .map(|(key, member)| -> Result<(String, Stream<T>)> { Ok((key, realize(member)?)) })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Collection::Map),
        Seed::Other(value) => {
            let found = value_kind(&value);
            debug!(found, "Rejecting collection seed");
            Err(StoreError::ShapeMismatch {
                operator: OPERATOR,
                found: found.to_string(),
            })
        }
    }
}

fn insert_reducer<T: Item>(insert: Insert, create: CreateFn<T>) -> Reducer<Collection<T>> {
    Reducer::new(move |state: Collection<T>| match (state, &insert) {
        (Collection::Sequence(members), Insert::Push(value)) => {
            push_member(members, value, &create).map(Collection::Sequence)
        }
        (Collection::Map(members), Insert::Set(key, value)) => {
            set_member(members, key, value, &create).map(Collection::Map)
        }
        (state, _) => Err(StoreError::PayloadMismatch {
            operator: OPERATOR,
            expected: state.kind(),
        }),
    })
}

fn removal_reducer<T: Item>(removal: Removal) -> Reducer<Collection<T>> {
    Reducer::new(move |state: Collection<T>| match (state, &removal) {
        (Collection::Sequence(members), Removal::Index(index)) => {
            Ok(Collection::Sequence(remove_index(members, *index)))
        }
        (Collection::Map(members), Removal::Key(key)) => Ok(Collection::Map(remove_key(members, key))),
        (state, _) => Err(StoreError::PayloadMismatch {
            operator: OPERATOR,
            expected: state.kind(),
        }),
    })
}

// --- Single-mode collections ---

/// Keep an already-reconciled sequence in sync with typed channels.
///
/// Like [`merge_sequence`](Stream::merge_sequence) for a collection known to
/// be a sequence: pushes carry the raw value, removals the index.
pub fn merge_array<T, F>(
    baseline: Vec<Stream<T>>,
    pushes: &Stream<Value>,
    removals: &Stream<usize>,
    create: F,
) -> Stream<Update<Vec<Stream<T>>>>
where
    T: Item,
    F: Fn(Value) -> Result<Stream<T>> + Send + Sync + 'static,
{
    let create: CreateFn<T> = Arc::new(create);
    let pushed = pushes.map(move |value| {
        let create = Arc::clone(&create);
        Update::reduce(move |members| push_member(members, &value, &create))
    });
    let removed = removals.map(|index| Update::reduce(move |members| Ok(remove_index(members, index))));

    Stream::merge_all(vec![Stream::just(Update::Replace(baseline)), pushed, removed])
}

/// Keep an already-reconciled map in sync with typed channels.
///
/// Sets carry `(key, raw value)`, removals the key.
pub fn merge_map<T, F>(
    baseline: BTreeMap<String, Stream<T>>,
    sets: &Stream<(String, Value)>,
    removals: &Stream<String>,
    create: F,
) -> Stream<Update<BTreeMap<String, Stream<T>>>>
where
    T: Item,
    F: Fn(Value) -> Result<Stream<T>> + Send + Sync + 'static,
{
    let create: CreateFn<T> = Arc::new(create);
    let set = sets.map(move |(key, value)| {
        let create = Arc::clone(&create);
        Update::reduce(move |members| set_member(members, &key, &value, &create))
    });
    let removed = removals.map(|key| Update::reduce(move |members| Ok(remove_key(members, &key))));

    Stream::merge_all(vec![Stream::just(Update::Replace(baseline)), set, removed])
}

fn push_member<T>(mut members: Vec<Stream<T>>, value: &Value, create: &CreateFn<T>) -> Result<Vec<Stream<T>>> {
    members.push(create(value.clone())?);
    Ok(members)
}

fn remove_index<T>(members: Vec<Stream<T>>, index: usize) -> Vec<Stream<T>> {
    members
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, member)| member)
        .collect()
}

fn set_member<T>(
    mut members: BTreeMap<String, Stream<T>>,
    key: &str,
    value: &Value,
    create: &CreateFn<T>,
) -> Result<BTreeMap<String, Stream<T>>> {
    members.insert(key.to_string(), create(value.clone())?);
    Ok(members)
}

fn remove_key<T>(mut members: BTreeMap<String, Stream<T>>, key: &str) -> BTreeMap<String, Stream<T>> {
    members.remove(key);
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Notification, Subject};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(value: Value) -> Result<Stream<Value>> {
        Ok(Stream::just(value))
    }

    fn first_value(stream: &Stream<Value>) -> Value {
        stream.listen(8).values().remove(0)
    }

    #[test]
    fn test_seed_from_value() {
        assert!(matches!(Seed::<Value>::from(json!([1, 2])), Seed::Sequence(m) if m.len() == 2));
        assert!(matches!(Seed::<Value>::from(json!({"a": 1})), Seed::Map(m) if m.len() == 1));
        assert!(matches!(Seed::<Value>::from(json!(0)), Seed::Other(_)));
    }

    #[test]
    fn test_reconcile_keeps_live_members() {
        let live = Stream::just(json!("y"));
        let seed = Seed::sequence(vec![Member::Raw(json!("x")), Member::Live(live.clone())]);
        let create: CreateFn<Value> = Arc::new(echo);

        let collection = reconcile(seed, &create).unwrap();
        let members = collection.as_sequence().unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(first_value(&members[0]), json!("x"));
        assert!(Stream::ptr_eq(&members[1], &live));
    }

    #[test]
    fn test_map_seed_keeps_live_members() {
        let live = Stream::just(json!("y"));
        let inserts = Subject::new();
        let removals: Subject<Removal> = Subject::new();
        let seed = Seed::map(vec![
            ("raw", Member::Raw(json!("x"))),
            ("live", Member::Live(live.clone())),
        ]);

        let handle = Stream::just(seed)
            .merge_sequence(&inserts.stream(), &removals.stream(), echo)
            .apply()
            .listen(8);
        inserts.next(Insert::Set("added".into(), json!("z")));

        let states = handle.values();
        assert_eq!(states.len(), 2);

        let reconciled = states[0].as_map().unwrap();
        assert_eq!(reconciled.len(), 2);
        assert_eq!(first_value(&reconciled["raw"]), json!("x"));
        assert!(Stream::ptr_eq(&reconciled["live"], &live));

        let grown = states[1].as_map().unwrap();
        assert_eq!(grown.len(), 3);
        assert!(Stream::ptr_eq(&grown["live"], &live));
        assert_eq!(first_value(&grown["added"]), json!("z"));
    }

    #[test]
    fn test_remove_index_out_of_range_is_noop() {
        let members = vec![Stream::just(json!(1)), Stream::just(json!(2))];
        assert_eq!(remove_index(members.clone(), 5).len(), 2);
        let remaining = remove_index(members, 0);
        assert_eq!(first_value(&remaining[0]), json!(2));
    }

    #[test]
    fn test_mismatched_payload_fails_reducer() {
        let create: CreateFn<Value> = Arc::new(echo);
        let reducer = insert_reducer(Insert::Set("k".into(), json!(1)), create);

        let err = reducer.call(Collection::Sequence(vec![])).unwrap_err();
        assert_eq!(
            err,
            StoreError::PayloadMismatch {
                operator: "merge_sequence",
                expected: "array"
            }
        );

        let err = removal_reducer::<Value>(Removal::Index(0))
            .call(Collection::Map(BTreeMap::new()))
            .unwrap_err();
        assert!(matches!(err, StoreError::PayloadMismatch { expected: "map", .. }));
    }

    #[test]
    fn test_creator_runs_when_reducer_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let inserts = Subject::new();
        let removals = Subject::new();

        let updates = Stream::just(Seed::sequence(Vec::<Member<Value>>::new())).merge_sequence(
            &inserts.stream(),
            &removals.stream(),
            move |value| {
                c.fetch_add(1, Ordering::SeqCst);
                echo(value)
            },
        );

        inserts.next(Insert::Push(json!("a")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let handle = updates.apply().listen(8);
        inserts.next(Insert::Push(json!("a")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.values().last().map(Collection::len), Some(1));
    }

    #[test]
    fn test_merge_array_typed_channels() {
        let pushes = Subject::new();
        let removals = Subject::new();
        let handle = merge_array(vec![], &pushes.stream(), &removals.stream(), echo)
            .apply()
            .listen(8);

        pushes.next(json!("first"));
        pushes.next(json!("second"));
        removals.next(0);

        let states = handle.values();
        let lens: Vec<usize> = states.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![0, 1, 2, 1]);
        assert_eq!(first_value(&states[3][0]), json!("second"));
    }

    #[test]
    fn test_merge_map_overwrites_key() {
        let sets = Subject::new();
        let removals: Subject<String> = Subject::new();
        let handle = merge_map(BTreeMap::new(), &sets.stream(), &removals.stream(), echo)
            .apply()
            .listen(8);

        sets.next(("k".to_string(), json!(1)));
        sets.next(("k".to_string(), json!(2)));

        let states = handle.values();
        let last = states.last().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(first_value(&last["k"]), json!(2));
    }

    #[test]
    fn test_shape_error_names_operator() {
        let inserts: Subject<Insert> = Subject::new();
        let removals: Subject<Removal> = Subject::new();
        let events = Stream::just(Seed::<Value>::from(json!(0)))
            .merge_sequence(&inserts.stream(), &removals.stream(), echo)
            .listen(8)
            .drain();

        assert_eq!(events.len(), 1);
        match &events[0] {
            Notification::Error(err) => {
                assert!(err.to_string().contains("\"merge_sequence\""));
                assert!(err.to_string().contains("array or a plain object"));
            }
            other => panic!("Expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_seed_replaces_collection() {
        let seeds: Subject<Seed<Value>> = Subject::new();
        let inserts = Subject::new();
        let removals: Subject<Removal> = Subject::new();
        let handle = seeds
            .stream()
            .merge_sequence(&inserts.stream(), &removals.stream(), echo)
            .listen(8);

        seeds.next(Seed::from(json!(["a"])));
        inserts.next(Insert::Push(json!("b")));
        seeds.next(Seed::from(json!({"k": 1})));

        let updates = handle.values();
        assert_eq!(updates.len(), 3);
        assert!(matches!(&updates[0], Update::Replace(Collection::Sequence(m)) if m.len() == 1));
        assert!(matches!(&updates[1], Update::Reduce(_)));
        match &updates[2] {
            Update::Replace(collection) => {
                let members = collection.as_map().unwrap();
                assert_eq!(members.len(), 1);
                assert_eq!(first_value(&members["k"]), json!(1));
            }
            other => panic!("Expected a replacement, got {:?}", other),
        }
        assert!(!handle.is_closed());
    }

    #[test]
    fn test_later_scalar_seed_fails() {
        let seeds: Subject<Seed<Value>> = Subject::new();
        let inserts: Subject<Insert> = Subject::new();
        let removals: Subject<Removal> = Subject::new();
        let handle = seeds
            .stream()
            .merge_sequence(&inserts.stream(), &removals.stream(), echo)
            .listen(8);

        seeds.next(Seed::from(json!(["a"])));
        seeds.next(Seed::from(json!(5)));

        let events = handle.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Notification::Next(Update::Replace(_))));
        match &events[1] {
            Notification::Error(err) => assert_eq!(
                *err,
                StoreError::ShapeMismatch {
                    operator: "merge_sequence",
                    found: "number".to_string()
                }
            ),
            other => panic!("Expected shape error, got {:?}", other),
        }
        assert!(handle.is_closed());
        assert_eq!(inserts.observer_count(), 0);
    }
}
