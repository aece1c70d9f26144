//! # Reactive Store
//!
//! A state container built from a tree of event streams.
//!
//! ## Core Concepts
//!
//! - **Leaves**: shared streams, each computed once and fanned out to every
//!   subscriber
//! - **Spec**: a declarative tree of ready-made streams, creators and branches
//! - **Preloaded state**: mirrored by path onto the tree and handed to creators
//! - **Middleware**: stream transforms applied to every leaf, in order
//! - **Collections**: streams of child streams grown and shrunk by insert and
//!   removal channels
//!
//! ## Example
//!
//! ```ignore
//! use reactive_store::{ChannelRegistry, Insert, Removal, Seed, Spec, Store, Stream};
//! use serde_json::json;
//!
//! let inserts = ChannelRegistry::new();
//! let removals = ChannelRegistry::new();
//!
//! let todos = Stream::just(Seed::from(json!(["write docs"])))
//!     .merge_sequence(&inserts.get(&"todos").stream(), &removals.get(&"todos").stream(), |title| {
//!         Ok(Stream::just(title))
//!     })
//!     .apply();
//!
//! let store = Store::with_state(
//!     &Spec::new()
//!         .stream("todos", todos.map(|todos| json!(todos.len())))
//!         .creator("count", |state| Ok(Stream::just(state.unwrap_or(json!(0))))),
//!     json!({"count": 5}),
//! )?;
//!
//! inserts.get(&"todos").next(Insert::Push(json!("ship it")));
//! removals.get(&"todos").next(Removal::Index(0));
//! ```

pub mod error;
pub mod middleware;
pub mod operators;
pub mod registry;
pub mod store;
pub mod stream;
pub mod tree;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use middleware::Middleware;
pub use operators::{
    merge_array, merge_map, reconcile, Collection, CreateFn, Insert, Member, Removal, Seed,
};
pub use registry::ChannelRegistry;
pub use store::{Store, StoreConfig};
pub use stream::{
    Item, Notification, Stream, StreamHandle, Subject, Subscriber, Subscription,
    DEFAULT_LISTEN_BUFFER,
};
pub use tree::{Creator, LiveNode, LiveTree, Spec, SpecNode};
pub use types::{join_path, Envelope, Reducer, Update, DEFAULT_ROOT, PATH_SEPARATOR};
