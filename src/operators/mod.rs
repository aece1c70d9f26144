//! Store-specific stream operators.
//!
//! - [`apply`](crate::stream::Stream::apply): fold a stream of
//!   [`Update`](crate::types::Update)s into a stream of states
//! - [`merge_sequence`](crate::stream::Stream::merge_sequence): grow and
//!   shrink a collection of streams from insert and removal channels
//!
//! # Example
//!
//! ```ignore
//! let inserts = Subject::new();
//! let removals = Subject::new();
//!
//! let todos = Stream::just(Seed::from(json!(["write docs"])))
//!     .merge_sequence(&inserts.stream(), &removals.stream(), |title| {
//!         Ok(Stream::just(title))
//!     })
//!     .apply();
//!
//! inserts.next(Insert::Push(json!("ship it")));
//! removals.next(Removal::Index(0));
//! ```

mod apply;
mod merge_sequence;

pub use merge_sequence::{
    merge_array, merge_map, reconcile, Collection, CreateFn, Insert, Member, Removal, Seed,
};
