//! Push-based event streams.
//!
//! A small, synchronous stream primitive the store is built on:
//! - [`Stream`]: cold by default, multicast via [`Stream::share`]
//! - [`Subject`]: a channel that external code pushes values into
//! - [`Subscription`]: idempotent teardown of everything a subscription holds
//! - [`StreamHandle`]: bounded channel access for pulling values out
//!
//! All work happens on the thread that pushes. No lock is held while a
//! notification is delivered, so subscribers may subscribe, push or
//! unsubscribe from inside a callback.
//!
//! # Example
//!
//! ```ignore
//! let clicks = Subject::new();
//! let doubled = clicks.stream().map(|n: i32| n * 2).share();
//!
//! let handle = doubled.listen(16);
//! clicks.next(21);
//! assert_eq!(handle.values(), vec![42]);
//! ```

mod handle;
mod observable;
mod serial;
mod share;
mod subject;
mod subscription;

pub use handle::{StreamHandle, DEFAULT_LISTEN_BUFFER};
pub use observable::Stream;
pub(crate) use serial::SerialFold;
pub use subject::Subject;
pub use subscription::{Notification, Subscriber, Subscription};

/// Values that can travel through a stream.
///
/// Streams fan values out to several subscribers and may be driven from any
/// thread, hence the bounds.
pub trait Item: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Item for T {}
