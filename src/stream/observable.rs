//! The cold, push-based `Stream` and its operators.

use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::serial::SerialFold;
use super::subscription::{Notification, Subscriber, Subscription};
use super::Item;

type Producer<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A push-based source of values.
///
/// A stream does nothing until subscribed; each subscription runs the
/// producer on the subscribing thread. Use [`Stream::share`] to turn a stream
/// into a multicast one whose producer runs once for all subscribers.
pub struct Stream<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({:p})", Arc::as_ptr(&self.producer))
    }
}

impl<T: Item> Stream<T> {
    /// Create a stream from a producer.
    ///
    /// The producer receives a [`Subscriber`] and pushes into it. Resources
    /// it acquires should be released through
    /// `subscriber.subscription().add(..)`.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Emit every value in order, then complete.
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        Self::new(move |subscriber| {
            for value in values.iter() {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.next(value.clone());
            }
            subscriber.complete();
        })
    }

    /// Emit one value, then complete.
    pub fn just(value: T) -> Self {
        Self::of(std::iter::once(value))
    }

    /// Complete immediately.
    pub fn empty() -> Self {
        Self::new(|subscriber| subscriber.complete())
    }

    /// Never emit and never complete.
    pub fn never() -> Self {
        Self::new(|_| {})
    }

    /// Fail immediately.
    pub fn fail(error: StoreError) -> Self {
        Self::new(move |subscriber| subscriber.error(error.clone()))
    }

    /// Whether two handles refer to the same stream.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.producer, &b.producer)
    }

    // --- Subscribing ---

    /// Subscribe with a notification callback.
    pub fn subscribe<F>(&self, sink: F) -> Subscription
    where
        F: Fn(Notification<T>) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(sink))
    }

    /// Subscribe to values only, ignoring terminal notifications.
    pub fn subscribe_next<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(move |notification| {
            if let Notification::Next(value) = notification {
                on_next(value);
            }
        })
    }

    /// Subscribe an existing subscriber.
    pub fn subscribe_with(&self, subscriber: Subscriber<T>) -> Subscription {
        let subscription = subscriber.subscription().clone();
        (self.producer)(subscriber);
        subscription
    }

    /// Subscribe on behalf of a downstream subscriber.
    ///
    /// Terminal notifications are forwarded to `down` and the upstream
    /// subscription is torn down together with the downstream one. The link
    /// is made before the producer runs so synchronous sources stop as soon
    /// as the downstream closes.
    pub(crate) fn subscribe_linked<U, F>(&self, down: &Subscriber<U>, on_next: F) -> Subscription
    where
        U: Item,
        F: Fn(T) + Send + Sync + 'static,
    {
        let d = down.clone();
        let upstream = Subscriber::new(move |notification| match notification {
            Notification::Next(value) => on_next(value),
            Notification::Error(e) => d.error(e),
            Notification::Complete => d.complete(),
        });
        down.subscription().add_child(upstream.subscription().clone());
        self.subscribe_with(upstream)
    }

    // --- Transforming ---

    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Item,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |down: Subscriber<U>| {
            let f = Arc::clone(&f);
            let d = down.clone();
            source.subscribe_linked(&down, move |value| d.next(f(value)));
        })
    }

    /// Map with a fallible function; an `Err` fails the stream.
    pub fn try_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Item,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |down: Subscriber<U>| {
            let f = Arc::clone(&f);
            let d = down.clone();
            source.subscribe_linked(&down, move |value| match f(value) {
                Ok(mapped) => d.next(mapped),
                Err(e) => d.error(e),
            });
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Stream<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter_indexed(move |value, _| predicate(value))
    }

    /// Filter with access to the zero-based emission index, counted per
    /// subscription.
    pub fn filter_indexed<F>(&self, predicate: F) -> Stream<T>
    where
        F: Fn(&T, usize) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Stream::new(move |down: Subscriber<T>| {
            let predicate = Arc::clone(&predicate);
            let index = AtomicUsize::new(0);
            let d = down.clone();
            source.subscribe_linked(&down, move |value| {
                let i = index.fetch_add(1, Ordering::SeqCst);
                if predicate(&value, i) {
                    d.next(value);
                }
            });
        })
    }

    pub fn filter_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Item,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |down: Subscriber<U>| {
            let f = Arc::clone(&f);
            let d = down.clone();
            source.subscribe_linked(&down, move |value| {
                if let Some(mapped) = f(value) {
                    d.next(mapped);
                }
            });
        })
    }

    /// Run a side effect for every value without changing it.
    pub fn tap<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.map(move |value| {
            f(&value);
            value
        })
    }

    pub fn skip(&self, count: usize) -> Stream<T> {
        self.filter_indexed(move |_, index| index >= count)
    }

    /// Emit at most `count` values, then complete.
    pub fn take(&self, count: usize) -> Stream<T> {
        let source = self.clone();
        Stream::new(move |down: Subscriber<T>| {
            if count == 0 {
                down.complete();
                return;
            }
            let seen = AtomicUsize::new(0);
            let d = down.clone();
            source.subscribe_linked(&down, move |value| {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= count {
                    d.next(value);
                }
                if n == count {
                    d.complete();
                }
            });
        })
    }

    /// Emit `value` first, then everything from upstream.
    pub fn start_with(&self, value: T) -> Stream<T> {
        let source = self.clone();
        Stream::new(move |down: Subscriber<T>| {
            down.next(value.clone());
            if down.is_closed() {
                return;
            }
            let d = down.clone();
            source.subscribe_linked(&down, move |v| d.next(v));
        })
    }

    /// Apply a stream-to-stream transform.
    pub fn pipe<U, F>(&self, transform: F) -> Stream<U>
    where
        U: Item,
        F: FnOnce(Stream<T>) -> Stream<U>,
    {
        transform(self.clone())
    }

    // --- Combining ---

    pub fn merge(&self, other: &Stream<T>) -> Stream<T> {
        Self::merge_all(vec![self.clone(), other.clone()])
    }

    /// Interleave several streams as delivered. Completes once all have
    /// completed; fails as soon as one fails.
    pub fn merge_all(sources: Vec<Stream<T>>) -> Stream<T> {
        Stream::new(move |down: Subscriber<T>| {
            if sources.is_empty() {
                down.complete();
                return;
            }
            let remaining = Arc::new(AtomicUsize::new(sources.len()));
            for source in sources.iter() {
                if down.is_closed() {
                    return;
                }
                let d = down.clone();
                let remaining = Arc::clone(&remaining);
                let inner = Subscriber::new(move |notification| match notification {
                    Notification::Next(value) => d.next(value),
                    Notification::Error(e) => d.error(e),
                    Notification::Complete => {
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            d.complete();
                        }
                    }
                });
                down.subscription().add_child(inner.subscription().clone());
                source.subscribe_with(inner);
            }
        })
    }

    /// Map every value to an inner stream and merge all inner streams.
    pub fn merge_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Item,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        self.try_merge_map(move |value| Ok(f(value)))
    }

    /// `merge_map` with a fallible projection; an `Err` fails the stream.
    ///
    /// Completes once upstream and every inner stream have completed.
    pub fn try_merge_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Item,
        F: Fn(T) -> Result<Stream<U>> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |down: Subscriber<U>| {
            let state = Arc::new(Mutex::new(MergeState::default()));

            let d = down.clone();
            let outer_state = Arc::clone(&state);
            let f = Arc::clone(&f);
            let outer = Subscriber::new(move |notification| match notification {
                Notification::Next(value) => {
                    let inner_stream = match f(value) {
                        Ok(stream) => stream,
                        Err(e) => {
                            d.error(e);
                            return;
                        }
                    };
                    outer_state.lock().active += 1;

                    let d2 = d.clone();
                    let inner_state = Arc::clone(&outer_state);
                    let own = Subscription::new();
                    let finished = own.clone();
                    let inner = Subscriber::with_subscription(
                        move |n| match n {
                            Notification::Next(v) => d2.next(v),
                            Notification::Error(e) => d2.error(e),
                            Notification::Complete => {
                                // A finished inner no longer needs tearing down.
                                d2.subscription().remove_child(&finished);
                                let done = {
                                    let mut st = inner_state.lock();
                                    st.active -= 1;
                                    st.outer_done && st.active == 0
                                };
                                if done {
                                    d2.complete();
                                }
                            }
                        },
                        own,
                    );
                    d.subscription().add_child(inner.subscription().clone());
                    inner_stream.subscribe_with(inner);
                }
                Notification::Error(e) => d.error(e),
                Notification::Complete => {
                    let done = {
                        let mut st = outer_state.lock();
                        st.outer_done = true;
                        st.active == 0
                    };
                    if done {
                        d.complete();
                    }
                }
            });
            down.subscription().add_child(outer.subscription().clone());
            source.subscribe_with(outer);
        })
    }

    // --- Folding ---

    /// Running fold from `seed`, emitting every intermediate state.
    pub fn scan<S, F>(&self, seed: S, f: F) -> Stream<S>
    where
        S: Item,
        F: Fn(S, T) -> S + Send + Sync + 'static,
    {
        self.try_scan(seed, move |state, value| Ok(f(state, value)))
    }

    /// Running fold with a fallible step; an `Err` fails the stream.
    ///
    /// The accumulator is per subscription. Values are folded one at a time
    /// in arrival order, even when pushed from several threads or from
    /// inside the step itself.
    pub fn try_scan<S, F>(&self, seed: S, f: F) -> Stream<S>
    where
        S: Item,
        F: Fn(S, T) -> Result<S> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |down: Subscriber<S>| {
            let f = Arc::clone(&f);
            let seed = seed.clone();
            let accumulator = SerialFold::new(move |state: Option<S>, value: T| {
                f(state.unwrap_or_else(|| seed.clone()), value)
            });
            let d = down.clone();
            source.subscribe_linked(&down, move |value| accumulator.push(value, &d));
        })
    }
}

#[derive(Default)]
struct MergeState {
    active: usize,
    outer_done: bool,
}
