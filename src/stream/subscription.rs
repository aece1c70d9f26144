//! Subscription lifecycle and the subscriber side of a stream.

use crate::error::StoreError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single delivery from a stream to one subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<T> {
    /// A new value.
    Next(T),
    /// The stream failed. Nothing follows.
    Error(StoreError),
    /// The stream finished. Nothing follows.
    Complete,
}

impl<T> Notification<T> {
    /// The carried value, if this is a `Next`.
    pub fn into_value(self) -> Option<T> {
        match self {
            Notification::Next(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this notification ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

struct SubscriptionInner {
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
    children: Mutex<Vec<Subscription>>,
}

/// Handle to an active subscription.
///
/// Cloning yields another handle to the same subscription. Unsubscribing
/// runs every registered teardown exactly once, which in turn releases
/// upstream subscriptions.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Create an open subscription with no teardowns.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                closed: AtomicBool::new(false),
                teardowns: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether `unsubscribe` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Register a teardown. Runs immediately if already closed.
    pub fn add<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut teardowns = self.inner.teardowns.lock();
            if !self.is_closed() {
                teardowns.push(Box::new(teardown));
                return;
            }
        }
        teardown();
    }

    /// Tie another subscription's lifetime to this one. The child is closed
    /// immediately if this subscription already is.
    pub fn add_child(&self, child: Subscription) {
        {
            let mut children = self.inner.children.lock();
            if !self.is_closed() {
                children.push(child);
                return;
            }
        }
        child.unsubscribe();
    }

    /// Forget a child that finished on its own, without closing it.
    pub fn remove_child(&self, child: &Subscription) {
        self.inner
            .children
            .lock()
            .retain(|c| !Arc::ptr_eq(&c.inner, &child.inner));
    }

    /// Number of attached children.
    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    /// Close the subscription and run its teardowns. Idempotent.
    pub fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let teardowns = std::mem::take(&mut *self.inner.teardowns.lock());
        for teardown in teardowns {
            teardown();
        }
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.unsubscribe();
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

type Sink<T> = Arc<dyn Fn(Notification<T>) + Send + Sync>;

/// The receiving end handed to a stream's producer.
///
/// Guarantees the stream grammar: any number of `next` calls followed by at
/// most one terminal notification. Deliveries after termination or after
/// unsubscription are dropped.
pub struct Subscriber<T> {
    sink: Sink<T>,
    stopped: Arc<AtomicBool>,
    subscription: Subscription,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            stopped: Arc::clone(&self.stopped),
            subscription: self.subscription.clone(),
        }
    }
}

impl<T> Subscriber<T> {
    /// Create a subscriber with a fresh subscription.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(Notification<T>) + Send + Sync + 'static,
    {
        Self::with_subscription(sink, Subscription::new())
    }

    /// Create a subscriber bound to an existing subscription.
    pub fn with_subscription<F>(sink: F, subscription: Subscription) -> Self
    where
        F: Fn(Notification<T>) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            stopped: Arc::new(AtomicBool::new(false)),
            subscription,
        }
    }

    /// The subscription this subscriber delivers under.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Whether further deliveries will be dropped.
    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.subscription.is_closed()
    }

    pub fn next(&self, value: T) {
        if !self.is_closed() {
            (self.sink)(Notification::Next(value));
        }
    }

    pub fn error(&self, error: StoreError) {
        self.terminate(Notification::Error(error));
    }

    pub fn complete(&self) {
        self.terminate(Notification::Complete);
    }

    /// Deliver any notification, routing terminals through the stop logic.
    pub fn notify(&self, notification: Notification<T>) {
        match notification {
            Notification::Next(value) => self.next(value),
            terminal => self.terminate(terminal),
        }
    }

    fn terminate(&self, notification: Notification<T>) {
        if self.subscription.is_closed() || self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.sink)(notification);
        self.subscription.unsubscribe();
    }
}
