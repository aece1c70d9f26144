//! Reference-counted multicasting.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use super::observable::Stream;
use super::subject::Subject;
use super::subscription::{Notification, Subscriber, Subscription};
use super::Item;

/// Connection state shared by every subscriber of one `share()` stream.
struct Connection<T> {
    subject: Option<Subject<T>>,
    upstream: Option<Subscription>,
    subscribers: usize,
    /// Bumped on every fresh connect so stale teardowns and terminals from an
    /// earlier connection leave the current one alone.
    generation: u64,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self {
            subject: None,
            upstream: None,
            subscribers: 0,
            generation: 0,
        }
    }
}

impl<T> Connection<T> {
    fn reset(&mut self) -> Option<Subscription> {
        self.subject = None;
        self.subscribers = 0;
        self.upstream.take()
    }
}

impl<T: Item> Stream<T> {
    /// Multicast this stream.
    ///
    /// The first subscriber connects the source; later subscribers join that
    /// connection and see the same values instead of re-running the source.
    /// When the last subscriber leaves the source is disconnected. After the
    /// source terminates, the next subscriber starts a fresh connection.
    pub fn share(&self) -> Stream<T> {
        let source = self.clone();
        let connection: Arc<Mutex<Connection<T>>> = Arc::new(Mutex::new(Connection::default()));

        Stream::new(move |down: Subscriber<T>| {
            let (subject, generation, fresh) = {
                let mut conn = connection.lock();
                conn.subscribers += 1;
                match conn.subject.clone() {
                    Some(subject) => (subject, conn.generation, false),
                    None => {
                        conn.generation += 1;
                        let subject = Subject::new();
                        conn.subject = Some(subject.clone());
                        (subject, conn.generation, true)
                    }
                }
            };

            let weak = Arc::downgrade(&connection);
            down.subscription().add(move || release(&weak, generation));
            subject.stream().subscribe_with(down);

            if !fresh {
                return;
            }

            let sink = subject.clone();
            let weak = Arc::downgrade(&connection);
            let upstream = source.subscribe(move |notification| {
                if notification.is_terminal() {
                    disconnect(&weak, generation);
                }
                match notification {
                    Notification::Next(value) => sink.next(value),
                    Notification::Error(e) => sink.error(e),
                    Notification::Complete => sink.complete(),
                }
            });

            let stale = {
                let mut conn = connection.lock();
                if conn.generation == generation && conn.subject.is_some() {
                    conn.upstream = Some(upstream.clone());
                    false
                } else {
                    true
                }
            };
            if stale {
                upstream.unsubscribe();
            }
        })
    }
}

/// A subscriber left; disconnect the source if it was the last one.
fn release<T>(connection: &Weak<Mutex<Connection<T>>>, generation: u64) {
    let Some(connection) = connection.upgrade() else {
        return;
    };
    let upstream = {
        let mut conn = connection.lock();
        if conn.generation != generation || conn.subject.is_none() {
            return;
        }
        conn.subscribers = conn.subscribers.saturating_sub(1);
        if conn.subscribers > 0 {
            return;
        }
        conn.reset()
    };
    if let Some(upstream) = upstream {
        upstream.unsubscribe();
    }
}

/// The source terminated; forget the connection so the next subscriber
/// reconnects.
fn disconnect<T>(connection: &Weak<Mutex<Connection<T>>>, generation: u64) {
    if let Some(connection) = connection.upgrade() {
        let mut conn = connection.lock();
        if conn.generation == generation {
            conn.reset();
        }
    }
}
