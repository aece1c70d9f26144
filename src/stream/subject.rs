//! Manually-triggered multicast channel.

use crate::error::StoreError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

use super::observable::Stream;
use super::subscription::{Notification, Subscriber};
use super::Item;

struct SubjectState<T> {
    observers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
    terminal: Option<Notification<T>>,
}

/// A channel that external code pushes values into.
///
/// Every value is delivered to the observers subscribed at the moment of the
/// push, in subscription order. Once terminated, the subject ignores further
/// pushes and late subscribers immediately receive the terminal notification.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject({:p})", Arc::as_ptr(&self.state))
    }
}

impl<T: Item> Subject<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Whether two handles refer to the same channel.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.state, &b.state)
    }

    /// Push a value to every current observer.
    pub fn next(&self, value: T) {
        let observers: Vec<Subscriber<T>> = {
            let state = self.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.observers.iter().map(|(_, o)| o.clone()).collect()
        };
        for observer in observers {
            observer.next(value.clone());
        }
    }

    pub fn error(&self, error: StoreError) {
        self.terminate(Notification::Error(error));
    }

    pub fn complete(&self) {
        self.terminate(Notification::Complete);
    }

    fn terminate(&self, notification: Notification<T>) {
        let observers = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(notification.clone());
            std::mem::take(&mut state.observers)
        };
        for (_, observer) in observers {
            observer.notify(notification.clone());
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Whether the subject has completed or failed.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    /// The subscribable side of this channel.
    pub fn stream(&self) -> Stream<T> {
        let state = Arc::clone(&self.state);
        Stream::new(move |subscriber: Subscriber<T>| {
            let terminal = {
                let mut st = state.lock();
                match st.terminal.clone() {
                    Some(terminal) => Some(terminal),
                    None => {
                        let id = st.next_id;
                        st.next_id += 1;
                        st.observers.push((id, subscriber.clone()));

                        let weak: Weak<Mutex<SubjectState<T>>> = Arc::downgrade(&state);
                        subscriber.subscription().add(move || {
                            if let Some(state) = weak.upgrade() {
                                state.lock().observers.retain(|(oid, _)| *oid != id);
                            }
                        });
                        None
                    }
                }
            };

            if let Some(terminal) = terminal {
                subscriber.notify(terminal);
            }
        })
    }
}

impl<T: Item> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}
