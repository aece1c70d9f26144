//! Pull-side access to a stream through a bounded channel.

use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, TryRecvError, TrySendError};
use std::time::Duration;
use tracing::warn;

use super::observable::Stream;
use super::subscription::{Notification, Subscriber, Subscription};
use super::Item;

/// Default number of buffered notifications for a listener.
pub const DEFAULT_LISTEN_BUFFER: usize = 1000;

/// Handle to a stream listener.
///
/// Notifications are buffered in a bounded channel. A listener that falls
/// more than its buffer size behind is dropped: its subscription is closed
/// and no further notifications arrive. Dropping the handle unsubscribes.
pub struct StreamHandle<T> {
    subscription: Subscription,
    receiver: Receiver<Notification<T>>,
}

impl<T: Item> Stream<T> {
    /// Subscribe and buffer notifications into a channel.
    pub fn listen(&self, buffer_size: usize) -> StreamHandle<T> {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let subscription = Subscription::new();

        let own = subscription.clone();
        let subscriber = Subscriber::with_subscription(
            move |notification| match sender.try_send(notification) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(buffer_size, "Dropping slow stream listener");
                    own.unsubscribe();
                }
                Err(TrySendError::Disconnected(_)) => own.unsubscribe(),
            },
            subscription.clone(),
        );
        self.subscribe_with(subscriber);

        StreamHandle {
            subscription,
            receiver,
        }
    }
}

impl<T> StreamHandle<T> {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<Notification<T>, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(&self) -> Result<Notification<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification<T>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every buffered notification.
    pub fn drain(&self) -> Vec<Notification<T>> {
        self.receiver.try_iter().collect()
    }

    /// Take every buffered value, discarding terminal notifications.
    pub fn values(&self) -> Vec<T> {
        self.drain()
            .into_iter()
            .filter_map(Notification::into_value)
            .collect()
    }

    /// Stop listening.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Whether the listener was closed by a terminal notification, an
    /// overflow or `unsubscribe`.
    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
