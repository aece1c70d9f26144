//! Keyed registry of lazily-created channels.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::trace;

use crate::stream::{Item, Subject};

/// Hands out one [`Subject`] per key, creating it on first access.
///
/// Lets code that only knows a key (an add trigger, a remove trigger, a
/// named event) reach the same channel as every other holder of that key.
pub struct ChannelRegistry<K, T> {
    channels: RwLock<HashMap<K, Subject<T>>>,
}

impl<K, T> ChannelRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Item,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with a fresh channel for each id.
    pub fn with_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let channels = ids.into_iter().map(|id| (id, Subject::new())).collect();
        Self {
            channels: RwLock::new(channels),
        }
    }

    /// Get the channel for `id`, creating it if missing.
    pub fn get(&self, id: &K) -> Subject<T> {
        if let Some(channel) = self.channels.read().get(id) {
            return channel.clone();
        }

        let mut channels = self.channels.write();
        channels
            .entry(id.clone())
            .or_insert_with(|| {
                trace!(?id, "Creating channel");
                Subject::new()
            })
            .clone()
    }

    /// Forget the channel for `id`. Returns whether one existed.
    ///
    /// Existing subscribers of the removed channel are left alone; a later
    /// `get` creates a new channel.
    pub fn remove(&self, id: &K) -> bool {
        let removed = self.channels.write().remove(id).is_some();
        if removed {
            trace!(?id, "Removed channel");
        }
        removed
    }

    pub fn contains(&self, id: &K) -> bool {
        self.channels.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Ids with a live channel, in no particular order.
    pub fn ids(&self) -> Vec<K> {
        self.channels.read().keys().cloned().collect()
    }
}

impl<K, T> Default for ChannelRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Item,
{
    fn default() -> Self {
        Self::new()
    }
}
