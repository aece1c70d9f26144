//! One-at-a-time folding for accumulating operators.

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::subscription::Subscriber;
use super::Item;
use crate::error::Result;

struct FoldState<S, T> {
    state: Option<S>,
    pending: VecDeque<T>,
    draining: bool,
}

/// Accumulator shared by every delivery to one fold subscription.
///
/// Items are queued and stepped strictly one after another. Whichever call
/// finds the queue idle drains it; concurrent or re-entrant calls only
/// enqueue and return. No lock is held while a step runs or a state is
/// emitted, so a step may push into the very stream it is folding.
pub(crate) struct SerialFold<S, T, F> {
    step: F,
    inner: Mutex<FoldState<S, T>>,
}

impl<S, T, F> SerialFold<S, T, F>
where
    S: Item,
    F: Fn(Option<S>, T) -> Result<S>,
{
    /// `step` receives the current state (`None` before the first step) and
    /// returns the next one.
    pub(crate) fn new(step: F) -> Self {
        Self {
            step,
            inner: Mutex::new(FoldState {
                state: None,
                pending: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// Queue `item` and drain the queue unless a drain is already running.
    ///
    /// Every resulting state is emitted to `down`. A failing step fails
    /// `down` and discards everything still queued.
    pub(crate) fn push(&self, item: T, down: &Subscriber<S>) {
        {
            let mut inner = self.inner.lock();
            inner.pending.push_back(item);
            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        loop {
            let (state, item) = {
                let mut inner = self.inner.lock();
                if down.is_closed() {
                    inner.pending.clear();
                }
                match inner.pending.pop_front() {
                    Some(item) => (inner.state.take(), item),
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };

            match (self.step)(state, item) {
                Ok(next) => {
                    self.inner.lock().state = Some(next.clone());
                    down.next(next);
                }
                Err(e) => down.error(e),
            }
        }
    }
}
