//! Folding update streams into state streams.

use crate::error::StoreError;
use crate::stream::{Item, SerialFold, Stream, Subscriber};
use crate::types::Update;

const OPERATOR: &str = "apply";

impl<S: Item> Stream<Update<S>> {
    /// Fold updates into states, emitting once per update.
    ///
    /// There is no seed: upstream is expected to emit an
    /// [`Update::Replace`] before its first reducer. A reducer that arrives
    /// earlier fails the stream with [`StoreError::Uninitialized`]. A failing
    /// reducer fails the stream.
    pub fn apply(&self) -> Stream<S> {
        fold(self, None)
    }

    /// Fold updates into states starting from `seed`.
    pub fn apply_with(&self, seed: S) -> Stream<S> {
        fold(self, Some(seed))
    }
}

fn fold<S: Item>(updates: &Stream<Update<S>>, seed: Option<S>) -> Stream<S> {
    let source = updates.clone();
    Stream::new(move |down: Subscriber<S>| {
        let seed = seed.clone();
        // Updates are applied one at a time, even when pushed from several
        // threads or from inside a reducer.
        let state = SerialFold::new(move |current: Option<S>, update: Update<S>| {
            match (current.or_else(|| seed.clone()), update) {
                (_, Update::Replace(replacement)) => Ok(replacement),
                (Some(current), Update::Reduce(reducer)) => reducer.call(current),
                (None, Update::Reduce(_)) => Err(StoreError::Uninitialized { operator: OPERATOR }),
            }
        });
        let d = down.clone();
        source.subscribe_linked(&down, move |update| state.push(update, &d));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Notification, Subject, DEFAULT_LISTEN_BUFFER};

    fn adder(trigger: &Subject<i32>) -> Stream<Update<i32>> {
        Stream::just(Update::Replace(0)).merge(
            &trigger
                .stream()
                .map(|payload: i32| Update::reduce(move |state: i32| Ok(state + payload))),
        )
    }

    #[test]
    fn test_state_changes_on_every_trigger() {
        let trigger = Subject::new();
        let handle = adder(&trigger).apply().skip(2).listen(DEFAULT_LISTEN_BUFFER);

        trigger.next(10);
        trigger.next(40);

        assert_eq!(handle.values(), vec![50]);
    }

    #[test]
    fn test_replace_resets_running_state() {
        let updates = Stream::of(vec![
            Update::Replace(1),
            Update::reduce(|s: i32| Ok(s * 10)),
            Update::Replace(5),
            Update::reduce(|s: i32| Ok(s + 1)),
        ]);

        assert_eq!(updates.apply().listen(8).values(), vec![1, 10, 5, 6]);
    }

    #[test]
    fn test_apply_with_seed() {
        let updates = Stream::of(vec![
            Update::reduce(|mut s: Vec<String>| {
                s.push("a".to_string());
                Ok(s)
            }),
            Update::reduce(|mut s: Vec<String>| {
                s.push("b".to_string());
                Ok(s)
            }),
        ]);

        let states = updates.apply_with(vec!["seed".to_string()]).listen(8).values();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1], vec!["seed", "a", "b"]);
    }

    #[test]
    fn test_updates_from_several_threads() {
        let trigger = Subject::new();
        let handle = adder(&trigger).apply().listen(4096);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let trigger = trigger.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        trigger.next(1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handle.values(), (0..=2000).collect::<Vec<_>>());
        assert!(!handle.is_closed());
    }

    #[test]
    fn test_reducer_may_push_into_its_own_source() {
        let trigger = Subject::new();
        let echo = trigger.clone();
        let updates = Stream::just(Update::Replace(0)).merge(&trigger.stream().map(move |payload: i32| {
            let echo = echo.clone();
            Update::reduce(move |state: i32| {
                if payload == 1 {
                    echo.next(100);
                }
                Ok(state + payload)
            })
        }));
        let handle = updates.apply().listen(DEFAULT_LISTEN_BUFFER);

        trigger.next(1);

        assert_eq!(
            handle.drain(),
            vec![Notification::Next(0), Notification::Next(1), Notification::Next(101)]
        );
    }

    #[test]
    fn test_reducer_before_state_fails() {
        let updates = Stream::just(Update::reduce(|s: i32| Ok(s + 1)));
        let events = updates.apply().listen(8).drain();

        assert_eq!(
            events,
            vec![Notification::Error(StoreError::Uninitialized { operator: "apply" })]
        );
    }

    #[test]
    fn test_failing_reducer_terminates() {
        let trigger = Subject::new();
        let updates = Stream::just(Update::Replace(1)).merge(&trigger.stream().map(|fail: bool| {
            Update::reduce(move |s: i32| {
                if fail {
                    Err(StoreError::Reducer("rejected".into()))
                } else {
                    Ok(s + 1)
                }
            })
        }));
        let handle = updates.apply().listen(8);

        trigger.next(false);
        trigger.next(true);
        trigger.next(false);

        assert_eq!(
            handle.drain(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Error(StoreError::Reducer("rejected".into()))
            ]
        );
        assert_eq!(trigger.observer_count(), 0);
    }
}
