//! Cross-cutting transforms applied to every leaf of a store.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::stream::Stream;
use crate::types::Envelope;

type Transform = dyn Fn(Stream<Envelope>) -> Stream<Envelope> + Send + Sync;

/// A stream transform over path-tagged leaf emissions.
///
/// The store runs its middlewares in declaration order on every leaf,
/// including leaves attached after construction. A middleware may inspect,
/// filter, delay or rewrite envelopes.
#[derive(Clone)]
pub struct Middleware {
    name: String,
    transform: Arc<Transform>,
}

impl Middleware {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Stream<Envelope>) -> Stream<Envelope> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// A middleware that only observes envelopes.
    pub fn tap<F>(name: impl Into<String>, inspect: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let inspect = Arc::new(inspect);
        Self::new(name, move |stream| {
            let inspect = Arc::clone(&inspect);
            stream.tap(move |envelope| inspect(envelope))
        })
    }

    /// A middleware that logs every envelope at debug level.
    pub fn tracing() -> Self {
        Self::tap("tracing", |envelope| {
            debug!(name = %envelope.name, value = %envelope.value, "Leaf emitted");
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap a leaf stream.
    pub fn apply(&self, stream: Stream<Envelope>) -> Stream<Envelope> {
        (self.transform)(stream)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}
