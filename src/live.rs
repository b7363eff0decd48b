//! Derived live sequences over the record store's snapshot channel.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::product::Product;
use crate::record_store::Snapshot;

type Derive<T> = Arc<dyn Fn(&[Product]) -> T + Send + Sync>;

/// A continuously updated value computed from the latest store snapshot.
///
/// The transformation is pure and runs on demand, so any number of live
/// sequences can hang off a single store subscription without background
/// tasks. Dropping a `LiveSequence` only drops its subscription; the durable
/// state is untouched and a new subscription starts from the latest value.
pub struct LiveSequence<T> {
    source: watch::Receiver<Snapshot>,
    derive: Derive<T>,
    last: Option<T>,
}

impl<T> Clone for LiveSequence<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            derive: Arc::clone(&self.derive),
            last: None,
        }
    }
}

impl<T> fmt::Debug for LiveSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSequence").finish_non_exhaustive()
    }
}

impl<T> LiveSequence<T>
where
    T: Clone + PartialEq,
{
    pub fn new<F>(source: watch::Receiver<Snapshot>, derive: F) -> Self
    where
        F: Fn(&[Product]) -> T + Send + Sync + 'static,
    {
        Self {
            source,
            derive: Arc::new(derive),
            last: None,
        }
    }

    /// The value derived from the latest snapshot.
    pub fn current(&self) -> T {
        let snapshot = self.source.borrow().clone();
        (self.derive)(snapshot.as_slice())
    }

    /// Waits for the next snapshot whose derived value differs from the last
    /// one this sequence delivered. The first call yields the current value
    /// immediately. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            let snapshot = self.source.borrow_and_update().clone();
            let value = (self.derive)(snapshot.as_slice());
            if self.last.as_ref() != Some(&value) {
                self.last = Some(value.clone());
                return Some(value);
            }
            self.source.changed().await.ok()?;
        }
    }

    /// Waits until the underlying snapshot changes, without deriving.
    pub async fn changed(&mut self) -> bool {
        self.source.changed().await.is_ok()
    }
}
