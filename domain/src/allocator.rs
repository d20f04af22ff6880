//! Sequence allocation on top of a [`CounterStore`].
//!
//! Identifiers are consumed as soon as `next` returns: a later failure in the
//! creation flow leaves a gap in the sequence, never a reused value.

use crate::{CoreError, CounterStore};

/// Counter key used by the shortener when none is configured.
pub const DEFAULT_COUNTER: &str = "surl_id";

/// Hands out strictly increasing identifiers for named counters.
#[derive(Clone, Debug)]
pub struct SequenceAllocator<S: CounterStore> {
    store: S,
}

impl<S: CounterStore> SequenceAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically increment `counter_name` and return the post-increment value.
    ///
    /// Store failures are returned as is; the caller must not assume an
    /// identifier was consumed and must not retry blindly.
    pub fn next(&self, counter_name: &str) -> Result<u64, CoreError> {
        if counter_name.trim().is_empty() {
            return Err(CoreError::Validation("counter name is required".into()));
        }
        let id = self.store.atomic_increment(counter_name)?;
        if id == 0 {
            return Err(CoreError::ConditionalUpdateFailed(format!(
                "counter {counter_name} returned 0 after increment"
            )));
        }
        tracing::debug!(counter = counter_name, id, "identifier allocated");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct BrokenStore(CoreError);
    impl CounterStore for BrokenStore {
        fn atomic_increment(&self, _key: &str) -> Result<u64, CoreError> {
            Err(self.0.clone())
        }
    }

    struct ZeroStore;
    impl CounterStore for ZeroStore {
        fn atomic_increment(&self, _key: &str) -> Result<u64, CoreError> {
            Ok(0)
        }
    }

    #[test]
    fn first_allocation_is_one_then_increasing() {
        let alloc = SequenceAllocator::new(InMemoryRepo::new());
        assert_eq!(alloc.next(DEFAULT_COUNTER).unwrap(), 1);
        assert_eq!(alloc.next(DEFAULT_COUNTER).unwrap(), 2);
        assert_eq!(alloc.next(DEFAULT_COUNTER).unwrap(), 3);
    }

    #[test]
    fn counters_are_independent() {
        let alloc = SequenceAllocator::new(InMemoryRepo::new());
        assert_eq!(alloc.next("a").unwrap(), 1);
        assert_eq!(alloc.next("a").unwrap(), 2);
        assert_eq!(alloc.next("b").unwrap(), 1);
    }

    #[test]
    fn rejects_blank_counter_name() {
        let alloc = SequenceAllocator::new(InMemoryRepo::new());
        assert!(matches!(alloc.next(" "), Err(CoreError::Validation(_))));
    }

    #[test]
    fn store_errors_propagate() {
        let alloc =
            SequenceAllocator::new(BrokenStore(CoreError::StoreUnavailable("timeout".into())));
        assert!(matches!(
            alloc.next(DEFAULT_COUNTER),
            Err(CoreError::StoreUnavailable(_))
        ));

        let alloc = SequenceAllocator::new(BrokenStore(CoreError::ConditionalUpdateFailed(
            "rejected".into(),
        )));
        assert!(matches!(
            alloc.next(DEFAULT_COUNTER),
            Err(CoreError::ConditionalUpdateFailed(_))
        ));
    }

    #[test]
    fn zero_from_store_is_rejected() {
        let alloc = SequenceAllocator::new(ZeroStore);
        assert!(matches!(
            alloc.next(DEFAULT_COUNTER),
            Err(CoreError::ConditionalUpdateFailed(_))
        ));
    }

    #[test]
    fn concurrent_callers_never_share_an_id() {
        const THREADS: usize = 16;
        const PER_THREAD: usize = 250;
        let alloc = SequenceAllocator::new(Arc::new(InMemoryRepo::new()));

        let ids: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        (0..PER_THREAD)
                            .map(|_| alloc.next(DEFAULT_COUNTER).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);
        assert_eq!(unique.iter().max(), Some(&((THREADS * PER_THREAD) as u64)));
    }

    #[test]
    fn per_thread_sequences_are_strictly_increasing() {
        let alloc = SequenceAllocator::new(Arc::new(InMemoryRepo::new()));
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let mut last = 0;
                    for _ in 0..100 {
                        let id = alloc.next(DEFAULT_COUNTER).unwrap();
                        assert!(id > last);
                        last = id;
                    }
                });
            }
        });
    }
}
