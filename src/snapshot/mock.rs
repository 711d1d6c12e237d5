//! Scripted snapshot source for tests and demos.

use super::{FetchError, Snapshot, SnapshotSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays queued fetch results in order.
///
/// Once the queue is empty every fetch fails with a transport error.
#[derive(Debug, Default)]
pub struct MockSource {
    queue: Mutex<VecDeque<Result<Snapshot, FetchError>>>,
    fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that yields `snapshot` once.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let source = Self::new();
        source.push(Ok(snapshot));
        source
    }

    /// Queues the result returned by the next unanswered fetch.
    pub fn push(&self, result: Result<Snapshot, FetchError>) {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }

    /// Number of fetches performed so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(FetchError::Transport {
                    url: self.endpoint().to_string(),
                    reason: "no scripted response".to_string(),
                })
            })
    }

    fn endpoint(&self) -> &str {
        "mock://snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_fails() {
        let source = MockSource::with_snapshot([("k", 1.0)].into_iter().collect());

        assert_eq!(source.fetch().await.unwrap().get("k"), Ok(1.0));
        assert!(matches!(
            source.fetch().await,
            Err(FetchError::Transport { .. })
        ));
        assert_eq!(source.fetches(), 2);
    }
}
