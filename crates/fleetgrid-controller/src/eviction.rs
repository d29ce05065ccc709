//! FIFO of units waiting to be terminated.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use fleetgrid_core::ResourceUnit;

/// Producers are cluster actions; the single consumer is the poller.
#[derive(Debug, Default)]
pub struct EvictionQueue {
    queue: Mutex<VecDeque<ResourceUnit>>,
}

impl EvictionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, unit: ResourceUnit) {
        self.queue.lock().await.push_back(unit);
    }

    pub async fn extend(&self, units: impl IntoIterator<Item = ResourceUnit>) {
        self.queue.lock().await.extend(units);
    }

    /// Take everything queued so far, oldest first.
    pub async fn drain(&self) -> Vec<ResourceUnit> {
        self.queue.lock().await.drain(..).collect()
    }

    /// Copy of the queue without consuming it.
    pub async fn pending(&self) -> Vec<ResourceUnit> {
        self.queue.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_in_fifo_order() {
        let queue = EvictionQueue::new();
        queue.push(ResourceUnit::new("a", "h1")).await;
        queue
            .extend([ResourceUnit::new("b", "h1"), ResourceUnit::new("c", "h2")])
            .await;
        assert_eq!(queue.len().await, 3);
        assert_eq!(queue.pending().await.len(), 3);

        let ids: Vec<String> = queue.drain().await.into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(queue.is_empty().await);
    }
}
