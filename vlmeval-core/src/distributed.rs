//! Cross-rank coordination: all-gather and barrier between concurrently running ranks.

use std::sync::Arc;

use tokio::sync::{Barrier, Mutex};

struct Shared<T> {
    world_size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<T>>>,
}

/// A group of ranks that exchange per-step outputs.
///
/// Every rank must take part in every collective call, in the same order.
pub struct ProcessGroup<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send> ProcessGroup<T> {
    pub fn new(world_size: usize) -> Self {
        let world_size = world_size.max(1);
        Self {
            shared: Arc::new(Shared {
                world_size,
                barrier: Barrier::new(world_size),
                slots: Mutex::new(vec![Vec::new(); world_size]),
            }),
        }
    }

    pub fn world_size(&self) -> usize {
        self.shared.world_size
    }

    /// Handle for `rank`.
    pub fn rank(&self, rank: usize) -> Rank<T> {
        assert!(rank < self.shared.world_size, "rank {rank} out of range");
        Rank {
            rank,
            shared: self.shared.clone(),
        }
    }

    pub fn ranks(&self) -> Vec<Rank<T>> {
        (0..self.world_size()).map(|r| self.rank(r)).collect()
    }
}

pub struct Rank<T> {
    rank: usize,
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send> Rank<T> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.shared.world_size
    }

    pub fn is_main_process(&self) -> bool {
        self.rank == 0
    }

    /// Contribute `items` and receive every rank's items, concatenated in rank order.
    pub async fn all_gather(&self, items: Vec<T>) -> Vec<T> {
        self.shared.slots.lock().await[self.rank] = items;
        self.shared.barrier.wait().await;
        let gathered = self.shared.slots.lock().await.concat();
        // Nobody may overwrite a slot before all ranks have read this round.
        self.shared.barrier.wait().await;
        gathered
    }

    pub async fn wait_for_everyone(&self) {
        self.shared.barrier.wait().await;
    }
}
