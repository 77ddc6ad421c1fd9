use std::sync::Arc;

use crate::{
    dataset::{EvalDataset, PreparedSample},
    Result,
};

/// Fixed-size, in-order batching over a dataset.
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn EvalDataset>,
    batch_size: usize,
}

impl DataLoader {
    pub fn new(dataset: Arc<dyn EvalDataset>, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Sample indices of every batch, the last one possibly short.
    pub fn batches(&self) -> Vec<Vec<usize>> {
        (0..self.dataset.len())
            .collect::<Vec<_>>()
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// The batches of one rank.
    ///
    /// Batches are dealt round-robin and every rank gets the same number of them: when the
    /// batch count does not divide evenly, trailing ranks wrap around to the first batches.
    /// Those repeated samples are removed after gathering.
    pub fn shard(&self, rank: usize, world_size: usize) -> Shard {
        let all = self.batches();
        let world_size = world_size.max(1);
        let steps = all.len().div_ceil(world_size);
        let batches = if all.is_empty() {
            Vec::new()
        } else {
            (0..steps)
                .map(|step| all[(step * world_size + rank) % all.len()].clone())
                .collect()
        };
        Shard {
            dataset: self.dataset.clone(),
            batches,
        }
    }
}

/// One rank's share of a [`DataLoader`].
pub struct Shard {
    dataset: Arc<dyn EvalDataset>,
    batches: Vec<Vec<usize>>,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn indices(&self) -> &[Vec<usize>] {
        &self.batches
    }

    /// Materialize the `step`-th batch.
    pub fn load(&self, step: usize) -> Result<Vec<PreparedSample>> {
        self.batches[step]
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::sample::SampleId;

    struct Numbers(usize);

    impl EvalDataset for Numbers {
        fn len(&self) -> usize {
            self.0
        }

        fn get(&self, index: usize) -> Result<PreparedSample> {
            Ok(PreparedSample {
                sample_id: SampleId::Int(index as i64),
                record: Map::new(),
                message: Vec::new(),
            })
        }
    }

    #[test]
    fn batches_in_order() {
        let loader = DataLoader::new(Arc::new(Numbers(5)), 2);
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(loader.batches(), vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(DataLoader::new(Arc::new(Numbers(3)), 0).batch_size(), 1);
    }

    #[test]
    fn shards_are_even_and_cover_everything() {
        let loader = DataLoader::new(Arc::new(Numbers(5)), 1);
        let shards: Vec<_> = (0..2).map(|r| loader.shard(r, 2)).collect();
        assert_eq!(shards[0].indices(), &[vec![0], vec![2], vec![4]]);
        // Rank 1 runs out and wraps around to the first batch.
        assert_eq!(shards[1].indices(), &[vec![1], vec![3], vec![0]]);

        let mut seen: Vec<usize> = shards
            .iter()
            .flat_map(|s| s.indices().iter().flatten().copied())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn single_rank_gets_everything() {
        let loader = DataLoader::new(Arc::new(Numbers(3)), 2);
        let shard = loader.shard(0, 1);
        assert_eq!(shard.len(), 2);
        let ids: Vec<_> = shard.load(1).unwrap().into_iter().map(|s| s.sample_id).collect();
        assert_eq!(ids, vec![SampleId::Int(2)]);
    }

    #[test]
    fn empty_dataset_has_no_batches() {
        let loader = DataLoader::new(Arc::new(Numbers(0)), 4);
        assert!(loader.shard(1, 4).is_empty());
    }
}
