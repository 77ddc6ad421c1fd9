use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::{
    adapter::ModelAdapter, dataset::PreparedSample, prediction::Prediction, Result,
};

/// Runs a model over batches of prepared samples, one rank's worth of work.
#[derive(Clone)]
pub struct Worker {
    adapter: Arc<dyn ModelAdapter>,
    model_name: String,
    dataset_name: String,
    max_in_flight: usize,
}

impl Worker {
    pub fn new(
        adapter: Arc<dyn ModelAdapter>,
        model_name: impl ToString,
        dataset_name: impl ToString,
        max_in_flight: usize,
    ) -> Self {
        Self {
            adapter,
            model_name: model_name.to_string(),
            dataset_name: dataset_name.to_string(),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Answer every sample of `batch`, keeping the batch order.
    pub async fn process(&self, batch: Vec<PreparedSample>) -> Result<Vec<Prediction>> {
        let outputs: Vec<Prediction> = stream::iter(batch)
            .map(|sample| async move {
                let answer = self
                    .adapter
                    .generate(&sample.message, Some(&self.dataset_name))
                    .await?;
                Ok::<_, crate::Error>(Prediction::new(
                    sample.sample_id,
                    sample.record,
                    answer,
                    &self.model_name,
                ))
            })
            .buffered(self.max_in_flight)
            .try_collect()
            .await?;
        for output in &outputs {
            debug!("{}: {:?}", output.sample_id, output.answer());
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Map;

    use super::*;
    use crate::{message::InputItem, sample::SampleId, Error};

    struct Echo;

    #[async_trait]
    impl ModelAdapter for Echo {
        async fn generate(&self, message: &[InputItem], dataset: Option<&str>) -> Result<String> {
            if message.is_empty() {
                return Err(Error::Backend("empty".into()));
            }
            Ok(format!("{}:{}", dataset.unwrap_or("-"), message[0].value))
        }
    }

    fn prepared(id: i64, text: &str) -> PreparedSample {
        PreparedSample {
            sample_id: SampleId::Int(id),
            record: Map::new(),
            message: if text.is_empty() {
                Vec::new()
            } else {
                vec![InputItem::text(text)]
            },
        }
    }

    #[tokio::test]
    async fn answers_in_batch_order() {
        let worker = Worker::new(Arc::new(Echo), "m", "ALFRED", 2);
        let out = worker
            .process(vec![prepared(1, "a"), prepared(2, "b"), prepared(3, "c")])
            .await
            .unwrap();
        let answers: Vec<_> = out.iter().map(|p| p.answer().unwrap()).collect();
        assert_eq!(answers, vec!["ALFRED:a", "ALFRED:b", "ALFRED:c"]);
        assert_eq!(out[0].record["gen_model_id"], "m");
    }

    #[tokio::test]
    async fn failure_propagates() {
        let worker = Worker::new(Arc::new(Echo), "m", "ALFRED", 1);
        assert!(worker
            .process(vec![prepared(1, "a"), prepared(2, "")])
            .await
            .is_err());
    }
}
