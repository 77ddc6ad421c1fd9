//! The benchmark driver: groups, shards, generates, gathers, deduplicates and saves.

use std::{path::PathBuf, sync::Arc, time::Instant};

use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::{
    adapter::ModelAdapter,
    bucket::{batch_size_for, split_by_image_count},
    dataset::{
        DocVqaDataset, EvalDataset, MileBenchDataset, OcrVqaDataset, ANLS_DOCVQA, ROUGE_OCR_VQA,
    },
    distributed::ProcessGroup,
    loader::DataLoader,
    output::{OutputTarget, SaveOutcome},
    prediction::{dedup_by_sample_id, Prediction},
    sample::{annotation_path, Annotation},
    worker::Worker,
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub dataset_name: String,
    pub model_name: String,
    pub output_dir: PathBuf,
    /// Requests a rank keeps in flight.
    pub bsz: usize,
    /// Upper bound on images per batch.
    pub batch_image: usize,
    pub combine_image: Option<usize>,
    pub overwrite: bool,
    pub docvqa_annotation: PathBuf,
    pub docvqa_img_dir: PathBuf,
    pub ocrvqa_dir: PathBuf,
}

impl RunConfig {
    pub fn output_target(&self) -> OutputTarget {
        OutputTarget::new(
            &self.output_dir,
            &self.model_name,
            &self.dataset_name,
            self.overwrite,
        )
    }

    fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join(&self.dataset_name)
    }
}

pub struct BatchRunner {
    config: RunConfig,
    workers: Vec<Worker>,
}

impl BatchRunner {
    /// One rank per adapter.
    pub fn new(config: RunConfig, adapters: Vec<Arc<dyn ModelAdapter>>) -> Result<Self> {
        if adapters.is_empty() {
            return Err(Error::ProcessGroup("at least one model endpoint is required".to_string()));
        }
        let workers = adapters
            .into_iter()
            .map(|adapter| {
                Worker::new(adapter, &config.model_name, &config.dataset_name, config.bsz)
            })
            .collect();
        Ok(Self { config, workers })
    }

    pub fn world_size(&self) -> usize {
        self.workers.len()
    }

    pub async fn run(&self) -> Result<SaveOutcome> {
        let target = self.config.output_target();
        if target.is_blocked() {
            return target.save(Vec::new(), &self.config.dataset_name);
        }

        info!(
            "Generation of {} to {} on {} rank(s)",
            self.config.model_name,
            self.config.dataset_name,
            self.world_size()
        );

        let results = match self.config.dataset_name.as_str() {
            ANLS_DOCVQA => {
                let dataset =
                    DocVqaDataset::load(&self.config.docvqa_annotation, &self.config.docvqa_img_dir)?;
                self.run_single_sample(Arc::new(dataset)).await?
            }
            ROUGE_OCR_VQA => {
                let dataset = OcrVqaDataset::load(&self.config.ocrvqa_dir)?;
                self.run_single_sample(Arc::new(dataset)).await?
            }
            _ => self.run_grouped().await?,
        };

        target.save(results, &self.config.dataset_name)
    }

    async fn run_single_sample(&self, dataset: Arc<dyn EvalDataset>) -> Result<Vec<Prediction>> {
        info!(
            "Predicting {} using {}",
            self.config.dataset_name, self.config.model_name
        );
        if dataset.is_empty() {
            warn!("{} has no samples to predict", self.config.dataset_name);
        }
        let results = dedup_by_sample_id(self.run_group(DataLoader::new(dataset, 1)).await?);
        info!("Generation done {}", results.len());
        Ok(results)
    }

    async fn run_grouped(&self) -> Result<Vec<Prediction>> {
        let dataset_dir = self.config.dataset_dir();
        let annotation = Annotation::load(annotation_path(
            &dataset_dir,
            &self.config.dataset_name,
            self.config.combine_image,
        ))?;
        let img_dir = dataset_dir.join("images");
        let task_instructions = annotation.meta_data.task_instruction;

        info!(
            "Predicting {} using {}",
            self.config.dataset_name, self.config.model_name
        );
        let mut results = Vec::new();
        for (n_img, samples) in split_by_image_count(annotation.data) {
            info!(
                "Proceeding {n_img}-length images samples | Num: {}",
                samples.len()
            );
            let dataset = MileBenchDataset::new(
                samples,
                task_instructions.clone(),
                &img_dir,
                self.config.combine_image,
            );
            let loader = DataLoader::new(
                Arc::new(dataset),
                batch_size_for(self.config.batch_image, n_img),
            );
            results.extend(self.run_group(loader).await?);
            results = dedup_by_sample_id(results);
            info!("Generation done {}", results.len());
        }
        Ok(results)
    }

    /// Run every rank over its shard of `loader` and return what the main rank gathered.
    async fn run_group(&self, loader: DataLoader) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let group = ProcessGroup::<Prediction>::new(self.world_size());
        let ranks = group
            .ranks()
            .into_iter()
            .zip(&self.workers)
            .map(|(rank, worker)| {
                let shard = loader.shard(rank.rank(), rank.world_size());
                async move {
                    let progress = if rank.is_main_process() {
                        progress_bar(shard.len() as u64)
                    } else {
                        ProgressBar::hidden()
                    };
                    let mut collected = Vec::new();
                    for step in 0..shard.len() {
                        let outputs = worker.process(shard.load(step)?).await?;
                        let all = rank.all_gather(outputs).await;
                        if rank.is_main_process() {
                            collected.extend(all);
                        }
                        progress.inc(1);
                    }
                    progress.finish_and_clear();
                    rank.wait_for_everyone().await;
                    Ok::<_, Error>(collected)
                }
            });

        let per_rank = try_join_all(ranks).await?;
        info!(
            "Group of {} batch(es) of size {} took {:.2}s",
            loader.num_batches(),
            loader.batch_size(),
            start.elapsed().as_secs_f32()
        );
        Ok(per_rank.into_iter().next().unwrap_or_default())
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
    {
        bar.set_style(style);
    }
    bar
}
