use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::info;
use vlmeval_core::{
    initialize_logging, BatchRunner, ModelAdapter, ModelConfigs, OpenAiBackend, Qwen2VlChat,
    RunConfig, SaveOutcome, DEFAULT_ENDPOINT,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Root directory of the MileBench datasets.
    #[arg(long = "data_dir", default_value = "data/MileBench")]
    data_dir: PathBuf,

    /// Dataset to run, e.g. `ALFRED`, `ANLS_DocVQA` or `Rouge_OCR_VQA`.
    #[arg(long = "dataset_name", default_value = "data/sample.json")]
    dataset_name: String,

    /// Entry of the model configs to evaluate.
    #[arg(long = "model_name")]
    model_name: String,

    /// Predictions are written to `<output_dir>/<model_name>/<dataset_name>/pred.json`.
    #[arg(long = "output_dir", default_value = "outputs")]
    output_dir: PathBuf,

    /// Requests each rank keeps in flight.
    #[arg(long, default_value_t = 1)]
    bsz: usize,

    /// Maximum number of images per batch. Samples with more images run one per batch.
    #[arg(long = "batch-image", default_value_t = 1)]
    batch_image: usize,

    /// Use combined N images for evaluation.
    #[arg(long = "combine_image")]
    combine_image: Option<usize>,

    /// Path to the model configs YAML file.
    #[arg(long = "model_configs", default_value = "configs/model_configs.yaml")]
    model_configs: PathBuf,

    /// Replace an existing prediction file.
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Chat-completions base URL of a model server. Repeat it to run one rank per server.
    /// Defaults to the model config's `endpoint`, then to `http://localhost:1234/v1`.
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// Bearer token for the model servers.
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// DocVQA annotations as a JSON list of imdb records.
    ///
    /// The distributed `imdb_val.npy` must be exported once, e.g.
    /// `python -c "import json, numpy as np; json.dump(np.load('imdb_val.npy', allow_pickle=True).tolist(), open('imdb_val.json', 'w'), default=lambda o: o.tolist())"`.
    #[arg(long, default_value = "data/docvqa/spdocvqa_imdb/imdb_val.json")]
    docvqa_ann: PathBuf,

    /// DocVQA page images.
    #[arg(long, default_value = "data/docvqa/spdocvqa_images")]
    docvqa_img_dir: PathBuf,

    /// OCR-VQA directory holding `dataset.json` and `images/`.
    #[arg(long, default_value = "data/OCR-VQA")]
    ocrvqa_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    initialize_logging();

    if args.bsz == 0 {
        anyhow::bail!("`bsz` must be a strictly positive integer, got 0.");
    }

    // Fail before any generation when the model is not configured.
    let configs = ModelConfigs::load(&args.model_configs)?;
    let model_config = configs.resolve(&args.model_name, &args.dataset_name)?;

    let endpoints = if args.endpoints.is_empty() {
        vec![model_config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())]
    } else {
        args.endpoints.clone()
    };
    info!("Using {} rank(s): {}", endpoints.len(), endpoints.join(", "));

    let adapters: Vec<Arc<dyn ModelAdapter>> = endpoints
        .iter()
        .map(|endpoint| {
            let backend = Arc::new(OpenAiBackend::new(endpoint, args.api_key.clone()));
            Arc::new(Qwen2VlChat::new(&model_config, backend)) as Arc<dyn ModelAdapter>
        })
        .collect();

    let config = RunConfig {
        data_dir: args.data_dir,
        dataset_name: args.dataset_name,
        model_name: args.model_name,
        output_dir: args.output_dir,
        bsz: args.bsz,
        batch_image: args.batch_image,
        combine_image: args.combine_image,
        overwrite: args.overwrite,
        docvqa_annotation: args.docvqa_ann,
        docvqa_img_dir: args.docvqa_img_dir,
        ocrvqa_dir: args.ocrvqa_dir,
    };

    match BatchRunner::new(config, adapters)?.run().await? {
        SaveOutcome::Written { path, count } => {
            info!("Done: {count} predictions in {}", path.display());
        }
        SaveOutcome::Exists(path) => {
            info!("Skipped {}, nothing was generated", path.display());
        }
    }

    Ok(())
}
