//! Static model configuration, a YAML file keyed by model name.
//!
//! ```yaml
//! qwen2-vl-7b:
//!   model_id: Qwen/Qwen2-VL-7B-Instruct
//!   gen_kwargs:
//!     max_new_tokens: 256
//!   max_pixels: 1003520
//!   fast_v:
//!     sys_length: 15
//!     image_token_length: 1024
//!     attention_rank: 512
//!     agg_layer: 2
//! ```

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_max_new_tokens() -> usize {
    50
}

fn default_one() -> usize {
    1
}

fn default_top_p() -> f64 {
    0.001
}

fn default_temperature() -> f64 {
    0.01
}

fn default_repetition_penalty() -> f64 {
    1.0
}

/// Sampling configuration handed unchanged to every generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_one")]
    pub num_beams: usize,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_one")]
    pub top_k: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            num_beams: 1,
            top_p: default_top_p(),
            top_k: 1,
            temperature: default_temperature(),
            repetition_penalty: default_repetition_penalty(),
        }
    }
}

/// Thresholds of the token-pruning execution mode (FastV / sequential pruning).
///
/// These are interpreted by the model, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningConfig {
    #[serde(default)]
    pub inplace: bool,
    pub sys_length: usize,
    pub image_token_length: usize,
    pub attention_rank: usize,
    pub agg_layer: usize,
    #[serde(default)]
    pub sequential_prune: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as served by the backend.
    pub model_id: String,
    /// Chat-completions base URL, used when no endpoint is given on the command line.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub gen_kwargs: GenerationConfig,
    #[serde(default)]
    pub min_pixels: Option<usize>,
    #[serde(default)]
    pub max_pixels: Option<usize>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    /// Present when the model should run in pruning mode.
    #[serde(default)]
    pub fast_v: Option<PruningConfig>,
}

impl ModelConfig {
    /// KV caching is disabled while pruning.
    pub fn use_cache(&self) -> bool {
        self.fast_v.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ModelConfigs(HashMap<String, ModelConfig>);

impl ModelConfigs {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Look up a model, failing before any generation when it is missing.
    pub fn get(&self, model_name: &str) -> Result<&ModelConfig> {
        self.0
            .get(model_name)
            .ok_or_else(|| Error::UnknownModel(model_name.to_string()))
    }

    /// Resolve a model's configuration for a dataset, applying the dataset's
    /// generation-length override.
    pub fn resolve(&self, model_name: &str, dataset_name: &str) -> Result<ModelConfig> {
        let mut config = self.get(model_name)?.clone();
        if let Some(max_new_tokens) = max_new_tokens_override(dataset_name) {
            config.gen_kwargs.max_new_tokens = max_new_tokens;
        }
        Ok(config)
    }
}

/// Datasets with short reference answers cap the generation length.
pub fn max_new_tokens_override(dataset_name: &str) -> Option<usize> {
    match dataset_name {
        crate::dataset::ANLS_DOCVQA => Some(100),
        crate::dataset::ROUGE_OCR_VQA => Some(50),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGS: &str = r#"
qwen2-vl-7b:
  model_id: Qwen/Qwen2-VL-7B-Instruct
  gen_kwargs:
    max_new_tokens: 512
    temperature: 0.2
  max_pixels: 1003520
qwen2-vl-7b-fastv:
  model_id: Qwen/Qwen2-VL-7B-Instruct
  endpoint: http://gpu1:1234/v1
  fast_v:
    inplace: false
    sys_length: 15
    image_token_length: 1024
    attention_rank: 512
    agg_layer: 2
    sequential_prune: true
"#;

    #[test]
    fn parses_with_defaults() {
        let configs = ModelConfigs::from_yaml(CONFIGS).unwrap();
        let cfg = configs.get("qwen2-vl-7b").unwrap();
        assert_eq!(cfg.gen_kwargs.max_new_tokens, 512);
        assert_eq!(cfg.gen_kwargs.temperature, 0.2);
        assert_eq!(cfg.gen_kwargs.top_k, 1);
        assert_eq!(cfg.gen_kwargs.num_beams, 1);
        assert_eq!(cfg.max_pixels, Some(1003520));
        assert_eq!(cfg.min_pixels, None);
        assert!(cfg.use_cache());

        let pruned = configs.get("qwen2-vl-7b-fastv").unwrap();
        assert!(!pruned.use_cache());
        let fast_v = pruned.fast_v.as_ref().unwrap();
        assert_eq!(fast_v.attention_rank, 512);
        assert!(fast_v.sequential_prune);
        assert_eq!(pruned.gen_kwargs, GenerationConfig::default());
    }

    #[test]
    fn unknown_model_fails() {
        let configs = ModelConfigs::from_yaml(CONFIGS).unwrap();
        let err = configs.resolve("llava", "ALFRED").unwrap_err();
        assert!(matches!(err, Error::UnknownModel(ref m) if m == "llava"));
    }

    #[test]
    fn dataset_overrides_generation_length() {
        let configs = ModelConfigs::from_yaml(CONFIGS).unwrap();
        let docvqa = configs.resolve("qwen2-vl-7b", "ANLS_DocVQA").unwrap();
        assert_eq!(docvqa.gen_kwargs.max_new_tokens, 100);
        let ocr = configs.resolve("qwen2-vl-7b", "Rouge_OCR_VQA").unwrap();
        assert_eq!(ocr.gen_kwargs.max_new_tokens, 50);
        let other = configs.resolve("qwen2-vl-7b", "ALFRED").unwrap();
        assert_eq!(other.gen_kwargs.max_new_tokens, 512);
        // The shared table is untouched.
        assert_eq!(
            configs.get("qwen2-vl-7b").unwrap().gen_kwargs.max_new_tokens,
            512
        );
    }
}
