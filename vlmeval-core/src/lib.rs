//! Benchmark runner and chat-model adapter for multi-image vision-language evaluation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub mod adapter;
pub mod backend;
pub mod bucket;
pub mod config;
pub mod dataset;
pub mod distributed;
mod error;
pub mod loader;
pub mod message;
pub mod openai;
pub mod output;
pub mod prediction;
pub mod runner;
pub mod sample;
pub mod vision;
pub mod worker;

pub use adapter::{ModelAdapter, Qwen2VlChat};
pub use backend::{ChatBackend, ChatMessage, ChatRequest, Role};
pub use config::{GenerationConfig, ModelConfig, ModelConfigs, PruningConfig};
pub use error::{Error, Result};
pub use message::{ContentItem, InputItem};
pub use openai::{OpenAiBackend, DEFAULT_ENDPOINT};
pub use output::{OutputTarget, SaveOutcome};
pub use prediction::Prediction;
pub use runner::{BatchRunner, RunConfig};
pub use sample::{Sample, SampleId};

pub(crate) static DEBUG: AtomicBool = AtomicBool::new(false);

/// Whether `VLMEVAL_DEBUG=1` was set when logging was initialized.
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Install the global `tracing` subscriber. Call once, at startup.
///
/// Logs at INFO by default, DEBUG when `VLMEVAL_DEBUG=1`; `RUST_LOG` takes precedence.
pub fn initialize_logging() {
    let is_debug = std::env::var("VLMEVAL_DEBUG")
        .unwrap_or_default()
        .contains('1');
    DEBUG.store(is_debug, Ordering::Relaxed);

    let filter = EnvFilter::builder()
        .with_default_directive(if is_debug {
            LevelFilter::DEBUG.into()
        } else {
            LevelFilter::INFO.into()
        })
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_reads_debug_flag() {
        std::env::set_var("VLMEVAL_DEBUG", "1");
        initialize_logging();
        assert!(debug_enabled());
    }
}
