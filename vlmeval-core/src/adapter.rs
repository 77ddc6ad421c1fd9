//! Uniform "answer this multi-modal message" interface over a chat model.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    backend::{ChatBackend, ChatMessage, ChatRequest},
    config::{GenerationConfig, ModelConfig, PruningConfig},
    message::{ensure_image_url, ensure_video_url, ContentItem, InputItem},
    vision::OCRBENCH_MIN_PIXELS,
    Error, Result,
};

const OCRBENCH: &str = "OCRBench";
const VIDEO_FPS: f64 = 2.0;

#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Generate one answer for `message`. `dataset` enables dataset-specific input policies.
    async fn generate(&self, message: &[InputItem], dataset: Option<&str>) -> Result<String>;
}

/// Qwen2-VL chat adapter.
pub struct Qwen2VlChat {
    model_id: String,
    min_pixels: Option<usize>,
    max_pixels: Option<usize>,
    generation: GenerationConfig,
    system_prompt: Option<String>,
    fps: Option<f64>,
    pruning: Option<PruningConfig>,
    verbose: bool,
    backend: Arc<dyn ChatBackend>,
}

impl Qwen2VlChat {
    pub fn new(config: &ModelConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let this = Self {
            model_id: config.model_id.clone(),
            min_pixels: config.min_pixels,
            max_pixels: config.max_pixels,
            generation: config.gen_kwargs.clone(),
            system_prompt: config.system_prompt.clone(),
            fps: Some(VIDEO_FPS),
            pruning: config.fast_v.clone(),
            verbose: config.verbose,
            backend,
        };
        info!(
            "{} on {}: {:?}, use_cache: {}",
            this.model_id,
            this.backend.describe(),
            this.generation,
            this.use_cache()
        );
        if let Some(pruning) = &this.pruning {
            info!("Pruning mode enabled: {pruning:?}");
        }
        this
    }

    /// Pruning mode needs every token's attention, so the KV cache is turned off.
    pub fn use_cache(&self) -> bool {
        self.pruning.is_none()
    }

    /// Validate and normalize the items of a message.
    pub fn prepare_content(
        &self,
        inputs: &[InputItem],
        dataset: Option<&str>,
    ) -> Result<Vec<ContentItem>> {
        let mut content = Vec::with_capacity(inputs.len());
        for input in inputs {
            let item = match input.kind.as_str() {
                "image" => {
                    let image = ensure_image_url(&input.value)?;
                    if dataset == Some(OCRBENCH) {
                        warn!("{OCRBENCH} dataset uses custom min_pixels={OCRBENCH_MIN_PIXELS}");
                        ContentItem::Image {
                            image,
                            min_pixels: Some(OCRBENCH_MIN_PIXELS),
                            max_pixels: self.max_pixels,
                        }
                    } else {
                        ContentItem::Image {
                            image,
                            min_pixels: self.min_pixels,
                            max_pixels: self.max_pixels,
                        }
                    }
                }
                "video" => ContentItem::Video {
                    video: ensure_video_url(&input.value)?,
                    fps: self.fps,
                },
                "text" => ContentItem::Text {
                    text: input.value.clone(),
                },
                other => {
                    return Err(Error::InvalidContentType {
                        kind: other.to_string(),
                        value: input.value.clone(),
                    })
                }
            };
            content.push(item);
        }
        Ok(content)
    }

    /// The conversation sent for `message`: an optional system turn and one user turn.
    pub fn build_request(&self, message: &[InputItem], dataset: Option<&str>) -> Result<ChatRequest> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(self.prepare_content(message, dataset)?));
        Ok(ChatRequest {
            model: self.model_id.clone(),
            messages,
            generation: self.generation.clone(),
            use_cache: self.use_cache(),
            pruning: self.pruning.clone(),
        })
    }
}

#[async_trait]
impl ModelAdapter for Qwen2VlChat {
    async fn generate(&self, message: &[InputItem], dataset: Option<&str>) -> Result<String> {
        let request = self.build_request(message, dataset)?;
        let verbose = self.verbose || crate::debug_enabled();
        if verbose {
            info!("{}", serde_json::to_string(&request.messages)?);
        }
        let response = self.backend.chat(&request).await?;
        if verbose {
            info!("{response}");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{backend::Role, config::ModelConfigs};

    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatBackend for Recording {
        async fn chat(&self, request: &ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok("B".to_string())
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    fn config(extra: &str) -> ModelConfig {
        let yaml = format!("m:\n  model_id: qwen2-vl\n  min_pixels: 3136\n  max_pixels: 401408\n{extra}");
        ModelConfigs::from_yaml(&yaml).unwrap().get("m").unwrap().clone()
    }

    #[tokio::test]
    async fn generates_through_backend() {
        let backend = Arc::new(Recording::default());
        let chat = Qwen2VlChat::new(&config("  system_prompt: You are helpful.\n"), backend.clone());

        let answer = chat
            .generate(
                &[
                    InputItem::image("https://example.com/1.jpg"),
                    InputItem::text("Which one?"),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(answer, "B");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "qwen2-vl");
        assert!(request.use_cache);
        assert!(request.pruning.is_none());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        let user = request.messages[1].content.as_ref().right().unwrap();
        assert_eq!(
            user[0],
            ContentItem::Image {
                image: "https://example.com/1.jpg".to_string(),
                min_pixels: Some(3136),
                max_pixels: Some(401408),
            }
        );
    }

    #[tokio::test]
    async fn invalid_type_fails_before_generation() {
        let backend = Arc::new(Recording::default());
        let chat = Qwen2VlChat::new(&config(""), backend.clone());
        let err = chat
            .generate(
                &[InputItem::text("hi"), InputItem {
                    kind: "audio".to_string(),
                    value: "a.wav".to_string(),
                }],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContentType { ref kind, .. } if kind == "audio"));

        let err = chat
            .generate(&[InputItem::image("/no/such/image.png")], None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn ocrbench_raises_min_pixels() {
        let chat = Qwen2VlChat::new(&config(""), Arc::new(Recording::default()));
        let items = [InputItem::image("https://example.com/1.jpg")];

        let content = chat.prepare_content(&items, Some("OCRBench")).unwrap();
        assert!(matches!(
            content[0],
            ContentItem::Image { min_pixels: Some(78400), max_pixels: Some(401408), .. }
        ));
        let content = chat.prepare_content(&items, Some("MMBench")).unwrap();
        assert!(matches!(
            content[0],
            ContentItem::Image { min_pixels: Some(3136), .. }
        ));
    }

    #[test]
    fn videos_get_fps() {
        let chat = Qwen2VlChat::new(&config(""), Arc::new(Recording::default()));
        let content = chat
            .prepare_content(&[InputItem::video("https://example.com/v.mp4")], None)
            .unwrap();
        assert_eq!(
            content[0],
            ContentItem::Video {
                video: "https://example.com/v.mp4".to_string(),
                fps: Some(2.0),
            }
        );
    }

    #[test]
    fn pruning_disables_cache() {
        let chat = Qwen2VlChat::new(
            &config("  fast_v:\n    sys_length: 15\n    image_token_length: 576\n    attention_rank: 288\n    agg_layer: 3\n"),
            Arc::new(Recording::default()),
        );
        assert!(!chat.use_cache());
        let request = chat.build_request(&[InputItem::text("hi")], None).unwrap();
        assert!(!request.use_cache);
        assert_eq!(request.pruning.unwrap().agg_layer, 3);
        // No system prompt configured.
        assert_eq!(request.messages.len(), 1);
    }
}
