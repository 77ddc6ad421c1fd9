//! ## OpenAI compatible chat backend.
//!
//! Talks to `mistralrs-server` or any other server exposing `/v1/chat/completions`
//! with `image_url`/`video_url` content parts.

use async_trait::async_trait;
use either::Either;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    backend::{ChatBackend, ChatRequest},
    config::PruningConfig,
    message::ContentItem,
    vision, Error, Result,
};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone, Serialize)]
struct UrlPart {
    url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: UrlPart,
    },
    VideoUrl {
        video_url: UrlPart,
        #[serde(skip_serializing_if = "Option::is_none")]
        fps: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    #[serde(with = "either::serde_untagged")]
    content: Either<String, Vec<ContentPart>>,
}

/// Body of `POST /chat/completions`. Fields past `n` are server extensions.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: usize,
    temperature: f64,
    top_p: f64,
    #[serde(rename = "n")]
    n_choices: usize,
    top_k: usize,
    repetition_penalty: f64,
    num_beams: usize,
    use_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fast_v: Option<&'a PruningConfig>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

fn local_path(url: &str) -> Option<std::path::PathBuf> {
    if !url.starts_with("file://") {
        return None;
    }
    url::Url::parse(url).ok()?.to_file_path().ok()
}

/// Turn a normalized item into a wire part, inlining local files.
async fn to_content_part(item: &ContentItem) -> Result<ContentPart> {
    Ok(match item {
        ContentItem::Text { text } => ContentPart::Text { text: text.clone() },
        ContentItem::Image {
            image,
            min_pixels,
            max_pixels,
        } => {
            let url = if image.starts_with("file://") {
                let path = local_path(image).ok_or_else(|| Error::InvalidImage(image.clone()))?;
                vision::local_image_to_data_url(&path, *min_pixels, *max_pixels).await?
            } else {
                image.clone()
            };
            ContentPart::ImageUrl {
                image_url: UrlPart { url },
            }
        }
        ContentItem::Video { video, fps } => {
            let url = if video.starts_with("file://") {
                let path = local_path(video).ok_or_else(|| Error::InvalidVideo(video.clone()))?;
                vision::video_to_data_url(&path).await?
            } else {
                video.clone()
            };
            ContentPart::VideoUrl {
                video_url: UrlPart { url },
                fps: *fps,
            }
        }
    })
}

async fn to_wire_message(message: &crate::backend::ChatMessage) -> Result<Message> {
    let content = match &message.content {
        Either::Left(text) => Either::Left(text.clone()),
        Either::Right(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(to_content_part(item).await?);
            }
            Either::Right(parts)
        }
    };
    Ok(Message {
        role: message.role.to_string(),
        content,
    })
}

/// A chat backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(base_url: impl ToString, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            messages.push(to_wire_message(message).await?);
        }
        let gen = &request.generation;
        let body = ChatCompletionRequest {
            model: &request.model,
            messages,
            max_tokens: gen.max_new_tokens,
            temperature: gen.temperature,
            top_p: gen.top_p,
            n_choices: 1,
            top_k: gen.top_k,
            repetition_penalty: gen.repetition_penalty,
            num_beams: gen.num_beams,
            use_cache: request.use_cache,
            fast_v: request.pruning.as_ref(),
        };

        let mut builder = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!("{status}: {text}")));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("response has no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();
        debug!("{} answered {} chars", self.base_url, content.len());
        Ok(content)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
