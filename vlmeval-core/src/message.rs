//! Generic multi-modal messages and their normalized form.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const IMAGE_PREFIXES: [&str; 5] = ["http://", "https://", "file://", "data:image;", "data:image/"];
const VIDEO_PREFIXES: [&str; 5] = ["http://", "https://", "file://", "data:video;", "data:video/"];

/// One item of a generic message: `{"type": "text" | "image" | "video", "value": ...}`.
///
/// The type is kept as a string so unsupported items can be reported rather than rejected
/// at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl InputItem {
    pub fn text(value: impl ToString) -> Self {
        Self {
            kind: "text".to_string(),
            value: value.to_string(),
        }
    }

    pub fn image(value: impl ToString) -> Self {
        Self {
            kind: "image".to_string(),
            value: value.to_string(),
        }
    }

    pub fn video(value: impl ToString) -> Self {
        Self {
            kind: "video".to_string(),
            value: value.to_string(),
        }
    }
}

/// A validated message item, with visual inputs turned into URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_pixels: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_pixels: Option<usize>,
    },
    Video {
        video: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fps: Option<f64>,
    },
}

fn ensure_url(value: &str, prefixes: &[&str]) -> Option<String> {
    if prefixes.iter().any(|p| value.starts_with(p)) {
        return Some(value.to_string());
    }
    let path = Path::new(value);
    if !path.exists() {
        return None;
    }
    let absolute = std::path::absolute(path).ok()?;
    url::Url::from_file_path(absolute).ok().map(String::from)
}

/// Accept remote, `file://` and `data:` image URLs as-is; turn an existing local path
/// into a `file://` URL.
pub fn ensure_image_url(image: &str) -> Result<String> {
    ensure_url(image, &IMAGE_PREFIXES).ok_or_else(|| Error::InvalidImage(image.to_string()))
}

/// Same as [`ensure_image_url`] for videos.
pub fn ensure_video_url(video: &str) -> Result<String> {
    ensure_url(video, &VIDEO_PREFIXES).ok_or_else(|| Error::InvalidVideo(video.to_string()))
}
