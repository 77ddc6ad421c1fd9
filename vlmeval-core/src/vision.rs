//! Client-side preparation of visual inputs before they are inlined into a request.

use std::{io::Cursor, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};

use crate::{Error, Result};

/// Qwen2-VL merges 14px patches 2x2, so resized sides are multiples of 28.
pub const IMAGE_FACTOR: usize = 28;
pub const DEFAULT_MIN_PIXELS: usize = 4 * 28 * 28;
pub const DEFAULT_MAX_PIXELS: usize = 16384 * 28 * 28;
/// Minimum resolution forced for OCRBench images.
pub const OCRBENCH_MIN_PIXELS: usize = 10 * 10 * 28 * 28;
const MAX_ASPECT_RATIO: f64 = 200.0;

/// Compute `(height, width)` so that both are multiples of `factor`, the pixel count lies
/// within `[min_pixels, max_pixels]`, and the aspect ratio is kept as closely as possible.
pub fn smart_resize(
    height: usize,
    width: usize,
    factor: usize,
    min_pixels: usize,
    max_pixels: usize,
) -> Result<(usize, usize)> {
    if height == 0 || width == 0 {
        return Err(Error::InvalidImage(format!(
            "empty image of height:{height} and width:{width}"
        )));
    }
    let ratio = height.max(width) as f64 / height.min(width) as f64;
    if ratio > MAX_ASPECT_RATIO {
        return Err(Error::InvalidImage(format!(
            "absolute aspect ratio must be smaller than {MAX_ASPECT_RATIO}, got {ratio:.2}"
        )));
    }

    // Sides shorter than one factor are padded up to it.
    let mut h_bar = factor.max((height as f64 / factor as f64).round() as usize * factor);
    let mut w_bar = factor.max((width as f64 / factor as f64).round() as usize * factor);

    if h_bar * w_bar > max_pixels {
        let beta = ((height * width) as f64 / max_pixels as f64).sqrt();
        h_bar = ((height as f64 / beta / factor as f64).floor() as usize).max(1) * factor;
        w_bar = ((width as f64 / beta / factor as f64).floor() as usize).max(1) * factor;
    } else if h_bar * w_bar < min_pixels {
        let beta = (min_pixels as f64 / (height * width) as f64).sqrt();
        h_bar = (height as f64 * beta / factor as f64).ceil() as usize * factor;
        w_bar = (width as f64 * beta / factor as f64).ceil() as usize * factor;
    }

    Ok((h_bar, w_bar))
}

/// Resize an image to its smart-resize target.
pub fn resize_for_model(
    image: &DynamicImage,
    min_pixels: Option<usize>,
    max_pixels: Option<usize>,
) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    let (h, w) = smart_resize(
        height as usize,
        width as usize,
        IMAGE_FACTOR,
        min_pixels.unwrap_or(DEFAULT_MIN_PIXELS),
        max_pixels.unwrap_or(DEFAULT_MAX_PIXELS),
    )?;
    if (h, w) == (height as usize, width as usize) {
        return Ok(image.clone());
    }
    Ok(image.resize_exact(w as u32, h as u32, FilterType::CatmullRom))
}

/// Encode an image as a base64 PNG data URL.
pub fn image_to_data_url(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(buf.into_inner())
    ))
}

pub(crate) fn video_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

/// Encode a local video file as a base64 data URL.
pub async fn video_to_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| Error::io(path, e))?;
    Ok(format!(
        "data:{};base64,{}",
        video_mime(path),
        STANDARD.encode(bytes)
    ))
}

/// Load a local image, fit it to the pixel bounds and inline it as a data URL.
pub async fn local_image_to_data_url(
    path: &Path,
    min_pixels: Option<usize>,
    max_pixels: Option<usize>,
) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| Error::io(path, e))?;
    let image = image::load_from_memory(&bytes)?;
    image_to_data_url(&resize_for_model(&image, min_pixels, max_pixels)?)
}
