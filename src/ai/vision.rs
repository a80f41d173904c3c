//! Vision utilities for document analysis
//!
//! Handles image preparation and format conversion for vision API calls.

use super::AiError;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Maximum image dimension (width or height)
const MAX_DIMENSION: u32 = 1600;

/// Formats sent unmodified; re-encoding a GIF/WebP would drop animation or
/// bloat the payload
const PASSTHROUGH_EXTENSIONS: &[&str] = &["gif", "webp"];

/// Prepare an image for a vision API call
///
/// - Resizes if too large
/// - Converts to JPEG for optimal payload size
/// - Returns the encoded bytes plus their media type
pub fn prepare_image_for_vision(image_data: &[u8]) -> Result<(Vec<u8>, String), AiError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| AiError::Image(format!("Failed to load image: {}", e)))?;

    let img = resize_if_needed(img);

    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    img.write_to(&mut cursor, ImageFormat::Jpeg)
        .map_err(|e| AiError::Image(format!("Failed to encode image: {}", e)))?;

    Ok((buffer, "image/jpeg".to_string()))
}

/// Resize image if it exceeds maximum dimensions
fn resize_if_needed(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());

    if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        return img;
    }

    let scale = (MAX_DIMENSION as f32 / width.max(height) as f32).min(1.0);
    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;

    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Check if a file extension is an image type we can analyze
pub fn is_image_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tiff" | "tif"
    )
}

/// Load an image file and encode it as a base64 data URL for a vision
/// message
pub async fn load_image_as_data_url(path: &Path) -> Result<String, AiError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| AiError::Image(format!("Failed to read image {}: {}", path.display(), e)))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let (bytes, media_type) = if PASSTHROUGH_EXTENSIONS.contains(&ext.as_str()) {
        let media_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        (data, media_type)
    } else {
        prepare_image_for_vision(&data)?
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", media_type, encoded))
}
