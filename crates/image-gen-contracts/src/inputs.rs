use std::path::Path;

use crate::error::{ImageGenError, Result};

/// Extensions accepted for input images and reserved by output naming.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default()
}

/// MIME type sent alongside an uploaded image.
pub fn media_type_for_path(path: &Path) -> String {
    let ext = lowercase_extension(path);
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "webp" => "image/webp".to_string(),
        _ => format!("image/{ext}"),
    }
}

pub fn validate_image_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ImageGenError::Validation(format!(
            "File not found: {}",
            path.display()
        )));
    }
    let ext = lowercase_extension(path);
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        let shown = if ext.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{ext}")
        };
        return Err(ImageGenError::Validation(format!(
            "Invalid image format: {shown} (supported formats: {})",
            IMAGE_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(())
}

pub fn validate_image_count(count: usize, max_images: usize, api: &str) -> Result<()> {
    if count > max_images {
        return Err(ImageGenError::Validation(format!(
            "Maximum of {max_images} input images allowed for {api}."
        )));
    }
    Ok(())
}
