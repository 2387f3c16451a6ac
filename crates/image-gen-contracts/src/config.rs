use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ImageGenError;

/// Requested output quality, shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    High,
    Medium,
    Low,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::High, Quality::Medium, Quality::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ImageGenError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Quality::High),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            _ => Err(ImageGenError::Configuration(format!(
                "Unknown quality '{raw}' (expected high, medium or low)"
            ))),
        }
    }
}

/// Content moderation level as understood by the GPT image API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Moderation {
    Auto,
    Low,
}

impl Moderation {
    pub fn as_str(self) -> &'static str {
        match self {
            Moderation::Auto => "auto",
            Moderation::Low => "low",
        }
    }
}

impl fmt::Display for Moderation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Moderation {
    type Err = ImageGenError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Moderation::Auto),
            "low" => Ok(Moderation::Low),
            _ => Err(ImageGenError::Configuration(format!(
                "Unknown moderation level '{raw}' (expected auto or low)"
            ))),
        }
    }
}

/// Unified, backend-independent request description.
///
/// Fields are private and only exposed through accessors, so a config cannot
/// change after construction. Backends derive their own parameters (aspect
/// ratio, resolution tier, safety thresholds) from it on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenConfig {
    prompt: String,
    images: Box<[PathBuf]>,
    quality: Quality,
    size: String,
    count: u32,
    transparent: bool,
    moderation: Moderation,
}

impl ImageGenConfig {
    pub fn new<I, P>(
        prompt: impl Into<String>,
        images: I,
        quality: Quality,
        size: impl Into<String>,
        count: u32,
        transparent: bool,
        moderation: Moderation,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            prompt: prompt.into(),
            images: images.into_iter().map(Into::into).collect(),
            quality,
            size: size.into(),
            count,
            transparent,
            moderation,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Input images in the order given; prompts refer to them as "Image 1", "Image 2", ...
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn transparent(&self) -> bool {
        self.transparent
    }

    pub fn moderation(&self) -> Moderation {
        self.moderation
    }

    pub fn is_edit(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn last_image(&self) -> Option<&Path> {
        self.images.last().map(PathBuf::as_path)
    }
}

/// One decoded image returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenResult {
    image_data: Vec<u8>,
    format: String,
}

impl ImageGenResult {
    pub fn new(image_data: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            image_data,
            format: format.into(),
        }
    }

    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Format tag such as `png` or `jpeg`.
    pub fn format(&self) -> &str {
        &self.format
    }
}
