//! Translation of the unified size / quality / moderation options into the
//! aspect-ratio, resolution-tier and safety-threshold model used by Gemini.

use std::fmt;

use image_gen_contracts::{Moderation, Quality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    Square,
    Landscape16x9,
    Portrait9x16,
    Landscape4x3,
    Portrait3x4,
    Ultrawide21x9,
}

impl AspectRatio {
    /// Scan order for nearest-ratio matching.
    pub const ALL: [AspectRatio; 6] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Ultrawide21x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Ultrawide21x9 => "21:9",
        }
    }

    pub fn value(self) -> f64 {
        match self {
            AspectRatio::Square => 1.0,
            AspectRatio::Landscape16x9 => 16.0 / 9.0,
            AspectRatio::Portrait9x16 => 9.0 / 16.0,
            AspectRatio::Landscape4x3 => 4.0 / 3.0,
            AspectRatio::Portrait3x4 => 3.0 / 4.0,
            AspectRatio::Ultrawide21x9 => 21.0 / 9.0,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|aspect| aspect.as_str() == token)
    }

    /// Closest canonical ratio by absolute difference. On an exact tie the
    /// earlier entry of [`AspectRatio::ALL`] wins; that order carries no meaning.
    pub fn nearest(ratio: f64) -> Self {
        let mut best = Self::ALL[0];
        let mut best_delta = (best.value() - ratio).abs();
        for candidate in Self::ALL.into_iter().skip(1) {
            let delta = (candidate.value() - ratio).abs();
            if delta < best_delta {
                best = candidate;
                best_delta = delta;
            }
        }
        best
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known pixel sizes and the ratio they stand for.
const SIZE_TO_ASPECT: [(&str, AspectRatio); 16] = [
    ("1024x1024", AspectRatio::Square),
    ("1536x1536", AspectRatio::Square),
    ("2048x2048", AspectRatio::Square),
    ("1920x1080", AspectRatio::Landscape16x9),
    ("1280x720", AspectRatio::Landscape16x9),
    ("3840x2160", AspectRatio::Landscape16x9),
    ("1344x768", AspectRatio::Landscape16x9),
    ("1080x1920", AspectRatio::Portrait9x16),
    ("720x1280", AspectRatio::Portrait9x16),
    ("1024x768", AspectRatio::Landscape4x3),
    ("1280x960", AspectRatio::Landscape4x3),
    ("768x1024", AspectRatio::Portrait3x4),
    ("960x1280", AspectRatio::Portrait3x4),
    ("2560x1080", AspectRatio::Ultrawide21x9),
    ("3440x1440", AspectRatio::Ultrawide21x9),
    ("1536x672", AspectRatio::Ultrawide21x9),
];

/// Maps any size string onto a canonical aspect ratio. Total: garbage input
/// falls back to 1:1.
pub fn parse_size(size: &str) -> AspectRatio {
    if let Some(aspect) = AspectRatio::from_token(size) {
        return aspect;
    }
    if let Some((_, aspect)) = SIZE_TO_ASPECT.iter().find(|(key, _)| *key == size) {
        return *aspect;
    }
    if let Some((width, height)) = parse_pixel_dims(size) {
        return AspectRatio::nearest(width as f64 / height as f64);
    }
    AspectRatio::Square
}

fn parse_pixel_dims(size: &str) -> Option<(i64, i64)> {
    let lowered = size.to_ascii_lowercase();
    let (left, right) = lowered.split_once('x')?;
    let width = left.trim().parse::<i64>().ok()?;
    let height = right.trim().parse::<i64>().ok()?;
    if height == 0 {
        return None;
    }
    Some((width, height))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionTier {
    OneK,
    TwoK,
    FourK,
}

impl ResolutionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionTier::OneK => "1K",
            ResolutionTier::TwoK => "2K",
            ResolutionTier::FourK => "4K",
        }
    }
}

impl From<Quality> for ResolutionTier {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::High => ResolutionTier::FourK,
            Quality::Medium => ResolutionTier::TwoK,
            Quality::Low => ResolutionTier::OneK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyThreshold {
    Off,
    BlockOnlyHigh,
}

impl SafetyThreshold {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyThreshold::Off => "OFF",
            SafetyThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
        }
    }

    /// Unrecognized labels resolve to the stricter `BLOCK_ONLY_HIGH`.
    pub fn from_moderation_label(label: &str) -> Self {
        match label {
            "low" => SafetyThreshold::Off,
            _ => SafetyThreshold::BlockOnlyHigh,
        }
    }
}

impl From<Moderation> for SafetyThreshold {
    fn from(moderation: Moderation) -> Self {
        Self::from_moderation_label(moderation.as_str())
    }
}

/// Harm categories that all receive the same threshold.
pub const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
