//! Generation spec definitions.
//!
//! A [`GenerationSpec`] is the immutable description of one generation
//! request. It is created when a request is accepted and never mutated;
//! provider adapters read from it when encoding their wire requests.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of content being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Long-running video synthesis (minutes, polled)
    Video,
    /// Still image synthesis
    Image,
    /// Voice/speech synthesis
    Voice,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Video => "video",
            GenerationKind::Image => "image",
            GenerationKind::Voice => "voice",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Landscape (16:9), the default for video providers.
    pub const LANDSCAPE: AspectRatio = AspectRatio {
        width: 16,
        height: 9,
    };

    /// Portrait (9:16) for short-form vertical video.
    pub const PORTRAIT: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1,
        height: 1,
    };

    /// Create a new aspect ratio.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::LANDSCAPE
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Error parsing an aspect ratio string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectRatioParseError(pub String);

impl fmt::Display for AspectRatioParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid aspect ratio: {}", self.0)
    }
}

impl std::error::Error for AspectRatioParseError {}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError(s.to_string()))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError(s.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError(s.to_string()))?;
        if width == 0 || height == 0 {
            return Err(AspectRatioParseError(s.to_string()));
        }
        Ok(Self { width, height })
    }
}

/// Resolution/quality tier requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Default tier (720p-class output)
    #[default]
    Standard,
    /// Premium tier (1080p-class output), costs more credits
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Standard => "standard",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source image for image-to-video or image-to-image generation.
///
/// Providers only consume URL references. Inline bytes must be resolved
/// into a reference by media preparation before any provider is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ImageSource {
    /// Already-hosted image, consumable by providers as-is.
    Reference { url: String },
    /// Raw image bytes supplied by the client (base64).
    Inline { data: String, mime_type: String },
}

impl ImageSource {
    /// Whether this source still needs to be uploaded.
    pub fn is_inline(&self) -> bool {
        matches!(self, ImageSource::Inline { .. })
    }
}

/// Immutable description of what to generate.
///
/// Created once per user request; fallback attempts reuse the same spec,
/// adjusting only provider-specific encoding (e.g. the watermark flag).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationSpec {
    /// What kind of content to generate
    pub kind: GenerationKind,

    /// Prompt text
    pub prompt: String,

    /// Optional source image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,

    /// Requested duration in seconds (video/voice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,

    /// Output aspect ratio
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Quality tier
    #[serde(default)]
    pub quality: QualityTier,

    /// Whether the user accepts a watermarked output (cheaper/faster path)
    #[serde(default)]
    pub watermark: bool,

    /// Explicit provider preference; wins over the default chain order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_hint: Option<String>,
}

impl GenerationSpec {
    /// Create a spec with defaults for everything but kind and prompt.
    pub fn new(kind: GenerationKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            image: None,
            duration_secs: None,
            aspect_ratio: AspectRatio::default(),
            quality: QualityTier::default(),
            watermark: false,
            provider_hint: None,
        }
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect: AspectRatio) -> Self {
        self.aspect_ratio = aspect;
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_provider_hint(mut self, hint: impl Into<String>) -> Self {
        self.provider_hint = Some(hint.into());
        self
    }

    /// Whether media preparation still has work to do for this spec.
    pub fn needs_image_upload(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.is_inline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse() {
        let ar: AspectRatio = "9:16".parse().unwrap();
        assert_eq!(ar, AspectRatio::PORTRAIT);
        assert!("9x16".parse::<AspectRatio>().is_err());
        assert!("0:16".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_spec_builder() {
        let spec = GenerationSpec::new(GenerationKind::Video, "a cat surfing")
            .with_duration_secs(10)
            .with_quality(QualityTier::High)
            .with_provider_hint("pulsar");

        assert_eq!(spec.kind, GenerationKind::Video);
        assert_eq!(spec.duration_secs, Some(10));
        assert_eq!(spec.provider_hint.as_deref(), Some("pulsar"));
        assert!(!spec.needs_image_upload());
    }

    #[test]
    fn test_needs_image_upload() {
        let spec = GenerationSpec::new(GenerationKind::Video, "animate this")
            .with_image(ImageSource::Inline {
                data: "aGVsbG8=".into(),
                mime_type: "image/png".into(),
            });
        assert!(spec.needs_image_upload());

        let spec = GenerationSpec::new(GenerationKind::Video, "animate this")
            .with_image(ImageSource::Reference {
                url: "https://cdn.example.com/a.png".into(),
            });
        assert!(!spec.needs_image_upload());
    }

    #[test]
    fn test_image_source_serde_shape() {
        let src = ImageSource::Reference {
            url: "https://cdn.example.com/a.png".into(),
        };
        let json = serde_json::to_value(&src).unwrap();
        assert_eq!(json["type"], "reference");
        assert_eq!(json["url"], "https://cdn.example.com/a.png");
    }
}
