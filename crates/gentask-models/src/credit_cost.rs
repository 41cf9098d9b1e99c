//! Credit cost calculation utilities.
//!
//! Computes the amount to reserve for a generation request and returns a
//! structured breakdown for use in ledger entries and user-facing
//! estimates.

use crate::spec::{GenerationKind, GenerationSpec, QualityTier};

// =============================================================================
// Constants
// =============================================================================

/// Credits per started 5-second segment of video.
pub const VIDEO_CREDITS_PER_SEGMENT: u32 = 10;

/// Seconds covered by one video billing segment.
pub const VIDEO_SEGMENT_SECS: u32 = 5;

/// Default video duration when the spec does not set one.
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 5;

/// Flat cost of an image generation.
pub const IMAGE_CREDIT_COST: u32 = 2;

/// Flat cost of a voice generation.
pub const VOICE_CREDIT_COST: u32 = 1;

/// Multiplier applied for the high quality tier.
pub const HIGH_QUALITY_MULTIPLIER: u32 = 2;

// =============================================================================
// Cost Breakdown
// =============================================================================

/// Detailed breakdown of credits for a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBreakdown {
    /// Base cost before the quality multiplier
    pub base: u32,
    /// Quality multiplier applied (1 for standard)
    pub quality_multiplier: u32,
    /// Grand total to reserve
    pub total: u32,
    /// Number of billing segments (video only, 0 otherwise)
    pub segments: u32,
}

impl CostBreakdown {
    /// Generate a human-readable description for ledger entries.
    ///
    /// Format: "Video generation, 10s (2 segments, high quality)"
    pub fn to_description(&self, spec: &GenerationSpec) -> String {
        match spec.kind {
            GenerationKind::Video => {
                let duration = spec.duration_secs.unwrap_or(DEFAULT_VIDEO_DURATION_SECS);
                let segment_text = if self.segments == 1 { "segment" } else { "segments" };
                if self.quality_multiplier > 1 {
                    format!(
                        "Video generation, {}s ({} {}, {} quality)",
                        duration, self.segments, segment_text, spec.quality
                    )
                } else {
                    format!(
                        "Video generation, {}s ({} {})",
                        duration, self.segments, segment_text
                    )
                }
            }
            GenerationKind::Image => format!("Image generation ({} quality)", spec.quality),
            GenerationKind::Voice => "Voice generation".to_string(),
        }
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Calculates the credits to reserve for a generation spec.
#[derive(Debug, Clone)]
pub struct GenerationCostCalculator<'a> {
    spec: &'a GenerationSpec,
}

impl<'a> GenerationCostCalculator<'a> {
    pub fn new(spec: &'a GenerationSpec) -> Self {
        Self { spec }
    }

    /// Compute the full breakdown.
    pub fn calculate(&self) -> CostBreakdown {
        let (base, segments) = match self.spec.kind {
            GenerationKind::Video => {
                let duration = self
                    .spec
                    .duration_secs
                    .unwrap_or(DEFAULT_VIDEO_DURATION_SECS)
                    .max(1);
                // Round up to whole segments; saturate rather than wrap
                // on absurd durations (the API bounds them, the ledger
                // refuses the reservation either way)
                let segments = duration.div_ceil(VIDEO_SEGMENT_SECS);
                (segments.saturating_mul(VIDEO_CREDITS_PER_SEGMENT), segments)
            }
            GenerationKind::Image => (IMAGE_CREDIT_COST, 0),
            GenerationKind::Voice => (VOICE_CREDIT_COST, 0),
        };

        let quality_multiplier = match self.spec.quality {
            QualityTier::Standard => 1,
            QualityTier::High => HIGH_QUALITY_MULTIPLIER,
        };

        CostBreakdown {
            base,
            quality_multiplier,
            total: base.saturating_mul(quality_multiplier),
            segments,
        }
    }

    /// Shortcut for the reserve amount.
    pub fn total(&self) -> u32 {
        self.calculate().total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::GenerationSpec;

    #[test]
    fn test_video_cost_rounds_up_segments() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x").with_duration_secs(12);
        let cost = GenerationCostCalculator::new(&spec).calculate();
        // 12s -> 3 segments of 5s
        assert_eq!(cost.segments, 3);
        assert_eq!(cost.total, 30);
    }

    #[test]
    fn test_video_default_duration() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x");
        assert_eq!(GenerationCostCalculator::new(&spec).total(), VIDEO_CREDITS_PER_SEGMENT);
    }

    #[test]
    fn test_high_quality_multiplier() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x")
            .with_duration_secs(5)
            .with_quality(QualityTier::High);
        let cost = GenerationCostCalculator::new(&spec).calculate();
        assert_eq!(cost.quality_multiplier, HIGH_QUALITY_MULTIPLIER);
        assert_eq!(cost.total, 20);
    }

    #[test]
    fn test_image_and_voice_flat_cost() {
        let spec = GenerationSpec::new(GenerationKind::Image, "x");
        assert_eq!(GenerationCostCalculator::new(&spec).total(), IMAGE_CREDIT_COST);

        let spec = GenerationSpec::new(GenerationKind::Voice, "x");
        assert_eq!(GenerationCostCalculator::new(&spec).total(), VOICE_CREDIT_COST);
    }

    #[test]
    fn test_huge_duration_saturates_instead_of_wrapping() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x")
            .with_duration_secs(u32::MAX)
            .with_quality(QualityTier::High);
        let cost = GenerationCostCalculator::new(&spec).calculate();
        // No panic, no wraparound to a tiny reservation
        assert_eq!(cost.total, u32::MAX);
    }

    #[test]
    fn test_description() {
        let spec = GenerationSpec::new(GenerationKind::Video, "x").with_duration_secs(10);
        let cost = GenerationCostCalculator::new(&spec).calculate();
        assert_eq!(cost.to_description(&spec), "Video generation, 10s (2 segments)");
    }
}
