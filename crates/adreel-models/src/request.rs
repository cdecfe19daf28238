//! Generation request input record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::style::VideoStyle;

/// A confirmed request to generate one marketing video.
///
/// This is what the surrounding system hands the pipeline once the user has
/// confirmed a script: the style to render, the narration script, and the
/// product's visual summary and reference image from the scraped listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerationRequest {
    /// Style to compose the prompt for
    #[serde(default)]
    pub style: VideoStyle,

    /// Confirmed narration script
    #[validate(length(min = 1, max = 4000, message = "Script must be 1-4000 characters"))]
    pub script: String,

    /// Visual summary of the scraped product, appended to the prompt so the
    /// generated product matches the listing
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Visual summary too long"))]
    pub product_visual_summary: Option<String>,

    /// Product reference image forwarded to the generation service
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "Reference image must be a valid URL"))]
    pub reference_image_url: Option<String>,
}

impl GenerationRequest {
    /// Create a request with just a style and script.
    pub fn new(style: VideoStyle, script: impl Into<String>) -> Self {
        Self {
            style,
            script: script.into(),
            product_visual_summary: None,
            reference_image_url: None,
        }
    }

    /// Set the product visual summary.
    pub fn with_visual_summary(mut self, summary: impl Into<String>) -> Self {
        self.product_visual_summary = Some(summary.into());
        self
    }

    /// Set the reference image URL.
    pub fn with_reference_image(mut self, url: impl Into<String>) -> Self {
        self.reference_image_url = Some(url.into());
        self
    }
}
