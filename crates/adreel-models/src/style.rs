//! Video style definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Available marketing video styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStyle {
    /// Product hero shots with dynamic camera moves
    #[default]
    ProductShowcase,
    /// Presenter speaking the script to camera
    TalkingHead,
    /// Product shown in everyday use
    Lifestyle,
}

impl VideoStyle {
    /// All available styles.
    pub const ALL: &'static [VideoStyle] = &[
        VideoStyle::ProductShowcase,
        VideoStyle::TalkingHead,
        VideoStyle::Lifestyle,
    ];

    /// Returns the style name as used on the wire and in object keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStyle::ProductShowcase => "product_showcase",
            VideoStyle::TalkingHead => "talking_head",
            VideoStyle::Lifestyle => "lifestyle",
        }
    }

    /// Returns a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            VideoStyle::ProductShowcase => "Product Showcase",
            VideoStyle::TalkingHead => "Talking Head",
            VideoStyle::Lifestyle => "Lifestyle",
        }
    }
}

impl fmt::Display for VideoStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStyle {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product_showcase" => Ok(VideoStyle::ProductShowcase),
            "talking_head" => Ok(VideoStyle::TalkingHead),
            "lifestyle" => Ok(VideoStyle::Lifestyle),
            _ => Err(StyleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown style: {0}")]
pub struct StyleParseError(String);
