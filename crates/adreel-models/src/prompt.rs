//! Prompt composition.
//!
//! Pure mapping from (style, script, optional product visual summary) to a
//! single generation prompt string. Dispatch is a lookup of one builder
//! function per style; no I/O, no clock, same inputs always produce the
//! same prompt.

use crate::style::VideoStyle;

const PRODUCT_SHOWCASE_TEMPLATE: &str = r#"Create a short, high-energy product marketing video.
Show the product as the hero: clean studio backdrop, dramatic lighting,
slow push-ins and orbiting camera moves that highlight materials and
details. Pace the cuts to the narration below."#;

const TALKING_HEAD_TEMPLATE: &str = r#"Create a short marketing video presented by a friendly,
credible spokesperson speaking directly to camera. Neutral modern interior,
soft key light, occasional cutaways to the product while the narration
below is delivered naturally."#;

const LIFESTYLE_TEMPLATE: &str = r#"Create a short lifestyle marketing video showing the product
in authentic everyday use. Warm natural light, handheld feel, real moments
rather than staged poses. Let the narration below carry the story."#;

/// Builds the style-specific body of the prompt from the script.
type PromptBuilder = fn(&str) -> String;

fn product_showcase(script: &str) -> String {
    format!("{PRODUCT_SHOWCASE_TEMPLATE}\n\nNarration:\n{script}")
}

fn talking_head(script: &str) -> String {
    format!("{TALKING_HEAD_TEMPLATE}\n\nNarration:\n{script}")
}

fn lifestyle(script: &str) -> String {
    format!("{LIFESTYLE_TEMPLATE}\n\nNarration:\n{script}")
}

/// Lookup table keyed by style.
fn builder_for(style: VideoStyle) -> PromptBuilder {
    match style {
        VideoStyle::ProductShowcase => product_showcase,
        VideoStyle::TalkingHead => talking_head,
        VideoStyle::Lifestyle => lifestyle,
    }
}

/// Compose the generation prompt for a confirmed script.
///
/// When a product visual summary is present, a fidelity addendum is
/// appended so the generated product matches the scraped listing.
pub fn compose_prompt(style: VideoStyle, script: &str, visual_summary: Option<&str>) -> String {
    let mut prompt = builder_for(style)(script);

    if let Some(summary) = visual_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\nMatch the product's real appearance exactly:\n");
        prompt.push_str(summary.trim());
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_is_deterministic() {
        let a = compose_prompt(
            VideoStyle::ProductShowcase,
            "Meet the mug that keeps coffee hot for 12 hours.",
            Some("matte black steel, copper rim"),
        );
        let b = compose_prompt(
            VideoStyle::ProductShowcase,
            "Meet the mug that keeps coffee hot for 12 hours.",
            Some("matte black steel, copper rim"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_each_style_produces_distinct_prompt() {
        let script = "Same script.";
        let showcase = compose_prompt(VideoStyle::ProductShowcase, script, None);
        let talking = compose_prompt(VideoStyle::TalkingHead, script, None);
        let lifestyle = compose_prompt(VideoStyle::Lifestyle, script, None);

        assert_ne!(showcase, talking);
        assert_ne!(talking, lifestyle);
        assert_ne!(showcase, lifestyle);
        for prompt in [&showcase, &talking, &lifestyle] {
            assert!(prompt.contains(script));
        }
    }

    #[test]
    fn test_visual_summary_addendum() {
        let without = compose_prompt(VideoStyle::Lifestyle, "Script.", None);
        let with = compose_prompt(VideoStyle::Lifestyle, "Script.", Some("red ceramic"));

        assert!(with.starts_with(&without));
        assert!(with.contains("red ceramic"));
        assert!(with.contains("real appearance"));
    }

    #[test]
    fn test_blank_visual_summary_is_ignored() {
        let without = compose_prompt(VideoStyle::TalkingHead, "Script.", None);
        let blank = compose_prompt(VideoStyle::TalkingHead, "Script.", Some("   "));
        assert_eq!(without, blank);
    }
}
