//! Paint rules for region layers
//!
//! Rules evaluate natively (for engines that paint features themselves) and render to
//! MapLibre-style JSON expressions (for engines that take style documents).

use crate::engine::FeatureState;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;

/// Feature property holding the ISO 3166-1 alpha-2 region code
pub const REGION_CODE_PROPERTY: &str = "ISO_A2";

/// Feature property holding the region display name
pub const REGION_NAME_PROPERTY: &str = "ADMIN";

/// RGBA color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with the alpha channel scaled by `opacity` (0.0 to 1.0)
    pub fn with_opacity(self, opacity: f32) -> Self {
        let a = (self.a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    /// CSS notation: `#rrggbb` when opaque, `rgba(r, g, b, a)` otherwise
    pub fn to_css(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!(
                "rgba({}, {}, {}, {})",
                self.r,
                self.g,
                self.b,
                self.a as f32 / 255.0
            )
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

/// Fill of the hovered region
pub const HOVER_FILL: Color = Color::rgb(0x69, 0xb3, 0xdd);
/// Fill of visited regions
pub const VISITED_FILL: Color = Color::rgb(0xad, 0xd8, 0xe6);
/// Region border lines
pub const OUTLINE_COLOR: Color = Color::rgb(0x62, 0x7b, 0xc1);
/// User location marker
pub const MARKER_COLOR: Color = Color::rgb(0xe7, 0x4c, 0x3c);

/// Two-tier conditional fill: hover overrides visited, visited overrides the default
#[derive(Debug, Clone, PartialEq)]
pub struct FillColorRule {
    pub hover: Color,
    pub visited: Color,
    pub default: Color,
    pub visited_codes: BTreeSet<String>,
}

impl FillColorRule {
    /// Standard palette for the given visited region codes
    pub fn for_visited<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hover: HOVER_FILL,
            visited: VISITED_FILL,
            default: Color::TRANSPARENT,
            visited_codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_visited(&self, region_code: &str) -> bool {
        self.visited_codes.contains(region_code)
    }

    pub fn evaluate(&self, state: FeatureState, region_code: &str) -> Color {
        if state.hover {
            self.hover
        } else if self.is_visited(region_code) {
            self.visited
        } else {
            self.default
        }
    }

    /// MapLibre `fill-color` expression
    pub fn to_expression(&self) -> Value {
        let codes: Vec<&str> = self.visited_codes.iter().map(String::as_str).collect();
        json!([
            "case",
            ["boolean", ["feature-state", "hover"], false],
            self.hover.to_css(),
            [
                "case",
                ["in", ["get", REGION_CODE_PROPERTY], ["literal", codes]],
                self.visited.to_css(),
                self.default.to_css()
            ]
        ])
    }
}

/// Opacity that rises while a region is hovered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityRule {
    pub hover: f32,
    pub default: f32,
}

impl Default for OpacityRule {
    fn default() -> Self {
        Self {
            hover: 0.9,
            default: 0.7,
        }
    }
}

impl OpacityRule {
    pub fn evaluate(&self, state: FeatureState) -> f32 {
        if state.hover { self.hover } else { self.default }
    }

    /// MapLibre `fill-opacity` expression
    pub fn to_expression(&self) -> Value {
        json!([
            "case",
            ["boolean", ["feature-state", "hover"], false],
            self.hover,
            self.default
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOVERED: FeatureState = FeatureState { hover: true };
    const IDLE: FeatureState = FeatureState { hover: false };

    #[test]
    fn test_css_rendering() {
        assert_eq!(HOVER_FILL.to_css(), "#69b3dd");
        assert_eq!(Color::TRANSPARENT.to_css(), "rgba(0, 0, 0, 0)");
    }

    #[test]
    fn test_fill_precedence() {
        let rule = FillColorRule::for_visited(["JP"]);
        assert_eq!(rule.evaluate(HOVERED, "JP"), HOVER_FILL);
        assert_eq!(rule.evaluate(IDLE, "JP"), VISITED_FILL);
        assert_eq!(rule.evaluate(IDLE, "FR"), Color::TRANSPARENT);
        assert_eq!(rule.evaluate(HOVERED, "FR"), HOVER_FILL);
    }

    #[test]
    fn test_fill_expression_shape() {
        let rule = FillColorRule::for_visited(["JP", "FR"]);
        let expr = rule.to_expression();

        assert_eq!(expr[0], "case");
        assert_eq!(expr[1], json!(["boolean", ["feature-state", "hover"], false]));
        assert_eq!(expr[2], "#69b3dd");
        // Codes are sorted for a stable expression
        assert_eq!(expr[3][1][2], json!(["literal", ["FR", "JP"]]));
        assert_eq!(expr[3][2], "#add8e6");
        assert_eq!(expr[3][3], "rgba(0, 0, 0, 0)");
    }

    #[test]
    fn test_opacity_rule() {
        let rule = OpacityRule::default();
        assert_eq!(rule.evaluate(HOVERED), 0.9);
        assert_eq!(rule.evaluate(IDLE), 0.7);
        assert_eq!(rule.to_expression()[3], json!(0.7f32));
    }

    #[test]
    fn test_with_opacity() {
        assert_eq!(VISITED_FILL.with_opacity(0.0).a, 0);
        assert_eq!(VISITED_FILL.with_opacity(1.0).a, 255);
        assert_eq!(Color::TRANSPARENT.with_opacity(0.7).a, 0);
    }
}
