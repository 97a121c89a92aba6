//! Field-by-field validation of partial display config updates
//!
//! Every key present in the update is checked independently. Unknown keys are
//! ignored. The result is either a patch holding only typed, in-range values or
//! the full list of violated-field messages.

use serde_json::{Map, Value};

use crate::display::{Color, DisplayConfig, Pixels, TextAlign};
use crate::error::ValidationErrors;

pub const FONT_SIZE_RANGE: (u32, u32) = (12, 72);
pub const SPACING_RANGE: (u32, u32) = (0, 500);
pub const OPACITY_RANGE: (u64, u64) = (1, 100);
pub const MAX_LINES_RANGE: (u64, u64) = (1, 50);
pub const MAX_FONT_FAMILY_LEN: usize = 200;

/// Validated subset of [`DisplayConfig`] fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayConfigPatch {
    pub color: Option<Color>,
    pub font_size: Option<Pixels>,
    pub font_family: Option<String>,
    pub text_align: Option<TextAlign>,
    pub scroll_enabled: Option<bool>,
    pub background_color: Option<Color>,
    pub background_opacity: Option<u8>,
    pub padding: Option<Pixels>,
    pub padding_horizontal: Option<Pixels>,
    pub margin_left: Option<Pixels>,
    pub margin_right: Option<Pixels>,
    pub max_lines: Option<u8>,
}

impl DisplayConfigPatch {
    /// True when the update carried no recognised field
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Replace only the fields present in the patch
    pub fn apply_to(&self, config: &mut DisplayConfig) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut config.color, &self.color);
        set(&mut config.font_size, &self.font_size);
        set(&mut config.font_family, &self.font_family);
        set(&mut config.text_align, &self.text_align);
        set(&mut config.scroll_enabled, &self.scroll_enabled);
        set(&mut config.background_color, &self.background_color);
        set(&mut config.background_opacity, &self.background_opacity);
        set(&mut config.padding, &self.padding);
        set(&mut config.padding_horizontal, &self.padding_horizontal);
        set(&mut config.margin_left, &self.margin_left);
        set(&mut config.margin_right, &self.margin_right);
        set(&mut config.max_lines, &self.max_lines);
    }

    /// Number of fields set
    pub fn len(&self) -> usize {
        [
            self.color.is_some(),
            self.font_size.is_some(),
            self.font_family.is_some(),
            self.text_align.is_some(),
            self.scroll_enabled.is_some(),
            self.background_color.is_some(),
            self.background_opacity.is_some(),
            self.padding.is_some(),
            self.padding_horizontal.is_some(),
            self.margin_left.is_some(),
            self.margin_right.is_some(),
            self.max_lines.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Validate a partial update given as a JSON value.
///
/// Anything other than a JSON object is rejected outright.
pub fn validate_update(update: &Value) -> Result<DisplayConfigPatch, ValidationErrors> {
    match update.as_object() {
        Some(fields) => validate_fields(fields),
        None => Err(ValidationErrors::single(
            "configuration update must be a JSON object",
        )),
    }
}

/// Validate every known key in `fields`, collecting all violations.
pub fn validate_fields(fields: &Map<String, Value>) -> Result<DisplayConfigPatch, ValidationErrors> {
    let mut patch = DisplayConfigPatch::default();
    let mut errors = Vec::new();

    for (key, value) in fields {
        let outcome = match key.as_str() {
            "color" => color(key, value).map(|c| patch.color = Some(c)),
            "backgroundColor" => color(key, value).map(|c| patch.background_color = Some(c)),
            "fontSize" => pixels(key, value, FONT_SIZE_RANGE).map(|p| patch.font_size = Some(p)),
            "padding" => pixels(key, value, SPACING_RANGE).map(|p| patch.padding = Some(p)),
            "paddingHorizontal" => {
                pixels(key, value, SPACING_RANGE).map(|p| patch.padding_horizontal = Some(p))
            }
            "marginLeft" => pixels(key, value, SPACING_RANGE).map(|p| patch.margin_left = Some(p)),
            "marginRight" => {
                pixels(key, value, SPACING_RANGE).map(|p| patch.margin_right = Some(p))
            }
            "fontFamily" => font_family(value).map(|f| patch.font_family = Some(f)),
            "textAlign" => text_align(value).map(|a| patch.text_align = Some(a)),
            "scrollEnabled" => match value.as_bool() {
                Some(b) => {
                    patch.scroll_enabled = Some(b);
                    Ok(())
                }
                None => Err("scrollEnabled must be a boolean".to_string()),
            },
            "backgroundOpacity" => {
                integer(key, value, OPACITY_RANGE).map(|n| patch.background_opacity = Some(n))
            }
            "maxLines" => integer(key, value, MAX_LINES_RANGE).map(|n| patch.max_lines = Some(n)),
            // Out-of-schema keys are not part of the record
            _ => Ok(()),
        };

        if let Err(message) = outcome {
            errors.push(message);
        }
    }

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(ValidationErrors::new(errors))
    }
}

fn color(key: &str, value: &Value) -> Result<Color, String> {
    value
        .as_str()
        .and_then(|s| s.parse::<Color>().ok())
        .ok_or_else(|| format!("{} must be a hex color (#RGB or #RRGGBB) or \"transparent\"", key))
}

fn pixels(key: &str, value: &Value, (min, max): (u32, u32)) -> Result<Pixels, String> {
    let parsed = match value {
        Value::String(s) => s.parse::<Pixels>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Pixels),
        _ => None,
    };

    parsed
        .filter(|px| (min..=max).contains(&px.get()))
        .ok_or_else(|| format!("{} must be a pixel value between {} and {}", key, min, max))
}

fn integer(key: &str, value: &Value, (min, max): (u64, u64)) -> Result<u8, String> {
    value
        .as_u64()
        .filter(|n| (min..=max).contains(n))
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| format!("{} must be an integer between {} and {}", key, min, max))
}

fn font_family(value: &Value) -> Result<String, String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty() && s.chars().count() <= MAX_FONT_FAMILY_LEN)
        .map(str::to_string)
        .ok_or_else(|| {
            format!(
                "fontFamily must be a non-empty string of at most {} characters",
                MAX_FONT_FAMILY_LEN
            )
        })
}

fn text_align(value: &Value) -> Result<TextAlign, String> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "textAlign must be one of left, center, right".to_string())
}
