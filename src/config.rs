use crate::render::{EngineSettings, RendererKind};
use crate::scene::FontUnits;
use crate::theme::ThemeRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_DOMAIN: &str = "holder.js";
pub const DEFAULT_FONT_FAMILY: &str = "Arial, Helvetica, Open Sans, sans-serif";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub font_family: String,
    pub font_weight: String,
    pub font_size: f32,
    pub font_units: FontUnits,
    /// Share of the scene's long side the adaptive font size may reach.
    pub text_scale: f32,
    pub line_wrap_ratio: f32,
    pub outline_width: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_weight: "bold".to_string(),
            font_size: 10.0,
            font_units: FontUnits::Pt,
            text_scale: 1.0 / 16.0,
            line_wrap_ratio: 0.9,
            outline_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub domain: String,
    pub themes: ThemeRegistry,
    pub layout: LayoutConfig,
    pub engine: EngineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            themes: ThemeRegistry::default(),
            layout: LayoutConfig::default(),
            engine: EngineSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    domain: Option<String>,
    themes: Option<ThemeRegistry>,
    line_wrap_ratio: Option<f32>,
    default_font_size: Option<f32>,
    default_units: Option<FontUnits>,
    text_scale: Option<f32>,
    font_family: Option<String>,
    font_weight: Option<String>,
    outline_width: Option<f32>,
    renderer: Option<RendererKind>,
    stylesheets: Option<Vec<String>>,
    no_font_fallback: Option<bool>,
    no_background_size: Option<bool>,
    pixel_ratio: Option<f32>,
    re_render_delay_ms: Option<u64>,
}

impl Settings {
    fn apply(&mut self, file: SettingsFile) -> anyhow::Result<()> {
        if let Some(domain) = file.domain {
            self.domain = domain;
        }
        if let Some(themes) = file.themes {
            self.themes.merge(themes);
        }
        if let Some(ratio) = file.line_wrap_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                anyhow::bail!("lineWrapRatio must be in (0, 1], got {ratio}");
            }
            self.layout.line_wrap_ratio = ratio;
        }
        if let Some(size) = file.default_font_size {
            if !(size > 0.0) {
                anyhow::bail!("defaultFontSize must be positive, got {size}");
            }
            self.layout.font_size = size;
        }
        if let Some(units) = file.default_units {
            self.layout.font_units = units;
        }
        if let Some(scale) = file.text_scale {
            self.layout.text_scale = scale;
        }
        if let Some(family) = file.font_family {
            self.layout.font_family = family;
        }
        if let Some(weight) = file.font_weight {
            self.layout.font_weight = weight;
        }
        if let Some(width) = file.outline_width {
            self.layout.outline_width = width;
        }
        if let Some(renderer) = file.renderer {
            self.engine.renderer = renderer;
        }
        if let Some(stylesheets) = file.stylesheets {
            self.engine.stylesheets = stylesheets;
        }
        if let Some(flag) = file.no_font_fallback {
            self.engine.no_font_fallback = flag;
        }
        if let Some(flag) = file.no_background_size {
            self.engine.no_background_size = flag;
        }
        if let Some(ratio) = file.pixel_ratio {
            if !(ratio > 0.0) {
                anyhow::bail!("pixelRatio must be positive, got {ratio}");
            }
            self.engine.pixel_ratio = ratio;
        }
        if let Some(delay) = file.re_render_delay_ms {
            self.engine.re_render_delay_ms = delay;
        }
        Ok(())
    }
}

/// Parses a JSON or JSON5 settings document over the defaults.
pub fn parse_settings(contents: &str) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let parsed: SettingsFile = json5::from_str(contents)?;
    settings.apply(parsed)?;
    Ok(settings)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_settings(&contents)
}
