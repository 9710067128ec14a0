use crate::color::{Color, MID_GRAY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_THEME: &str = "gray";

/// Alpha of the dark foreground blended onto light backgrounds.
const DARK_FOREGROUND_ALPHA: f32 = 0.285714;
/// Outline shift applied to the background, towards higher contrast.
const OUTLINE_SHIFT: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(alias = "bg")]
    pub background: Color,
    #[serde(alias = "fg")]
    pub foreground: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, alias = "fontweight", skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Theme {
    pub fn new(background: u32, foreground: u32) -> Self {
        Self {
            background: Color::from_raw(background),
            foreground: Color::from_raw(foreground),
            font: None,
            font_weight: None,
            size: None,
            text: None,
        }
    }

    pub fn gray() -> Self {
        Self::new(0xEEEEEE, 0xAAAAAA)
    }
}

/// Named themes available to descriptors via `theme=` and `random=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeRegistry {
    themes: BTreeMap<String, Theme>,
}

impl Default for ThemeRegistry {
    fn default() -> Self {
        let mut themes = BTreeMap::new();
        themes.insert(DEFAULT_THEME.to_string(), Theme::gray());
        themes.insert("social".to_string(), Theme::new(0x3a5a97, 0xFFFFFF));
        themes.insert("industrial".to_string(), Theme::new(0x434A52, 0xC2F200));
        themes.insert("sky".to_string(), Theme::new(0x0D8FDB, 0xFFFFFF));
        themes.insert("vine".to_string(), Theme::new(0x39DBAC, 0x1E292C));
        themes.insert("lava".to_string(), Theme::new(0xF8591A, 0x1C2846));
        Self { themes }
    }
}

impl ThemeRegistry {
    pub fn empty() -> Self {
        Self {
            themes: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Theme> {
        self.themes.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, theme: Theme) {
        self.themes.insert(name.into(), theme);
    }

    pub fn names(&self) -> Vec<String> {
        self.themes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// The registry's `gray` entry, or the built-in gray when it was removed.
    pub fn default_theme(&self) -> Theme {
        self.get(DEFAULT_THEME).cloned().unwrap_or_else(Theme::gray)
    }

    pub fn merge(&mut self, other: ThemeRegistry) {
        self.themes.extend(other.themes);
    }
}

/// Colour-related flags lifted from a descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemeRequest {
    pub name: Option<String>,
    pub background: Option<Color>,
    pub foreground: Option<Color>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTheme {
    pub theme: Theme,
    pub auto_foreground: bool,
}

/// Resolves the final theme for a descriptor.
///
/// A registered theme name wins outright and the explicit colours are
/// ignored. Without one, explicit colours are merged over the default theme.
/// A background without a foreground still derives a contrasting foreground
/// from whatever background the theme ends up with. The registry is only
/// read; the returned theme is an owned copy.
pub fn resolve_theme(request: &ThemeRequest, registry: &ThemeRegistry) -> ResolvedTheme {
    let named = request
        .name
        .as_deref()
        .and_then(|name| registry.get(name))
        .cloned();

    let mut theme = match named {
        Some(theme) => theme,
        None => {
            let mut theme = registry.default_theme();
            if let Some(background) = request.background {
                theme.background = background;
            }
            if let Some(foreground) = request.foreground {
                theme.foreground = foreground;
            }
            theme
        }
    };

    let auto_foreground = request.background.is_some() && request.foreground.is_none();
    if auto_foreground {
        theme.foreground = auto_foreground_color(&theme.background);
    }

    ResolvedTheme {
        theme,
        auto_foreground,
    }
}

/// Dark translucent text blended onto light backgrounds, solid white otherwise.
pub fn auto_foreground_color(background: &Color) -> Color {
    let overlay = if background.lighter_than(&MID_GRAY) {
        Color::from_raw(0x000000).with_alpha(DARK_FOREGROUND_ALPHA)
    } else {
        Color::from_raw(0xFFFFFF)
    };
    background.blend_alpha(&overlay)
}

pub fn outline_color(background: &Color) -> Color {
    if background.lighter_than(&MID_GRAY) {
        background.lighten(-OUTLINE_SHIFT)
    } else {
        background.lighten(OUTLINE_SHIFT)
    }
}
