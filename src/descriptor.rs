//! Placeholder descriptor parsing: `<domain>/<W>x<H>?key=value&...`.

use crate::color::Color;
use crate::querystring;
use crate::theme::{Theme, ThemeRegistry, ThemeRequest, resolve_theme};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{BuildHasher, RandomState};
use tracing::{debug, warn};

static DIMENSIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([%p]?)x(\d+)([%p]?)$").unwrap());

const DIMENSIONS_TEMPLATE: &str = "holder_dimensions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Pixels(u32),
    Percent(u32),
}

impl Dimension {
    pub fn value(&self) -> u32 {
        match self {
            Dimension::Pixels(v) | Dimension::Percent(v) => *v,
        }
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, Dimension::Percent(_))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(v) => write!(f, "{v}"),
            Dimension::Percent(v) => write!(f, "{v}%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: Dimension,
    pub height: Dimension,
}

impl Dimensions {
    /// The nominal `WxH` caption, percent signs included.
    pub fn caption(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    #[default]
    Default,
    Literal,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl Align {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" => Some(Align::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderSpec {
    /// The descriptor, starting at the domain when one was found.
    pub holder_url: String,
    pub dimensions: Dimensions,
    pub fluid: bool,
    pub auto: bool,
    pub theme: Theme,
    pub auto_foreground: bool,
    pub text: Option<String>,
    pub text_mode: TextMode,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub align: Align,
    pub nowrap: bool,
    pub outline: bool,
    pub line_wrap_ratio: Option<f32>,
    pub stylesheets: Vec<String>,
}

impl PlaceholderSpec {
    /// Caption text shown by the element: `text [WxH]`, or `WxH` without a text.
    pub fn alt_text(&self) -> String {
        let dimensions = self.dimensions.caption();
        match self.text.as_deref().or(self.theme.text.as_deref()) {
            Some(text) if text.contains(&dimensions) => text.to_string(),
            Some(text) => format!("{text} [{dimensions}]"),
            None => dimensions,
        }
    }
}

pub struct ParseOptions<'a> {
    pub domain: &'a str,
    pub themes: &'a ThemeRegistry,
    pub stylesheets: &'a [String],
}

/// Lazily built theme name list plus the generator used by `random=`.
#[derive(Debug, Clone)]
pub struct ThemeKeyCache {
    keys: Option<Vec<String>>,
    state: u64,
}

impl Default for ThemeKeyCache {
    fn default() -> Self {
        Self::with_seed(RandomState::new().hash_one(0x686f6c646572u64))
    }
}

impl ThemeKeyCache {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            keys: None,
            // xorshift state must be non-zero
            state: seed | 1,
        }
    }

    /// Drops the cached key list; call after the registry changes.
    pub fn invalidate(&mut self) {
        self.keys = None;
    }

    pub fn is_cached(&self) -> bool {
        self.keys.is_some()
    }

    pub fn pick(&mut self, registry: &ThemeRegistry) -> Option<String> {
        let keys = self.keys.get_or_insert_with(|| registry.names());
        if keys.is_empty() {
            return None;
        }
        let len = keys.len() as u64;
        let index = next_random(&mut self.state) % len;
        self.keys
            .as_ref()
            .and_then(|keys| keys.get(index as usize))
            .cloned()
    }
}

fn next_random(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

/// Loose truthiness used by boolean query flags.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "yes" | "1" | "on" | "✓"),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Parses a descriptor into a placeholder spec. `None` means the string is
/// not a placeholder descriptor at all, which callers treat as "do nothing".
pub fn parse_descriptor(
    url: &str,
    options: &ParseOptions<'_>,
    theme_keys: &mut ThemeKeyCache,
) -> Option<PlaceholderSpec> {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };

    let domain_prefix = format!("{}/", options.domain);
    let (start, segment_path) = match path.rfind(&domain_prefix) {
        Some(idx) if !options.domain.is_empty() => (idx, &path[idx + domain_prefix.len()..]),
        _ => (0, path.trim_start_matches('/')),
    };
    let segment = segment_path.split('/').next().unwrap_or_default();

    let caps = DIMENSIONS_RE.captures(segment)?;
    let width_value: u32 = caps[1].parse().ok()?;
    let height_value: u32 = caps[3].parse().ok()?;
    let mut dimensions = Dimensions {
        width: dimension(width_value, &caps[2]),
        height: dimension(height_value, &caps[4]),
    };
    let mut fluid = dimensions.width.is_percent() || dimensions.height.is_percent();

    let flags = query.map(querystring::parse).unwrap_or_default();

    if truthy(flags.get("ratio")) && width_value > 0 {
        fluid = true;
        let ratio_height = (100.0 * height_value as f64 / width_value as f64).floor() as u32;
        dimensions = Dimensions {
            width: Dimension::Percent(100),
            height: Dimension::Percent(ratio_height),
        };
    }

    let mut request = ThemeRequest {
        background: color_flag(&flags, "bg"),
        foreground: color_flag(&flags, "fg"),
        ..Default::default()
    };

    if let Some(name) = querystring::get_str(&flags, "theme")
        && options.themes.get(name).is_some()
    {
        request.name = Some(name.to_string());
    }

    if truthy(flags.get("random")) {
        if let Some(name) = theme_keys.pick(options.themes) {
            debug!(theme = %name, "picked random theme");
            request.name = Some(name);
        }
    }

    let resolved = resolve_theme(&request, options.themes);

    let text = querystring::get_str(&flags, "text")
        .filter(|text| !text.is_empty())
        .map(|text| text.replace(DIMENSIONS_TEMPLATE, &dimensions.caption()));

    let text_mode = match querystring::get_str(&flags, "textmode") {
        Some("literal") => TextMode::Literal,
        Some("exact") => TextMode::Exact,
        _ => TextMode::Default,
    };

    let size = querystring::get_str(&flags, "size")
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|size| size.is_finite() && *size > 0.0);

    let font = querystring::get_str(&flags, "font")
        .filter(|font| !font.is_empty())
        .map(str::to_string);

    let align = querystring::get_str(&flags, "align")
        .and_then(Align::parse)
        .unwrap_or_default();

    let line_wrap_ratio = querystring::get_str(&flags, "lineWrap")
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|ratio| *ratio > 0.0 && *ratio <= 1.0);

    let spec = PlaceholderSpec {
        holder_url: url[start..].to_string(),
        dimensions,
        fluid,
        auto: truthy(flags.get("auto")),
        theme: resolved.theme,
        auto_foreground: resolved.auto_foreground,
        text,
        text_mode,
        font,
        size,
        align,
        nowrap: truthy(flags.get("nowrap")),
        outline: truthy(flags.get("outline")),
        line_wrap_ratio,
        stylesheets: options.stylesheets.to_vec(),
    };
    debug!(
        descriptor = %spec.holder_url,
        dimensions = %spec.dimensions.caption(),
        fluid = spec.fluid,
        "parsed placeholder descriptor"
    );
    Some(spec)
}

fn dimension(value: u32, suffix: &str) -> Dimension {
    if suffix.is_empty() {
        Dimension::Pixels(value)
    } else {
        Dimension::Percent(value)
    }
}

fn color_flag(flags: &Map<String, Value>, key: &str) -> Option<Color> {
    let raw = querystring::get_str(flags, key)?;
    let color = Color::parse(raw);
    if color.is_none() {
        warn!(flag = key, value = raw, "ignoring invalid color");
    }
    color
}
