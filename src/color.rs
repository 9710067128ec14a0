use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static RGB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rgb\((\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$").unwrap());

static RGBA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba\((\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(0(?:\.\d+)?|1(?:\.0+)?|\.\d+)\s*\)$")
        .unwrap()
});

/// Mid-gray reference used for every contrast decision.
pub const MID_GRAY: Color = Color::from_raw(0x7f7f7f);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Hue in degrees, `0.0..360.0`.
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// A 24-bit RGB colour with an optional alpha channel.
///
/// Construction from text never clamps garbage into a default: `parse` and
/// `from_hex` return `None` for anything that is not a well-formed colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    raw: u32,
    alpha: f32,
}

impl Color {
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw: raw & 0xFF_FFFF,
            alpha: 1.0,
        }
    }

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_raw(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Parses `#rgb`, `#rrggbb` (hash optional).
    pub fn from_hex(input: &str) -> Option<Self> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.is_empty() || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        u32::from_str_radix(&expanded, 16).ok().map(Self::from_raw)
    }

    /// Parses any colour notation accepted in descriptors: bare or hashed hex,
    /// `rgb(r,g,b)` and `rgba(r,g,b,a)`.
    pub fn parse(input: &str) -> Option<Self> {
        let value = input.trim();
        if let Some(color) = Self::from_hex(value) {
            return Some(color);
        }
        if let Some(caps) = RGB_RE.captures(value) {
            return Some(Self::from_rgb(
                channel(&caps[1])?,
                channel(&caps[2])?,
                channel(&caps[3])?,
            ));
        }
        if let Some(caps) = RGBA_RE.captures(value) {
            let alpha: f32 = caps[4].parse().ok()?;
            return Some(
                Self::from_rgb(channel(&caps[1])?, channel(&caps[2])?, channel(&caps[3])?)
                    .with_alpha(alpha),
            );
        }
        None
    }

    pub fn from_hsl(hsl: Hsl) -> Self {
        let h = hsl.h.rem_euclid(360.0) / 360.0;
        let s = hsl.s.clamp(0.0, 1.0);
        let l = hsl.l.clamp(0.0, 1.0);
        if s == 0.0 {
            let v = (l * 255.0).round() as u8;
            return Self::from_rgb(v, v, v);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let r = hue_to_channel(p, q, h + 1.0 / 3.0);
        let g = hue_to_channel(p, q, h);
        let b = hue_to_channel(p, q, h - 1.0 / 3.0);
        Self::from_rgb(
            (r * 255.0).round() as u8,
            (g * 255.0).round() as u8,
            (b * 255.0).round() as u8,
        )
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn rgb(&self) -> Rgb {
        Rgb {
            r: ((self.raw >> 16) & 0xFF) as u8,
            g: ((self.raw >> 8) & 0xFF) as u8,
            b: (self.raw & 0xFF) as u8,
        }
    }

    pub fn hsl(&self) -> Hsl {
        let Rgb { r, g, b } = self.rgb();
        let r = r as f32 / 255.0;
        let g = g as f32 / 255.0;
        let b = b as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return Hsl { h: 0.0, s: 0.0, l };
        }
        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        Hsl { h: h * 60.0, s, l }
    }

    /// BT.709 luma, the lightness proxy for contrast decisions.
    pub fn luma(&self) -> f32 {
        let Rgb { r, g, b } = self.rgb();
        0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32
    }

    pub fn lighter_than(&self, other: &Color) -> bool {
        self.luma() > other.luma()
    }

    /// Adds `round(255 * multiplier)` to every channel. `multiplier` is in `-1..=1`.
    pub fn lighten(&self, multiplier: f32) -> Color {
        let delta = (255.0 * multiplier.clamp(-1.0, 1.0)).round() as i32;
        let shift = |value: u8| (value as i32 + delta).clamp(0, 255) as u8;
        let Rgb { r, g, b } = self.rgb();
        Color::from_rgb(shift(r), shift(g), shift(b)).with_alpha(self.alpha)
    }

    /// Composites `over` (using its alpha) onto this colour.
    pub fn blend_alpha(&self, over: &Color) -> Color {
        let a = over.alpha;
        let base = self.rgb();
        let top = over.rgb();
        let mix = |top: u8, base: u8| (a * top as f32 + (1.0 - a) * base as f32).round() as u8;
        Color::from_rgb(mix(top.r, base.r), mix(top.g, base.g), mix(top.b, base.b))
    }

    pub fn to_hex(&self, hash: bool) -> String {
        if hash {
            format!("#{:06x}", self.raw)
        } else {
            format!("{:06x}", self.raw)
        }
    }

    /// Hex when opaque, `rgba()` otherwise.
    pub fn to_css(&self) -> String {
        if self.alpha >= 1.0 {
            return self.to_hex(true);
        }
        let Rgb { r, g, b } = self.rgb();
        format!("rgba({r},{g},{b},{})", self.alpha)
    }
}

fn channel(value: &str) -> Option<u8> {
    value.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t > 1.0 {
        t - 1.0
    } else {
        t
    };
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid color: {0}")]
pub struct InvalidColor(pub String);

impl TryFrom<String> for Color {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value).ok_or(InvalidColor(value))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_css()
    }
}
