//! Text measurement backends and the caption measurement step of layout.

use crate::scene::FontSpec;
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use ttf_parser::{Face, GlyphId};

/// Literal two-character line break marker accepted in captions.
pub const LINE_BREAK_MARKER: &str = "\\n";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no text measurement available for font `{family}`")]
pub struct MeasurementUnavailable {
    pub family: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordMetrics {
    pub text: String,
    pub width: f32,
    pub line_break: bool,
}

/// Measurement of a whole caption, computed fresh for each layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPositionData {
    pub space_width: f32,
    pub line_count: usize,
    pub bounding_box: BoundingBox,
    /// Per-word widths, only filled in when the caption spans several lines.
    pub words: Vec<WordMetrics>,
}

/// The capability layout needs from a text measurement surface.
pub trait TextMeasurer {
    fn measure(&mut self, text: &str, font: &FontSpec) -> Result<BoundingBox, MeasurementUnavailable>;
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for Box<T> {
    fn measure(&mut self, text: &str, font: &FontSpec) -> Result<BoundingBox, MeasurementUnavailable> {
        (**self).measure(text, font)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionToken<'a> {
    Word(&'a str),
    Break,
}

/// Splits a caption on spaces, pulling out explicit line break markers
/// (`\n` as typed in a descriptor, or a real newline).
pub fn split_caption(text: &str) -> Vec<CaptionToken<'_>> {
    let mut tokens = Vec::new();
    for chunk in text.split(' ') {
        let mut rest = chunk;
        loop {
            let marker = [LINE_BREAK_MARKER, "\n"]
                .iter()
                .filter_map(|marker| rest.find(marker).map(|idx| (idx, marker.len())))
                .min_by_key(|(idx, _)| *idx);
            match marker {
                Some((idx, len)) => {
                    if idx > 0 {
                        tokens.push(CaptionToken::Word(&rest[..idx]));
                    }
                    tokens.push(CaptionToken::Break);
                    rest = &rest[idx + len..];
                }
                None => {
                    if !rest.is_empty() {
                        tokens.push(CaptionToken::Word(rest));
                    }
                    break;
                }
            }
        }
    }
    tokens
}

/// Measures `text` as one run, derives the average space width and estimates
/// how many lines it needs at `scene_width * wrap_ratio`.
pub fn measure_caption<M: TextMeasurer + ?Sized>(
    measurer: &mut M,
    text: &str,
    font: &FontSpec,
    scene_width: f32,
    wrap_ratio: f32,
) -> Result<TextPositionData, MeasurementUnavailable> {
    let tokens = split_caption(text);
    let words: Vec<&str> = tokens
        .iter()
        .filter_map(|token| match token {
            CaptionToken::Word(word) => Some(*word),
            CaptionToken::Break => None,
        })
        .collect();
    let breaks = tokens.len() - words.len();

    let bounding_box = measurer.measure(&words.join(" "), font)?;
    let no_space = measurer.measure(&words.concat(), font)?;
    let gaps = words.len().saturating_sub(1).max(1) as f32;
    let space_width = ((bounding_box.width - no_space.width) / gaps).round();

    let max_line_width = scene_width * wrap_ratio;
    let mut line_count = if max_line_width > 0.0 {
        (bounding_box.width / max_line_width).ceil() as usize
    } else {
        1
    };
    line_count += breaks;

    let mut measured = Vec::new();
    if line_count > 1 {
        for token in &tokens {
            match token {
                CaptionToken::Word(word) => measured.push(WordMetrics {
                    text: word.to_string(),
                    width: measurer.measure(word, font)?.width,
                    line_break: false,
                }),
                CaptionToken::Break => measured.push(WordMetrics {
                    text: LINE_BREAK_MARKER.to_string(),
                    width: 0.0,
                    line_break: true,
                }),
            }
        }
    }

    debug!(
        width = bounding_box.width,
        height = bounding_box.height,
        line_count,
        space_width,
        "measured caption"
    );

    Ok(TextPositionData {
        space_width,
        line_count,
        bounding_box,
        words: measured,
    })
}

/// Approximate Arial metrics, in ems. Deterministic and font-free, which makes
/// it the measurer of choice for tests and environments without fonts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphTableMeasurer;

impl GlyphTableMeasurer {
    fn char_width(ch: char, bold: bool) -> f32 {
        let regular = match ch {
            ' ' | '.' | ',' | ':' | ';' | '!' | '\'' | '|' | 'i' | 'j' | 'l' | 'I' => 0.278,
            'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' | '/' | '\\' => 0.333,
            '0'..='9' | '$' | '?' | '#' | '_' => 0.556,
            'm' => 0.833,
            'w' => 0.722,
            'M' | '@' => 0.833,
            'W' => 0.944,
            '%' => 0.889,
            'A'..='Z' => 0.667,
            'a'..='z' => 0.556,
            _ if ch.is_alphanumeric() => 1.0,
            _ => 0.584,
        };
        if bold && !ch.is_ascii_digit() && ch != ' ' {
            regular * 1.08
        } else {
            regular
        }
    }
}

impl TextMeasurer for GlyphTableMeasurer {
    fn measure(&mut self, text: &str, font: &FontSpec) -> Result<BoundingBox, MeasurementUnavailable> {
        let px = font.px_size();
        let bold = font.numeric_weight() >= 600;
        let width = text
            .chars()
            .filter(|ch| *ch != '\n')
            .map(|ch| Self::char_width(ch, bold))
            .sum::<f32>()
            * px;
        Ok(BoundingBox {
            width,
            height: (px * 1.15).round(),
        })
    }
}

/// Shared handle to a font database and the faces resolved from it.
#[derive(Clone)]
pub struct FontLibrary {
    inner: Arc<Mutex<FontStore>>,
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary").finish_non_exhaustive()
    }
}

struct FontStore {
    db: Database,
    system_fonts: bool,
    loaded_system_fonts: bool,
    cache: HashMap<(String, u16), Option<Arc<FontFace>>>,
}

impl FontLibrary {
    /// A library that lazily loads the system fonts on first lookup.
    pub fn system() -> Self {
        Self::with_database(Database::new(), true)
    }

    /// A library restricted to explicitly loaded fonts.
    pub fn empty() -> Self {
        Self::with_database(Database::new(), false)
    }

    fn with_database(db: Database, system_fonts: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FontStore {
                db,
                system_fonts,
                loaded_system_fonts: false,
                cache: HashMap::new(),
            })),
        }
    }

    pub fn load_font_file(&self, path: &Path) -> std::io::Result<()> {
        if let Ok(mut store) = self.inner.lock() {
            store.db.load_font_file(path)?;
            store.cache.clear();
        }
        Ok(())
    }

    /// Resolves a CSS family list and weight to a loaded face.
    pub fn face(&self, family: &str, weight: u16) -> Option<Arc<FontFace>> {
        let mut store = self.inner.lock().ok()?;
        store.face(family, weight)
    }

    pub fn face_count(&self) -> usize {
        self.inner
            .lock()
            .map(|mut store| {
                store.ensure_system_fonts();
                store.db.len()
            })
            .unwrap_or(0)
    }
}

impl FontStore {
    fn ensure_system_fonts(&mut self) {
        if self.system_fonts && !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
            debug!(faces = self.db.len(), "loaded system fonts");
        }
    }

    fn face(&mut self, family: &str, weight: u16) -> Option<Arc<FontFace>> {
        let key = (normalize_family_key(family), weight);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        self.ensure_system_fonts();
        let face = self.load_face(family, weight).map(Arc::new);
        self.cache.insert(key, face.clone());
        face
    }

    fn load_face(&self, font_family: &str, weight: u16) -> Option<FontFace> {
        #[derive(Clone, Copy)]
        enum FamilyToken {
            Generic(Family<'static>),
            Name(usize),
        }

        let mut names: Vec<String> = Vec::new();
        let mut order: Vec<FamilyToken> = Vec::new();
        for part in font_family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => order.push(FamilyToken::Generic(Family::Serif)),
                "sans-serif" | "system-ui" => order.push(FamilyToken::Generic(Family::SansSerif)),
                "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                "cursive" => order.push(FamilyToken::Generic(Family::Cursive)),
                "fantasy" => order.push(FamilyToken::Generic(Family::Fantasy)),
                _ => {
                    order.push(FamilyToken::Name(names.len()));
                    names.push(raw.to_string());
                }
            }
        }
        // renderers append monospace as the last resort; measurement mirrors it
        order.push(FamilyToken::Generic(Family::SansSerif));
        order.push(FamilyToken::Generic(Family::Monospace));

        let families: Vec<Family<'_>> = order
            .iter()
            .map(|token| match token {
                FamilyToken::Generic(family) => *family,
                FamilyToken::Name(idx) => Family::Name(names[*idx].as_str()),
            })
            .collect();

        let query = Query {
            families: &families,
            weight: Weight(weight),
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontFace::parse(data.to_vec(), index))
            .flatten()
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Owned font bytes plus the vertical metrics needed for layout and painting.
pub struct FontFace {
    data: Vec<u8>,
    index: u32,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    ascii_advances: [u16; 128],
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("index", &self.index)
            .field("units_per_em", &self.units_per_em)
            .finish_non_exhaustive()
    }
}

impl FontFace {
    pub fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        let units_per_em = face.units_per_em().max(1);
        let ascender = face.ascender();
        let descender = face.descender();
        Some(Self {
            data,
            index,
            units_per_em,
            ascender,
            descender,
            ascii_advances,
        })
    }

    /// Runs `f` with a parsed view of the face.
    pub fn with_face<T>(&self, f: impl FnOnce(&Face<'_>) -> T) -> Option<T> {
        Face::parse(&self.data, self.index).ok().map(|face| f(&face))
    }

    pub fn scale(&self, px_size: f32) -> f32 {
        px_size / self.units_per_em as f32
    }

    pub fn measure_width(&self, text: &str, px_size: f32) -> f32 {
        let scale = self.scale(px_size);
        let fallback = px_size * 0.56;
        if text.is_ascii() {
            return text
                .bytes()
                .filter(|byte| *byte != b'\n')
                .map(|byte| match self.ascii_advances[byte as usize] {
                    0 => fallback,
                    advance => advance as f32 * scale,
                })
                .sum();
        }
        self.with_face(|face| {
            text.chars()
                .filter(|ch| *ch != '\n')
                .map(|ch| {
                    face.glyph_index(ch)
                        .and_then(|glyph| face.glyph_hor_advance(glyph))
                        .map(|advance| advance as f32 * scale)
                        .unwrap_or(fallback)
                })
                .sum()
        })
        .unwrap_or_else(|| text.chars().count() as f32 * fallback)
    }

    pub fn line_height(&self, px_size: f32) -> f32 {
        (self.ascender as f32 - self.descender as f32) * self.scale(px_size)
    }

    pub fn advance(&self, face: &Face<'_>, ch: char, px_size: f32) -> (Option<GlyphId>, f32) {
        let glyph = face.glyph_index(ch);
        let advance = glyph
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .map(|advance| advance as f32 * self.scale(px_size))
            .unwrap_or(px_size * 0.56);
        (glyph, advance)
    }
}

/// Measures text against real font files.
#[derive(Debug, Clone)]
pub struct FontMeasurer {
    fonts: FontLibrary,
}

impl FontMeasurer {
    pub fn new(fonts: FontLibrary) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }
}

impl TextMeasurer for FontMeasurer {
    fn measure(&mut self, text: &str, font: &FontSpec) -> Result<BoundingBox, MeasurementUnavailable> {
        let face = self
            .fonts
            .face(&font.family, font.numeric_weight())
            .ok_or_else(|| MeasurementUnavailable {
                family: font.family.clone(),
            })?;
        let px = font.px_size();
        Ok(BoundingBox {
            width: face.measure_width(text, px),
            height: face.line_height(px),
        })
    }
}
