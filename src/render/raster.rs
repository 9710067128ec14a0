//! Raster backend painting onto a reused `tiny_skia` pixmap.

use super::{
    Backend, PayloadEncoding, RenderError, RenderSettings, RenderedImage, RendererKind, scene_parts,
};
use crate::color::Color;
use crate::scene::{PlacedWord, SceneGraph, placed_words};
use crate::text_metrics::{FontFace, FontLibrary};
use resvg::tiny_skia::{
    self, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform,
};
use tracing::{debug, warn};

pub const PNG_MIME: &str = "image/png";

pub struct RasterBackend {
    fonts: FontLibrary,
    surface: Option<Pixmap>,
}

impl std::fmt::Debug for RasterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBackend")
            .field("fonts", &self.fonts)
            .field(
                "surface",
                &self.surface.as_ref().map(|pixmap| (pixmap.width(), pixmap.height())),
            )
            .finish()
    }
}

impl RasterBackend {
    pub fn new(fonts: FontLibrary) -> Self {
        Self {
            fonts,
            surface: None,
        }
    }

    /// Returns the shared surface at `width`x`height`, cleared.
    fn acquire_surface(&mut self, width: u32, height: u32) -> Result<&mut Pixmap, RenderError> {
        let reusable = self
            .surface
            .as_ref()
            .is_some_and(|pixmap| pixmap.width() == width && pixmap.height() == height);
        if !reusable {
            let pixmap = Pixmap::new(width, height)
                .ok_or(RenderError::SurfaceAllocation { width, height })?;
            self.surface = Some(pixmap);
        }
        let pixmap = self
            .surface
            .as_mut()
            .ok_or(RenderError::SurfaceAllocation { width, height })?;
        pixmap.fill(tiny_skia::Color::TRANSPARENT);
        Ok(pixmap)
    }
}

impl Backend for RasterBackend {
    fn kind(&self) -> RendererKind {
        RendererKind::Raster
    }

    fn render(
        &mut self,
        graph: &SceneGraph,
        settings: &RenderSettings<'_>,
    ) -> Result<RenderedImage, RenderError> {
        let parts = scene_parts(graph)?;
        let ratio = settings.engine.pixel_ratio;
        let invalid = || RenderError::InvalidDimensions {
            width: graph.width,
            height: graph.height,
            font_size: parts.style.font.size,
        };
        let scaled_width = (graph.width * ratio).round();
        let scaled_height = (graph.height * ratio).round();
        if !(scaled_width.is_finite() && scaled_width >= 1.0)
            || !(scaled_height.is_finite() && scaled_height >= 1.0)
        {
            return Err(invalid());
        }
        let (width, height) = (scaled_width as u32, scaled_height as u32);

        let face = self
            .fonts
            .face(&parts.style.font.family, parts.style.font.numeric_weight());
        let pixmap = self.acquire_surface(width, height)?;

        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(skia_color(&parts.fill));
        let bg_width = width as f32;
        let bg_height = height as f32;
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, bg_width, bg_height) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }

        if let Some(outline) = parts.outline {
            let offset = outline.width / 2.0;
            let mut pb = PathBuilder::new();
            pb.move_to(offset, offset);
            pb.line_to(bg_width - offset, offset);
            pb.line_to(bg_width - offset, bg_height - offset);
            pb.line_to(offset, bg_height - offset);
            pb.line_to(offset, offset);
            pb.move_to(0.0, offset);
            pb.line_to(bg_width, bg_height - offset);
            pb.move_to(0.0, bg_height - offset);
            pb.line_to(bg_width, offset);
            if let Some(path) = pb.finish() {
                paint.set_color(skia_color(&outline.color));
                let stroke = Stroke {
                    width: outline.width * ratio,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }

        match face {
            Some(face) => {
                paint.set_color(skia_color(&parts.style.fill));
                let px_size = parts.style.font.px_size() * ratio;
                for word in word_positions(graph) {
                    let (x, middle) = (word.x * ratio, word.y * ratio);
                    paint_word(pixmap, &face, word.text, x, middle, px_size, &paint);
                }
            }
            None => warn!(
                family = %parts.style.font.family,
                "no font face available, rendering placeholder without text"
            ),
        }

        let bytes = pixmap
            .encode_png()
            .map_err(|err| RenderError::Encode(err.to_string()))?;
        debug!(width, height, bytes = bytes.len(), "rendered png");
        Ok(RenderedImage {
            mime: PNG_MIME,
            bytes,
            encoding: PayloadEncoding::Base64,
        })
    }
}

/// Word anchors on the middle of each line box, in scene units.
pub fn word_positions(graph: &SceneGraph) -> Vec<PlacedWord<'_>> {
    let half_leading = graph
        .text_group()
        .and_then(|group| group.text_style())
        .map_or(0.0, |style| style.leading / 2.0);
    placed_words(graph)
        .into_iter()
        .map(|mut word| {
            word.y += half_leading;
            word
        })
        .collect()
}

fn skia_color(color: &Color) -> tiny_skia::Color {
    let rgb = color.rgb();
    let alpha = (color.alpha().clamp(0.0, 1.0) * 255.0).round() as u8;
    tiny_skia::Color::from_rgba8(rgb.r, rgb.g, rgb.b, alpha)
}

/// Fills the glyph outlines of `text` with the em box centred on `middle`.
fn paint_word(
    pixmap: &mut Pixmap,
    font: &FontFace,
    text: &str,
    x: f32,
    middle: f32,
    px_size: f32,
    paint: &Paint<'_>,
) {
    let scale = font.scale(px_size);
    let baseline = middle + (font.ascender as f32 + font.descender as f32) / 2.0 * scale;
    let path = font.with_face(|face| {
        let mut builder = GlyphPath {
            pb: PathBuilder::new(),
            x,
            y: baseline,
            scale,
        };
        for ch in text.chars() {
            let (glyph, advance) = font.advance(face, ch, px_size);
            if let Some(glyph) = glyph {
                face.outline_glyph(glyph, &mut builder);
            }
            builder.x += advance;
        }
        builder.pb.finish()
    });
    if let Some(Some(path)) = path {
        pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Maps font units (y up) onto pixmap pixels (y down) at a pen position.
struct GlyphPath {
    pb: PathBuilder,
    x: f32,
    y: f32,
    scale: f32,
}

impl GlyphPath {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x + x * self.scale, self.y - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphPath {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.pb.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.pb.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.pb.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.pb.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.pb.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Align;
    use crate::render::{EngineSettings, RenderMode};
    use crate::scene::{
        BACKGROUND_NODE, FontSpec, FontUnits, NodeKind, Outline, TEXT_GROUP_NODE, TextStyle,
    };

    fn graph(width: f32, height: f32) -> SceneGraph {
        let mut graph = SceneGraph::new(width, height);
        let mut bg = graph.rect(BACKGROUND_NODE, Color::from_raw(0x0D8FDB));
        bg.resize(width, height);
        bg.kind = NodeKind::Rect {
            fill: Color::from_raw(0x0D8FDB),
            outline: Some(Outline {
                color: Color::from_raw(0x27A9F5),
                width: 2.0,
            }),
        };
        graph.root_mut().add(bg).unwrap();
        let style = TextStyle {
            text: "hi".to_string(),
            font: FontSpec {
                family: "Arial".to_string(),
                size: 10.0,
                units: FontUnits::Pt,
                weight: "bold".to_string(),
            },
            align: Align::Center,
            fill: Color::from_raw(0xFFFFFF),
            leading: 15.0,
            position: None,
        };
        let mut group = graph.group(TEXT_GROUP_NODE, Some(style));
        let mut line = graph.group("line0", None);
        line.add(graph.text("hi")).unwrap();
        group.add(line).unwrap();
        graph.root_mut().add(group).unwrap();
        graph
    }

    fn settings(engine: &EngineSettings) -> RenderSettings<'_> {
        RenderSettings {
            mode: RenderMode::Image,
            engine,
        }
    }

    #[test]
    fn renders_png_without_fonts() {
        let mut backend = RasterBackend::new(FontLibrary::empty());
        let engine = EngineSettings::default();
        let image = backend.render(&graph(40.0, 20.0), &settings(&engine)).unwrap();
        assert_eq!(image.mime, PNG_MIME);
        assert_eq!(&image.bytes[1..4], b"PNG");
        assert!(image.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn surface_follows_pixel_ratio() {
        let mut backend = RasterBackend::new(FontLibrary::empty());
        let engine = EngineSettings {
            pixel_ratio: 2.0,
            ..EngineSettings::default()
        };
        backend.render(&graph(40.0, 20.0), &settings(&engine)).unwrap();
        let surface = backend.surface.as_ref().unwrap();
        assert_eq!((surface.width(), surface.height()), (80, 40));
    }

    #[test]
    fn surface_is_reset_between_renders() {
        let mut backend = RasterBackend::new(FontLibrary::empty());
        let engine = EngineSettings::default();
        let first = backend.render(&graph(30.0, 30.0), &settings(&engine)).unwrap();
        let second = backend.render(&graph(30.0, 30.0), &settings(&engine)).unwrap();
        assert_eq!(first, second);
        backend.render(&graph(10.0, 50.0), &settings(&engine)).unwrap();
        let surface = backend.surface.as_ref().unwrap();
        assert_eq!((surface.width(), surface.height()), (10, 50));
    }

    #[test]
    fn background_pixel_uses_fill() {
        let mut backend = RasterBackend::new(FontLibrary::empty());
        let engine = EngineSettings::default();
        backend.render(&graph(40.0, 40.0), &settings(&engine)).unwrap();
        let surface = backend.surface.as_ref().unwrap();
        // away from the outline and its diagonals
        let pixel = surface.pixel(20, 5).unwrap();
        assert_eq!((pixel.red(), pixel.green(), pixel.blue()), (0x0D, 0x8F, 0xDB));
    }

    #[test]
    fn words_are_anchored_mid_line() {
        let graph = graph(40.0, 20.0);
        let placed = placed_words(&graph);
        let anchors = word_positions(&graph);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].text, "hi");
        assert_eq!(anchors[0].x, placed[0].x);
        assert_eq!(anchors[0].y, placed[0].y + 7.5);
    }

    #[test]
    fn rejects_degenerate_size() {
        let mut backend = RasterBackend::new(FontLibrary::empty());
        let engine = EngineSettings::default();
        let err = backend.render(&graph(0.0, 20.0), &settings(&engine)).unwrap_err();
        assert!(matches!(err, RenderError::InvalidDimensions { .. }));
    }
}
