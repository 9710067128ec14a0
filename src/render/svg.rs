use super::{
    Backend, PayloadEncoding, RenderError, RenderMode, RenderSettings, RenderedImage, RendererKind,
    scene_parts,
};
use crate::scene::{PlacedWord, SceneGraph, placed_words};
use tracing::debug;

pub const SVG_MIME: &str = "image/svg+xml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Moves text from the line top to an alphabetic baseline so it lines up
/// with the raster backend's middle-baseline text.
pub const BASELINE_SHIFT: f32 = 0.8;

/// Vector markup backend. The markup buffer is reused across renders.
#[derive(Debug, Default)]
pub struct SvgBackend {
    buf: String,
    renders: u64,
}

impl SvgBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `graph` to SVG markup.
    pub fn markup(
        &mut self,
        graph: &SceneGraph,
        settings: &RenderSettings<'_>,
    ) -> Result<&str, RenderError> {
        let parts = scene_parts(graph)?;
        let (width, height) = (graph.width, graph.height);
        let font = &parts.style.font;
        if !(width.is_finite() && width > 0.0)
            || !(height.is_finite() && height > 0.0)
            || !(font.size.is_finite() && font.size > 0.0)
        {
            return Err(RenderError::InvalidDimensions {
                width,
                height,
                font_size: font.size,
            });
        }

        self.renders += 1;
        let id = format!("holder_{:x}", self.renders);
        let svg = &mut self.buf;
        svg.clear();

        for (idx, stylesheet) in settings.engine.stylesheets.iter().enumerate() {
            if idx > 0 {
                svg.push('\n');
            }
            svg.push_str(&format!(
                "<?xml-stylesheet rel=\"stylesheet\" href=\"{}\"?>",
                escape_xml(stylesheet)
            ));
        }

        svg.push_str(&format!(
            "<svg xmlns=\"{SVG_NS}\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\" preserveAspectRatio=\"none\">"
        ));
        svg.push_str(&format!(
            "<defs><style type=\"text/css\">#{id} text {{ fill:{};font-weight:{};font-family:{}, monospace;font-size:{}{} }} </style></defs>",
            parts.style.fill.to_css(),
            escape_xml(&font.weight),
            escape_xml(&font.family),
            font.size,
            font.units.as_str()
        ));
        svg.push_str(&format!("<g id=\"{id}\">"));
        svg.push_str(&format!(
            "<rect width=\"{width}\" height=\"{height}\" fill=\"{}\"></rect>",
            parts.fill.to_css()
        ));
        if let Some(outline) = parts.outline {
            svg.push_str(&format!(
                "<path d=\"{}\" stroke-width=\"{}\" stroke=\"{}\" fill=\"none\"></path>",
                outline_path(width, height, outline.width),
                outline.width,
                outline.color.to_css()
            ));
        }
        svg.push_str("<g>");
        for word in word_positions(graph) {
            svg.push_str(&format!(
                "<text x=\"{:.2}\" y=\"{:.2}\">{}</text>",
                word.x,
                word.y,
                escape_xml(word.text)
            ));
        }
        svg.push_str("</g></g></svg>");

        debug!(id = %id, bytes = svg.len(), "rendered svg markup");
        Ok(&self.buf)
    }
}

impl Backend for SvgBackend {
    fn kind(&self) -> RendererKind {
        RendererKind::Vector
    }

    fn render(
        &mut self,
        graph: &SceneGraph,
        settings: &RenderSettings<'_>,
    ) -> Result<RenderedImage, RenderError> {
        let markup = self.markup(graph, settings)?;
        let encoding = if settings.mode == RenderMode::Background {
            PayloadEncoding::Base64
        } else {
            PayloadEncoding::Percent
        };
        Ok(RenderedImage {
            mime: SVG_MIME,
            bytes: markup.as_bytes().to_vec(),
            encoding,
        })
    }
}

/// Word anchors as written to `<text>` elements.
pub fn word_positions(graph: &SceneGraph) -> Vec<PlacedWord<'_>> {
    let shift = graph
        .text_group()
        .and_then(|group| group.text_style())
        .and_then(|style| style.position.as_ref())
        .map(|position| position.bounding_box.height * BASELINE_SHIFT)
        .unwrap_or(0.0);
    placed_words(graph)
        .into_iter()
        .map(|mut word| {
            word.y += shift;
            word
        })
        .collect()
}

/// Border rectangle with both corner-to-corner diagonals.
pub fn outline_path(width: f32, height: f32, outline_width: f32) -> String {
    let offset = outline_width / 2.0;
    format!(
        "M {offset} {offset} H {} V {} H {offset} V 0 M 0 {offset} L {width} {} M 0 {} L {width} {offset}",
        width - offset,
        height - offset,
        height - offset,
        height - offset,
    )
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::descriptor::Align;
    use crate::render::EngineSettings;
    use crate::scene::{BACKGROUND_NODE, FontSpec, FontUnits, NodeKind, Outline, TEXT_GROUP_NODE, TextStyle};
    use crate::text_metrics::{BoundingBox, TextPositionData};

    fn graph(text: &str, outline: bool) -> SceneGraph {
        let mut graph = SceneGraph::new(200.0, 100.0);
        let mut bg = graph.rect(BACKGROUND_NODE, Color::from_raw(0xEEEEEE));
        bg.resize(200.0, 100.0);
        if outline {
            bg.kind = NodeKind::Rect {
                fill: Color::from_raw(0xEEEEEE),
                outline: Some(Outline {
                    color: Color::from_raw(0xD4D4D4),
                    width: 2.0,
                }),
            };
        }
        graph.root_mut().add(bg).unwrap();
        let style = TextStyle {
            text: text.to_string(),
            font: FontSpec {
                family: "Arial".to_string(),
                size: 12.0,
                units: FontUnits::Pt,
                weight: "bold".to_string(),
            },
            align: Align::Center,
            fill: Color::from_raw(0xAAAAAA),
            leading: 20.0,
            position: Some(TextPositionData {
                space_width: 4.0,
                line_count: 1,
                bounding_box: BoundingBox {
                    width: 50.0,
                    height: 20.0,
                },
                words: Vec::new(),
            }),
        };
        let mut group = graph.group(TEXT_GROUP_NODE, Some(style));
        group.move_to(Some(75.0), Some(40.0), Some(1));
        let mut line = graph.group("line0", None);
        line.add(graph.text(text)).unwrap();
        group.add(line).unwrap();
        graph.root_mut().add(group).unwrap();
        graph
    }

    fn engine() -> EngineSettings {
        EngineSettings::default()
    }

    #[test]
    fn markup_contains_scoped_style_and_words() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let markup = backend.markup(&graph("200x100", false), &settings).unwrap().to_string();
        assert!(markup.starts_with("<svg"));
        assert!(markup.contains("#holder_1 text { fill:#aaaaaa;font-weight:bold;font-family:Arial, monospace;font-size:12pt }"));
        assert!(markup.contains("<rect width=\"200\" height=\"100\" fill=\"#eeeeee\"></rect>"));
        assert!(markup.contains("<text x=\"75.00\" y=\"56.00\">200x100</text>"));
        assert!(!markup.contains("<path"));
    }

    #[test]
    fn ids_are_unique_per_render() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let first = backend.markup(&graph("a", false), &settings).unwrap().to_string();
        let second = backend.markup(&graph("a", false), &settings).unwrap().to_string();
        assert!(first.contains("holder_1"));
        assert!(second.contains("holder_2"));
        assert!(!second.contains("holder_1"));
    }

    #[test]
    fn escapes_markup_in_text() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let markup = backend.markup(&graph("<b>&", false), &settings).unwrap();
        assert!(markup.contains("&lt;b&gt;&amp;"));
        assert!(!markup.contains("<b>"));
    }

    #[test]
    fn outline_path_draws_cross() {
        assert_eq!(
            outline_path(100.0, 50.0, 2.0),
            "M 1 1 H 99 V 49 H 1 V 0 M 0 1 L 100 49 M 0 49 L 100 1"
        );
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let markup = backend.markup(&graph("x", true), &settings).unwrap();
        assert!(markup.contains("stroke=\"#d4d4d4\""));
    }

    #[test]
    fn stylesheets_become_processing_instructions() {
        let mut backend = SvgBackend::new();
        let engine = EngineSettings {
            stylesheets: vec!["a.css".to_string(), "b.css".to_string()],
            ..EngineSettings::default()
        };
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let markup = backend.markup(&graph("x", false), &settings).unwrap();
        assert!(markup.starts_with(
            "<?xml-stylesheet rel=\"stylesheet\" href=\"a.css\"?>\n<?xml-stylesheet rel=\"stylesheet\" href=\"b.css\"?><svg"
        ));
    }

    #[test]
    fn background_mode_uses_base64() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Background,
            engine: &engine,
        };
        let image = backend.render(&graph("x", false), &settings).unwrap();
        assert!(image.data_uri().starts_with("data:image/svg+xml;charset=UTF-8;base64,"));
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let image = backend.render(&graph("x", false), &settings).unwrap();
        assert!(image.data_uri().starts_with("data:image/svg+xml;charset=UTF-8,%3Csvg"));
    }

    #[test]
    fn rejects_invalid_dimensions() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let mut bad = graph("x", false);
        bad.width = f32::NAN;
        assert!(matches!(
            backend.markup(&bad, &settings),
            Err(RenderError::InvalidDimensions { .. })
        ));
        let mut zero = graph("x", false);
        zero.height = 0.0;
        assert!(backend.render(&zero, &settings).is_err());
    }

    #[test]
    fn render_does_not_move_the_scene() {
        let mut backend = SvgBackend::new();
        let engine = engine();
        let settings = RenderSettings {
            mode: RenderMode::Image,
            engine: &engine,
        };
        let graph = graph("x", false);
        let before = graph.clone();
        backend.render(&graph, &settings).unwrap();
        backend.render(&graph, &settings).unwrap();
        assert_eq!(graph, before);
    }
}
