//! Render backends turning a positioned scene graph into an image payload.

#[cfg(feature = "png")]
pub mod raster;
pub mod svg;

use crate::scene::{NodeKind, Outline, SceneGraph, TextStyle};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[serde(alias = "canvas", alias = "png")]
    Raster,
    #[default]
    #[serde(alias = "svg")]
    Vector,
}

impl RendererKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendererKind::Raster => "raster",
            RendererKind::Vector => "vector",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Image,
    Background,
    Fluid,
}

/// Per-render engine options; the font fallback rule may rewrite a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub renderer: RendererKind,
    pub stylesheets: Vec<String>,
    pub no_font_fallback: bool,
    pub no_background_size: bool,
    pub pixel_ratio: f32,
    pub re_render_delay_ms: u64,
    #[serde(skip)]
    pub re_render_required: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Vector,
            stylesheets: Vec::new(),
            no_font_fallback: false,
            no_background_size: false,
            pixel_ratio: 1.0,
            re_render_delay_ms: 150,
            re_render_required: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings<'a> {
    pub mode: RenderMode,
    pub engine: &'a EngineSettings,
}

/// Which backends this process can use, probed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub raster: bool,
    pub vector: bool,
}

impl Capabilities {
    pub fn probe() -> Self {
        Self {
            raster: cfg!(feature = "png"),
            vector: true,
        }
    }

    pub fn supports(&self, kind: RendererKind) -> bool {
        match kind {
            RendererKind::Raster => self.raster,
            RendererKind::Vector => self.vector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadEncoding {
    Base64,
    Percent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub encoding: PayloadEncoding,
}

impl RenderedImage {
    pub fn data_uri(&self) -> String {
        let charset = if self.mime == svg::SVG_MIME {
            ";charset=UTF-8"
        } else {
            ""
        };
        match self.encoding {
            PayloadEncoding::Base64 => format!(
                "data:{}{};base64,{}",
                self.mime,
                charset,
                base64::engine::general_purpose::STANDARD.encode(&self.bytes)
            ),
            PayloadEncoding::Percent => format!(
                "data:{}{},{}",
                self.mime,
                charset,
                urlencoding::encode_binary(&self.bytes)
            ),
        }
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("invalid render dimensions {width}x{height} (font size {font_size})")]
    InvalidDimensions {
        width: f32,
        height: f32,
        font_size: f32,
    },
    #[error("failed to allocate a {width}x{height} drawing surface")]
    SurfaceAllocation { width: u32, height: u32 },
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("scene graph has no `{0}` node")]
    MissingNode(&'static str),
}

pub trait Backend {
    fn kind(&self) -> RendererKind;

    fn render(
        &mut self,
        graph: &SceneGraph,
        settings: &RenderSettings<'_>,
    ) -> Result<RenderedImage, RenderError>;
}

/// Background fill and outline, plus the caption style.
pub(crate) struct SceneParts<'a> {
    pub fill: crate::color::Color,
    pub outline: Option<&'a Outline>,
    pub style: &'a TextStyle,
}

pub(crate) fn scene_parts(graph: &SceneGraph) -> Result<SceneParts<'_>, RenderError> {
    let background = graph
        .background()
        .ok_or(RenderError::MissingNode(crate::scene::BACKGROUND_NODE))?;
    let (fill, outline) = match &background.kind {
        NodeKind::Rect { fill, outline } => (*fill, outline.as_ref()),
        _ => return Err(RenderError::MissingNode(crate::scene::BACKGROUND_NODE)),
    };
    let style = graph
        .text_group()
        .and_then(|group| group.text_style())
        .ok_or(RenderError::MissingNode(crate::scene::TEXT_GROUP_NODE))?;
    Ok(SceneParts {
        fill,
        outline,
        style,
    })
}
