//! The placeholder pipeline: parse, resolve, lay out and render one element.
//!
//! [`Holder`] carries the immutable settings, the probed capabilities and the
//! reusable backends. Everything that changes from element to element lives in
//! a [`RunContext`] the caller threads through.

use crate::color::Color;
use crate::config::Settings;
use crate::descriptor::{
    Dimension, ParseOptions, PlaceholderSpec, TextMode, ThemeKeyCache, parse_descriptor,
};
use crate::fluid::{BoxSize, FluidConfig, Readiness};
use crate::layout::{LayoutError, SceneRequest, compute_layout};
#[cfg(feature = "png")]
use crate::render::raster::RasterBackend;
use crate::render::svg::SvgBackend;
use crate::render::{
    Backend, Capabilities, EngineSettings, RenderError, RenderMode, RenderSettings, RenderedImage,
    RendererKind,
};
use crate::text_metrics::{FontLibrary, FontMeasurer, TextMeasurer};
use crate::theme::Theme;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum HolderError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementKind {
    #[default]
    Image,
    Object,
    Other,
}

/// The host element a descriptor was found on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    /// Current content box, `None` when the host cannot measure it yet.
    pub live_box: Option<BoxSize>,
}

impl Element {
    pub fn new(id: u64, kind: ElementKind) -> Self {
        Self {
            id: ElementId(id),
            kind,
            live_box: None,
        }
    }

    pub fn image(id: u64) -> Self {
        Self::new(id, ElementKind::Image)
    }

    pub fn with_box(mut self, width: f32, height: f32) -> Self {
        self.live_box = Some(BoxSize::new(width, height));
        self
    }

    fn visible_box(&self) -> Option<BoxSize> {
        self.live_box.filter(|size| !size.is_degenerate())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOverrides {
    pub mode: Option<RenderMode>,
    pub renderer: Option<RendererKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPlaceholder {
    pub image: RenderedImage,
    /// Data URI for the element's source or background.
    pub payload: String,
    pub renderer: RendererKind,
    pub mode: RenderMode,
    pub width: f32,
    pub height: f32,
    pub alt_text: Option<String>,
    /// CSS `background-size` value for background mode.
    pub background_size: Option<String>,
    /// Set when a raster render with a custom font should be repeated once
    /// the font has had time to load.
    pub re_render_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NotPlaceholder,
    /// The element has no usable box yet; it was queued as invisible.
    NotReady,
    /// No renderer is available; paint a plain box in `background`.
    Fallback {
        background: Color,
        alt_text: Option<String>,
    },
    Rendered(Box<RenderedPlaceholder>),
}

impl Outcome {
    pub fn rendered(&self) -> Option<&RenderedPlaceholder> {
        match self {
            Outcome::Rendered(rendered) => Some(rendered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Resizable {
    spec: PlaceholderSpec,
    engine: EngineSettings,
    mode: RenderMode,
    fluid: Option<FluidConfig>,
}

/// Mutable state for one run over a set of elements.
#[derive(Debug, Default)]
pub struct RunContext {
    pub theme_keys: ThemeKeyCache,
    resizable: BTreeMap<ElementId, Resizable>,
    invisible: BTreeMap<u64, ElementId>,
    next_invisible_id: u64,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            theme_keys: ThemeKeyCache::with_seed(seed),
            ..Self::default()
        }
    }

    /// Queues `element` for a later visibility check. Idempotent.
    pub fn mark_invisible(&mut self, element: ElementId) -> u64 {
        if let Some((id, _)) = self.invisible.iter().find(|(_, queued)| **queued == element) {
            return *id;
        }
        self.next_invisible_id += 1;
        self.invisible.insert(self.next_invisible_id, element);
        self.next_invisible_id
    }

    pub fn is_invisible(&self, element: ElementId) -> bool {
        self.invisible.values().any(|queued| *queued == element)
    }

    pub fn invisible_count(&self) -> usize {
        self.invisible.len()
    }

    /// Removes and returns queued elements whose box is now usable.
    pub fn take_visible(
        &mut self,
        mut live_box: impl FnMut(ElementId) -> Option<BoxSize>,
    ) -> Vec<ElementId> {
        let ready: Vec<u64> = self
            .invisible
            .iter()
            .filter(|(_, element)| live_box(**element).is_some_and(|size| !size.is_degenerate()))
            .map(|(id, _)| *id)
            .collect();
        ready
            .into_iter()
            .filter_map(|id| self.invisible.remove(&id))
            .collect()
    }

    pub fn resizable_elements(&self) -> Vec<ElementId> {
        self.resizable.keys().copied().collect()
    }

    pub fn is_resizable(&self, element: ElementId) -> bool {
        self.resizable.contains_key(&element)
    }

    /// Drops all state held for `element`.
    pub fn forget(&mut self, element: ElementId) {
        self.resizable.remove(&element);
        self.invisible.retain(|_, queued| *queued != element);
    }
}

pub struct Holder {
    settings: Settings,
    capabilities: Capabilities,
    measurer: Box<dyn TextMeasurer>,
    svg: SvgBackend,
    #[cfg(feature = "png")]
    raster: RasterBackend,
}

impl std::fmt::Debug for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holder")
            .field("settings", &self.settings)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Holder {
    /// A holder measuring and painting with the system fonts.
    pub fn new(settings: Settings) -> Self {
        let fonts = FontLibrary::system();
        Self::with_measurer(settings, Box::new(FontMeasurer::new(fonts.clone())), fonts)
    }

    #[cfg_attr(not(feature = "png"), allow(unused_variables))]
    pub fn with_measurer(
        settings: Settings,
        measurer: Box<dyn TextMeasurer>,
        fonts: FontLibrary,
    ) -> Self {
        let capabilities = Capabilities::probe();
        debug!(
            raster = capabilities.raster,
            vector = capabilities.vector,
            renderer = settings.engine.renderer.as_str(),
            "holder ready"
        );
        Self {
            settings,
            capabilities,
            measurer,
            svg: SvgBackend::new(),
            #[cfg(feature = "png")]
            raster: RasterBackend::new(fonts),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Registers a named theme; the random theme list is rebuilt on next use.
    pub fn add_theme(&mut self, name: impl Into<String>, theme: Theme, ctx: &mut RunContext) {
        self.settings.themes.insert(name, theme);
        ctx.theme_keys.invalidate();
    }

    pub fn parse(&self, descriptor: &str, ctx: &mut RunContext) -> Option<PlaceholderSpec> {
        let options = ParseOptions {
            domain: &self.settings.domain,
            themes: &self.settings.themes,
            stylesheets: &self.settings.engine.stylesheets,
        };
        parse_descriptor(descriptor, &options, &mut ctx.theme_keys)
    }

    /// Engine settings for one element, after the custom font fallback.
    pub fn engine_for(
        &self,
        spec: &PlaceholderSpec,
        kind: ElementKind,
        renderer: Option<RendererKind>,
    ) -> EngineSettings {
        let mut engine = self.settings.engine.clone();
        if let Some(renderer) = renderer {
            engine.renderer = renderer;
        }
        if spec.font.is_some() {
            // images cannot load external fonts from inside vector markup
            if !engine.no_font_fallback
                && kind == ElementKind::Image
                && self.capabilities.raster
                && engine.renderer == RendererKind::Vector
            {
                debug!("custom font on an image, switching to the raster renderer");
                engine.renderer = RendererKind::Raster;
            }
            if engine.renderer == RendererKind::Raster {
                engine.re_render_required = true;
            }
        }
        engine
    }

    /// Runs the whole pipeline for one element.
    pub fn process(
        &mut self,
        descriptor: &str,
        element: &Element,
        overrides: RenderOverrides,
        ctx: &mut RunContext,
    ) -> Result<Outcome, HolderError> {
        let Some(spec) = self.parse(descriptor, ctx) else {
            debug!(descriptor, "not a placeholder descriptor");
            return Ok(Outcome::NotPlaceholder);
        };
        let mode = overrides.mode.unwrap_or(if spec.fluid {
            RenderMode::Fluid
        } else {
            RenderMode::Image
        });
        let engine = self.engine_for(&spec, element.kind, overrides.renderer);

        if !self.capabilities.supports(engine.renderer) {
            warn!(
                renderer = engine.renderer.as_str(),
                "renderer unavailable, using a plain colour box"
            );
            return Ok(Outcome::Fallback {
                background: spec.theme.background,
                alt_text: alt_text(&spec, mode),
            });
        }

        let exact = spec.text_mode == TextMode::Exact;
        if mode == RenderMode::Fluid || (mode == RenderMode::Image && exact) {
            let fluid = if mode == RenderMode::Fluid {
                element
                    .visible_box()
                    .and_then(|initial| FluidConfig::capture(&spec, initial))
            } else {
                None
            };
            ctx.resizable.insert(
                element.id,
                Resizable {
                    spec,
                    engine,
                    mode,
                    fluid,
                },
            );
            return self.resize(element, ctx);
        }

        let Some(size) = fixed_box(&spec, element.visible_box()) else {
            ctx.mark_invisible(element.id);
            return Ok(Outcome::NotReady);
        };
        self.render_placeholder(&spec, &engine, mode, size, None)
    }

    /// Re-renders a fluid or exact-caption element at its current box.
    pub fn resize(&mut self, element: &Element, ctx: &mut RunContext) -> Result<Outcome, HolderError> {
        let Some(mut entry) = ctx.resizable.get(&element.id).cloned() else {
            return Ok(Outcome::NotPlaceholder);
        };
        let Some(live) = element.visible_box() else {
            ctx.mark_invisible(element.id);
            return Ok(Outcome::NotReady);
        };
        let exact = entry.spec.text_mode == TextMode::Exact;
        let (size, exact_dimensions) = if entry.mode == RenderMode::Fluid {
            if entry.fluid.is_none() {
                entry.fluid = FluidConfig::capture(&entry.spec, live);
                ctx.resizable.insert(element.id, entry.clone());
            }
            let resolved = match entry.fluid.as_ref().map(|config| config.resolve(live)) {
                Some(Readiness::Ready(size)) => size,
                Some(Readiness::NotReady) | None => {
                    ctx.mark_invisible(element.id);
                    return Ok(Outcome::NotReady);
                }
            };
            (resolved, exact.then_some(resolved))
        } else {
            match fixed_box(&entry.spec, Some(live)) {
                Some(size) => (size, exact.then_some(live)),
                None => {
                    ctx.mark_invisible(element.id);
                    return Ok(Outcome::NotReady);
                }
            }
        };

        self.render_placeholder(&entry.spec, &entry.engine, entry.mode, size, exact_dimensions)
    }

    /// Re-renders every registered fluid or exact-caption element, asking
    /// `live_box` for each element's current box.
    pub fn resize_all(
        &mut self,
        mut live_box: impl FnMut(ElementId) -> Option<BoxSize>,
        ctx: &mut RunContext,
    ) -> Result<Vec<(ElementId, Outcome)>, HolderError> {
        let elements = ctx.resizable_elements();
        let mut outcomes = Vec::with_capacity(elements.len());
        for id in elements {
            let element = Element {
                id,
                kind: ElementKind::Image,
                live_box: live_box(id),
            };
            let outcome = self.resize(&element, ctx)?;
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }

    fn backend(&mut self, kind: RendererKind) -> Option<&mut dyn Backend> {
        match kind {
            RendererKind::Vector => Some(&mut self.svg),
            #[cfg(feature = "png")]
            RendererKind::Raster => Some(&mut self.raster),
            #[cfg(not(feature = "png"))]
            RendererKind::Raster => None,
        }
    }

    fn render_placeholder(
        &mut self,
        spec: &PlaceholderSpec,
        engine: &EngineSettings,
        mode: RenderMode,
        size: BoxSize,
        exact_dimensions: Option<BoxSize>,
    ) -> Result<Outcome, HolderError> {
        let request = SceneRequest {
            width: size.width,
            height: size.height,
            spec,
            exact_dimensions,
        };
        let graph = compute_layout(&request, &self.settings.layout, self.measurer.as_mut())?;

        let settings = RenderSettings { mode, engine };
        let Some(backend) = self.backend(engine.renderer) else {
            warn!(renderer = engine.renderer.as_str(), "renderer not compiled in");
            return Ok(Outcome::Fallback {
                background: spec.theme.background,
                alt_text: alt_text(spec, mode),
            });
        };
        let renderer = backend.kind();
        let image = backend.render(&graph, &settings)?;
        let payload = image.data_uri();

        let background_size = (mode == RenderMode::Background && !engine.no_background_size)
            .then(|| format!("{}px {}px", size.width, size.height));
        let re_render_after = engine
            .re_render_required
            .then(|| Duration::from_millis(engine.re_render_delay_ms));

        debug!(
            renderer = renderer.as_str(),
            width = size.width,
            height = size.height,
            bytes = payload.len(),
            "rendered placeholder"
        );

        Ok(Outcome::Rendered(Box::new(RenderedPlaceholder {
            image,
            payload,
            renderer,
            mode,
            width: size.width,
            height: size.height,
            alt_text: alt_text(spec, mode),
            background_size,
            re_render_after,
        })))
    }
}

fn alt_text(spec: &PlaceholderSpec, mode: RenderMode) -> Option<String> {
    (mode != RenderMode::Background).then(|| spec.alt_text())
}

/// Pixel axes come from the descriptor, percentage axes from the live box.
fn fixed_box(spec: &PlaceholderSpec, live: Option<BoxSize>) -> Option<BoxSize> {
    let width = match spec.dimensions.width {
        Dimension::Pixels(value) => value as f32,
        Dimension::Percent(_) => live?.width,
    };
    let height = match spec.dimensions.height {
        Dimension::Pixels(value) => value as f32,
        Dimension::Percent(_) => live?.height,
    };
    Some(BoxSize::new(width, height))
}
