#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod descriptor;
pub mod fluid;
pub mod holder;
pub mod layout;
pub mod querystring;
pub mod render;
pub mod scene;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use color::Color;
pub use config::{Settings, load_config, parse_settings};
pub use descriptor::{PlaceholderSpec, parse_descriptor};
pub use fluid::BoxSize;
pub use holder::{Element, ElementKind, Holder, HolderError, Outcome, RenderOverrides, RunContext};
pub use render::{RenderMode, RendererKind};
pub use theme::{Theme, ThemeRegistry};

use text_metrics::{FontLibrary, GlyphTableMeasurer};

/// Renders one descriptor to vector markup with the built-in glyph table,
/// independent of installed fonts. `live_box` is only consulted for fluid
/// descriptors and exact captions.
pub fn render_with_settings(
    descriptor: &str,
    mut settings: Settings,
    live_box: Option<BoxSize>,
) -> Result<Outcome, HolderError> {
    // no font faces are loaded, so a raster render would have no caption
    settings.engine.renderer = RendererKind::Vector;
    settings.engine.no_font_fallback = true;
    let mut holder = Holder::with_measurer(settings, Box::new(GlyphTableMeasurer), FontLibrary::empty());
    let mut ctx = RunContext::new();
    let mut element = Element::image(1);
    element.live_box = live_box;
    holder.process(descriptor, &element, RenderOverrides::default(), &mut ctx)
}
