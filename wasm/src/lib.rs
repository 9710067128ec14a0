use holder_rs::{BoxSize, Outcome, Settings, Theme, parse_settings, render_with_settings};
use serde::Deserialize;
use std::collections::BTreeMap;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceholderOptions {
    /// Full settings document, same shape as a config file.
    settings: Option<serde_json::Value>,
    domain: Option<String>,
    themes: Option<BTreeMap<String, Theme>>,
    width: Option<f32>,
    height: Option<f32>,
}

fn build_settings(options: &mut PlaceholderOptions) -> Result<Settings, String> {
    let mut settings = match options.settings.take() {
        Some(value) => parse_settings(&value.to_string()).map_err(|error| error.to_string())?,
        None => Settings::default(),
    };
    if let Some(domain) = options.domain.take() {
        settings.domain = domain;
    }
    for (name, theme) in options.themes.take().unwrap_or_default() {
        settings.themes.insert(name, theme);
    }
    Ok(settings)
}

fn render(descriptor: &str, options_json: Option<String>) -> Result<String, String> {
    let mut options = match options_json {
        Some(raw) => serde_json::from_str::<PlaceholderOptions>(&raw).map_err(|error| error.to_string())?,
        None => PlaceholderOptions::default(),
    };
    let settings = build_settings(&mut options)?;
    let live_box = match (options.width, options.height) {
        (Some(width), Some(height)) => Some(BoxSize::new(width, height)),
        _ => None,
    };
    match render_with_settings(descriptor, settings, live_box).map_err(|error| error.to_string())? {
        Outcome::Rendered(rendered) => Ok(rendered.payload),
        Outcome::NotPlaceholder => Err(format!("not a placeholder descriptor: {descriptor}")),
        Outcome::NotReady => Err("fluid placeholder needs width and height".to_string()),
        Outcome::Fallback { .. } => Err("no renderer available".to_string()),
    }
}

/// Renders a descriptor to an SVG data URI.
#[wasm_bindgen]
pub fn render_placeholder(descriptor: &str, options_json: Option<String>) -> Result<String, JsValue> {
    render(descriptor, options_json).map_err(|error| JsValue::from_str(&error))
}

#[cfg(test)]
mod tests {
    use crate::render;

    #[test]
    fn renders_svg_data_uri() {
        let uri = render("holder.js/300x150?theme=sky&text=Hello", None)
            .expect("descriptor should render");
        assert!(uri.starts_with("data:image/svg+xml;charset=UTF-8,"));
        assert!(uri.contains("Hello"));
    }

    #[test]
    fn applies_custom_domain_and_themes() {
        let options = r##"{
            "domain": "img.test",
            "themes": { "brand": { "bg": "#102030", "fg": "#fff" } }
        }"##;
        let uri = render("img.test/120x60?theme=brand", Some(options.to_string()))
            .expect("descriptor should render");
        assert!(uri.contains("%23102030"));
    }

    #[test]
    fn fluid_needs_a_box() {
        assert!(render("holder.js/100%x50", None).is_err());
        let uri = render(
            "holder.js/100%x50",
            Some(r#"{"width": 400, "height": 50}"#.to_string()),
        )
        .expect("fluid placeholder with a box should render");
        assert!(uri.contains("400x50"));
    }
}
