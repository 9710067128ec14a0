use holder_rs::color::Color;
use holder_rs::config::{LayoutConfig, Settings};
use holder_rs::descriptor::{Dimension, ParseOptions, ThemeKeyCache, parse_descriptor};
use holder_rs::fluid::{BoxSize, FluidConfig, Readiness};
use holder_rs::layout::{SceneRequest, compute_layout};
use holder_rs::render::svg;
use holder_rs::scene::NodeKind;
use holder_rs::text_metrics::GlyphTableMeasurer;
use holder_rs::theme::{ThemeRegistry, ThemeRequest, resolve_theme};
use holder_rs::{Outcome, PlaceholderSpec, render_with_settings};

fn parse(descriptor: &str) -> Option<PlaceholderSpec> {
    let themes = ThemeRegistry::default();
    let options = ParseOptions {
        domain: "holder.js",
        themes: &themes,
        stylesheets: &[],
    };
    parse_descriptor(descriptor, &options, &mut ThemeKeyCache::with_seed(42))
}

fn layout(spec: &PlaceholderSpec, width: f32, height: f32) -> holder_rs::scene::SceneGraph {
    let request = SceneRequest {
        width,
        height,
        spec,
        exact_dimensions: None,
    };
    compute_layout(&request, &LayoutConfig::default(), &mut GlyphTableMeasurer).unwrap()
}

fn caption(graph: &holder_rs::scene::SceneGraph) -> String {
    graph.text_group().unwrap().text_style().unwrap().text.clone()
}

#[test]
fn plain_dimensions_use_gray_theme_and_size_caption() {
    let spec = parse("300x150").unwrap();
    assert_eq!(spec.dimensions.width, Dimension::Pixels(300));
    assert_eq!(spec.dimensions.height, Dimension::Pixels(150));
    assert!(!spec.fluid);
    assert_eq!(spec.theme, ThemeRegistry::default().default_theme());
    assert_eq!(caption(&layout(&spec, 300.0, 150.0)), "300x150");
}

#[test]
fn background_flag_enables_auto_foreground() {
    let spec = parse("300x150?bg=333&text=Hello").unwrap();
    assert_eq!(spec.theme.background.to_hex(true), "#333333");
    assert!(spec.auto_foreground);
    assert_eq!(spec.theme.foreground.raw(), 0xffffff);
    assert_eq!(caption(&layout(&spec, 300.0, 150.0)), "Hello");
}

#[test]
fn percentage_dimensions_are_fluid() {
    let spec = parse("100%x50%").unwrap();
    assert!(spec.fluid);
    assert_eq!(spec.dimensions.width, Dimension::Percent(100));
    assert_eq!(spec.dimensions.height, Dimension::Percent(50));
    assert_eq!(spec.dimensions.caption(), "100%x50%");
}

#[test]
fn outline_on_light_background_is_darker() {
    let spec = parse("holder.js/200x100?outline=true&bg=dddddd").unwrap();
    assert!(spec.theme.background.lighter_than(&Color::from_raw(0x7f7f7f)));
    let graph = layout(&spec, 200.0, 100.0);
    match &graph.background().unwrap().kind {
        NodeKind::Rect {
            fill,
            outline: Some(outline),
        } => assert!(outline.color.luma() < fill.luma()),
        other => panic!("background without outline: {other:?}"),
    }
}

#[cfg(feature = "png")]
#[test]
fn backends_agree_on_word_positions() {
    use holder_rs::render::raster;

    let spec = parse("holder.js/240x120?text=several words wrapping onto more lines").unwrap();
    let graph = layout(&spec, 240.0, 120.0);
    let style = graph.text_group().and_then(|group| group.text_style()).unwrap();
    let bbox_height = style.position.as_ref().unwrap().bounding_box.height;
    let half_leading = style.leading / 2.0;

    let vector = svg::word_positions(&graph);
    let raster = raster::word_positions(&graph);
    assert_eq!(vector.len(), raster.len());
    assert!(vector.len() > 1);
    let mut line_tops = Vec::new();
    for (v, r) in vector.iter().zip(&raster) {
        assert_eq!(v.text, r.text);
        assert_eq!(v.x, r.x);
        let top = v.y - svg::BASELINE_SHIFT * bbox_height;
        assert!((r.y - half_leading - top).abs() < 1e-4);
        if !line_tops.contains(&top) {
            line_tops.push(top);
        }
    }
    assert!(line_tops.len() > 1);
    assert!(line_tops.windows(2).all(|pair| (pair[1] - pair[0] - style.leading).abs() < 1e-3));
}

#[test]
fn dimensions_survive_parsing() {
    for (descriptor, width, height) in [
        ("1x1", Dimension::Pixels(1), Dimension::Pixels(1)),
        ("640x480?theme=sky&size=20", Dimension::Pixels(640), Dimension::Pixels(480)),
        ("25%x9999", Dimension::Percent(25), Dimension::Pixels(9999)),
        ("holder.js/80x20%?nowrap=true", Dimension::Pixels(80), Dimension::Percent(20)),
    ] {
        let spec = parse(descriptor).unwrap();
        assert_eq!(spec.dimensions.width, width, "{descriptor}");
        assert_eq!(spec.dimensions.height, height, "{descriptor}");
    }
}

#[test]
fn malformed_dimensions_are_not_placeholders() {
    for descriptor in ["", "x", "300", "300x", "x150", "-3x4", "3.5x4", "3x4x5", "axb", "300 x 150"] {
        assert!(parse(descriptor).is_none(), "{descriptor}");
    }
}

#[test]
fn theme_resolution_is_idempotent() {
    let registry = ThemeRegistry::default();
    let snapshot = registry.clone();
    let request = ThemeRequest {
        name: Some("industrial".to_string()),
        background: Color::parse("rgb(10,20,30)"),
        foreground: None,
    };
    assert_eq!(resolve_theme(&request, &registry), resolve_theme(&request, &registry));
    assert_eq!(registry, snapshot);
}

#[test]
fn lighten_round_trips() {
    let original = Color::from_hex("6a8fb3").unwrap();
    assert_eq!(original.lighten(0.0), original);
    for amount in [0.05f32, 0.1, 0.2, -0.15] {
        let back = original.lighten(amount).lighten(-amount);
        let (a, b) = (original.rgb(), back.rgb());
        assert!((a.r as i16 - b.r as i16).abs() <= 1);
        assert!((a.g as i16 - b.g as i16).abs() <= 1);
        assert!((a.b as i16 - b.b as i16).abs() <= 1);
    }
    let dark = Color::from_hex("222").unwrap();
    assert_eq!(original.lighter_than(&dark), !dark.lighter_than(&original));
}

#[test]
fn layout_is_repeatable() {
    let spec = parse("holder.js/160x90?text=The quick brown fox jumps over the lazy dog").unwrap();
    let first = layout(&spec, 160.0, 90.0);
    let second = layout(&spec, 160.0, 90.0);
    assert_eq!(first, second);
    assert!(first.text_group().unwrap().children().len() > 1);
}

#[test]
fn overflowing_text_sticks_to_top() {
    let spec = parse("holder.js/120x20?text=one two three four five six seven eight nine ten").unwrap();
    let graph = layout(&spec, 120.0, 20.0);
    let group = graph.text_group().unwrap();
    assert!(group.height > 20.0);
    assert_eq!(group.y, 0.0);
}

#[test]
fn fluid_width_keeps_ratio() {
    let spec = parse("holder.js/100%x100?auto=yes").unwrap();
    let config = FluidConfig::capture(&spec, BoxSize::new(200.0, 100.0)).unwrap();
    assert_eq!(
        config.resolve(BoxSize::new(400.0, 100.0)),
        Readiness::Ready(BoxSize::new(400.0, 200.0))
    );
}

#[test]
fn one_shot_render_produces_escaped_svg() {
    let outcome = render_with_settings(
        "holder.js/200x100?text=a<b&bg=000",
        Settings::default(),
        None,
    )
    .unwrap();
    let Outcome::Rendered(rendered) = outcome else {
        panic!("expected a render, got {outcome:?}");
    };
    let markup = String::from_utf8(rendered.image.bytes.clone()).unwrap();
    assert!(markup.contains("a&lt;b"));
    assert!(markup.contains("fill=\"#000000\""));
    assert!(rendered.payload.starts_with("data:image/svg+xml;charset=UTF-8,%3Csvg"));
}

#[test]
fn fluid_render_needs_a_box() {
    let outcome = render_with_settings("holder.js/100%x100", Settings::default(), None).unwrap();
    assert_eq!(outcome, Outcome::NotReady);
    let outcome = render_with_settings(
        "holder.js/100%x100",
        Settings::default(),
        Some(BoxSize::new(500.0, 100.0)),
    )
    .unwrap();
    let rendered = outcome.rendered().unwrap();
    assert_eq!((rendered.width, rendered.height), (500.0, 100.0));
}

#[test]
fn one_shot_render_keeps_custom_font_captions_in_svg() {
    let mut settings = Settings::default();
    settings.engine.renderer = holder_rs::RendererKind::Raster;
    let outcome = render_with_settings("holder.js/100x50?font=Georgia&text=Hi", settings, None).unwrap();
    let rendered = outcome.rendered().unwrap();
    assert_eq!(rendered.renderer, holder_rs::RendererKind::Vector);
    assert_eq!(rendered.re_render_after, None);
    let markup = String::from_utf8(rendered.image.bytes.clone()).unwrap();
    assert!(markup.contains(">Hi</text>"));
    assert!(markup.contains("Georgia"));
    assert!(rendered.payload.starts_with("data:image/svg+xml"));
}
