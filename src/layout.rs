//! Scene construction and caption layout.
//!
//! Builds the background rectangle and the text group for one placeholder,
//! measures the caption, breaks it into lines greedily and positions the
//! lines according to the requested alignment.

use crate::config::LayoutConfig;
use crate::descriptor::{Align, PlaceholderSpec, TextMode};
use crate::fluid::BoxSize;
use crate::scene::{
    BACKGROUND_NODE, FontSpec, Node, NodeKind, Outline, SceneError, SceneGraph, TEXT_GROUP_NODE,
    TextStyle,
};
use crate::text_metrics::{
    CaptionToken, MeasurementUnavailable, TextMeasurer, TextPositionData, measure_caption,
    split_caption,
};
use crate::theme::outline_color;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    MeasurementUnavailable(#[from] MeasurementUnavailable),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Everything needed to lay out one placeholder at a concrete size.
#[derive(Debug, Clone, Copy)]
pub struct SceneRequest<'a> {
    pub width: f32,
    pub height: f32,
    pub spec: &'a PlaceholderSpec,
    /// Live element size, used by `textmode=exact` on the second pass.
    pub exact_dimensions: Option<BoxSize>,
}

/// Font size that never drops below the request but grows with small scenes.
pub fn text_size(width: f32, height: f32, requested: f32, scale: f32) -> f32 {
    let width = width.floor();
    let height = height.floor();
    let big_side = width.max(height);
    let small_side = width.min(height);
    let adaptive = 0.8 * small_side.min(big_side * scale);
    adaptive.max(requested).round()
}

pub fn resolve_font(request: &SceneRequest<'_>, config: &LayoutConfig) -> FontSpec {
    let spec = request.spec;
    let requested = spec
        .size
        .or(spec.theme.size)
        .filter(|size| *size > 0.0)
        .unwrap_or(config.font_size);
    FontSpec {
        family: spec
            .font
            .clone()
            .or_else(|| spec.theme.font.clone())
            .unwrap_or_else(|| config.font_family.clone()),
        size: text_size(request.width, request.height, requested, config.text_scale),
        units: config.font_units,
        weight: spec
            .theme
            .font_weight
            .clone()
            .unwrap_or_else(|| config.font_weight.clone()),
    }
}

pub fn resolve_caption(request: &SceneRequest<'_>) -> String {
    let spec = request.spec;
    match spec.text_mode {
        TextMode::Literal => return spec.dimensions.caption(),
        TextMode::Exact => {
            if let Some(exact) = request.exact_dimensions {
                return format!("{}x{}", exact.width.floor(), exact.height.floor());
            }
        }
        TextMode::Default => {}
    }
    spec.text
        .clone()
        .or_else(|| spec.theme.text.clone())
        .unwrap_or_else(|| format!("{}x{}", request.width.floor(), request.height.floor()))
}

/// Builds the positioned scene graph for `request`.
pub fn compute_layout<M: TextMeasurer + ?Sized>(
    request: &SceneRequest<'_>,
    config: &LayoutConfig,
    measurer: &mut M,
) -> Result<SceneGraph, LayoutError> {
    let spec = request.spec;
    let (width, height) = (request.width, request.height);
    let font = resolve_font(request, config);
    let caption = resolve_caption(request);
    let wrap_ratio = spec.line_wrap_ratio.unwrap_or(config.line_wrap_ratio);
    let align = spec.align;
    let nowrap = spec.nowrap;

    let mut graph = SceneGraph::new(width, height);

    let mut background = graph.rect(BACKGROUND_NODE, spec.theme.background);
    background.resize(width, height);
    if spec.outline
        && let NodeKind::Rect { fill, outline } = &mut background.kind
    {
        *outline = Some(Outline {
            color: outline_color(fill),
            width: config.outline_width,
        });
    }
    graph.root_mut().add(background)?;

    let position = measure_caption(measurer, &caption, &font, width, wrap_ratio)?;
    let leading = position.bounding_box.height;

    let style = TextStyle {
        text: caption,
        font,
        align,
        fill: spec.theme.foreground,
        leading,
        position: None,
    };
    let mut group = graph.group(TEXT_GROUP_NODE, Some(style));
    group.move_to(None, None, Some(1));

    let scene_margin = width * wrap_ratio;

    if position.line_count > 1 {
        let max_line_width = match align {
            // doubled margin keeps left/right text off the edge
            Align::Left | Align::Right => width * (1.0 - (1.0 - wrap_ratio) * 2.0),
            Align::Center => scene_margin,
        };
        break_lines(&mut graph, &mut group, &position, max_line_width, leading, nowrap)?;

        match align {
            Align::Left => group.move_to(Some(width - scene_margin), None, None),
            Align::Right => {
                for line in group.children_mut() {
                    let x = width - line.width;
                    line.move_to(Some(x), None, None);
                }
                group.move_to(Some(-(width - scene_margin)), None, None);
            }
            Align::Center => {
                let group_width = group.width;
                for line in group.children_mut() {
                    let x = (group_width - line.width) / 2.0;
                    line.move_to(Some(x), None, None);
                }
                group.move_to(Some((width - group_width) / 2.0), None, None);
            }
        }
    } else {
        let bbox = position.bounding_box;
        let mut line = graph.group("line0", None);
        line.resize(bbox.width, bbox.height);
        let words: Vec<&str> = split_caption(text_of(&group))
            .into_iter()
            .filter_map(|token| match token {
                CaptionToken::Word(word) => Some(word),
                CaptionToken::Break => None,
            })
            .collect();
        let text_node = graph.text(&words.join(" "));
        line.add(text_node)?;
        group.resize(bbox.width, bbox.height);

        match align {
            Align::Left => group.move_to(Some(width - scene_margin), None, None),
            Align::Right => {
                line.move_to(Some(width - bbox.width), None, None);
                group.move_to(Some(-(width - scene_margin)), None, None);
            }
            Align::Center => group.move_to(Some((width - bbox.width) / 2.0), None, None),
        }
        group.add(line)?;
    }

    // keep the first line visible when the text is taller than the scene
    let top = ((height - group.height) / 2.0).max(0.0);
    group.move_to(None, Some(top), None);

    if let NodeKind::Group { style: Some(style) } = &mut group.kind {
        style.position = Some(position);
    }

    debug!(
        lines = group.children().len(),
        x = group.x,
        y = group.y,
        width = group.width,
        height = group.height,
        "laid out caption"
    );

    graph.root_mut().add(group)?;
    Ok(graph)
}

fn text_of(group: &Node) -> &str {
    group.text_style().map(|style| style.text.as_str()).unwrap_or("")
}

fn break_lines(
    graph: &mut SceneGraph,
    group: &mut Node,
    position: &TextPositionData,
    max_line_width: f32,
    leading: f32,
    nowrap: bool,
) -> Result<(), SceneError> {
    let mut offset_x = 0.0f32;
    let mut offset_y = 0.0f32;
    let mut line_index = 0usize;
    let mut line = graph.group("line0", None);

    for word in &position.words {
        let overflow = offset_x + word.width >= max_line_width;
        if !nowrap && (word.line_break || overflow) {
            finalize_line(group, line, offset_x, leading)?;
            offset_x = 0.0;
            offset_y += leading;
            line_index += 1;
            line = graph.group(&format!("line{line_index}"), None);
            line.move_to(None, Some(offset_y), None);
        }
        if word.line_break {
            continue;
        }
        let mut node = graph.text(&word.text);
        node.move_to(Some(offset_x), Some(0.0), None);
        trace!(word = %word.text, x = offset_x, line = line_index, "placed word");
        offset_x += position.space_width + word.width;
        line.add(node)?;
    }

    finalize_line(group, line, offset_x, leading)
}

fn finalize_line(group: &mut Node, mut line: Node, width: f32, height: f32) -> Result<(), SceneError> {
    line.resize(width, height);
    group.width = group.width.max(width);
    group.height += height;
    group.add(line)?;
    Ok(())
}
