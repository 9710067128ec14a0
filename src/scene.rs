//! Retained scene graph for a single placeholder.
//!
//! Children are owned by their parent, so a node has exactly one parent and
//! the tree cannot contain cycles. Sibling names are unique.

use crate::color::Color;
use crate::descriptor::Align;
use crate::text_metrics::TextPositionData;

pub const BACKGROUND_NODE: &str = "holderBg";
pub const TEXT_GROUP_NODE: &str = "holderTextGroup";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("scene node `{parent}` already has a child named `{name}`")]
    DuplicateNode { parent: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontUnits {
    #[default]
    Pt,
    Px,
}

impl FontUnits {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontUnits::Pt => "pt",
            FontUnits::Px => "px",
        }
    }

    /// CSS pixels per unit.
    pub fn px_factor(&self) -> f32 {
        match self {
            FontUnits::Pt => 96.0 / 72.0,
            FontUnits::Px => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    pub units: FontUnits,
    pub weight: String,
}

impl FontSpec {
    pub fn px_size(&self) -> f32 {
        self.size * self.units.px_factor()
    }

    /// Numeric CSS weight, `bold` is 700 and unknown keywords are 400.
    pub fn numeric_weight(&self) -> u16 {
        match self.weight.trim() {
            "bold" | "bolder" => 700,
            "lighter" => 300,
            "normal" | "" => 400,
            other => other.parse().unwrap_or(400),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub color: Color,
    pub width: f32,
}

/// Caption properties carried by the text group.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub text: String,
    pub font: FontSpec,
    pub align: Align,
    pub fill: Color,
    /// Line height, known after measurement.
    pub leading: f32,
    pub position: Option<TextPositionData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Rect {
        fill: Color,
        outline: Option<Outline>,
    },
    Group {
        style: Option<TextStyle>,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    pub x: f32,
    pub y: f32,
    pub z: i32,
    pub width: f32,
    pub height: f32,
    pub kind: NodeKind,
    children: Vec<Node>,
}

impl Node {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            x: 0.0,
            y: 0.0,
            z: 0,
            width: 0.0,
            height: 0.0,
            kind,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// Moves the node; `None` keeps the current coordinate.
    pub fn move_to(&mut self, x: Option<f32>, y: Option<f32>, z: Option<i32>) {
        if let Some(x) = x {
            self.x = x;
        }
        if let Some(y) = y {
            self.y = y;
        }
        if let Some(z) = z {
            self.z = z;
        }
    }

    pub fn add(&mut self, child: Node) -> Result<&mut Node, SceneError> {
        if self.children.iter().any(|existing| existing.name == child.name) {
            return Err(SceneError::DuplicateNode {
                parent: self.name.clone(),
                name: child.name,
            });
        }
        self.children.push(child);
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.children.iter_mut()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn text_style(&self) -> Option<&TextStyle> {
        match &self.kind {
            NodeKind::Group { style } => style.as_ref(),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A scene root plus the factory for its shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub width: f32,
    pub height: f32,
    root: Node,
    node_count: u64,
}

impl SceneGraph {
    pub fn new(width: f32, height: f32) -> Self {
        let mut root = Node::new("root".to_string(), NodeKind::Root);
        root.resize(width, height);
        Self {
            width,
            height,
            root,
            node_count: 1,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    fn next_name(&mut self) -> String {
        self.node_count += 1;
        format!("n{}", self.node_count)
    }

    pub fn rect(&mut self, name: &str, fill: Color) -> Node {
        self.node_count += 1;
        Node::new(name.to_string(), NodeKind::Rect { fill, outline: None })
    }

    pub fn group(&mut self, name: &str, style: Option<TextStyle>) -> Node {
        self.node_count += 1;
        Node::new(name.to_string(), NodeKind::Group { style })
    }

    /// Text leaves get generated names so repeated words never collide.
    pub fn text(&mut self, text: &str) -> Node {
        let name = self.next_name();
        Node::new(
            name,
            NodeKind::Text {
                text: text.to_string(),
            },
        )
    }

    pub fn background(&self) -> Option<&Node> {
        self.root.child(BACKGROUND_NODE)
    }

    pub fn text_group(&self) -> Option<&Node> {
        self.root.child(TEXT_GROUP_NODE)
    }
}

/// A word leaf with its absolute scene position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord<'a> {
    pub text: &'a str,
    pub x: f32,
    pub y: f32,
}

/// Flattens group, line and word offsets into absolute word positions.
pub fn placed_words(graph: &SceneGraph) -> Vec<PlacedWord<'_>> {
    let mut words = Vec::new();
    let Some(group) = graph.text_group() else {
        return words;
    };
    for line in group.children() {
        for word in line.children() {
            if let Some(text) = word.text() {
                words.push(PlacedWord {
                    text,
                    x: group.x + line.x + word.x,
                    y: group.y + line.y + word.y,
                });
            }
        }
    }
    words
}
