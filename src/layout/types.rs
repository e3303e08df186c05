use serde::Serialize;

use crate::ir::{EntityRef, LineStyle, PropositionKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Unit vector, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            None
        } else {
            Some(self.scale(1.0 / len))
        }
    }
}

/// Axis-aligned box; `(x, y)` is the lower-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.top().max(other.top()) - y,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLayout {
    pub lines: Vec<String>,
    /// Center of the whole block; lines run downward from it.
    pub anchor: Point,
    pub size: f32,
    pub line_height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateBadge {
    pub state: String,
    pub value: bool,
    /// The value differs from the one shown at the previous level.
    pub changed: bool,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectLayout {
    pub id: String,
    pub rect: Rect,
    pub center: Point,
    pub color: String,
    pub label: TextLayout,
    pub on_floor: bool,
    pub states: Vec<StateBadge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Top,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaceholderLayout {
    pub kind: PlaceholderKind,
    pub rect: Rect,
    /// Drawn only when the current level mentions it.
    pub visible: bool,
}

impl PlaceholderLayout {
    pub fn center(&self) -> Point {
        self.rect.center()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateLine {
    pub state: String,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceptacleLayout {
    pub id: String,
    /// Icon plus its horizontal margins.
    pub rect: Rect,
    pub icon: Rect,
    pub icon_path: Option<String>,
    pub label: TextLayout,
    pub top: PlaceholderLayout,
    pub center: PlaceholderLayout,
    pub state_lines: Vec<StateLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomLayout {
    pub id: String,
    /// Outer box including margins.
    pub rect: Rect,
    /// The drawn room box.
    pub inner: Rect,
    pub label: TextLayout,
    pub in_proposition: bool,
    pub bordered: bool,
    pub anchor: Point,
    pub placeholder: Option<PlaceholderLayout>,
    pub receptacles: Vec<ReceptacleLayout>,
    pub objects: Vec<ObjectLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorLayout {
    pub proposition: usize,
    pub kind: PropositionKind,
    pub source: String,
    pub target: String,
    pub from: Point,
    pub control: Point,
    pub to: Point,
    /// Unit tangent at the end of the curve.
    pub direction: Point,
    pub head_base: Point,
    pub style: LineStyle,
    pub color: String,
    pub label: Option<(Point, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendKind {
    NextTo,
    SameArg,
    DifferentArg,
}

impl LegendKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::NextTo => "next to",
            Self::SameArg => "same as",
            Self::DifferentArg => "different",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendVertex {
    pub entity: EntityRef,
    pub side: LegendSide,
    /// Glyph box (object square, receptacle icon or tiny room).
    pub rect: Rect,
    /// Where edges attach.
    pub anchor: Point,
    pub color: Option<String>,
    pub icon_path: Option<String>,
    pub label: TextLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEdge {
    pub from: usize,
    pub to: usize,
    pub style: LineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendLayout {
    pub kind: LegendKind,
    pub title: TextLayout,
    pub rect: Rect,
    pub vertices: Vec<LegendVertex>,
    pub edges: Vec<LegendEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelLayout {
    pub index: usize,
    pub propositions: Vec<usize>,
    pub lower: f32,
    pub upper: f32,
    pub rooms: Vec<RoomLayout>,
    pub connectors: Vec<ConnectorLayout>,
    /// Objects this level's is_next_to pairs could not place anywhere.
    pub unplaced: Vec<String>,
    /// Entities drawn outside any room (single-entity previews).
    pub objects: Vec<ObjectLayout>,
    pub receptacles: Vec<ReceptacleLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Divider {
    pub y: f32,
    pub x1: f32,
    pub x2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepBadge {
    pub number: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramLayout {
    pub width: f32,
    pub height: f32,
    pub bounds: Rect,
    pub levels: Vec<LevelLayout>,
    pub legends: Vec<LegendLayout>,
    pub dividers: Vec<Divider>,
    pub instruction: Option<TextLayout>,
    pub step: Option<StepBadge>,
}
