//! Shape definitions for the shared canvas.

mod ellipse;
mod freehand;
mod line;
mod rectangle;

pub use ellipse::Ellipse;
pub use freehand::Freehand;
pub use line::Line;
pub use rectangle::Rectangle;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stroke width given to new shapes and to shapes whose width was unusable.
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }
}

/// Sloppiness level for the hand-drawn look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sloppiness {
    Architect = 0,
    #[default]
    Artist = 1,
    Cartoonist = 2,
}

/// Fill pattern style for closed shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillPattern {
    #[default]
    Solid,
    Hachure,
    CrossHatch,
    Dots,
}

/// Style properties for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    pub fill_color: Option<SerializableColor>,
    #[serde(default)]
    pub fill_pattern: FillPattern,
    #[serde(default)]
    pub sloppiness: Sloppiness,
    /// Seed for the hand-drawn jitter, so every peer renders the same strokes.
    #[serde(default = "next_seed")]
    pub seed: u32,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

/// Seeds only need to differ between shapes drawn in one session.
fn next_seed() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEED_COUNTER: AtomicU32 = AtomicU32::new(1);

    // splitmix32 finalizer
    let mut x = SEED_COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_mul(0x9E37_79B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    x
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            fill_color: None,
            fill_pattern: FillPattern::default(),
            sloppiness: Sloppiness::default(),
            seed: next_seed(),
            opacity: 1.0,
        }
    }
}

/// Unique identifier for shapes.
pub type ShapeId = Uuid;

/// Discriminant of a [`Shape`], used by per-kind policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
    Freehand,
}

/// Enum wrapper for all shape types (for serialization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rectangle(Rectangle),
    Ellipse(Ellipse),
    Line(Line),
    Freehand(Freehand),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Shape::Rectangle($s) => $body,
            Shape::Ellipse($s) => $body,
            Shape::Line($s) => $body,
            Shape::Freehand($s) => $body,
        }
    };
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        dispatch!(self, s => s.id())
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::Ellipse(_) => ShapeKind::Ellipse,
            Shape::Line(_) => ShapeKind::Line,
            Shape::Freehand(_) => ShapeKind::Freehand,
        }
    }

    pub fn is_freehand(&self) -> bool {
        matches!(self, Shape::Freehand(_))
    }

    pub fn style(&self) -> &ShapeStyle {
        dispatch!(self, s => &s.style)
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        dispatch!(self, s => &mut s.style)
    }
}

impl From<Rectangle> for Shape {
    fn from(s: Rectangle) -> Self {
        Shape::Rectangle(s)
    }
}

impl From<Ellipse> for Shape {
    fn from(s: Ellipse) -> Self {
        Shape::Ellipse(s)
    }
}

impl From<Line> for Shape {
    fn from(s: Line) -> Self {
        Shape::Line(s)
    }
}

impl From<Freehand> for Shape {
    fn from(s: Freehand) -> Self {
        Shape::Freehand(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_kind_matches_variant() {
        let shape: Shape = Freehand::from_points(vec![Point::ZERO]).into();
        assert_eq!(shape.kind(), ShapeKind::Freehand);
        assert!(shape.is_freehand());

        let shape: Shape = Rectangle::new(Point::ZERO, 1.0, 1.0).into();
        assert_eq!(shape.kind(), ShapeKind::Rectangle);
        assert!(!shape.is_freehand());
    }

    #[test]
    fn test_shape_json_keeps_type_and_style() {
        let mut rect = Rectangle::new(Point::new(1.0, 2.0), 3.0, 4.0);
        rect.style.fill_color = Some(SerializableColor::white());
        let shape = Shape::Rectangle(rect);

        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.starts_with(r#"{"Rectangle":"#));

        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_style_defaults_when_fields_missing() {
        let json = r#"{"stroke_color":{"r":0,"g":0,"b":0,"a":255},"stroke_width":3.0,"fill_color":null}"#;
        let style: ShapeStyle = serde_json::from_str(json).unwrap();
        assert_eq!(style.fill_pattern, FillPattern::Solid);
        assert!((style.opacity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_seed_is_generated() {
        let json = r#"{"stroke_color":{"r":0,"g":0,"b":0,"a":255},"stroke_width":3.0,"fill_color":null}"#;
        let a: ShapeStyle = serde_json::from_str(json).unwrap();
        let b: ShapeStyle = serde_json::from_str(json).unwrap();
        assert_ne!(a.seed, b.seed);
        assert_ne!(a.seed, 0);
    }

    #[test]
    fn test_style_mut_reaches_variant() {
        let mut shape: Shape = Ellipse::circle(Point::ZERO, 2.0).into();
        shape.style_mut().stroke_width = 7.0;
        match &shape {
            Shape::Ellipse(ellipse) => assert_eq!(ellipse.style.stroke_width, 7.0),
            other => panic!("unexpected variant {:?}", other.kind()),
        }
    }
}
