// THEORY:
// The `region` module is the geometric leaf of the measurement engine. A `Region`
// is the bounding rectangle the upstream detector reports for one face in one frame,
// expressed in the detector's own coordinate space (never screen space).
//
// Key architectural principles:
// 1.  **Plain Value**: A `Region` is `Copy` and has no identity of its own. Every frame
//     brings a fresh one; the owning detection is what gives it meaning.
// 2.  **Forgiving Geometry**: Detectors occasionally report inverted rectangles. They
//     are not rejected here; an inverted axis simply measures as zero, so everything
//     downstream (most importantly the power formula) still has a defined answer.
// 3.  **Hit Testing**: `contains` and `expanded` are what a presentation layer needs
//     to map a tap back onto a finalized face without knowing anything about lifecycles.

use serde::{Deserialize, Serialize};

/// A 2D point in detector coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned bounding rectangle reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Region {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent. An inverted rectangle measures as zero.
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    /// Vertical extent. An inverted rectangle measures as zero.
    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Edges are inclusive.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    /// True when the two rectangles share a region of positive area. Touching edges do not count.
    pub fn intersects(&self, other: &Region) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }

    /// Returns a rectangle scaled by `factor` around the same center.
    pub fn expanded(&self, factor: f32) -> Region {
        let center = self.center();
        let half_width = self.width() * factor / 2.0;
        let half_height = self.height() * factor / 2.0;
        Region::new(
            center.x - half_width,
            center.y - half_height,
            center.x + half_width,
            center.y + half_height,
        )
    }
}
