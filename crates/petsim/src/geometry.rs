use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Width/height pair in container-local units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

/// Rectangle an agent's top-left corner may occupy.
///
/// Bounds are only ever constructed non-empty (`left <= right`, `top <= bottom`);
/// an empty movement area is represented by `None` at the call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Option<Self> {
        let finite = [left, top, right, bottom].iter().all(|v| v.is_finite());
        if !finite || right < left || bottom < top {
            return None;
        }
        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left
            && point.x <= self.right
            && point.y >= self.top
            && point.y <= self.bottom
    }

    /// Derives the movement rectangle for an agent of `dimensions` inside a
    /// container, honouring the margin and the vertical activity band
    /// (fractions of container height).
    pub fn for_agent(
        container: Size,
        dimensions: Size,
        margin: f32,
        band_top: f32,
        band_bottom: f32,
    ) -> Option<Self> {
        if container.is_degenerate() {
            return None;
        }
        let left = margin;
        let right = container.width - margin - dimensions.width;
        let top = margin.max(container.height * band_top);
        let bottom = (container.height - margin).min(container.height * band_bottom)
            - dimensions.height;
        Self::new(left, top, right, bottom)
    }
}
