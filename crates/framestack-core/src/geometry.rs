// crates/framestack-core/src/geometry.rs
//
// Destination-rect type shared by track items, the canvas, and transitions.

use serde::{Deserialize, Serialize};

/// Axis-aligned destination rectangle in output-canvas pixels.
///
/// An all-zero rect is the "fill the output canvas" sentinel on
/// `VideoTrackItem` — resolve it with `VideoTrackItem::layout_rect` before
/// drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// True for the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.w == 0.0 && self.h == 0.0
    }

    /// Rect translated by `(dx, dy)`.
    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect { x: self.x + dx, y: self.y + dy, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinel() {
        assert!(Rect::default().is_zero());
        assert!(!Rect::new(0.0, 0.0, 1.0, 0.0).is_zero());
    }

    #[test]
    fn offset_moves_origin_only() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0).offset(-5.0, 5.0);
        assert_eq!(r, Rect::new(5.0, 25.0, 100.0, 50.0));
    }
}
