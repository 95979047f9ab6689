// crates/framestack-core/src/transitions/slide_x.rs
//
// Horizontal push: the outgoing frame slides off to the left by
// canvas_width * rate while the incoming frame slides in from the right,
// offset by canvas_width * (1 - rate). Both draw at full alpha; the edge
// between them is hard.

use crate::canvas::{Canvas, PixelView};
use crate::geometry::Rect;
use crate::transitions::{TransitionKind, VideoTransition};

pub struct SlideX;

impl VideoTransition for SlideX {
    fn kind(&self) -> TransitionKind {
        TransitionKind::SlideX
    }

    fn label(&self) -> &'static str {
        "slide-x"
    }

    fn render(
        &self,
        canvas:    &mut Canvas,
        from:      PixelView<'_>,
        from_dest: Rect,
        to:        PixelView<'_>,
        to_dest:   Rect,
        _duration: f64,
        rate:      f32,
    ) {
        let rate = rate.clamp(0.0, 1.0);
        let w = canvas.width as f32;

        canvas.draw(from, from_dest.offset(-w * rate, 0.0), 255);
        canvas.draw(to, to_dest.offset(w * (1.0 - rate), 0.0), 255);
    }
}
