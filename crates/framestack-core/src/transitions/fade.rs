// crates/framestack-core/src/transitions/fade.rs
//
// Alpha dissolve: draw the outgoing frame at alpha 255*(1-rate), then the
// incoming frame over it at 255*rate, each into its own destination rect.
//
// The endpoint identities matter: at rate 0 the output is pixel-identical
// to drawing `from` alone, at rate 1 to drawing `to` alone. That holds
// because the canvas blend is exact at alpha 0 and 255.

use crate::canvas::{Canvas, PixelView};
use crate::geometry::Rect;
use crate::transitions::{TransitionKind, VideoTransition};

pub struct Fade;

impl VideoTransition for Fade {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Fade
    }

    fn label(&self) -> &'static str {
        "fade"
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
        canvas.draw(from, from_dest, (255.0 * (1.0 - rate)) as u8);
        canvas.draw(to, to_dest, (255.0 * rate) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelLayout;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        (0..w * h).flat_map(|_| rgba).collect()
    }

    fn view(w: u32, h: u32, data: &[u8]) -> PixelView<'_> {
        PixelView { width: w, height: h, row_pitch: w as usize * 4, layout: PixelLayout::Rgba, data }
    }

    const FULL: Rect = Rect { x: 0.0, y: 0.0, w: 4.0, h: 4.0 };

    #[test]
    fn rate_zero_is_identical_to_from_alone() {
        let from = solid(4, 4, [200, 10, 10, 255]);
        let to = solid(4, 4, [10, 10, 200, 255]);

        let mut expected = Canvas::new(4, 4);
        expected.draw(view(4, 4, &from), FULL, 255);

        let mut canvas = Canvas::new(4, 4);
        Fade.render(&mut canvas, view(4, 4, &from), FULL, view(4, 4, &to), FULL, 1.0, 0.0);

        assert_eq!(canvas.data(), expected.data());
    }

    #[test]
    fn rate_one_is_identical_to_to_alone() {
        let from = solid(4, 4, [200, 10, 10, 255]);
        let to = solid(4, 4, [10, 10, 200, 255]);

        let mut expected = Canvas::new(4, 4);
        expected.draw(view(4, 4, &to), FULL, 255);

        let mut canvas = Canvas::new(4, 4);
        Fade.render(&mut canvas, view(4, 4, &from), FULL, view(4, 4, &to), FULL, 1.0, 1.0);

        assert_eq!(canvas.data(), expected.data());
    }

    #[test]
    fn midpoint_mixes_both_frames() {
        let from = solid(4, 4, [200, 0, 0, 255]);
        let to = solid(4, 4, [0, 0, 200, 255]);

        let mut canvas = Canvas::new(4, 4);
        Fade.render(&mut canvas, view(4, 4, &from), FULL, view(4, 4, &to), FULL, 1.0, 0.5);

        // Two sequential half-alpha source-over draws on black: the `from`
        // channel is attenuated twice (200 * 0.5 * 0.5 ~= 50), the `to`
        // channel once (200 * 0.5 ~= 100).
        let px = &canvas.data()[..4];
        assert!(px[0] > 35 && px[0] < 65, "red should be double-attenuated: {px:?}");
        assert!(px[2] > 85 && px[2] < 115, "blue should be half-strength: {px:?}");
        assert!(px[0] < px[2], "incoming clip dominates at the midpoint: {px:?}");
    }
}
