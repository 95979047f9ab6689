// crates/framestack-core/src/canvas.rs
//
// Packed-RGBA compositing surface. This is the small slice of canvas
// functionality the compositor and transitions actually need: clear,
// scaled blit with a global alpha, and 1:1 composite of a scratch canvas.
//
// Blends run in gamma-encoded byte space, same as the YUV transition math
// in the encode pipeline this grew out of. The integer blend is exact at
// alpha 0 and 255: a full-alpha draw writes source bytes verbatim and a
// zero-alpha draw is a no-op.

use crate::geometry::Rect;

/// Pixel byte order of a decoded frame. The decode engine fast-paths these
/// two layouts; everything else is converted to RGBA before it gets here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba,
    Bgra,
}

/// Borrowed view of one decoded frame's pixels.
///
/// `row_pitch` is the stride in bytes and may exceed `width * 4` — decoders
/// keep their row padding and the blit skips it.
#[derive(Clone, Copy)]
pub struct PixelView<'a> {
    pub width:     u32,
    pub height:    u32,
    pub row_pitch: usize,
    pub layout:    PixelLayout,
    pub data:      &'a [u8],
}

impl<'a> PixelView<'a> {
    /// Fetch pixel `(x, y)` as RGBA bytes, swizzling BGRA sources.
    #[inline]
    fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let o = y as usize * self.row_pitch + x as usize * 4;
        let p = &self.data[o..o + 4];
        match self.layout {
            PixelLayout::Rgba => [p[0], p[1], p[2], p[3]],
            PixelLayout::Bgra => [p[2], p[1], p[0], p[3]],
        }
    }
}

/// Opaque packed-RGBA render target.
pub struct Canvas {
    pub width:  u32,
    pub height: u32,
    data:       Vec<u8>,
}

/// Blend one gamma-encoded byte over another at `alpha` ∈ [0, 255].
/// Exactly `src` at 255 and exactly `dst` at 0.
#[inline]
fn blend_over(src: u8, dst: u8, alpha: u16) -> u8 {
    ((src as u16 * alpha + dst as u16 * (255 - alpha) + 127) / 255) as u8
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut c = Self { width, height, data: vec![0; width as usize * height as usize * 4] };
        c.clear();
        c
    }

    /// Reset every pixel to opaque black.
    pub fn clear(&mut self) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
    }

    /// Packed RGBA bytes, row-major, no padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// View of this canvas as a drawable source.
    pub fn as_view(&self) -> PixelView<'_> {
        PixelView {
            width:     self.width,
            height:    self.height,
            row_pitch: self.width as usize * 4,
            layout:    PixelLayout::Rgba,
            data:      &self.data,
        }
    }

    /// Draw `src` scaled (nearest-neighbor) into `dest`, blended over the
    /// canvas with global `alpha`. Pixels falling outside the canvas are
    /// clipped; `alpha == 0` draws nothing.
    pub fn draw(&mut self, src: PixelView<'_>, dest: Rect, alpha: u8) {
        if alpha == 0 || dest.w <= 0.0 || dest.h <= 0.0 || src.width == 0 || src.height == 0 {
            return;
        }

        let x0 = dest.x.floor().max(0.0) as u32;
        let y0 = dest.y.floor().max(0.0) as u32;
        let x1 = ((dest.x + dest.w).ceil() as i64).clamp(0, self.width as i64) as u32;
        let y1 = ((dest.y + dest.h).ceil() as i64).clamp(0, self.height as i64) as u32;
        let a = alpha as u16;

        for cy in y0..y1 {
            let v = (cy as f32 + 0.5 - dest.y) / dest.h;
            if !(0.0..1.0).contains(&v) {
                continue;
            }
            let sy = ((v * src.height as f32) as u32).min(src.height - 1);
            for cx in x0..x1 {
                let u = (cx as f32 + 0.5 - dest.x) / dest.w;
                if !(0.0..1.0).contains(&u) {
                    continue;
                }
                let sx = ((u * src.width as f32) as u32).min(src.width - 1);

                let spx = src.rgba(sx, sy);
                let o = (cy as usize * self.width as usize + cx as usize) * 4;
                let dpx = &mut self.data[o..o + 4];
                dpx[0] = blend_over(spx[0], dpx[0], a);
                dpx[1] = blend_over(spx[1], dpx[1], a);
                dpx[2] = blend_over(spx[2], dpx[2], a);
                dpx[3] = 255;
            }
        }
    }

    /// Composite another same-sized canvas over this one at 1:1, opaque.
    /// Used to splat the transition scratch canvas onto the main frame.
    pub fn draw_canvas(&mut self, other: &Canvas) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        self.data.copy_from_slice(&other.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let mut v = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            v.extend_from_slice(&rgba);
        }
        v
    }

    fn view(w: u32, h: u32, layout: PixelLayout, data: &[u8]) -> PixelView<'_> {
        PixelView { width: w, height: h, row_pitch: w as usize * 4, layout, data }
    }

    #[test]
    fn full_alpha_draw_is_byte_exact() {
        let src = solid_frame(2, 2, [10, 200, 33, 255]);
        let mut canvas = Canvas::new(2, 2);
        canvas.draw(view(2, 2, PixelLayout::Rgba, &src), Rect::new(0.0, 0.0, 2.0, 2.0), 255);
        assert_eq!(canvas.data(), &src[..]);
    }

    #[test]
    fn zero_alpha_draw_is_noop() {
        let src = solid_frame(2, 2, [10, 200, 33, 255]);
        let mut canvas = Canvas::new(2, 2);
        let before = canvas.data().to_vec();
        canvas.draw(view(2, 2, PixelLayout::Rgba, &src), Rect::new(0.0, 0.0, 2.0, 2.0), 0);
        assert_eq!(canvas.data(), &before[..]);
    }

    #[test]
    fn bgra_source_is_swizzled() {
        let src = solid_frame(1, 1, [1, 2, 3, 255]); // B=1 G=2 R=3 when read as BGRA
        let mut canvas = Canvas::new(1, 1);
        canvas.draw(view(1, 1, PixelLayout::Bgra, &src), Rect::new(0.0, 0.0, 1.0, 1.0), 255);
        assert_eq!(&canvas.data()[..4], &[3, 2, 1, 255]);
    }

    #[test]
    fn row_pitch_padding_is_skipped() {
        // 1×2 image with 8-byte rows: pixel then 4 bytes of padding garbage.
        let data = [9, 9, 9, 255, 77, 77, 77, 77, 5, 5, 5, 255, 77, 77, 77, 77];
        let v = PixelView {
            width: 1, height: 2, row_pitch: 8, layout: PixelLayout::Rgba, data: &data,
        };
        let mut canvas = Canvas::new(1, 2);
        canvas.draw(v, Rect::new(0.0, 0.0, 1.0, 2.0), 255);
        assert_eq!(&canvas.data()[..4], &[9, 9, 9, 255]);
        assert_eq!(&canvas.data()[4..8], &[5, 5, 5, 255]);
    }

    #[test]
    fn scaled_draw_fills_dest_rect_only() {
        let src = solid_frame(2, 2, [255, 0, 0, 255]);
        let mut canvas = Canvas::new(4, 4);
        canvas.draw(view(2, 2, PixelLayout::Rgba, &src), Rect::new(2.0, 2.0, 2.0, 2.0), 255);
        // top-left untouched, bottom-right painted
        assert_eq!(&canvas.data()[..4], &[0, 0, 0, 255]);
        let o = (3 * 4 + 3) * 4;
        assert_eq!(&canvas.data()[o..o + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn offscreen_dest_is_clipped() {
        let src = solid_frame(2, 2, [255, 255, 255, 255]);
        let mut canvas = Canvas::new(2, 2);
        // dest entirely off-canvas: must not panic, must not paint
        canvas.draw(view(2, 2, PixelLayout::Rgba, &src), Rect::new(-10.0, -10.0, 5.0, 5.0), 255);
        assert_eq!(&canvas.data()[..4], &[0, 0, 0, 255]);
        // dest straddling the top-left corner paints only the overlap
        canvas.draw(view(2, 2, PixelLayout::Rgba, &src), Rect::new(-1.0, -1.0, 2.0, 2.0), 255);
        assert_eq!(&canvas.data()[..4], &[255, 255, 255, 255]);
        let bottom_right = (1 * 2 + 1) * 4;
        assert_eq!(&canvas.data()[bottom_right..bottom_right + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn midpoint_blend_is_average() {
        let src = solid_frame(1, 1, [200, 100, 0, 255]);
        let mut canvas = Canvas::new(1, 1);
        canvas.draw(view(1, 1, PixelLayout::Rgba, &src), Rect::new(0.0, 0.0, 1.0, 1.0), 255);
        let over = solid_frame(1, 1, [0, 0, 0, 255]);
        canvas.draw(view(1, 1, PixelLayout::Rgba, &over), Rect::new(0.0, 0.0, 1.0, 1.0), 128);
        let px = &canvas.data()[..4];
        assert!((px[0] as i16 - 100).abs() <= 1);
        assert!((px[1] as i16 - 50).abs() <= 1);
    }
}
