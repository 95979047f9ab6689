// crates/framestack-core/src/mix.rs
//
// Audio crossfade math used by the compositor's mixing pass.
//
// The two-clip formula is symmetric per channel. An earlier revision of
// this pipeline fed clip 2's right channel into both terms of the right
// blend; that routing was a bug, not a design — the formula below is the
// intended one.

/// Linear two-clip crossfade at `rate` ∈ [0, 1].
///
/// `rate = 0` → 100 % clip 1, `rate = 1` → 100 % clip 2, per channel:
/// `left = l1*(1-r) + l2*r`, `right = r1*(1-r) + r2*r`.
#[inline]
pub fn crossfade_sample(s1: (f32, f32), s2: (f32, f32), rate: f32) -> (f32, f32) {
    let inv = 1.0 - rate;
    (s1.0 * inv + s2.0 * rate, s1.1 * inv + s2.1 * rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_pass_through_each_clip() {
        let a = (0.25, -0.5);
        let b = (-1.0, 1.0);
        assert_eq!(crossfade_sample(a, b, 0.0), a);
        assert_eq!(crossfade_sample(a, b, 1.0), b);
    }

    #[test]
    fn midpoint_is_arithmetic_mean_per_channel() {
        let a = (0.8, -0.2);
        let b = (0.2, 0.6);
        let (l, r) = crossfade_sample(a, b, 0.5);
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.2).abs() < 1e-6);
    }

    #[test]
    fn channels_never_cross() {
        // Distinct per-channel values expose any left/right routing mixup.
        let a = (1.0, 0.0);
        let b = (0.0, 0.0);
        let (l, r) = crossfade_sample(a, b, 0.25);
        assert!((l - 0.75).abs() < 1e-6);
        assert_eq!(r, 0.0);
    }
}
