// crates/framestack-core/src/track.rs
//
// Timeline model: tracks and the clips placed on them. Pure interval
// arithmetic — nothing here touches media or pixels.
//
// Video and audio items are a closed pair of structs rather than an open
// trait hierarchy: the compositor needs exhaustive handling, not extension.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::transitions::TransitionKind;

// ── Shared clip interval math ─────────────────────────────────────────────────

macro_rules! impl_clip_interval {
    ($ty:ty) => {
        impl $ty {
            /// Length of the trim window inside the resource, in seconds.
            pub fn duration(&self) -> f64 {
                debug_assert!(self.end_time >= self.start_time);
                debug_assert!(self.offset >= 0.0);
                self.end_time - self.start_time
            }

            /// Global timeline instant at which this clip ends.
            pub fn absolute_end_time(&self) -> f64 {
                self.offset + self.duration()
            }

            /// True iff `offset <= t <= absolute_end_time` (both inclusive).
            pub fn is_time_in_range(&self, t: f64) -> bool {
                t >= self.offset && t <= self.absolute_end_time()
            }

            /// Map a global timeline instant to resource-relative time.
            pub fn source_time(&self, t: f64) -> f64 {
                t - self.offset + self.start_time
            }
        }
    };
}

// ── Track items ───────────────────────────────────────────────────────────────

/// A placed, time-trimmed reference to a media resource on a video track.
///
/// `offset` is the placement on the global timeline; `start_time`/`end_time`
/// are the trim window inside the resource. All values in seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoTrackItem {
    pub resource_id: String,
    pub offset:      f64,
    pub start_time:  f64,
    pub end_time:    f64,
    /// Destination rect on the output canvas. All-zero = fill the canvas.
    #[serde(default)]
    pub dest:        Rect,
    /// Drop this clip's audio from the mix.
    #[serde(default)]
    pub mute_audio:  bool,
    /// Blend applied when this clip overlaps the next one on the same track.
    #[serde(default)]
    pub transition:  TransitionKind,
}

impl VideoTrackItem {
    /// Resolve the destination rect, expanding the zero sentinel to the
    /// full output canvas.
    pub fn layout_rect(&self, output_width: u32, output_height: u32) -> Rect {
        if self.dest.is_zero() {
            Rect::new(0.0, 0.0, output_width as f32, output_height as f32)
        } else {
            self.dest
        }
    }
}

/// A placed, time-trimmed reference to a media resource on an audio track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioTrackItem {
    pub resource_id: String,
    pub offset:      f64,
    pub start_time:  f64,
    pub end_time:    f64,
}

impl_clip_interval!(VideoTrackItem);
impl_clip_interval!(AudioTrackItem);

// ── Tracks ────────────────────────────────────────────────────────────────────

/// Ordered lane of video clips. Track order in the project defines draw
/// order: the first declared track is topmost, so the compositor walks the
/// list in reverse.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoTrack {
    pub items: Vec<VideoTrackItem>,
    /// Drop this entire track's audio from the mix.
    #[serde(default)]
    pub mute_audio: bool,
}

/// Ordered lane of audio clips.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AudioTrack {
    pub items: Vec<AudioTrackItem>,
}

// ── Intersection rate ─────────────────────────────────────────────────────────

/// Normalized position of `t` inside the overlap window of two clips.
///
/// Returns `(window_duration, rate)` where `rate` ramps linearly from 0 at
/// the start of the overlap to 1 at its end, or `None` when the clips do not
/// properly overlap: the later clip starts after the earlier one ends, the
/// later clip does not extend past the earlier one, or the overlap window is
/// empty. Argument order does not matter: the clip that starts earlier is
/// the outgoing one, and when both start together the shorter clip fades
/// out into the longer.
pub fn intersection_rate(
    a: (f64, f64), // (offset, absolute_end_time)
    b: (f64, f64),
    t: f64,
) -> Option<(f64, f64)> {
    let (first, second) = if a.0 < b.0 || (a.0 == b.0 && a.1 <= b.1) {
        (a, b)
    } else {
        (b, a)
    };

    if second.0 > first.1 {
        return None; // gap between the clips
    }
    if first.1 > second.1 {
        return None; // second clip ends inside the first — not a forward overlap
    }

    let window = first.1 - second.0;
    if window <= 0.0 {
        return None; // touching, not overlapping
    }

    let rate = ((t - second.0) / window).clamp(0.0, 1.0);
    Some((window, rate))
}

/// `intersection_rate` over the interval of two video items.
pub fn video_intersection_rate(
    a: &VideoTrackItem,
    b: &VideoTrackItem,
    t: f64,
) -> Option<(f64, f64)> {
    intersection_rate(
        (a.offset, a.absolute_end_time()),
        (b.offset, b.absolute_end_time()),
        t,
    )
}

/// `intersection_rate` over the interval of two audio items.
pub fn audio_intersection_rate(
    a: &AudioTrackItem,
    b: &AudioTrackItem,
    t: f64,
) -> Option<(f64, f64)> {
    intersection_rate(
        (a.offset, a.absolute_end_time()),
        (b.offset, b.absolute_end_time()),
        t,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitem(offset: f64, start: f64, end: f64) -> VideoTrackItem {
        VideoTrackItem {
            resource_id: "res".into(),
            offset,
            start_time: start,
            end_time: end,
            dest: Rect::default(),
            mute_audio: false,
            transition: TransitionKind::Cut,
        }
    }

    #[test]
    fn derived_interval_properties() {
        let it = vitem(2.0, 1.0, 5.5);
        assert_eq!(it.duration(), 4.5);
        assert_eq!(it.absolute_end_time(), 6.5);
    }

    #[test]
    fn time_in_range_is_inclusive_both_ends() {
        let it = vitem(2.0, 0.0, 3.0); // [2.0, 5.0]
        assert!(it.is_time_in_range(2.0));
        assert!(it.is_time_in_range(5.0));
        assert!(it.is_time_in_range(3.3));
        assert!(!it.is_time_in_range(1.999));
        assert!(!it.is_time_in_range(5.001));
    }

    #[test]
    fn source_time_maps_through_trim_window() {
        let it = vitem(10.0, 3.0, 8.0);
        assert_eq!(it.source_time(10.0), 3.0);
        assert_eq!(it.source_time(12.0), 5.0);
    }

    #[test]
    fn layout_rect_expands_zero_sentinel() {
        let it = vitem(0.0, 0.0, 1.0);
        assert_eq!(it.layout_rect(800, 600), Rect::new(0.0, 0.0, 800.0, 600.0));

        let mut placed = vitem(0.0, 0.0, 1.0);
        placed.dest = Rect::new(10.0, 10.0, 320.0, 240.0);
        assert_eq!(placed.layout_rect(800, 600), placed.dest);
    }

    #[test]
    fn intersection_rate_linear_ramp() {
        // a covers [0, 4], b covers [3, 8] → window [3, 4]
        let a = (0.0, 4.0);
        let b = (3.0, 8.0);
        let (window, r0) = intersection_rate(a, b, 3.0).unwrap();
        assert_eq!(window, 1.0);
        assert_eq!(r0, 0.0);
        let (_, rm) = intersection_rate(a, b, 3.5).unwrap();
        assert!((rm - 0.5).abs() < 1e-9);
        let (_, r1) = intersection_rate(a, b, 4.0).unwrap();
        assert_eq!(r1, 1.0);
    }

    #[test]
    fn intersection_rate_is_order_independent() {
        let a = (0.0, 4.0);
        let b = (3.0, 8.0);
        assert_eq!(intersection_rate(a, b, 3.25), intersection_rate(b, a, 3.25));

        // equal offsets: the shorter clip is the outgoing one either way
        let c = (0.0, 8.0);
        assert_eq!(intersection_rate(a, c, 2.0), Some((4.0, 0.5)));
        assert_eq!(intersection_rate(c, a, 2.0), Some((4.0, 0.5)));
    }

    #[test]
    fn no_intersection_for_disjoint_or_contained() {
        // gap
        assert!(intersection_rate((0.0, 2.0), (3.0, 5.0), 2.5).is_none());
        // b fully inside a — not a forward overlap
        assert!(intersection_rate((0.0, 10.0), (2.0, 5.0), 3.0).is_none());
        // touching exactly
        assert!(intersection_rate((0.0, 3.0), (3.0, 6.0), 3.0).is_none());
    }
}
