// crates/framestack-core/src/lib.rs
//
// Pure data and pure pixel algorithms — no ffmpeg, no I/O.
// framestack-media consumes these to drive the actual render.

pub mod canvas;
pub mod geometry;
pub mod mix;
pub mod project;
pub mod track;
pub mod transitions;

pub use canvas::{Canvas, PixelLayout, PixelView};
pub use geometry::Rect;
pub use project::{MediaResource, Project};
pub use track::{AudioTrack, AudioTrackItem, VideoTrack, VideoTrackItem};
