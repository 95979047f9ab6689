// crates/framestack-media/src/lib.rs
//! Decoding and rendering on top of ffmpeg. `MediaSource` wraps one demuxer
//! with sequential-read-biased seeking, `render_timeline` composites a
//! `Project` into an H.264/AAC file.

pub mod cursor;
pub mod pool;
pub mod render;
pub mod source;

pub use render::{render_timeline, RenderProgress, RenderSpec, RenderStats};
pub use source::{AudioBlock, MediaSource, SourceError, VideoPicture};
