// crates/framestack-media/src/source.rs
//
// MediaSource: stateful per-resource decoder that maps arbitrary requested
// times to normalized decoded units.
//
// Both lookups share one demuxer read position and one cached unit per
// stream. The decode loop drains the video and audio decoders together and
// feeds them one packet at a time, so the two caches stay warm around the
// same point in the file. Seeking is governed by DecodeCursor: sequential
// reads never reseek, and backward or far-forward requests cost exactly one
// keyframe seek plus a decoder flush.
//
// Normalized output:
//   Video — RGBA or BGRA rows copied verbatim into a pooled buffer (the two
//   fast paths); any other pixel format is converted to RGBA through a
//   cached swscale context and a reused intermediate frame.
//   Audio — stereo f32 pairs. Packed and planar float/16-bit/32-bit sources
//   are accepted; integer samples are scaled by their type's max value,
//   mono duplicates channel 0, extra channels beyond the first two are
//   dropped.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use thiserror::Error;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;

use framestack_core::{PixelLayout, PixelView};

use crate::cursor::DecodeCursor;
use crate::pool::SlabPool;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Misuse of a source that lacks the requested stream kind. Callers are
/// expected to check `has_video()` / `has_audio()` first.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no video stream in '{0}'")]
    NoVideoStream(PathBuf),
    #[error("no audio stream in '{0}'")]
    NoAudioStream(PathBuf),
}

// ── Cached units ──────────────────────────────────────────────────────────────

/// One decoded, normalized video frame. `data` is a pooled buffer owned by
/// the source; it is recycled when the next frame supersedes this one, so
/// callers needing the pixels past the next decode must clone.
#[derive(Clone, Debug)]
pub struct VideoPicture {
    pub pts:       f64,
    pub width:     u32,
    pub height:    u32,
    pub row_pitch: usize,
    pub layout:    PixelLayout,
    pub data:      Vec<u8>,
}

impl VideoPicture {
    pub fn as_view(&self) -> PixelView<'_> {
        PixelView {
            width:     self.width,
            height:    self.height,
            row_pitch: self.row_pitch,
            layout:    self.layout,
            data:      &self.data,
        }
    }
}

/// One decoded audio frame as stereo f32 pairs. Covers the half-open time
/// range `[pts, pts + duration)`.
#[derive(Clone, Debug)]
pub struct AudioBlock {
    pub pts:      f64,
    pub duration: f64,
    pub samples:  Vec<(f32, f32)>,
}

impl AudioBlock {
    /// Sample index for time `t`, if this block covers it.
    fn index_of(&self, t: f64, sample_rate: u32) -> Option<usize> {
        if t < self.pts {
            return None;
        }
        let idx = ((t - self.pts) * sample_rate as f64).round() as usize;
        (idx < self.samples.len()).then_some(idx)
    }
}

// ── Stream state ──────────────────────────────────────────────────────────────

struct VideoStream {
    index:     usize,
    time_base: Rational,
    decoder:   ffmpeg::decoder::video::Video,
}

struct AudioStream {
    index:       usize,
    time_base:   Rational,
    sample_rate: u32,
    decoder:     ffmpeg::decoder::audio::Audio,
}

struct CachedScaler {
    src_format: Pixel,
    src_w:      u32,
    src_h:      u32,
    ctx:        ScaleCtx,
}

#[derive(Clone, Copy, PartialEq)]
enum Want {
    Video,
    Audio,
}

// ── MediaSource ───────────────────────────────────────────────────────────────

pub struct MediaSource {
    path:        PathBuf,
    ictx:        ffmpeg::format::context::Input,
    video:       Option<VideoStream>,
    audio:       Option<AudioStream>,
    duration:    f64,
    cursor:      DecodeCursor,
    byte_pool:   SlabPool<u8>,
    sample_pool: SlabPool<(f32, f32)>,
    cur_video:   Option<VideoPicture>,
    cur_audio:   Option<AudioBlock>,
    scaler:      Option<CachedScaler>,
    /// Reused target frame for non-fast-path pixel conversion.
    converted:   VideoFrame,
    warned_sample_format: bool,
}

impl MediaSource {
    /// Open `path` and build decoders for its best video and audio streams.
    /// A file with neither stream kind is an error; a missing audio decoder
    /// soft-fails to "no audio" so a corrupt audio track cannot sink the
    /// whole render.
    pub fn open(path: impl Into<PathBuf>, seek_threshold: f64) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let path = path.into();
        let ictx = input(&path).with_context(|| format!("open '{}'", path.display()))?;

        let mut video = None;
        if let Some(stream) = ictx.streams().best(MediaType::Video) {
            let dec_ctx = codec::context::Context::from_parameters(stream.parameters())
                .with_context(|| format!("video decoder params for '{}'", path.display()))?;
            let decoder = dec_ctx
                .decoder()
                .video()
                .with_context(|| format!("open video decoder for '{}'", path.display()))?;
            video = Some(VideoStream {
                index:     stream.index(),
                time_base: stream.time_base(),
                decoder,
            });
        }

        let mut audio = None;
        if let Some(stream) = ictx.streams().best(MediaType::Audio) {
            match codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().audio())
            {
                Ok(decoder) => {
                    audio = Some(AudioStream {
                        index:       stream.index(),
                        time_base:   stream.time_base(),
                        sample_rate: decoder.rate(),
                        decoder,
                    });
                }
                Err(e) => {
                    log::warn!("audio decoder open failed for '{}': {e}", path.display());
                }
            }
        }

        if video.is_none() && audio.is_none() {
            anyhow::bail!("'{}' has no decodable streams", path.display());
        }

        // Container duration, falling back to the longest stream when the
        // container does not carry one.
        let mut duration = ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
        if duration <= 0.0 {
            for stream in ictx.streams() {
                let d = stream.duration() as f64 * f64::from(stream.time_base());
                if d > duration {
                    duration = d;
                }
            }
        }

        Ok(Self {
            path,
            ictx,
            video,
            audio,
            duration,
            cursor: DecodeCursor::new(seek_threshold),
            byte_pool: SlabPool::new(),
            sample_pool: SlabPool::new(),
            cur_video: None,
            cur_audio: None,
            scaler: None,
            converted: VideoFrame::empty(),
            warned_sample_format: false,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Total keyframe seeks issued so far. Sequential rendering of one clip
    /// should leave this at 1.
    pub fn seeks_issued(&self) -> u64 {
        self.cursor.seeks_issued()
    }

    /// Decoded frame at or nearest after `t` (seconds into the resource).
    /// Past the end of the stream the last decoded frame holds; past the
    /// container duration the answer is `None`.
    pub fn video_frame(&mut self, t: f64) -> Result<Option<&VideoPicture>> {
        if self.video.is_none() {
            return Err(SourceError::NoVideoStream(self.path.clone()).into());
        }
        if t > self.duration {
            return Ok(None);
        }
        let hit = self.cur_video.as_ref().is_some_and(|p| p.pts == t);
        if !hit {
            self.decode_toward(t, Want::Video)?;
        }
        Ok(self.cur_video.as_ref())
    }

    /// Stereo sample at `t`, or `None` when `t` falls past the duration or
    /// into a gap the decoder cannot produce samples for.
    pub fn audio_sample(&mut self, t: f64) -> Result<Option<(f32, f32)>> {
        let sample_rate = match &self.audio {
            Some(s) => s.sample_rate,
            None => return Err(SourceError::NoAudioStream(self.path.clone()).into()),
        };
        if t > self.duration {
            return Ok(None);
        }
        if let Some(block) = &self.cur_audio {
            if let Some(i) = block.index_of(t, sample_rate) {
                return Ok(Some(block.samples[i]));
            }
        }
        self.decode_toward(t, Want::Audio)?;
        Ok(self
            .cur_audio
            .as_ref()
            .and_then(|b| b.index_of(t, sample_rate).map(|i| b.samples[i])))
    }

    // ── Decode loop ───────────────────────────────────────────────────────────

    /// Drive the demuxer/decoders until the `want` stream's cached unit
    /// covers `t` or the file is exhausted.
    fn decode_toward(&mut self, t: f64, want: Want) -> Result<()> {
        if self.cursor.needs_seek(t) {
            self.seek(t);
        }

        let mut flushing = false;
        loop {
            // Drain whatever the video decoder has ready.
            loop {
                let got = match &mut self.video {
                    Some(vs) => {
                        let mut frame = VideoFrame::empty();
                        if vs.decoder.receive_frame(&mut frame).is_ok() {
                            let ts = frame.timestamp().or_else(|| frame.pts()).unwrap_or(0);
                            Some((frame, ts as f64 * f64::from(vs.time_base)))
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let Some((frame, pts)) = got else { break };
                self.store_video(&frame, pts)?;
                self.cursor.advance(pts);
                if want == Want::Video && pts >= t {
                    return Ok(());
                }
            }

            // Same for audio.
            loop {
                let got = match &mut self.audio {
                    Some(aus) => {
                        let mut frame = AudioFrame::empty();
                        if aus.decoder.receive_frame(&mut frame).is_ok() {
                            let ts = frame.timestamp().or_else(|| frame.pts()).unwrap_or(0);
                            Some((frame, ts as f64 * f64::from(aus.time_base)))
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let Some((frame, pts)) = got else { break };
                self.store_audio(&frame, pts);
                self.cursor.advance(pts);
                if want == Want::Audio {
                    let covered = self
                        .cur_audio
                        .as_ref()
                        .is_some_and(|b| b.index_of(t, self.sample_rate()).is_some());
                    // Overshooting past `t` means the stream has a gap there;
                    // give up rather than decode to the end of the file.
                    if covered || pts > t {
                        return Ok(());
                    }
                }
            }

            // Both decoders starved: feed one packet, routed by stream index.
            let next = {
                let mut packets = self.ictx.packets();
                loop {
                    match packets.next() {
                        Some(Ok((stream, packet))) => break Some((stream.index(), packet)),
                        Some(Err(_)) => continue,
                        None => break None,
                    }
                }
            };

            match next {
                Some((idx, packet)) => {
                    if let Some(vs) = &mut self.video {
                        if idx == vs.index {
                            let _ = vs.decoder.send_packet(&packet);
                            continue;
                        }
                    }
                    if let Some(aus) = &mut self.audio {
                        if idx == aus.index {
                            let _ = aus.decoder.send_packet(&packet);
                        }
                    }
                }
                None if !flushing => {
                    // Out of packets: flush decoder-held frames (B-frame
                    // reordering), then one more drain pass.
                    flushing = true;
                    if let Some(vs) = &mut self.video {
                        let _ = vs.decoder.send_eof();
                    }
                    if let Some(aus) = &mut self.audio {
                        let _ = aus.decoder.send_eof();
                    }
                }
                None => {
                    self.cursor.mark_eof();
                    return Ok(());
                }
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.audio.as_ref().map_or(0, |a| a.sample_rate)
    }

    /// Keyframe seek with decoder flush. Failure is soft: the forward scan
    /// still reaches the target, just from the current read position.
    fn seek(&mut self, t: f64) {
        let target = t.max(0.0);
        let ts = (target * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
        if let Err(e) = self.ictx.seek(ts, ..=ts) {
            log::warn!("seek to {target:.3}s failed in '{}': {e}", self.path.display());
        }
        if let Some(vs) = &mut self.video {
            vs.decoder.flush();
        }
        if let Some(aus) = &mut self.audio {
            aus.decoder.flush();
        }
        self.cursor.record_seek(target);
    }

    // ── Video normalization ───────────────────────────────────────────────────

    fn store_video(&mut self, decoded: &VideoFrame, pts: f64) -> Result<()> {
        match decoded.format() {
            Pixel::RGBA => self.cache_picture(decoded, pts, PixelLayout::Rgba),
            Pixel::BGRA => self.cache_picture(decoded, pts, PixelLayout::Bgra),
            _ => {
                let mut out = std::mem::replace(&mut self.converted, VideoFrame::empty());
                self.convert_rgba(decoded, &mut out)?;
                self.cache_picture(&out, pts, PixelLayout::Rgba);
                self.converted = out;
            }
        }
        Ok(())
    }

    /// Convert `decoded` to RGBA through the cached swscale context,
    /// rebuilding it when the source geometry or format changes.
    fn convert_rgba(&mut self, decoded: &VideoFrame, out: &mut VideoFrame) -> Result<()> {
        let stale = self.scaler.as_ref().map_or(true, |s| {
            s.src_format != decoded.format()
                || s.src_w != decoded.width()
                || s.src_h != decoded.height()
        });
        if stale {
            self.scaler = Some(CachedScaler {
                src_format: decoded.format(),
                src_w:      decoded.width(),
                src_h:      decoded.height(),
                ctx:        ScaleCtx::get(
                    decoded.format(),
                    decoded.width(),
                    decoded.height(),
                    Pixel::RGBA,
                    decoded.width(),
                    decoded.height(),
                    ScaleFlags::BILINEAR,
                )
                .context("create RGBA converter")?,
            });
        }
        if let Some(cs) = &mut self.scaler {
            cs.ctx.run(decoded, out).context("convert frame to RGBA")?;
        }
        Ok(())
    }

    /// Copy the frame's rows into a pooled buffer and supersede the cached
    /// picture, recycling the old buffer.
    fn cache_picture(&mut self, frame: &VideoFrame, pts: f64, layout: PixelLayout) {
        let height = frame.height() as usize;
        let row_pitch = frame.stride(0);
        let src = frame.data(0);

        let mut data = self.byte_pool.acquire(row_pitch * height);
        let n = src.len().min(data.len());
        data[..n].copy_from_slice(&src[..n]);

        if let Some(old) = self.cur_video.take() {
            self.byte_pool.release(old.data);
        }
        self.cur_video = Some(VideoPicture {
            pts,
            width: frame.width(),
            height: frame.height(),
            row_pitch,
            layout,
            data,
        });
    }

    // ── Audio normalization ───────────────────────────────────────────────────

    fn store_audio(&mut self, frame: &AudioFrame, pts: f64) {
        let sample_rate = self.sample_rate().max(1);
        let n = frame.samples();
        let mut samples = self.sample_pool.acquire(n);

        if !fill_stereo(frame, &mut samples) && !self.warned_sample_format {
            self.warned_sample_format = true;
            log::warn!(
                "unsupported sample format {:?} in '{}', emitting silence",
                frame.format(),
                self.path.display()
            );
        }

        if let Some(old) = self.cur_audio.take() {
            self.sample_pool.release(old.samples);
        }
        self.cur_audio = Some(AudioBlock {
            pts,
            duration: n as f64 / sample_rate as f64,
            samples,
        });
    }
}

/// Normalize one decoded audio frame into stereo f32 pairs. Returns false
/// (leaving `out` silent) for sample formats outside the supported set.
fn fill_stereo(frame: &AudioFrame, out: &mut [(f32, f32)]) -> bool {
    let n = out.len();
    let channels = frame.ch_layout().channels() as usize;
    if n == 0 || channels == 0 {
        return true;
    }

    // Planes hold raw bytes; reinterpret per the declared sample format.
    // Plane/packed lengths are n*channels samples for packed data and n per
    // plane for planar data, as filled by the decoder.
    unsafe fn plane<T>(frame: &AudioFrame, idx: usize, len: usize) -> &[T] {
        std::slice::from_raw_parts(frame.data(idx).as_ptr() as *const T, len)
    }

    unsafe {
        match frame.format() {
            Sample::F32(SampleType::Packed) => {
                interleaved_pairs(plane::<f32>(frame, 0, n * channels), channels, out, |v| v);
            }
            Sample::F32(SampleType::Planar) => {
                let left = plane::<f32>(frame, 0, n);
                let right = if channels >= 2 { plane::<f32>(frame, 1, n) } else { left };
                planar_pairs(left, right, out, |v| v);
            }
            Sample::I16(SampleType::Packed) => {
                interleaved_pairs(plane::<i16>(frame, 0, n * channels), channels, out, scale_i16);
            }
            Sample::I16(SampleType::Planar) => {
                let left = plane::<i16>(frame, 0, n);
                let right = if channels >= 2 { plane::<i16>(frame, 1, n) } else { left };
                planar_pairs(left, right, out, scale_i16);
            }
            Sample::I32(SampleType::Packed) => {
                interleaved_pairs(plane::<i32>(frame, 0, n * channels), channels, out, scale_i32);
            }
            Sample::I32(SampleType::Planar) => {
                let left = plane::<i32>(frame, 0, n);
                let right = if channels >= 2 { plane::<i32>(frame, 1, n) } else { left };
                planar_pairs(left, right, out, scale_i32);
            }
            _ => return false,
        }
    }
    true
}

fn scale_i16(v: i16) -> f32 {
    v as f32 / i16::MAX as f32
}

fn scale_i32(v: i32) -> f32 {
    v as f32 / i32::MAX as f32
}

/// Interleaved frames: channel 0 is left, channel 1 is right; mono
/// duplicates channel 0, channels past the second are dropped.
fn interleaved_pairs<T: Copy>(
    data: &[T],
    channels: usize,
    out: &mut [(f32, f32)],
    scale: impl Fn(T) -> f32,
) {
    for (i, slot) in out.iter_mut().enumerate() {
        let base = i * channels;
        let l = scale(data[base]);
        let r = if channels >= 2 { scale(data[base + 1]) } else { l };
        *slot = (l, r);
    }
}

fn planar_pairs<T: Copy>(left: &[T], right: &[T], out: &mut [(f32, f32)], scale: impl Fn(T) -> f32) {
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = (scale(left[i]), scale(right[i]));
    }
}
