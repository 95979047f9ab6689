// crates/framestack-media/src/render.rs
//
// Timeline render: composite a Project into one H.264 + AAC MP4.
//
// Stream layout in the output:
//   Stream 0 — H.264 video (YUV420P, CRF 18, preset fast)
//   Stream 1 — AAC audio  (FLTP stereo, 44100 Hz, 128 kbps)
//
// Two passes over the timeline, audio first, then video. Each pass walks
// output ticks (sample slots / frame slots), resolves the active clips per
// track, and feeds the mixed/composited result to its encoder. PTS values
// are bare tick counters: sample index in 1/sample_rate for audio, frame
// index in 1/fps for video. Packets are written non-interleaved; the muxer
// tolerates the pass ordering because each stream's timestamps are
// monotonic.
//
// Per-tick clip resolution (same rule for audio mixing and video drawing):
//   0 active items — the track contributes nothing this tick.
//   1 active item  — drawn/mixed directly at its clip-relative time.
//   2+ active items — the first two (declaration order) crossfade, driven
//   by their intersection rate; items past the second are ignored. A video
//   pair without a registered transition falls back to a hard cut showing
//   the incoming clip.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use crossbeam_channel::Sender;
use uuid::Uuid;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::{output as open_output, Pixel, Sample};
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use framestack_core::mix::crossfade_sample;
use framestack_core::track::{intersection_rate, video_intersection_rate};
use framestack_core::transitions::{registry, TransitionKind, VideoTransition};
use framestack_core::{AudioTrackItem, Canvas, Project, VideoTrackItem};

use crate::cursor::DEFAULT_SEEK_THRESHOLD;
use crate::source::MediaSource;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Send a progress update every this many encoded video frames.
const PROGRESS_INTERVAL: u64 = 15;

// ── Public types ──────────────────────────────────────────────────────────────

/// Complete description of one render job.
pub struct RenderSpec {
    /// Identifier echoed in every progress event.
    pub job_id:           Uuid,
    pub project:          Project,
    /// Output frame rate (integer; fractional rates not needed here).
    pub fps:              u32,
    pub sample_rate:      u32,
    /// Samples per encoded audio frame. The encoder's own frame size wins
    /// when it reports a larger one.
    pub audio_frame_size: usize,
    /// Forward decode window before a source prefers a seek, in seconds.
    pub seek_threshold:   f64,
    /// Destination file, including extension (`.mp4`).
    pub output:           PathBuf,
    /// Transitions available to video clip pairs, keyed by selector.
    pub transitions:      HashMap<TransitionKind, Box<dyn VideoTransition>>,
}

impl RenderSpec {
    pub fn new(project: Project, output: impl Into<PathBuf>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            project,
            fps: 30,
            sample_rate: 44_100,
            audio_frame_size: 1024,
            seek_threshold: DEFAULT_SEEK_THRESHOLD,
            output: output.into(),
            transitions: registry(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderProgress {
    pub job_id:       Uuid,
    pub frames_done:  u64,
    pub total_frames: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Keyframe seeks issued across all sources. Sequential timelines keep
    /// this near one per source per pass.
    pub seeks_issued: u64,
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Render `spec` to disk. Blocking — run on a dedicated thread when driving
/// it from an interactive caller. Progress events are best-effort; a full
/// or disconnected channel never fails the render.
pub fn render_timeline(
    spec:     &RenderSpec,
    progress: Option<&Sender<RenderProgress>>,
) -> Result<RenderStats> {
    ffmpeg::init().context("initialize ffmpeg")?;

    let project = &spec.project;
    let has_items = project.video_tracks.iter().any(|t| !t.items.is_empty())
        || project.audio_tracks.iter().any(|t| !t.items.is_empty());
    if !has_items {
        anyhow::bail!("nothing to render: timeline is empty");
    }

    // ── Open every resource once for the render's duration ───────────────────
    let mut sources: HashMap<String, MediaSource> = HashMap::new();
    for res in &project.resources {
        let source = MediaSource::open(res.path.clone(), spec.seek_threshold)
            .with_context(|| format!("resource '{}'", res.id))?;
        sources.insert(res.id.clone(), source);
    }
    warn_unknown_resources(project, &sources);

    let timeline_end = project
        .video_tracks
        .iter()
        .flat_map(|t| &t.items)
        .map(|i| i.absolute_end_time())
        .fold(0.0, f64::max);
    let total_frames = ((timeline_end * spec.fps as f64).ceil() as u64).max(1);

    // ── Output context ────────────────────────────────────────────────────────
    let mut octx = open_output(&spec.output)
        .with_context(|| format!("open output '{}'", spec.output.display()))?;

    // ── Video encoder (stream 0) ──────────────────────────────────────────────
    // The codec context is created independently of the output stream —
    // Stream does not expose a codec accessor in this version of
    // ffmpeg-the-third.
    let frame_tb = Rational::new(1, spec.fps as i32);

    let h264 = encoder::find(CodecId::H264)
        .context("H.264 encoder not found — is libx264 available?")?;

    let mut ost_video = octx.add_stream(h264).context("add video stream")?;
    ost_video.set_time_base(frame_tb);

    let video_enc_ctx = codec::context::Context::new_with_codec(h264);
    let mut video_enc = video_enc_ctx
        .encoder()
        .video()
        .context("create video encoder context")?;

    video_enc.set_width(project.output_width);
    video_enc.set_height(project.output_height);
    video_enc.set_format(Pixel::YUV420P);
    video_enc.set_time_base(frame_tb);
    video_enc.set_frame_rate(Some(Rational::new(spec.fps as i32, 1)));
    video_enc.set_bit_rate(0); // CRF controls quality; bit_rate 0 signals VBR

    let mut opts = ffmpeg::Dictionary::new();
    opts.set("crf", "18");
    opts.set("preset", "fast");

    let mut video_encoder = video_enc
        .open_as_with(h264, opts)
        .context("open H.264 encoder")?;

    // Square pixels. Must be set on the opened context — libavcodec resets
    // sample_aspect_ratio during codec initialisation, and
    // avcodec_parameters_from_context reads from the post-open context.
    video_encoder.set_aspect_ratio(Rational::new(1, 1));

    // Copy encoder params into the stream's codecpar so the muxer has
    // resolution, format, and codec-private data. set_parameters() requires
    // AsPtr<AVCodecParameters>, which encoder::Video does not implement, so
    // go through FFI directly.
    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(0)).codecpar,
            video_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        anyhow::ensure!(ret >= 0, "avcodec_parameters_from_context (video): {ret}");
    }

    // ── Audio encoder (stream 1) ──────────────────────────────────────────────
    let audio_tb = Rational::new(1, spec.sample_rate as i32);

    let aac = encoder::find(CodecId::AAC).context("AAC encoder not found")?;

    let mut ost_audio = octx.add_stream(aac).context("add audio stream")?;
    ost_audio.set_time_base(audio_tb);

    let audio_enc_ctx = codec::context::Context::new_with_codec(aac);
    let mut audio_enc = audio_enc_ctx
        .encoder()
        .audio()
        .context("create audio encoder context")?;

    audio_enc.set_rate(spec.sample_rate as i32);
    audio_enc.set_ch_layout(ChannelLayout::STEREO);
    audio_enc.set_format(Sample::F32(SampleType::Planar));
    audio_enc.set_bit_rate(128_000);

    let mut audio_encoder = audio_enc
        .open_as_with(aac, ffmpeg::Dictionary::new())
        .context("open AAC encoder")?;

    let audio_frame_size = (audio_encoder.frame_size() as usize).max(spec.audio_frame_size);

    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(1)).codecpar,
            audio_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        anyhow::ensure!(ret >= 0, "avcodec_parameters_from_context (audio): {ret}");
    }

    octx.write_header().context("write output header")?;

    // Muxer-assigned timebases may differ from the encoder ones.
    let ost_video_tb = octx.stream(0).map(|s| s.time_base()).unwrap_or(frame_tb);
    let ost_audio_tb = octx.stream(1).map(|s| s.time_base()).unwrap_or(audio_tb);

    let mut stats = RenderStats::default();

    // ── Audio pass ────────────────────────────────────────────────────────────
    let mut left = vec![0.0f32; audio_frame_size];
    let mut right = vec![0.0f32; audio_frame_size];
    let mut sample_idx: i64 = 0;

    loop {
        let block_pts = sample_idx;
        let block_start = sample_idx as f64 / spec.sample_rate as f64;
        if !project.has_more_audio_samples(block_start) {
            break;
        }

        // Ticks past the timeline end inside the final block stay silent.
        left.fill(0.0);
        right.fill(0.0);
        for i in 0..audio_frame_size {
            let t = sample_idx as f64 / spec.sample_rate as f64;
            if !project.has_more_audio_samples(t) {
                break;
            }
            let (l, r) = mix_tick(project, &mut sources, t)?;
            left[i] = l;
            right[i] = r;
            sample_idx += 1;
        }

        let frame = planar_stereo_frame(&left, &right, spec.sample_rate, block_pts);
        audio_encoder
            .send_frame(&frame)
            .context("send audio frame to encoder")?;
        let mut pkt = Packet::empty();
        while audio_encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(1);
            pkt.rescale_ts(audio_tb, ost_audio_tb);
            pkt.write(&mut octx).context("write audio packet")?;
        }
        stats.audio_frames += 1;
    }

    audio_encoder.send_eof().context("flush audio encoder")?;
    let mut pkt = Packet::empty();
    while audio_encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(1);
        pkt.rescale_ts(audio_tb, ost_audio_tb);
        pkt.write(&mut octx).context("write flush audio packet")?;
    }

    // ── Video pass ────────────────────────────────────────────────────────────
    let w = project.output_width;
    let h = project.output_height;
    let mut canvas = Canvas::new(w, h);
    let mut scratch = Canvas::new(w, h);

    // Reused RGBA staging frame; the YUV target is fresh per tick because the
    // encoder holds references into it.
    let mut rgba = VideoFrame::new(Pixel::RGBA, w, h);
    let mut to_yuv = ScaleCtx::get(
        Pixel::RGBA,
        w,
        h,
        Pixel::YUV420P,
        w,
        h,
        ScaleFlags::BILINEAR,
    )
    .context("create YUV converter")?;

    let mut frame_index: i64 = 0;
    loop {
        let t = frame_index as f64 / spec.fps as f64;
        if !project.has_more_video_frames(t) {
            break;
        }

        canvas.clear();
        // Bottom-to-top: the first declared track is topmost, so it is
        // composited last.
        for track in project.video_tracks.iter().rev() {
            draw_track(
                &mut canvas,
                &mut scratch,
                track.items.as_slice(),
                t,
                &mut sources,
                &spec.transitions,
                w,
                h,
            )?;
        }

        stage_canvas(&canvas, &mut rgba);
        let mut yuv = VideoFrame::empty();
        to_yuv.run(&rgba, &mut yuv).context("convert frame to YUV")?;
        yuv.set_pts(Some(frame_index));

        video_encoder
            .send_frame(&yuv)
            .context("send video frame to encoder")?;
        let mut pkt = Packet::empty();
        while video_encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(0);
            pkt.rescale_ts(frame_tb, ost_video_tb);
            pkt.write(&mut octx).context("write video packet")?;
        }

        frame_index += 1;
        if frame_index as u64 % PROGRESS_INTERVAL == 0 {
            send_progress(progress, spec.job_id, frame_index as u64, total_frames);
        }
    }
    stats.video_frames = frame_index as u64;

    video_encoder.send_eof().context("flush video encoder")?;
    let mut pkt = Packet::empty();
    while video_encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(0);
        pkt.rescale_ts(frame_tb, ost_video_tb);
        pkt.write(&mut octx).context("write flush video packet")?;
    }

    octx.write_trailer().context("write trailer")?;
    send_progress(progress, spec.job_id, stats.video_frames, total_frames);

    stats.seeks_issued = sources.values().map(|s| s.seeks_issued()).sum();
    log::info!(
        "render {}: {} video frames, {} audio frames, {} seeks",
        spec.job_id,
        stats.video_frames,
        stats.audio_frames,
        stats.seeks_issued
    );
    Ok(stats)
}

fn send_progress(
    progress: Option<&Sender<RenderProgress>>,
    job_id: Uuid,
    frames_done: u64,
    total_frames: u64,
) {
    if let Some(tx) = progress {
        let _ = tx.try_send(RenderProgress { job_id, frames_done, total_frames });
    }
}

fn warn_unknown_resources(project: &Project, sources: &HashMap<String, MediaSource>) {
    let video_ids = project.video_tracks.iter().flat_map(|t| &t.items).map(|i| &i.resource_id);
    let audio_ids = project.audio_tracks.iter().flat_map(|t| &t.items).map(|i| &i.resource_id);
    for id in video_ids.chain(audio_ids) {
        if !sources.contains_key(id) {
            log::warn!("track item references unknown resource '{id}', it will be skipped");
        }
    }
}

// ── Audio mixing ──────────────────────────────────────────────────────────────

/// One active clip's audio identity at a tick, shared between audio-track
/// and video-track items.
struct AudioClip<'a> {
    resource_id: &'a str,
    interval:    (f64, f64),
    source_time: f64,
}

impl<'a> AudioClip<'a> {
    fn from_audio(item: &'a AudioTrackItem, t: f64) -> Self {
        Self {
            resource_id: &item.resource_id,
            interval:    (item.offset, item.absolute_end_time()),
            source_time: item.source_time(t),
        }
    }

    fn from_video(item: &'a VideoTrackItem, t: f64) -> Self {
        Self {
            resource_id: &item.resource_id,
            interval:    (item.offset, item.absolute_end_time()),
            source_time: item.source_time(t),
        }
    }
}

/// Sum of all tracks' contributions at tick time `t`. Audio tracks first,
/// then the unmuted video tracks' embedded audio.
fn mix_tick(
    project: &Project,
    sources: &mut HashMap<String, MediaSource>,
    t: f64,
) -> Result<(f32, f32)> {
    let mut mixed = (0.0f32, 0.0f32);

    for track in &project.audio_tracks {
        let (first, second) = active_pair(&track.items, |it| it.is_time_in_range(t));
        let contribution = track_sample(
            first.map(|it| AudioClip::from_audio(it, t)),
            second.map(|it| AudioClip::from_audio(it, t)),
            t,
            sources,
        )?;
        mixed.0 += contribution.0;
        mixed.1 += contribution.1;
    }

    for track in &project.video_tracks {
        if track.mute_audio {
            continue;
        }
        let (first, second) =
            active_pair(&track.items, |it| !it.mute_audio && it.is_time_in_range(t));
        let contribution = track_sample(
            first.map(|it| AudioClip::from_video(it, t)),
            second.map(|it| AudioClip::from_video(it, t)),
            t,
            sources,
        )?;
        mixed.0 += contribution.0;
        mixed.1 += contribution.1;
    }

    Ok(mixed)
}

/// One track's sample at `t`: single clip passes through, an overlapping
/// pair crossfades by intersection rate, and a pair without a proper
/// overlap (or with a missing sample) contributes silence.
fn track_sample(
    first: Option<AudioClip<'_>>,
    second: Option<AudioClip<'_>>,
    t: f64,
    sources: &mut HashMap<String, MediaSource>,
) -> Result<(f32, f32)> {
    match (first, second) {
        (None, _) => Ok((0.0, 0.0)),
        (Some(clip), None) => Ok(fetch_sample(sources, &clip)?.unwrap_or((0.0, 0.0))),
        (Some(clip1), Some(clip2)) => {
            let Some((_, rate)) = intersection_rate(clip1.interval, clip2.interval, t) else {
                return Ok((0.0, 0.0));
            };
            let s1 = fetch_sample(sources, &clip1)?;
            let s2 = fetch_sample(sources, &clip2)?;
            match (s1, s2) {
                (Some(a), Some(b)) => Ok(crossfade_sample(a, b, rate as f32)),
                _ => Ok((0.0, 0.0)),
            }
        }
    }
}

/// Clip's sample at its clip-relative time, or `None` when the resource is
/// unknown or carries no audio.
fn fetch_sample(
    sources: &mut HashMap<String, MediaSource>,
    clip: &AudioClip<'_>,
) -> Result<Option<(f32, f32)>> {
    let Some(source) = sources.get_mut(clip.resource_id) else {
        return Ok(None);
    };
    if !source.has_audio() {
        return Ok(None);
    }
    source.audio_sample(clip.source_time)
}

/// First two items matching `pred`, in declaration order. Anything past the
/// second active item is ignored by design.
fn active_pair<T>(items: &[T], pred: impl Fn(&T) -> bool) -> (Option<&T>, Option<&T>) {
    let mut it = items.iter().filter(|item| pred(item));
    let first = it.next();
    (first, it.next())
}

/// Build one FLTP stereo frame from mixed sample buffers.
fn planar_stereo_frame(left: &[f32], right: &[f32], sample_rate: u32, pts: i64) -> AudioFrame {
    let n = left.len();
    let mut frame = AudioFrame::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
    frame.set_rate(sample_rate);
    frame.set_pts(Some(pts));
    unsafe {
        let ldst = std::slice::from_raw_parts_mut(frame.data_mut(0).as_mut_ptr() as *mut f32, n);
        ldst.copy_from_slice(left);
        let rdst = std::slice::from_raw_parts_mut(frame.data_mut(1).as_mut_ptr() as *mut f32, n);
        rdst.copy_from_slice(right);
    }
    frame
}

// ── Video compositing ─────────────────────────────────────────────────────────

/// Composite one track's contribution at tick time `t` onto `canvas`.
#[allow(clippy::too_many_arguments)]
fn draw_track(
    canvas: &mut Canvas,
    scratch: &mut Canvas,
    items: &[VideoTrackItem],
    t: f64,
    sources: &mut HashMap<String, MediaSource>,
    transitions: &HashMap<TransitionKind, Box<dyn VideoTransition>>,
    w: u32,
    h: u32,
) -> Result<()> {
    let (first, second) = active_pair(items, |it| it.is_time_in_range(t));

    match (first, second) {
        (None, _) => {}
        (Some(item), None) => {
            if let Some(source) = sources.get_mut(&item.resource_id) {
                if source.has_video() {
                    if let Some(pic) = source.video_frame(item.source_time(t))? {
                        canvas.draw(pic.as_view(), item.layout_rect(w, h), 255);
                    }
                }
            }
        }
        (Some(item1), Some(item2)) => {
            // A pair only renders when both sources decode video and the
            // items properly overlap; otherwise the track sits out the tick.
            let Some((window, rate)) = video_intersection_rate(item1, item2, t) else {
                return Ok(());
            };
            let both_decode = sources.get(&item1.resource_id).is_some_and(|s| s.has_video())
                && sources.get(&item2.resource_id).is_some_and(|s| s.has_video());
            if !both_decode {
                return Ok(());
            }

            // The outgoing frame is copied out of its source: fetching the
            // incoming frame may recycle the same decoder's buffer when both
            // items reference one resource.
            let pic1 = match sources.get_mut(&item1.resource_id) {
                Some(source) => match source.video_frame(item1.source_time(t))? {
                    Some(p) => p.clone(),
                    None => return Ok(()),
                },
                None => return Ok(()),
            };
            let Some(source2) = sources.get_mut(&item2.resource_id) else {
                return Ok(());
            };
            let Some(pic2) = source2.video_frame(item2.source_time(t))? else {
                return Ok(());
            };

            let dest1 = item1.layout_rect(w, h);
            let dest2 = item2.layout_rect(w, h);

            // Transition selector lives on the earlier item. No registry
            // entry (Cut included) = hard cut to the incoming clip.
            match transitions.get(&item1.transition) {
                Some(transition) => {
                    scratch.clear();
                    transition.render(
                        scratch,
                        pic1.as_view(),
                        dest1,
                        pic2.as_view(),
                        dest2,
                        window,
                        rate as f32,
                    );
                    canvas.draw_canvas(scratch);
                }
                None => canvas.draw(pic2.as_view(), dest2, 255),
            }
        }
    }
    Ok(())
}

/// Copy the canvas into the RGBA staging frame, honoring its row stride.
fn stage_canvas(canvas: &Canvas, rgba: &mut VideoFrame) {
    let w = canvas.width as usize;
    let h = canvas.height as usize;
    let stride = rgba.stride(0);
    let dst = rgba.data_mut(0);
    let src = canvas.data();
    for row in 0..h {
        dst[row * stride..row * stride + w * 4]
            .copy_from_slice(&src[row * w * 4..(row + 1) * w * 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_pair_takes_first_two_in_declaration_order() {
        let intervals = [(0.0, 4.0), (3.0, 8.0), (3.5, 9.0), (20.0, 30.0)];
        // three intervals are active at t=3.6; the third must be ignored
        let (first, second) = active_pair(&intervals, |&(a, b)| a <= 3.6 && 3.6 <= b);
        assert_eq!(first, Some(&(0.0, 4.0)));
        assert_eq!(second, Some(&(3.0, 8.0)));
    }

    #[test]
    fn active_pair_empty_and_single() {
        let intervals = [(0.0, 1.0), (5.0, 6.0)];
        let (first, second) = active_pair(&intervals, |&(a, b)| a <= 5.5 && 5.5 <= b);
        assert_eq!(first, Some(&(5.0, 6.0)));
        assert_eq!(second, None);

        let (first, second) = active_pair(&intervals, |&(a, b)| a <= 3.0 && 3.0 <= b);
        assert_eq!(first, None);
        assert_eq!(second, None);
    }
}
