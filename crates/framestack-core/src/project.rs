// crates/framestack-core/src/project.rs
//
// Project description — the full input to one render. Plain serde data,
// no runtime handles; framestack-media opens the actual streams.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::track::{AudioTrack, VideoTrack};

/// A decodable media file referenced by track items through its `id`.
///
/// The path is the lazy stream factory: nothing is opened until a render
/// starts, and each resource is opened exactly once for the render's
/// duration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaResource {
    pub id:   String,
    pub path: PathBuf,
}

/// The composition handed to a render job.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub resources:     Vec<MediaResource>,
    #[serde(default)]
    pub video_tracks:  Vec<VideoTrack>,
    #[serde(default)]
    pub audio_tracks:  Vec<AudioTrack>,
    pub output_width:  u32,
    pub output_height: u32,
}

impl Project {
    /// True while any video track still has a clip ending after `t`.
    /// Total render length = max `absolute_end_time` over all video items.
    pub fn has_more_video_frames(&self, t: f64) -> bool {
        self.video_tracks
            .iter()
            .any(|track| track.items.iter().any(|it| it.absolute_end_time() > t))
    }

    /// True while any audio OR video track still has a clip ending after `t`.
    /// Video clips contribute audio, so both kinds gate the audio pass.
    pub fn has_more_audio_samples(&self, t: f64) -> bool {
        self.audio_tracks
            .iter()
            .any(|track| track.items.iter().any(|it| it.absolute_end_time() > t))
            || self.has_more_video_frames(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::track::VideoTrackItem;
    use crate::transitions::TransitionKind;

    fn six_second_project() -> Project {
        Project {
            resources: vec![MediaResource { id: "clip".into(), path: "clip.mp4".into() }],
            video_tracks: vec![VideoTrack {
                items: vec![VideoTrackItem {
                    resource_id: "clip".into(),
                    offset:      0.0,
                    start_time:  0.0,
                    end_time:    6.0,
                    dest:        Rect::default(),
                    mute_audio:  false,
                    transition:  TransitionKind::Cut,
                }],
                mute_audio: false,
            }],
            audio_tracks: vec![],
            output_width: 800,
            output_height: 600,
        }
    }

    #[test]
    fn six_seconds_at_30fps_is_exactly_180_ticks() {
        let project = six_second_project();
        let fps = 30u32;

        let mut emitted = Vec::new();
        let mut frame_index: i64 = 0;
        loop {
            let t = frame_index as f64 / fps as f64;
            if !project.has_more_video_frames(t) {
                break;
            }
            emitted.push(frame_index);
            frame_index += 1;
        }

        assert_eq!(emitted.len(), 180);
        assert_eq!(emitted.first(), Some(&0));
        assert_eq!(emitted.last(), Some(&179));
    }

    #[test]
    fn audio_pass_also_gated_by_video_clips() {
        let project = six_second_project();
        assert!(project.has_more_audio_samples(5.9));
        assert!(!project.has_more_audio_samples(6.0));
    }

    #[test]
    fn project_round_trips_through_json() {
        let project = six_second_project();
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back.video_tracks[0].items[0].end_time, 6.0);
        assert_eq!(back.output_width, 800);
    }
}
