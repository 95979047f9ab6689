// crates/framestack-media/src/cursor.rs
//! Seek policy for a demuxer that is expensive to reposition.
//!
//! Timeline playback asks for timestamps that are almost always equal to or
//! slightly ahead of the last decoded one. The cursor turns each request into
//! either "keep draining packets" or "issue a keyframe seek", and only picks
//! the seek when reading forward cannot reach the target cheaply.

/// Forward window, in seconds, within which we decode toward the target
/// instead of seeking. Roughly one GOP of typical footage.
pub const DEFAULT_SEEK_THRESHOLD: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CursorState {
    /// Nothing decoded yet; the first request always seeks.
    Fresh,
    /// Last decoded unit started at this stream time.
    Positioned(f64),
    /// Demuxer ran out of packets; remembers the last decoded time.
    EndOfStream(f64),
}

#[derive(Debug)]
pub struct DecodeCursor {
    state: CursorState,
    seek_threshold: f64,
    seeks_issued: u64,
}

impl DecodeCursor {
    pub fn new(seek_threshold: f64) -> Self {
        Self {
            state: CursorState::Fresh,
            seek_threshold,
            seeks_issued: 0,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Stream time of the last decoded unit, if any.
    pub fn position(&self) -> Option<f64> {
        match self.state {
            CursorState::Fresh => None,
            CursorState::Positioned(t) | CursorState::EndOfStream(t) => Some(t),
        }
    }

    pub fn seeks_issued(&self) -> u64 {
        self.seeks_issued
    }

    /// Whether serving `target` requires repositioning the demuxer.
    ///
    /// Seeks are issued for the first request, for any backward request, and
    /// for forward jumps beyond the threshold. Everything else is reached by
    /// decoding forward.
    pub fn needs_seek(&self, target: f64) -> bool {
        match self.state {
            CursorState::Fresh => true,
            CursorState::Positioned(pos) | CursorState::EndOfStream(pos) => {
                target < pos || target > pos + self.seek_threshold
            }
        }
    }

    /// Record that a keyframe seek toward `target` was issued.
    pub fn record_seek(&mut self, target: f64) {
        self.seeks_issued += 1;
        self.state = CursorState::Positioned(target);
    }

    /// Record the start time of a freshly decoded unit.
    pub fn advance(&mut self, pts: f64) {
        self.state = CursorState::Positioned(pts);
    }

    /// Record that the demuxer and decoders are fully drained.
    pub fn mark_eof(&mut self) {
        let last = self.position().unwrap_or(0.0);
        self.state = CursorState::EndOfStream(last);
    }
}

impl Default for DecodeCursor {
    fn default() -> Self {
        Self::new(DEFAULT_SEEK_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the cursor the way a decode loop would: seek when asked to,
    /// then advance through units of `step` seconds until `target` is covered.
    fn request(cursor: &mut DecodeCursor, target: f64, step: f64) {
        if cursor.needs_seek(target) {
            cursor.record_seek(target);
        }
        let mut pos = cursor.position().unwrap_or(0.0);
        while pos < target {
            pos += step;
            cursor.advance(pos);
        }
    }

    #[test]
    fn sequential_playback_seeks_once() {
        let mut cursor = DecodeCursor::new(DEFAULT_SEEK_THRESHOLD);
        let step = 1.0 / 30.0;
        for frame in 0..300 {
            request(&mut cursor, frame as f64 * step, step);
        }
        assert_eq!(cursor.seeks_issued(), 1);
    }

    #[test]
    fn backward_request_seeks() {
        let mut cursor = DecodeCursor::new(DEFAULT_SEEK_THRESHOLD);
        request(&mut cursor, 5.0, 1.0 / 30.0);
        assert_eq!(cursor.seeks_issued(), 1);
        assert!(cursor.needs_seek(2.0));
    }

    #[test]
    fn forward_jump_within_threshold_decodes_through() {
        let mut cursor = DecodeCursor::new(1.0);
        request(&mut cursor, 2.0, 1.0 / 30.0);
        assert!(!cursor.needs_seek(2.5));
        assert!(!cursor.needs_seek(3.0));
    }

    #[test]
    fn forward_jump_past_threshold_seeks() {
        let mut cursor = DecodeCursor::new(1.0);
        request(&mut cursor, 2.0, 1.0 / 30.0);
        // position lands just past 2.0 after the last advance
        assert!(cursor.needs_seek(3.2));
    }

    #[test]
    fn fresh_cursor_always_seeks() {
        let cursor = DecodeCursor::new(1.0);
        assert!(cursor.needs_seek(0.0));
        assert_eq!(cursor.position(), None);
    }

    #[test]
    fn eof_reentry_requires_seek_only_when_backward_or_far() {
        let mut cursor = DecodeCursor::new(1.0);
        request(&mut cursor, 4.0, 1.0 / 30.0);
        cursor.mark_eof();
        assert!(matches!(cursor.state(), CursorState::EndOfStream(_)));
        // nearby forward target keeps draining (and will hit EOF again)
        assert!(!cursor.needs_seek(4.5));
        // rewinding out of EOF costs a seek
        assert!(cursor.needs_seek(1.0));
        cursor.record_seek(1.0);
        assert_eq!(cursor.state(), CursorState::Positioned(1.0));
        assert_eq!(cursor.seeks_issued(), 2);
    }
}
