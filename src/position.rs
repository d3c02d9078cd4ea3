//! Decoder position tracking.
//!
//! The decoder only moves forward, so a handle has to remember where it is:
//! which frame was delivered last, the timestamp of the most recent decoded
//! picture, and the key frame that picture descends from. It also holds up
//! to two decoded pictures. `current` is the newest output and `backup` the
//! one before it, so a target that falls between two pictures can still be
//! answered with the earlier one.

/// A picture produced by the decoder.
#[derive(Debug, Clone)]
pub struct DecodedPicture<F> {
    /// Backend-specific picture storage.
    pub frame: F,
    /// Presentation timestamp (pts, or dts when pts is absent).
    pub pts: i64,
    /// Display duration in time-base ticks.
    pub duration: i64,
    /// Whether the picture is a key frame.
    pub key_frame: bool,
}

impl<F> DecodedPicture<F> {
    /// Whether `pts` falls inside `[self.pts, self.pts + self.duration)`.
    pub fn contains(&self, pts: i64) -> bool {
        self.pts <= pts && pts < self.pts + self.duration
    }
}

/// A snapshot of where the decoder stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionState {
    /// The last frame index successfully delivered.
    pub current_frame_index: Option<i64>,
    /// Timestamp of the most recently decoded picture. Unset right after a
    /// seek.
    pub current_pts: Option<i64>,
    /// Timestamp of the key frame that starts the current group of pictures.
    pub current_keyframe_pts: Option<i64>,
    /// Whether a backup picture is held.
    pub backup_valid: bool,
    /// Whether the most recent fetch decided it had to seek.
    pub must_seek_before_decode: bool,
}

/// Position state plus the picture slots and the packet being decoded.
#[derive(Debug)]
pub(crate) struct PositionTracker<P, F> {
    pub(crate) current_frame_index: Option<i64>,
    pub(crate) current_pts: Option<i64>,
    pub(crate) current_keyframe_pts: Option<i64>,
    pub(crate) must_seek_before_decode: bool,
    pub(crate) current: Option<DecodedPicture<F>>,
    pub(crate) backup: Option<DecodedPicture<F>>,
    /// The packet most recently handed to the decoder.
    pub(crate) packet: Option<P>,
}

impl<P, F> PositionTracker<P, F> {
    pub(crate) fn new() -> Self {
        Self {
            current_frame_index: None,
            current_pts: None,
            current_keyframe_pts: None,
            must_seek_before_decode: false,
            current: None,
            backup: None,
            packet: None,
        }
    }

    pub(crate) fn snapshot(&self) -> PositionState {
        PositionState {
            current_frame_index: self.current_frame_index,
            current_pts: self.current_pts,
            current_keyframe_pts: self.current_keyframe_pts,
            backup_valid: self.backup.is_some(),
            must_seek_before_decode: self.must_seek_before_decode,
        }
    }

    /// True until the first picture has been decoded, and again after a
    /// seek or a decode failure.
    pub(crate) fn is_first_decode(&self) -> bool {
        self.current.is_none()
    }

    /// Install a freshly decoded picture as `current`.
    pub(crate) fn record_picture(&mut self, picture: DecodedPicture<F>) {
        self.current_pts = Some(picture.pts);
        if picture.key_frame {
            self.current_keyframe_pts = Some(picture.pts);
        }
        self.current = Some(picture);
    }

    /// Move `current` into `backup` before decoding the next picture.
    ///
    /// An existing backup is kept once the scan has reached the target, and
    /// an empty `current` never overwrites it.
    pub(crate) fn store_backup(&mut self, target_pts: i64) {
        if self.backup.is_some() && self.current_pts.is_some_and(|pts| pts >= target_pts) {
            return;
        }
        if let Some(current) = self.current.take() {
            self.backup = Some(current);
        }
    }

    /// Discard decode state after the demuxer was repositioned.
    ///
    /// Both picture slots are emptied: a picture from before the seek must
    /// never bracket a target found after it.
    pub(crate) fn reset_after_seek(&mut self) {
        self.current = None;
        self.backup = None;
        self.current_pts = None;
        self.packet = None;
    }

    /// Forget everything, as if the stream had just been opened.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn finish_fetch(&mut self, frame_index: i64) {
        self.current_frame_index = Some(frame_index);
    }
}
