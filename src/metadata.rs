//! Stream metadata.
//!
//! [`VideoMetadata`] is captured once when a
//! [`StreamHandle`](crate::StreamHandle) opens and refreshed when the
//! decoder reports a new coded size. [`PreviewFrame`] bundles a
//! representative thumbnail with the facts a file browser shows next to it.

use std::collections::HashMap;

use ffmpeg_next::Rational;

use crate::{backend::StreamInfo, handle::FetchedFrame, timestamp::frames_to_seconds};

/// Metadata for the selected video stream.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Guessed frame rate.
    pub frame_rate: Rational,
    /// Frames per second as a float (may be approximate for variable frame
    /// rate content).
    pub frames_per_second: f64,
    /// Estimated number of frames.
    pub duration_in_frames: i64,
    /// Start offset of the video stream in seconds.
    pub start_offset: f64,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"av1"`).
    pub codec: String,
    /// Container format name list.
    pub format: String,
    /// Whether fetched images carry an alpha channel.
    pub has_alpha: bool,
    /// Container-level tags (title, encoder, creation time, ...).
    pub tags: HashMap<String, String>,
}

impl VideoMetadata {
    pub(crate) fn from_stream(info: &StreamInfo, width: u32, height: u32, tags: Vec<(String, String)>) -> Self {
        Self {
            width,
            height,
            frame_rate: info.frame_rate,
            frames_per_second: f64::from(info.frame_rate),
            duration_in_frames: info.duration_in_frames,
            start_offset: info.start_offset,
            codec: info.codec_name.clone(),
            format: info.format_name.clone(),
            has_alpha: info.has_alpha,
            tags: tags.into_iter().collect(),
        }
    }

    /// Stream length in seconds, derived from the frame count.
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.duration_in_frames, self.frame_rate)
    }
}

/// A representative frame plus thumbnail facts.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// The frame halfway through the stream.
    pub frame: FetchedFrame,
    /// Stream width in pixels.
    pub width: u32,
    /// Stream height in pixels.
    pub height: u32,
    /// Number of addressable frames.
    pub frame_count: i64,
    /// Frames per second, absent when the stream declares no rate.
    pub frames_per_second: Option<f64>,
    /// Length in seconds, absent when the stream declares no rate.
    pub duration_seconds: Option<f64>,
}
