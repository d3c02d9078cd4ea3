//! The seam between the frame-fetch engine and a demuxer/decoder.
//!
//! [`StreamHandle`](crate::StreamHandle) drives everything through
//! [`MediaBackend`]. The production implementation is
//! [`FfmpegBackend`](crate::FfmpegBackend); tests substitute a deterministic
//! in-memory backend to exercise seek planning without media files.

use ffmpeg_next::Rational;
use image::RgbaImage;

use crate::{error::FrameSeekError, position::DecodedPicture};

/// A compressed packet belonging to the selected video stream.
pub trait CompressedPacket {
    /// Presentation timestamp, if the container provides one.
    fn pts(&self) -> Option<i64>;

    /// Decode timestamp, if the container provides one.
    fn dts(&self) -> Option<i64>;

    /// Whether the packet starts a key frame.
    fn is_key(&self) -> bool;

    /// Byte offset of the packet in the container, if known.
    fn position(&self) -> Option<i64> {
        None
    }

    /// The packet's timestamp: pts when present, dts otherwise.
    fn timestamp(&self) -> Option<i64> {
        crate::timestamp::pts_or_dts(self.pts(), self.dts())
    }
}

/// Where a backend seek should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Backward seek on the video stream to the last key frame at or before
    /// this timestamp (stream time base units).
    Timestamp(i64),
    /// Seek to a byte offset in the container.
    Byte(i64),
}

/// Facts about the selected video stream, fixed at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Stream time base.
    pub time_base: Rational,
    /// Guessed frame rate (frames per second).
    pub frame_rate: Rational,
    /// Timestamp of the first frame, when the container declares one.
    pub start_pts: Option<i64>,
    /// Start offset of the video stream in seconds.
    pub start_offset: f64,
    /// Estimated number of frames in the stream.
    pub duration_in_frames: i64,
    /// Coded width at open time.
    pub width: u32,
    /// Coded height at open time.
    pub height: u32,
    /// Whether the decoded pixel format carries an alpha channel.
    pub has_alpha: bool,
    /// Container format name list (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format_name: String,
    /// Short codec name (e.g. `"h264"`).
    pub codec_name: String,
    /// Whether the container must be seeked by byte offset when an index is
    /// in use.
    pub byte_seek: bool,
    /// Whether the demuxer implements its own timestamp seek. When it does
    /// not, seeks go through a key-frame search that steps backward.
    pub native_seek: bool,
}

/// A demuxer plus decoder for one video stream.
///
/// Packets returned by [`read_packet`](MediaBackend::read_packet) belong to
/// the selected stream only. Pictures come out of
/// [`receive_picture`](MediaBackend::receive_picture) in presentation order.
pub trait MediaBackend {
    /// Compressed packet type.
    type Packet: CompressedPacket;
    /// Decoded picture storage.
    type Frame;

    /// Stream facts captured at open time.
    fn info(&self) -> &StreamInfo;

    /// The decoder's current coded size; may change mid-stream.
    fn coded_size(&self) -> (u32, u32);

    /// Read the next packet of the video stream. `Ok(None)` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, FrameSeekError>;

    /// Submit a packet to the decoder.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), FrameSeekError>;

    /// Signal end of stream so the decoder releases buffered pictures.
    fn send_eof(&mut self) -> Result<(), FrameSeekError>;

    /// Take one decoded picture. `Ok(None)` when the decoder needs more input.
    fn receive_picture(&mut self) -> Result<Option<DecodedPicture<Self::Frame>>, FrameSeekError>;

    /// Reposition the demuxer.
    fn seek(&mut self, target: SeekTarget) -> Result<(), FrameSeekError>;

    /// Drop every picture and packet buffered inside the decoder.
    fn flush(&mut self);

    /// Convert a decoded picture to packed RGBA.
    fn convert(&mut self, frame: &Self::Frame) -> Result<RgbaImage, FrameSeekError>;

    /// Container-level metadata tags.
    fn tags(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}
