//! Error types for the `frameseek` crate.
//!
//! This module defines [`FrameSeekError`], the unified error type returned by
//! every fallible operation in the crate. Seek failures and decode stalls are
//! deliberately absent: the engine logs them and degrades to the best
//! available picture instead of failing the fetch.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `frameseek` operations.
///
/// Every public method that can fail returns `Result<T, FrameSeekError>`.
/// Variants carry enough context to diagnose the problem without additional
/// logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameSeekError {
    /// The container or codec could not be opened.
    #[error("Failed to open video stream at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::StreamHandle::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file has fewer video streams than the requested ordinal.
    #[error("No video stream with ordinal {ordinal} found in file")]
    NoVideoStream {
        /// Ordinal among the file's video streams (0 = first).
        ordinal: usize,
    },

    /// The requested frame index lies outside `[0, duration)`.
    #[error("Frame {frame_index} is out of range (stream has {duration} frames)")]
    FrameOutOfRange {
        /// The frame index that was requested.
        frame_index: i64,
        /// The stream duration in frames for the requested timecode kind.
        duration: i64,
    },

    /// The decoder produced no picture at all for the request.
    #[error("No picture could be decoded for frame {frame_index}")]
    DecodeUnavailable {
        /// The frame index that was requested.
        frame_index: i64,
    },

    /// Converted picture data did not have the layout the engine relies on.
    ///
    /// The handle that raised this error is marked failed.
    #[error("Decoded picture violates format assumptions: {0}")]
    FormatAssumption(String),

    /// The handle was previously marked failed and cannot produce frames.
    #[error("Stream handle is unusable: {0}")]
    StreamFailed(String),

    /// Timecode index data is malformed or unusable.
    #[error("Invalid timecode index: {0}")]
    InvalidIndex(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while writing a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl FrameSeekError {
    /// Whether this error leaves the handle permanently unusable.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, FrameSeekError::FormatAssumption(_))
    }
}

impl From<FfmpegError> for FrameSeekError {
    fn from(error: FfmpegError) -> Self {
        FrameSeekError::FfmpegError(error.to_string())
    }
}
