//! # frameseek
//!
//! Frame-accurate random access to video streams.
//!
//! Video decoders only move forward: a frame can be decoded after the key
//! frame it depends on and everything between them. `frameseek` hides that
//! behind "give me frame N". It estimates the target timestamp, seeks a
//! little before it, and decodes forward until the target is covered. The
//! decoder position is tracked between calls, so reading consecutive frames
//! never seeks. Decoding is done by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use frameseek::{OpenOptions, StreamHandle};
//!
//! let mut handle = StreamHandle::open("input.mp4", OpenOptions::new())?;
//! println!("{} frames", handle.duration(frameseek::TimecodeKind::None));
//!
//! // Random access...
//! let frame = handle.fetch(500)?;
//! frame.image.save("frame_500.png")?;
//!
//! // ...and cheap sequential playback from there.
//! for index in 501..510 {
//!     let frame = handle.fetch(index)?;
//!     assert!(!handle.position().must_seek_before_decode);
//! #   let _ = frame;
//! }
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```
//!
//! ### Timecode indices
//!
//! ```no_run
//! use frameseek::{OpenOptions, ProxySize, StreamHandle, TimecodeKind};
//!
//! let mut handle = StreamHandle::open("camera.ts", OpenOptions::new())?;
//! handle.build_index(TimecodeKind::RecordRunNoGaps)?;
//! let frame = handle.fetch_frame(42, TimecodeKind::RecordRunNoGaps, ProxySize::None)?;
//! # let _ = frame;
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```
//!
//! ## Features
//!
//! - **Random access** by frame index, with a configurable seek margin
//! - **Sequential fast path**: `N` followed by `N + 1` never seeks
//! - **Seek-buffer reuse**: a seek that lands in the group of pictures being
//!   decoded keeps the decoder's buffers
//! - **Key-frame search** for demuxers without native timestamp seeking
//! - **Timecode indices** with byte seeking for containers that need it
//! - **Variable frame rate tolerance**: the picture covering the target
//!   timestamp wins, with the previous picture as a fallback
//! - **Proxies**: redirect fetches to reduced-resolution stand-ins
//! - **Per-handle logging** through the [`log`] facade
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | [`FrameStream`] fetches frames on a blocking thread via Tokio |
//! | `rayon` | [`fetch_frames_parallel`] spreads runs of frames across rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod backend;
pub mod config;
pub mod conversion;
pub mod demuxer;
pub mod diagnostics;
pub mod error;
pub mod ffmpeg;
pub mod handle;
pub mod metadata;
#[cfg(feature = "rayon")]
pub mod parallel;
pub mod position;
pub mod scan;
mod seek;
#[cfg(feature = "async")]
pub mod stream;
pub mod timecode;
pub mod timestamp;

pub use backend::{CompressedPacket, MediaBackend, SeekTarget, StreamInfo};
pub use config::{DEFAULT_COLORSPACE, OpenOptions, ProxySize, SeekTuning};
pub use demuxer::FfmpegBackend;
pub use diagnostics::FetchLog;
pub use error::FrameSeekError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use handle::{FetchedFrame, StreamHandle};
pub use metadata::{PreviewFrame, VideoMetadata};
#[cfg(feature = "rayon")]
pub use parallel::fetch_frames_parallel;
pub use position::{DecodedPicture, PositionState};
pub use scan::{PictureChoice, PictureSource, choose_picture};
#[cfg(feature = "async")]
pub use stream::{FrameStream, frame_stream};
pub use timecode::{FrameIndex, IndexEntry, PacketRecord, TimecodeIndex, TimecodeKind};
