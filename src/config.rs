//! Open-time configuration.
//!
//! [`OpenOptions`] is a builder that carries stream selection,
//! post-processing flags, seek tuning and the optional log sink into
//! [`StreamHandle::open`](crate::StreamHandle::open).
//!
//! # Example
//!
//! ```no_run
//! use frameseek::{OpenOptions, StreamHandle};
//!
//! let options = OpenOptions::new()
//!     .with_stream_index(1)
//!     .with_deinterlace(true)
//!     .with_decoder_threads(4);
//! let handle = StreamHandle::open("input.mkv", options)?;
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use log::Log;

use crate::diagnostics::FetchLog;

/// Colorspace tag attached to fetched images unless overridden.
pub const DEFAULT_COLORSPACE: &str = "sRGB";

/// Reduced-resolution proxy a fetch may be redirected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxySize {
    /// Decode the stream itself.
    #[default]
    None,
    /// 25% proxy.
    Quarter,
    /// 50% proxy.
    Half,
    /// 75% proxy.
    ThreeQuarters,
    /// Full-size proxy (e.g. an intra-only transcode).
    Full,
}

/// Knobs of the seek planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTuning {
    /// Nominal frames to back off before the target when seeking without a
    /// timecode index.
    pub margin_frames: i64,
    /// Upper bound on backward steps while searching for a key frame in
    /// containers without native timestamp seeking.
    pub max_search_steps: u32,
}

impl Default for SeekTuning {
    fn default() -> Self {
        Self {
            margin_frames: 3,
            max_search_steps: 256,
        }
    }
}

/// Options for opening a [`StreamHandle`](crate::StreamHandle).
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) stream_index: usize,
    pub(crate) deinterlace: bool,
    pub(crate) flip_vertical: bool,
    pub(crate) colorspace: String,
    pub(crate) decoder_threads: Option<usize>,
    pub(crate) seek: SeekTuning,
    pub(crate) logger: Option<Arc<dyn Log>>,
    pub(crate) label: Option<String>,
}

impl Debug for OpenOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OpenOptions")
            .field("stream_index", &self.stream_index)
            .field("deinterlace", &self.deinterlace)
            .field("flip_vertical", &self.flip_vertical)
            .field("colorspace", &self.colorspace)
            .field("decoder_threads", &self.decoder_threads)
            .field("seek", &self.seek)
            .field("has_logger", &self.logger.is_some())
            .field("label", &self.label)
            .finish()
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Defaults: first video stream, no post-processing, `"sRGB"`,
    /// automatic decoder threading, a 3-frame seek margin.
    pub fn new() -> Self {
        Self {
            stream_index: 0,
            deinterlace: false,
            flip_vertical: false,
            colorspace: DEFAULT_COLORSPACE.to_string(),
            decoder_threads: None,
            seek: SeekTuning::default(),
            logger: None,
            label: None,
        }
    }

    /// Select the n-th video stream of the file (0 = first).
    #[must_use]
    pub fn with_stream_index(mut self, ordinal: usize) -> Self {
        self.stream_index = ordinal;
        self
    }

    /// Blend interlaced fields of every fetched picture.
    #[must_use]
    pub fn with_deinterlace(mut self, deinterlace: bool) -> Self {
        self.deinterlace = deinterlace;
        self
    }

    /// Store fetched images bottom row first.
    #[must_use]
    pub fn with_flip_vertical(mut self, flip: bool) -> Self {
        self.flip_vertical = flip;
        self
    }

    /// Colorspace name tagged onto fetched images.
    #[must_use]
    pub fn with_colorspace(mut self, colorspace: impl Into<String>) -> Self {
        self.colorspace = colorspace.into();
        self
    }

    /// Decoder thread count. `0` or unset lets FFmpeg decide.
    #[must_use]
    pub fn with_decoder_threads(mut self, threads: usize) -> Self {
        self.decoder_threads = Some(threads);
        self
    }

    /// Override the seek planner's tuning.
    #[must_use]
    pub fn with_seek_tuning(mut self, tuning: SeekTuning) -> Self {
        self.seek = SeekTuning {
            margin_frames: tuning.margin_frames.max(0),
            max_search_steps: tuning.max_search_steps.max(1),
        };
        self
    }

    /// Send this handle's log records to `logger` instead of the global
    /// logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Label prefixed to every log record. Defaults to the file name.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn fetch_log(&self, default_label: &str) -> FetchLog {
        let log = FetchLog::new(self.label.as_deref().unwrap_or(default_label));
        match &self.logger {
            Some(logger) => log.with_sink(Arc::clone(logger)),
            None => log,
        }
    }
}
