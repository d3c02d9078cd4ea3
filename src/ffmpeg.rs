//! FFmpeg's own console logging.
//!
//! libavformat and libavcodec print to stderr independently of the [`log`]
//! records this crate emits. [`set_ffmpeg_log_level`] tunes that output;
//! [`FfmpegLogLevel::for_filter`] derives a matching level from the
//! application's `log` filter so both stay in step.

use ffmpeg_next::util::log::Level;
use log::LevelFilter;

/// FFmpeg internal log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    Quiet,
    Panic,
    Fatal,
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl FfmpegLogLevel {
    /// The FFmpeg level that corresponds to a `log` filter.
    ///
    /// FFmpeg chatter is one step quieter than the crate's own records:
    /// `debug` on the Rust side maps to FFmpeg `info`, `trace` to `debug`.
    pub fn for_filter(filter: LevelFilter) -> Self {
        match filter {
            LevelFilter::Off => FfmpegLogLevel::Quiet,
            LevelFilter::Error => FfmpegLogLevel::Fatal,
            LevelFilter::Warn => FfmpegLogLevel::Error,
            LevelFilter::Info => FfmpegLogLevel::Warning,
            LevelFilter::Debug => FfmpegLogLevel::Info,
            LevelFilter::Trace => FfmpegLogLevel::Debug,
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set FFmpeg's process-wide console verbosity.
///
/// This is global state; libraries embedding `frameseek` should leave it to
/// the application.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// FFmpeg's current console verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}
