//! Per-handle structured logging.
//!
//! Every [`StreamHandle`](crate::StreamHandle) owns a [`FetchLog`] and passes
//! it by reference to the seek planner and decode scanner. Records go through
//! the [`log`] crate: either to a sink injected with
//! [`OpenOptions::with_logger`](crate::OpenOptions::with_logger), or to the
//! global logger the application installed. The crate itself never touches
//! process-wide log state.
//!
//! Targets are per component so they can be filtered independently, e.g.
//! `RUST_LOG=frameseek::seek=debug`:
//!
//! | Target | Component |
//! |--------|-----------|
//! | `frameseek::open` | stream analysis at open time |
//! | `frameseek::fetch` | fetch orchestration and picture selection |
//! | `frameseek::seek` | seek planning and execution |
//! | `frameseek::scan` | packet reading and decoding |

use std::{
    fmt::{Arguments, Debug, Formatter, Result as FmtResult},
    path::Path,
    sync::Arc,
};

use log::{Level, Log, Metadata, Record};

/// A labelled log handle with an optional injected sink.
#[derive(Clone)]
pub struct FetchLog {
    label: String,
    sink: Option<Arc<dyn Log>>,
}

impl Debug for FetchLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FetchLog")
            .field("label", &self.label)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl FetchLog {
    /// Create a log handle that forwards to the global logger.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sink: None,
        }
    }

    /// Forward records to `sink` instead of the global logger.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Log>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The label prefixed to every message (usually the file name).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Emit one record.
    pub fn log(&self, level: Level, target: &str, args: Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(target).build();
        let logger: &dyn Log = match &self.sink {
            Some(sink) => sink.as_ref(),
            None => {
                if level > log::max_level() {
                    return;
                }
                log::logger()
            }
        };
        if !logger.enabled(&metadata) {
            return;
        }
        logger.log(
            &Record::builder()
                .metadata(metadata)
                .args(format_args!("[{}] {}", self.label, args))
                .build(),
        );
    }
}

/// Default log label for a file: its name, or the whole path without one.
pub(crate) fn path_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `emit!(log, Level, "target", "format", args...)`
macro_rules! emit {
    ($log:expr, $level:ident, $target:literal, $($arg:tt)+) => {
        $log.log(::log::Level::$level, $target, format_args!($($arg)+))
    };
}

pub(crate) use emit;
