//! Async frame streaming.
//!
//! [`FrameStream`] fetches frames on a `tokio::task::spawn_blocking` thread
//! and hands them back through a bounded channel, so FFmpeg work never
//! occupies the async runtime's worker threads.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use frameseek::{FrameSeekError, OpenOptions, frame_stream};
//!
//! # async fn example() -> Result<(), FrameSeekError> {
//! let mut stream = frame_stream("input.mp4", vec![0, 1, 2, 240], OpenOptions::new(), None);
//! while let Some(result) = stream.next().await {
//!     let frame = result?;
//!     frame.image.save(format!("frame_{}.png", frame.frame_index))?;
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    path::Path,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    sync::mpsc::{Receiver, Sender},
    task::JoinHandle,
};
use tokio_stream::Stream;

use crate::{
    config::OpenOptions,
    diagnostics::{FetchLog, emit, path_label},
    error::FrameSeekError,
    handle::{FetchedFrame, StreamHandle},
};

/// Default bounded-channel capacity. Decoded frames are large, so it is
/// kept small.
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// A stream of fetched frames produced by a background thread.
///
/// Frames arrive in request order. Dropping the stream closes the channel
/// and the background thread stops before its next fetch.
pub struct FrameStream {
    receiver: Receiver<Result<FetchedFrame, FrameSeekError>>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl Stream for FrameStream {
    type Item = Result<FetchedFrame, FrameSeekError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Fetch `frame_indices` from the file at `path` on a blocking thread.
///
/// An open or fetch error is delivered as the stream's last item.
/// `channel_capacity` of `None` uses the default of 8.
pub fn frame_stream<P: AsRef<Path>>(
    path: P,
    frame_indices: Vec<i64>,
    options: OpenOptions,
    channel_capacity: Option<usize>,
) -> FrameStream {
    let path = path.as_ref().to_path_buf();
    let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY).max(1);
    let (sender, receiver) = tokio::sync::mpsc::channel(capacity);

    let handle = tokio::task::spawn_blocking(move || {
        let log = options.fetch_log(&path_label(&path));
        if let Err(error) = fetch_blocking(&path, &frame_indices, options, &log, &sender) {
            emit!(log, Debug, "frameseek::fetch", "frame stream stopped: {error}");
            let _ = sender.blocking_send(Err(error));
        }
    });

    FrameStream { receiver, handle }
}

fn fetch_blocking(
    path: &Path,
    frame_indices: &[i64],
    options: OpenOptions,
    log: &FetchLog,
    sender: &Sender<Result<FetchedFrame, FrameSeekError>>,
) -> Result<(), FrameSeekError> {
    let mut handle = StreamHandle::open(path, options)?;
    for &frame_index in frame_indices {
        let frame = handle.fetch(frame_index)?;
        if sender.blocking_send(Ok(frame)).is_err() {
            emit!(log, Debug, "frameseek::fetch", "frame stream dropped, stopping");
            break;
        }
    }
    handle.close();
    Ok(())
}
