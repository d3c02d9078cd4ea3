//! Forward decoding up to a target timestamp, and picture selection.

use crate::{
    backend::{CompressedPacket, MediaBackend},
    diagnostics::emit,
    handle::FetchEngine,
    position::DecodedPicture,
};

/// Which picture slot answered a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureSource {
    /// The most recently decoded picture.
    Current,
    /// The picture decoded before it.
    Backup,
}

/// The outcome of [`choose_picture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureChoice {
    /// The slot holding the picture to deliver.
    pub source: PictureSource,
    /// Whether the chosen picture's display interval covers the target.
    /// Inexact choices are best-effort fallbacks.
    pub exact: bool,
}

/// Choose the picture to deliver for `target_pts`.
///
/// `current` wins if its `[pts, pts + duration)` interval contains the
/// target. Otherwise `backup` wins if the target lies in
/// `[backup.pts, current.pts)`. When neither matches, `current` is returned
/// if present, else `backup`, both flagged inexact.
pub fn choose_picture<F>(
    current: Option<&DecodedPicture<F>>,
    backup: Option<&DecodedPicture<F>>,
    target_pts: i64,
) -> Option<PictureChoice> {
    if let Some(current) = current {
        if current.contains(target_pts) {
            return Some(PictureChoice {
                source: PictureSource::Current,
                exact: true,
            });
        }
        if backup.is_some_and(|backup| backup.pts <= target_pts && target_pts < current.pts) {
            return Some(PictureChoice {
                source: PictureSource::Backup,
                exact: true,
            });
        }
        return Some(PictureChoice {
            source: PictureSource::Current,
            exact: false,
        });
    }
    backup.map(|_| PictureChoice {
        source: PictureSource::Backup,
        exact: false,
    })
}

impl<B: MediaBackend> FetchEngine<B> {
    /// Decode forward until the newest picture's timestamp reaches
    /// `target_pts`, or decoding fails.
    ///
    /// Before each decode the current picture moves to the backup slot, so
    /// the two most recent pictures bracket the target when the loop ends.
    pub(crate) fn scan_to_target(&mut self, target_pts: i64) {
        let start_keyframe_pts = self.tracker.current_keyframe_pts;
        let mut reported_gop = false;

        while self.tracker.current_pts.is_none_or(|pts| pts < target_pts) {
            emit!(
                self.log,
                Trace,
                "frameseek::scan",
                "looking for pts {target_pts}, current pts {:?}, backup pts {:?}",
                self.tracker.current_pts,
                self.tracker.backup.as_ref().map(|picture| picture.pts)
            );
            self.tracker.store_backup(target_pts);
            let decoded = self.decode_one();

            if self.tracker.must_seek_before_decode
                && start_keyframe_pts != self.tracker.current_keyframe_pts
                && !reported_gop
            {
                emit!(
                    self.log,
                    Error,
                    "frameseek::scan",
                    "decoded frame belongs to an unexpected GOP (expected key frame {:?}, found {:?})",
                    start_keyframe_pts,
                    self.tracker.current_keyframe_pts
                );
                reported_gop = true;
            }

            if !decoded {
                break;
            }
        }
    }

    /// Produce the next picture into the `current` slot.
    ///
    /// Pictures already buffered in the decoder are taken first. After that,
    /// packets are read and submitted until one comes out. At end of stream
    /// the decoder is drained once. On failure `current` is left empty.
    pub(crate) fn decode_one(&mut self) -> bool {
        if let Some(picture) = self.receive() {
            self.tracker.record_picture(picture);
            return true;
        }
        self.tracker.packet = None;

        loop {
            match self.backend.read_packet() {
                Ok(Some(packet)) => {
                    emit!(
                        self.log,
                        Trace,
                        "frameseek::scan",
                        "read packet pts {:?} dts {:?} key {}",
                        packet.pts(),
                        packet.dts(),
                        packet.is_key()
                    );
                    if let Err(error) = self.backend.send_packet(&packet) {
                        emit!(self.log, Debug, "frameseek::scan", "decoder rejected packet: {error}");
                    }
                    self.tracker.packet = Some(packet);
                    if let Some(picture) = self.receive() {
                        self.tracker.record_picture(picture);
                        return true;
                    }
                    self.tracker.packet = None;
                }
                Ok(None) => {
                    if let Err(error) = self.backend.send_eof() {
                        emit!(self.log, Debug, "frameseek::scan", "draining decoder failed: {error}");
                    }
                    if let Some(picture) = self.receive() {
                        self.tracker.record_picture(picture);
                        return true;
                    }
                    emit!(self.log, Debug, "frameseek::scan", "end of stream, decoder is empty");
                    self.tracker.current = None;
                    return false;
                }
                Err(error) => {
                    emit!(self.log, Error, "frameseek::scan", "error while reading packet: {error}");
                    self.tracker.current = None;
                    return false;
                }
            }
        }
    }

    fn receive(&mut self) -> Option<DecodedPicture<B::Frame>> {
        match self.backend.receive_picture() {
            Ok(picture) => {
                if let Some(picture) = &picture {
                    emit!(
                        self.log,
                        Trace,
                        "frameseek::scan",
                        "decoded picture pts {} duration {} key {}",
                        picture.pts,
                        picture.duration,
                        picture.key_frame
                    );
                }
                picture
            }
            Err(error) => {
                emit!(self.log, Debug, "frameseek::scan", "decoder error: {error}");
                None
            }
        }
    }
}
