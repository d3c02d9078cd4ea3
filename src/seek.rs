//! Seek planning.
//!
//! Before every fetch the planner decides whether the decoder can keep
//! reading forward or has to be repositioned. Repositioning goes one of two
//! ways:
//!
//! * **With a timecode index**, the index names the key frame to seek to and
//!   whether the target is reachable by scanning forward from the current
//!   position.
//! * **Without an index**, the planner seeks a few frames before the
//!   estimated target timestamp. Demuxers without native timestamp seeking
//!   get a backward search for a key frame first. After the seek, the first
//!   packet is inspected to find out whether the decoder already sits in the
//!   right group of pictures, in which case its buffers are kept.
//!
//! Seek errors are logged and never fail the fetch; decoding resumes from
//! wherever the demuxer ended up.

use crate::{
    backend::{CompressedPacket, MediaBackend, SeekTarget},
    diagnostics::emit,
    error::FrameSeekError,
    handle::FetchEngine,
    timecode::TimecodeIndex,
    timestamp::{pts_or_dts, seek_margin_pts, steps_per_frame},
};

impl<B: MediaBackend> FetchEngine<B> {
    /// Decide whether the request breaks sequential decoding.
    ///
    /// Only a request for exactly the next frame, with a picture already
    /// decoded, may continue without a seek.
    pub(crate) fn must_seek(&mut self, frame_index: i64) -> bool {
        let sequential = self
            .tracker
            .current_frame_index
            .is_some_and(|current| frame_index == current + 1);
        let must_seek = !sequential || self.tracker.is_first_decode();
        self.tracker.must_seek_before_decode = must_seek;
        must_seek
    }

    /// Reposition the decoder for `frame_index` if needed.
    ///
    /// Returns `true` when the decoder was flushed and the scan will start
    /// from a fresh group of pictures.
    pub(crate) fn plan_and_execute_seek(
        &mut self,
        frame_index: i64,
        target_pts: i64,
        index: Option<&dyn TimecodeIndex>,
    ) -> bool {
        if !self.must_seek(frame_index) {
            return false;
        }
        match index {
            Some(index) => self.seek_with_index(frame_index, index),
            None => self.seek_without_index(frame_index, target_pts),
        }
    }

    fn seek_with_index(&mut self, frame_index: i64, index: &dyn TimecodeIndex) -> bool {
        let new_slot = index.frame_slot(frame_index);

        let scannable_from = self
            .tracker
            .current_frame_index
            .filter(|_| !self.tracker.is_first_decode())
            .filter(|current| index.can_scan(index.frame_slot(*current), new_slot));
        if let Some(current) = scannable_from {
            emit!(
                self.log,
                Debug,
                "frameseek::seek",
                "frame {frame_index} is reachable from frame {current} without seeking"
            );
            return false;
        }

        let keyframe_pts = pts_or_dts(index.seek_pos_pts(new_slot), index.seek_pos_dts(new_slot));
        self.tracker.current_keyframe_pts = keyframe_pts;

        let seek_pos = index.seek_pos(new_slot);
        let target = if self.backend.info().byte_seek && seek_pos >= 0 {
            SeekTarget::Byte(seek_pos)
        } else {
            SeekTarget::Timestamp(keyframe_pts.unwrap_or(0))
        };
        emit!(
            self.log,
            Debug,
            "frameseek::seek",
            "index seek for frame {frame_index}: {target:?} (slot {new_slot})"
        );

        let result = self.backend.seek(target);
        self.finish_seek(target, result);
        true
    }

    fn seek_without_index(&mut self, frame_index: i64, target_pts: i64) -> bool {
        let info = self.backend.info();
        let steps = steps_per_frame(info.frame_rate, info.time_base);
        let native_seek = info.native_seek;
        let mut seek_pts = seek_margin_pts(target_pts, steps, self.tuning.margin_frames);

        let result = if native_seek {
            self.backend.seek(SeekTarget::Timestamp(seek_pts))
        } else {
            self.search_keyframe(&mut seek_pts, target_pts, steps)
        };
        emit!(
            self.log,
            Debug,
            "frameseek::seek",
            "seek for frame {frame_index}: target pts {target_pts}, seek pts {seek_pts}"
        );

        if result.is_ok() && !self.seek_buffers_need_flushing(frame_index, seek_pts) {
            return false;
        }
        self.finish_seek(SeekTarget::Timestamp(seek_pts), result);
        true
    }

    /// Step backward from `seek_pts` until the first packet after a seek is
    /// a key frame at or before `target_pts`.
    ///
    /// Generic demuxer seeks can land on any packet, which would start
    /// decoding mid-GOP. Stops early when the landing point stops moving or
    /// the start of the stream is reached. Leaves `seek_pts` at the chosen
    /// position and seeks there.
    fn search_keyframe(
        &mut self,
        seek_pts: &mut i64,
        target_pts: i64,
        steps: f64,
    ) -> Result<(), FrameSeekError> {
        let requested = *seek_pts;
        let mut current = requested;
        let mut previous: Option<Option<i64>> = None;

        for offset in 0..i64::from(self.tuning.max_search_steps) {
            if current == 0 && (offset > 0 || requested == 0) {
                break;
            }
            current = (requested - (offset as f64 * steps).round() as i64).max(0);
            if self.backend.seek(SeekTarget::Timestamp(current)).is_err() {
                break;
            }

            let (is_key, landed_pts) = match self.backend.read_packet() {
                Ok(Some(packet)) => (packet.is_key(), packet.timestamp()),
                _ => (false, None),
            };
            emit!(
                self.log,
                Trace,
                "frameseek::seek",
                "key frame search: seek to {current} landed on {landed_pts:?} (key: {is_key})"
            );

            if is_key && landed_pts.is_some_and(|pts| pts <= target_pts) {
                break;
            }
            if previous == Some(landed_pts) {
                break;
            }
            previous = Some(landed_pts);
        }

        *seek_pts = current;
        self.backend.seek(SeekTarget::Timestamp(current))
    }

    /// Inspect the first packet after a seek.
    ///
    /// Returns `false` when the decoder's buffered state is still valid: the
    /// seek landed on the packet being decoded, or on the current group of
    /// pictures while moving forward (the demuxer is then advanced back to
    /// where it was). Otherwise seeks back to `seek_pts`, records the landing
    /// key frame and returns `true`.
    fn seek_buffers_need_flushing(&mut self, frame_index: i64, seek_pts: i64) -> bool {
        let gop_pts = match self.backend.read_packet() {
            Ok(Some(packet)) => packet.timestamp(),
            Ok(None) => None,
            Err(error) => {
                emit!(self.log, Debug, "frameseek::seek", "probe read after seek failed: {error}");
                None
            }
        };
        let packet_pts = self.tracker.packet.as_ref().and_then(|packet| packet.timestamp());

        if gop_pts.is_some() && gop_pts == packet_pts {
            emit!(
                self.log,
                Debug,
                "frameseek::seek",
                "seek landed on the packet being decoded, keeping decoder buffers"
            );
            return false;
        }

        let moving_forward = self
            .tracker
            .current_frame_index
            .is_some_and(|current| frame_index > current);
        if gop_pts.is_some() && gop_pts == self.tracker.current_keyframe_pts && moving_forward {
            emit!(
                self.log,
                Debug,
                "frameseek::seek",
                "target is in the current GOP, restoring stream position"
            );
            self.restore_stream_position(packet_pts);
            return false;
        }

        if let Err(error) = self.backend.seek(SeekTarget::Timestamp(seek_pts)) {
            emit!(self.log, Warn, "frameseek::seek", "re-seek to {seek_pts} failed: {error}");
        }
        self.tracker.current_keyframe_pts = gop_pts;
        true
    }

    /// Read forward until the packet last handed to the decoder comes by
    /// again, so the next read continues where decoding left off.
    fn restore_stream_position(&mut self, packet_pts: Option<i64>) {
        let Some(packet_pts) = packet_pts else {
            return;
        };
        loop {
            match self.backend.read_packet() {
                Ok(Some(packet)) if packet.timestamp() == Some(packet_pts) => break,
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    emit!(
                        self.log,
                        Warn,
                        "frameseek::seek",
                        "stream ended before packet {packet_pts} was found again"
                    );
                    break;
                }
            }
        }
    }

    /// Flush after a seek and forget decode state; seek errors are only
    /// logged.
    fn finish_seek(&mut self, target: SeekTarget, result: Result<(), FrameSeekError>) {
        if let Err(error) = result {
            emit!(
                self.log,
                Error,
                "frameseek::seek",
                "error while seeking to {target:?}: {error}"
            );
        }
        self.backend.flush();
        self.tracker.reset_after_seek();
    }
}
