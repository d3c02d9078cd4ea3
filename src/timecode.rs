//! Timecode indices: an external mapping from frame index to presentation
//! timestamp and the key frame to seek to.
//!
//! [`TimecodeIndex`] is the lookup interface the seek planner consumes.
//! [`FrameIndex`] is the in-memory implementation, built either from
//! explicit entries or by scanning the stream with
//! [`StreamHandle::build_index`](crate::StreamHandle::build_index).

use crate::{error::FrameSeekError, timestamp::pts_or_dts};

/// How frame numbers are assigned to decoded pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimecodeKind {
    /// No index; frame positions are estimated from the frame rate.
    #[default]
    None,
    /// Frame numbers follow the presentation timestamps, so dropped frames
    /// leave gaps.
    RecordRun,
    /// Frame numbers count decoded pictures, with no gaps.
    RecordRunNoGaps,
}

/// Lookup interface over a timecode index.
///
/// Slots are positions in the index's entry table; frame indices map onto
/// slots through [`frame_slot`](TimecodeIndex::frame_slot).
pub trait TimecodeIndex: Send + Sync {
    /// Slot of the first entry whose frame number is `>= frame_index`,
    /// clamped to the last slot.
    fn frame_slot(&self, frame_index: i64) -> usize;

    /// Presentation timestamp of the picture in `slot`.
    fn pts(&self, slot: usize) -> i64;

    /// Byte offset of the key frame that starts the slot's group of pictures.
    fn seek_pos(&self, slot: usize) -> i64;

    /// Presentation timestamp of that key frame.
    fn seek_pos_pts(&self, slot: usize) -> Option<i64>;

    /// Decode timestamp of that key frame.
    fn seek_pos_dts(&self, slot: usize) -> Option<i64>;

    /// Whether decoding can continue forward from `from_slot` to `to_slot`
    /// without seeking.
    fn can_scan(&self, from_slot: usize, to_slot: usize) -> bool;

    /// Number of frames the index covers.
    fn duration(&self) -> i64;
}

/// One row of a [`FrameIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Frame number under the index's [`TimecodeKind`].
    pub frame_number: i64,
    /// Byte offset of the governing key frame packet (-1 when unknown).
    pub seek_pos: i64,
    /// Presentation timestamp of the governing key frame.
    pub seek_pos_pts: Option<i64>,
    /// Decode timestamp of the governing key frame.
    pub seek_pos_dts: Option<i64>,
    /// Presentation timestamp of this frame.
    pub pts: i64,
}

/// Timing facts about one packet, recorded while scanning a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    /// Presentation timestamp, if the container provides one.
    pub pts: Option<i64>,
    /// Decode timestamp, if the container provides one.
    pub dts: Option<i64>,
    /// Whether the packet starts a key frame.
    pub is_key: bool,
    /// Byte offset in the file, when known.
    pub position: Option<i64>,
}

/// An in-memory timecode index, sorted by frame number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameIndex {
    entries: Vec<IndexEntry>,
}

impl FrameIndex {
    /// Build an index from explicit entries.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::InvalidIndex`] if `entries` is empty or its
    /// frame numbers decrease.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self, FrameSeekError> {
        if entries.is_empty() {
            return Err(FrameSeekError::InvalidIndex("index has no entries".to_string()));
        }
        if let Some(pair) = entries
            .windows(2)
            .find(|pair| pair[1].frame_number < pair[0].frame_number)
        {
            return Err(FrameSeekError::InvalidIndex(format!(
                "frame numbers decrease from {} to {}",
                pair[0].frame_number, pair[1].frame_number
            )));
        }
        Ok(Self { entries })
    }

    /// Build an index from packets in decode order.
    ///
    /// Each packet inherits the most recent key frame as its seek point.
    /// Pictures are then ordered by presentation time and numbered according
    /// to `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::InvalidIndex`] if `kind` is
    /// [`TimecodeKind::None`] or no packet carries a timestamp.
    pub fn from_packets(
        kind: TimecodeKind,
        packets: &[PacketRecord],
        steps_per_frame: f64,
        start_pts: i64,
    ) -> Result<Self, FrameSeekError> {
        if kind == TimecodeKind::None {
            return Err(FrameSeekError::InvalidIndex(
                "cannot build an index without a timecode kind".to_string(),
            ));
        }

        let mut gop: Option<&PacketRecord> = None;
        let mut rows: Vec<(i64, &PacketRecord)> = Vec::with_capacity(packets.len());
        for packet in packets {
            if packet.is_key {
                gop = Some(packet);
            }
            // Leading pictures before the first key frame cannot be reached.
            let (Some(pts), Some(key)) = (pts_or_dts(packet.pts, packet.dts), gop) else {
                continue;
            };
            rows.push((pts, key));
        }
        rows.sort_by_key(|(pts, _)| *pts);
        rows.dedup_by_key(|(pts, _)| *pts);

        let entries = rows
            .into_iter()
            .enumerate()
            .map(|(slot, (pts, key))| {
                let frame_number = match kind {
                    TimecodeKind::RecordRun => {
                        ((pts - start_pts) as f64 / steps_per_frame).round() as i64
                    }
                    _ => slot as i64,
                };
                IndexEntry {
                    frame_number,
                    seek_pos: key.position.unwrap_or(-1),
                    seek_pos_pts: key.pts,
                    seek_pos_dts: key.dts,
                    pts,
                }
            })
            .collect();

        Self::from_entries(entries)
    }

    /// The index's entries, sorted by frame number.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn entry(&self, slot: usize) -> &IndexEntry {
        // Non-empty by construction.
        &self.entries[slot.min(self.entries.len() - 1)]
    }
}

impl TimecodeIndex for FrameIndex {
    fn frame_slot(&self, frame_index: i64) -> usize {
        let slot = self
            .entries
            .partition_point(|entry| entry.frame_number < frame_index);
        slot.min(self.entries.len() - 1)
    }

    fn pts(&self, slot: usize) -> i64 {
        self.entry(slot).pts
    }

    fn seek_pos(&self, slot: usize) -> i64 {
        self.entry(slot).seek_pos
    }

    fn seek_pos_pts(&self, slot: usize) -> Option<i64> {
        self.entry(slot).seek_pos_pts
    }

    fn seek_pos_dts(&self, slot: usize) -> Option<i64> {
        self.entry(slot).seek_pos_dts
    }

    fn can_scan(&self, from_slot: usize, to_slot: usize) -> bool {
        let (from, to) = (self.entry(from_slot), self.entry(to_slot));
        to_slot > from_slot
            && from.seek_pos == to.seek_pos
            && from.seek_pos_pts == to.seek_pos_pts
            && from.seek_pos_dts == to.seek_pos_dts
    }

    fn duration(&self) -> i64 {
        self.entries.last().map_or(0, |entry| entry.frame_number + 1)
    }
}
