//! A deterministic in-memory backend for exercising seek planning.
//!
//! Frame `n` is one packet with pts `start_pts + n * 25` in a 1/600 time base
//! at 24 fps. Key frames repeat every `gop_size` frames. Decoded pictures
//! encode their frame number in the red and green channels, so tests can
//! tell exactly which frame a fetch delivered.
//!
//! Optional knobs shift timestamps after a gap, store packets in B-frame
//! decode order (pairs after each key frame swapped, dts behind pts), and
//! make timestamp seeks overshoot to the next key frame.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use ffmpeg_next::Rational;
use frameseek::{
    CompressedPacket, DecodedPicture, FrameSeekError, MediaBackend, OpenOptions, SeekTarget, StreamHandle, StreamInfo,
};
use image::{DynamicImage, Rgba, RgbaImage};
use log::{Level, Log, Metadata, Record};

pub const STEPS: i64 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticPacket {
    pub frame_number: u32,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub key: bool,
    pub position: i64,
}

impl CompressedPacket for SyntheticPacket {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn dts(&self) -> Option<i64> {
        self.dts
    }

    fn is_key(&self) -> bool {
        self.key
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }
}

/// Counts pictures that are still alive.
#[derive(Debug)]
pub struct LiveToken(Arc<AtomicUsize>);

impl LiveToken {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct SyntheticFrame {
    pub frame_number: u32,
    _live: LiveToken,
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub frame_count: u32,
    /// Declared duration; may exceed `frame_count` to simulate a stream that
    /// ends early.
    pub declared_frames: i64,
    pub gop_size: u32,
    pub start_pts: i64,
    pub width: u32,
    pub height: u32,
    pub native_seek: bool,
    pub byte_seek: bool,
    /// Pictures held back by the decoder before output starts.
    pub decoder_delay: usize,
    pub fail_seeks: bool,
    pub fail_convert: bool,
    /// From this frame on, pictures have a different coded size.
    pub resize_from: Option<(u32, u32, u32)>,
    /// From this frame on, timestamps are pushed later by the given ticks.
    pub timestamp_gap: Option<(u32, i64)>,
    /// Store packets in decode order with swapped pairs, like B-frames.
    pub reorder: bool,
    /// Timestamp seeks from this seek call on land on the first key frame at
    /// or after the target instead of before it.
    pub overshoot_from_seek: Option<usize>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frame_count: 30,
            declared_frames: 30,
            gop_size: 10,
            start_pts: 0,
            width: 8,
            height: 4,
            native_seek: true,
            byte_seek: false,
            decoder_delay: 0,
            fail_seeks: false,
            fail_convert: false,
            resize_from: None,
            timestamp_gap: None,
            reorder: false,
            overshoot_from_seek: None,
        }
    }
}

pub struct SyntheticBackend {
    config: SyntheticConfig,
    info: StreamInfo,
    packets: Vec<SyntheticPacket>,
    cursor: usize,
    pending: VecDeque<u32>,
    draining: bool,
    last_output: Option<u32>,
    live: Arc<AtomicUsize>,
    pub seeks: Vec<SeekTarget>,
    pub flushes: usize,
    pub packets_read: usize,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        let packets = decode_order(&config)
            .into_iter()
            .enumerate()
            .map(|(decode_index, n)| {
                let pts = presentation_pts(&config, n);
                let dts = if config.reorder {
                    config.start_pts + (decode_index as i64 - 1) * STEPS
                } else {
                    pts
                };
                SyntheticPacket {
                    frame_number: n,
                    pts: Some(pts),
                    dts: Some(dts),
                    key: n % config.gop_size == 0,
                    position: 1000 + decode_index as i64 * 100,
                }
            })
            .collect();
        let info = StreamInfo {
            time_base: Rational::new(1, 600),
            frame_rate: Rational::new(24, 1),
            start_pts: Some(config.start_pts),
            start_offset: config.start_pts as f64 / 600.0,
            duration_in_frames: config.declared_frames,
            width: config.width,
            height: config.height,
            has_alpha: false,
            format_name: "synthetic".to_string(),
            codec_name: "counter".to_string(),
            byte_seek: config.byte_seek,
            native_seek: config.native_seek,
        };
        Self {
            config,
            info,
            packets,
            cursor: 0,
            pending: VecDeque::new(),
            draining: false,
            last_output: None,
            live: Arc::new(AtomicUsize::new(0)),
            seeks: Vec::new(),
            flushes: 0,
            packets_read: 0,
        }
    }

    /// Shared counter of pictures not yet dropped.
    pub fn live_pictures(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    pub fn pts_of(&self, frame_number: u32) -> i64 {
        presentation_pts(&self.config, frame_number)
    }

    fn size_of(&self, frame_number: u32) -> (u32, u32) {
        match self.config.resize_from {
            Some((from, width, height)) if frame_number >= from => (width, height),
            _ => (self.config.width, self.config.height),
        }
    }
}

impl MediaBackend for SyntheticBackend {
    type Packet = SyntheticPacket;
    type Frame = SyntheticFrame;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn coded_size(&self) -> (u32, u32) {
        match self.last_output {
            Some(frame_number) => self.size_of(frame_number),
            None => (self.config.width, self.config.height),
        }
    }

    fn read_packet(&mut self) -> Result<Option<SyntheticPacket>, FrameSeekError> {
        let packet = self.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
            self.packets_read += 1;
        }
        Ok(packet)
    }

    fn send_packet(&mut self, packet: &SyntheticPacket) -> Result<(), FrameSeekError> {
        if self.draining {
            return Err(FrameSeekError::FfmpegError("decoder is draining".to_string()));
        }
        self.pending.push_back(packet.frame_number);
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), FrameSeekError> {
        self.draining = true;
        Ok(())
    }

    fn receive_picture(&mut self) -> Result<Option<DecodedPicture<SyntheticFrame>>, FrameSeekError> {
        let delay = if self.config.reorder {
            self.config.decoder_delay.max(1)
        } else {
            self.config.decoder_delay
        };
        if self.pending.len() <= delay && !self.draining {
            return Ok(None);
        }
        // Pictures leave the decoder in presentation order.
        let Some(slot) = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, frame_number)| **frame_number)
            .map(|(slot, _)| slot)
        else {
            return Ok(None);
        };
        let Some(frame_number) = self.pending.remove(slot) else {
            return Ok(None);
        };
        self.last_output = Some(frame_number);
        Ok(Some(DecodedPicture {
            frame: SyntheticFrame {
                frame_number,
                _live: LiveToken::new(&self.live),
            },
            pts: self.pts_of(frame_number),
            duration: STEPS,
            key_frame: frame_number % self.config.gop_size == 0,
        }))
    }

    fn seek(&mut self, target: SeekTarget) -> Result<(), FrameSeekError> {
        self.seeks.push(target);
        if self.config.fail_seeks {
            return Err(FrameSeekError::FfmpegError("seek refused".to_string()));
        }
        let overshoot = self
            .config
            .overshoot_from_seek
            .is_some_and(|from| self.seeks.len() > from);
        if let (true, SeekTarget::Timestamp(ts)) = (overshoot, target) {
            self.cursor = self
                .packets
                .iter()
                .position(|packet| packet.key && packet.pts.is_some_and(|pts| pts >= ts))
                .unwrap_or(self.packets.len());
            return Ok(());
        }
        let native = self.config.native_seek;
        let landing = self.packets.iter().rposition(|packet| match target {
            // A generic seek may land on any packet, not only key frames.
            SeekTarget::Timestamp(ts) => packet.pts.is_some_and(|pts| pts <= ts) && (packet.key || !native),
            SeekTarget::Byte(position) => packet.key && packet.position <= position,
        });
        self.cursor = landing.unwrap_or(0);
        Ok(())
    }

    fn flush(&mut self) {
        self.flushes += 1;
        self.pending.clear();
        self.draining = false;
    }

    fn convert(&mut self, frame: &SyntheticFrame) -> Result<RgbaImage, FrameSeekError> {
        if self.config.fail_convert {
            return Err(FrameSeekError::FormatAssumption("synthetic layout mismatch".to_string()));
        }
        let (width, height) = self.size_of(frame.frame_number);
        let n = frame.frame_number;
        Ok(RgbaImage::from_pixel(
            width,
            height,
            Rgba([(n & 0xff) as u8, (n >> 8) as u8, 7, 255]),
        ))
    }

    fn tags(&self) -> Vec<(String, String)> {
        vec![("title".to_string(), "synthetic".to_string())]
    }
}

fn presentation_pts(config: &SyntheticConfig, frame_number: u32) -> i64 {
    let gap = match config.timestamp_gap {
        Some((from, ticks)) if frame_number >= from => ticks,
        _ => 0,
    };
    config.start_pts + i64::from(frame_number) * STEPS + gap
}

/// Frame numbers in the order their packets are stored.
fn decode_order(config: &SyntheticConfig) -> Vec<u32> {
    if !config.reorder {
        return (0..config.frame_count).collect();
    }
    let mut order = Vec::with_capacity(config.frame_count as usize);
    let mut key = 0;
    while key < config.frame_count {
        let end = (key + config.gop_size).min(config.frame_count);
        order.push(key);
        let mut n = key + 1;
        while n + 1 < end {
            order.extend([n + 1, n]);
            n += 2;
        }
        if n < end {
            order.push(n);
        }
        key = end;
    }
    order
}

pub fn handle(config: SyntheticConfig) -> StreamHandle<SyntheticBackend> {
    StreamHandle::with_backend(SyntheticBackend::new(config), OpenOptions::new())
}

pub fn handle_with(config: SyntheticConfig, options: OpenOptions) -> StreamHandle<SyntheticBackend> {
    StreamHandle::with_backend(SyntheticBackend::new(config), options)
}

/// The frame number a synthetic picture encodes.
pub fn frame_number_of(image: &DynamicImage) -> u32 {
    let pixel = image.to_rgba8().get_pixel(0, 0).0;
    u32::from(pixel[0]) | (u32::from(pixel[1]) << 8)
}

/// A `log` sink that keeps every record.
#[derive(Default)]
pub struct CapturingLogger {
    records: Mutex<Vec<(Level, String, String)>>,
}

impl CapturingLogger {
    pub fn records(&self) -> Vec<(Level, String, String)> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if let Ok(mut records) = self.records.lock() {
            records.push((record.level(), record.target().to_string(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}
