//! The FFmpeg-backed [`MediaBackend`].
//!
//! Opens the container with `ffmpeg-next`, analyses the selected video
//! stream once, and exposes packet reading, decoding, seeking and RGBA
//! conversion to the fetch engine. Seeking goes through `av_seek_frame`
//! directly because the engine needs backward, stream-relative and byte
//! seeks, which the safe wrapper does not offer.

use std::{os::raw::c_int, path::Path, ptr};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{Context as CodecContext, threading},
    color::Range as ColorRange,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use ffmpeg_sys_next::{
    AV_PIX_FMT_FLAG_ALPHA, AVColorSpace, AVFMT_GENERIC_INDEX, AVFMT_TS_DISCONT, AVPixelFormat, AVSEEK_FLAG_BACKWARD,
    AVSEEK_FLAG_BYTE,
};
use image::RgbaImage;

use crate::{
    backend::{CompressedPacket, MediaBackend, SeekTarget, StreamInfo},
    config::OpenOptions,
    conversion::packed_rgba,
    diagnostics::{FetchLog, emit},
    error::FrameSeekError,
    position::DecodedPicture,
    timestamp::steps_per_frame,
};

const AV_TIME_BASE: f64 = 1_000_000.0;

/// Container formats that need byte seeking when an index is in use.
const BYTE_SEEK_FORMATS: &[&str] = &["mpegts"];

impl CompressedPacket for Packet {
    fn pts(&self) -> Option<i64> {
        Packet::pts(self)
    }

    fn dts(&self) -> Option<i64> {
        Packet::dts(self)
    }

    fn is_key(&self) -> bool {
        Packet::is_key(self)
    }

    fn position(&self) -> Option<i64> {
        let position = Packet::position(self);
        (position >= 0).then_some(position as i64)
    }
}

struct Scaler {
    context: ScalingContext,
    format: Pixel,
    width: u32,
    height: u32,
}

/// Demuxer, decoder and RGBA converter for one video stream of a file.
pub struct FfmpegBackend {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    info: StreamInfo,
    scaler: Option<Scaler>,
    log: FetchLog,
}

impl FfmpegBackend {
    /// Open `path` and prepare a decoder for the configured video stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::FileOpen`] if the container, its stream
    /// information or the codec cannot be opened, and
    /// [`FrameSeekError::NoVideoStream`] if the file has too few video
    /// streams.
    pub fn open<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self, FrameSeekError> {
        let path = path.as_ref();
        let file_open = |reason: String| FrameSeekError::FileOpen {
            path: path.to_path_buf(),
            reason,
        };
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let log = options.fetch_log(&label);

        emit!(log, Debug, "frameseek::open", "opening {}", path.display());

        ffmpeg_next::init().map_err(|error| file_open(format!("FFmpeg initialisation failed: {error}")))?;
        let input = ffmpeg_next::format::input(&path).map_err(|error| file_open(error.to_string()))?;

        let stream = input
            .streams()
            .filter(|stream| stream.parameters().medium() == Type::Video)
            .nth(options.stream_index)
            .ok_or(FrameSeekError::NoVideoStream {
                ordinal: options.stream_index,
            })?;
        let stream_index = stream.index();

        let mut context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| file_open(format!("Failed to read codec parameters: {error}")))?;
        context.set_threading(threading::Config {
            kind: threading::Type::Frame,
            count: options.decoder_threads.unwrap_or(0),
            ..threading::Config::default()
        });
        let decoder = context
            .decoder()
            .video()
            .map_err(|error| file_open(format!("Failed to open video decoder: {error}")))?;
        if decoder.format() == Pixel::None {
            return Err(file_open("decoder reports no pixel format".to_string()));
        }

        let time_base = stream.time_base();
        let frame_rate = Rational::from(unsafe {
            ffmpeg_sys_next::av_guess_frame_rate(
                input.as_ptr() as *mut _,
                stream.as_ptr() as *mut _,
                ptr::null_mut(),
            )
        });
        let start_pts = known(stream.start_time());
        let start_offset = start_pts.map_or(0.0, |pts| pts as f64 * f64::from(time_base));

        let audio_start = input
            .streams()
            .find(|stream| stream.parameters().medium() == Type::Audio)
            .and_then(|audio| known(audio.start_time()).map(|pts| pts as f64 * f64::from(audio.time_base())))
            .unwrap_or(0.0);

        let duration_in_frames = estimate_duration_in_frames(DurationFacts {
            stream_frames: stream.frames(),
            stream_duration: known(stream.duration()),
            container_duration: known(input.duration()),
            time_base,
            frame_rate,
            video_start: start_offset,
            audio_start,
        });

        let format_name = input.format().name().to_string();
        let format_flags = unsafe { (*input.format().as_ptr()).flags };
        let byte_seek = needs_byte_seek(&format_name, format_flags & AVFMT_TS_DISCONT as c_int != 0);
        let native_seek = has_native_seek(format_flags);

        let descriptor = unsafe { ffmpeg_sys_next::av_pix_fmt_desc_get(AVPixelFormat::from(decoder.format())) };
        let has_alpha = !descriptor.is_null() && has_alpha_plane(unsafe { (*descriptor).flags });
        let codec_name = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = StreamInfo {
            time_base,
            frame_rate,
            start_pts,
            start_offset,
            duration_in_frames,
            width: decoder.width(),
            height: decoder.height(),
            has_alpha,
            format_name,
            codec_name,
            byte_seek,
            native_seek,
        };

        emit!(
            log,
            Debug,
            "frameseek::open",
            "stream {stream_index}: {}x{} {} @ {}/{} fps, time base {}/{}, {} frames, format {} (byte seek: {}, native seek: {})",
            info.width,
            info.height,
            info.codec_name,
            frame_rate.numerator(),
            frame_rate.denominator(),
            time_base.numerator(),
            time_base.denominator(),
            info.duration_in_frames,
            info.format_name,
            info.byte_seek,
            info.native_seek
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            info,
            scaler: None,
            log,
        })
    }

    fn scaler_for(&mut self, frame: &VideoFrame) -> Result<&mut ScalingContext, FrameSeekError> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let stale = self
            .scaler
            .as_ref()
            .is_none_or(|scaler| scaler.format != format || scaler.width != width || scaler.height != height);

        if stale {
            let mut context = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGBA,
                width,
                height,
                ScalingFlags::BILINEAR | ScalingFlags::FULL_CHR_H_INT,
            )?;
            if !self.apply_source_range(&mut context) {
                emit!(self.log, Warn, "frameseek::open", "could not set colorspace details for conversion");
            }
            emit!(
                self.log,
                Debug,
                "frameseek::open",
                "conversion context {format:?} {width}x{height} -> RGBA"
            );
            self.scaler = Some(Scaler {
                context,
                format,
                width,
                height,
            });
        }

        self.scaler
            .as_mut()
            .map(|scaler| &mut scaler.context)
            .ok_or_else(|| FrameSeekError::FfmpegError("no conversion context".to_string()))
    }

    /// Honour full-range (JPEG) YCbCr input and the stream's colour matrix.
    fn apply_source_range(&self, context: &mut ScalingContext) -> bool {
        let full_range = self.decoder.color_range() == ColorRange::JPEG;
        let color_space = AVColorSpace::from(self.decoder.color_space());

        unsafe {
            let mut inv_table: *mut c_int = ptr::null_mut();
            let mut table: *mut c_int = ptr::null_mut();
            let (mut src_range, mut dst_range) = (0, 0);
            let (mut brightness, mut contrast, mut saturation) = (0, 0, 0);

            if ffmpeg_sys_next::sws_getColorspaceDetails(
                context.as_mut_ptr(),
                &mut inv_table,
                &mut src_range,
                &mut table,
                &mut dst_range,
                &mut brightness,
                &mut contrast,
                &mut saturation,
            ) < 0
            {
                return false;
            }

            let coefficients = ffmpeg_sys_next::sws_getCoefficients(color_space as c_int);
            ffmpeg_sys_next::sws_setColorspaceDetails(
                context.as_mut_ptr(),
                coefficients,
                c_int::from(src_range != 0 || full_range),
                table,
                dst_range,
                brightness,
                contrast,
                saturation,
            ) >= 0
        }
    }

    /// Container index of the selected video stream.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = Packet;
    type Frame = VideoFrame;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn coded_size(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, FrameSeekError> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(Some(packet)),
                Ok(()) => continue,
                Err(FfmpegError::Eof) => return Ok(None),
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), FrameSeekError> {
        self.decoder.send_packet(packet).map_err(FrameSeekError::from)
    }

    fn send_eof(&mut self) -> Result<(), FrameSeekError> {
        self.decoder.send_eof().map_err(FrameSeekError::from)
    }

    fn receive_picture(&mut self) -> Result<Option<DecodedPicture<VideoFrame>>, FrameSeekError> {
        let mut frame = VideoFrame::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {}
            Err(FfmpegError::Eof) => return Ok(None),
            Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        }

        let packet_dts = known(unsafe { (*frame.as_ptr()).pkt_dts });
        let pts = frame
            .pts()
            .or(packet_dts)
            .or_else(|| frame.timestamp())
            .unwrap_or(0);
        let raw_duration = unsafe { (*frame.as_ptr()).duration };
        let duration = if raw_duration > 0 {
            raw_duration
        } else {
            (steps_per_frame(self.info.frame_rate, self.info.time_base).round() as i64).max(1)
        };
        let key_frame = frame.is_key();

        Ok(Some(DecodedPicture {
            frame,
            pts,
            duration,
            key_frame,
        }))
    }

    fn seek(&mut self, target: SeekTarget) -> Result<(), FrameSeekError> {
        let (stream, timestamp, flags) = match target {
            SeekTarget::Timestamp(pts) => (self.stream_index as c_int, pts, AVSEEK_FLAG_BACKWARD as c_int),
            SeekTarget::Byte(position) => (-1, position, AVSEEK_FLAG_BYTE as c_int),
        };
        let result = unsafe { ffmpeg_sys_next::av_seek_frame(self.input.as_mut_ptr(), stream, timestamp, flags) };
        if result < 0 {
            return Err(FfmpegError::from(result).into());
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<RgbaImage, FrameSeekError> {
        let (width, height) = (frame.width(), frame.height());
        let mut rgba = VideoFrame::empty();
        self.scaler_for(frame)?.run(frame, &mut rgba)?;

        let buffer = packed_rgba(&rgba, width, height)?;
        RgbaImage::from_raw(width, height, buffer).ok_or_else(|| {
            FrameSeekError::FormatAssumption(format!("RGBA buffer does not match {width}x{height}"))
        })
    }

    fn tags(&self) -> Vec<(String, String)> {
        self.input
            .metadata()
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

/// Inputs for [`estimate_duration_in_frames`], in container units.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DurationFacts {
    /// Declared frame count (0 when unknown).
    pub stream_frames: i64,
    /// Stream duration in the stream time base.
    pub stream_duration: Option<i64>,
    /// Container duration in microseconds.
    pub container_duration: Option<i64>,
    pub time_base: Rational,
    pub frame_rate: Rational,
    /// Video and audio start offsets in seconds.
    pub video_start: f64,
    pub audio_start: f64,
}

/// Estimate the number of frames in the video stream.
///
/// A declared frame count wins unless it implies a stream more than four
/// times longer than the container. Otherwise the stream duration is used,
/// or the container duration minus the video's late start relative to
/// audio, multiplied by the frame rate and rounded.
pub(crate) fn estimate_duration_in_frames(facts: DurationFacts) -> i64 {
    let fps = f64::from(facts.frame_rate);
    let container_seconds = facts.container_duration.map(|duration| duration as f64 / AV_TIME_BASE);

    if facts.stream_frames > 0 {
        let plausible = match container_seconds {
            Some(container) if fps > 0.0 && container > 0.0 => {
                facts.stream_frames as f64 / fps <= 4.0 * container
            }
            _ => true,
        };
        if plausible {
            return facts.stream_frames;
        }
    }

    let Some(container_seconds) = container_seconds else {
        return 0;
    };
    let stream_seconds = match facts.stream_duration {
        Some(duration) => duration as f64 * f64::from(facts.time_base),
        None if facts.video_start > facts.audio_start => {
            container_seconds - (facts.video_start - facts.audio_start)
        }
        None => container_seconds,
    };
    (stream_seconds * fps + 0.5) as i64
}

/// Whether a container must be seeked by byte offset.
pub(crate) fn needs_byte_seek(format_name: &str, timestamp_discontinuities: bool) -> bool {
    timestamp_discontinuities
        || format_name
            .split(',')
            .any(|name| BYTE_SEEK_FORMATS.iter().any(|format| name.trim().eq_ignore_ascii_case(format)))
}

/// Whether the demuxer seeks by timestamp itself.
///
/// Demuxers without their own seek callback fall back to FFmpeg's generic
/// index search, which can land on any packet. Since FFmpeg 7 the callback is
/// private, so this is approximated from the format flags: formats that
/// build a generic index or have timestamp discontinuities (MPEG transport
/// and program streams) count as non-native.
pub(crate) fn has_native_seek(format_flags: c_int) -> bool {
    format_flags & (AVFMT_GENERIC_INDEX | AVFMT_TS_DISCONT) as c_int == 0
}

/// Whether a pixel format descriptor's flags mark an alpha plane.
pub(crate) fn has_alpha_plane(descriptor_flags: u64) -> bool {
    descriptor_flags & u64::from(AV_PIX_FMT_FLAG_ALPHA) != 0
}

fn known(timestamp: i64) -> Option<i64> {
    (timestamp != ffmpeg_sys_next::AV_NOPTS_VALUE).then_some(timestamp)
}
