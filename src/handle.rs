//! The stream handle: one open video stream and its decoder position.
//!
//! [`StreamHandle`] turns "give me frame N" into seek and decode calls on a
//! [`MediaBackend`]. Consecutive requests (`N`, `N + 1`, ...) continue
//! decoding without seeking; any other request seeks near the target and
//! scans forward.

use std::{collections::HashMap, path::Path, sync::Arc};

use ffmpeg_next::Rational;
use image::DynamicImage;

use crate::{
    backend::{CompressedPacket, MediaBackend, SeekTarget, StreamInfo},
    config::{OpenOptions, ProxySize, SeekTuning},
    conversion::finish_picture,
    demuxer::FfmpegBackend,
    diagnostics::{FetchLog, emit, path_label},
    error::FrameSeekError,
    metadata::{PreviewFrame, VideoMetadata},
    position::{PositionState, PositionTracker},
    scan::{PictureSource, choose_picture},
    timecode::{FrameIndex, PacketRecord, TimecodeIndex, TimecodeKind},
    timestamp::{estimate_pts, frame_rate_fraction, frames_to_seconds, steps_per_frame},
};

/// A decoded, converted frame.
#[derive(Debug, Clone)]
pub struct FetchedFrame {
    /// The converted picture: RGBA when the stream has alpha, RGB otherwise.
    pub image: DynamicImage,
    /// The frame index that was requested.
    pub frame_index: i64,
    /// Timestamp of the picture that was delivered.
    pub pts: i64,
    /// `false` when no picture covered the target timestamp and the nearest
    /// decoded picture was delivered instead.
    pub exact: bool,
    /// Colorspace tag from [`OpenOptions::with_colorspace`].
    pub colorspace: String,
}

/// Backend, position tracker and logging shared by the seek planner and the
/// decode scanner.
pub(crate) struct FetchEngine<B: MediaBackend> {
    pub(crate) backend: B,
    pub(crate) tracker: PositionTracker<B::Packet, B::Frame>,
    pub(crate) log: FetchLog,
    pub(crate) tuning: SeekTuning,
}

/// An open video stream with frame-accurate random access.
///
/// # Example
///
/// ```no_run
/// use frameseek::{OpenOptions, StreamHandle};
///
/// let mut handle = StreamHandle::open("input.mp4", OpenOptions::new())?;
/// let frame = handle.fetch(120)?;
/// frame.image.save("frame_120.png")?;
/// # Ok::<(), frameseek::FrameSeekError>(())
/// ```
pub struct StreamHandle<B: MediaBackend = FfmpegBackend> {
    engine: FetchEngine<B>,
    options: OpenOptions,
    width: u32,
    height: u32,
    indices: HashMap<TimecodeKind, Arc<dyn TimecodeIndex>>,
    proxies: HashMap<ProxySize, StreamHandle<B>>,
    failure: Option<String>,
}

impl StreamHandle<FfmpegBackend> {
    /// Open the video stream selected by `options` in the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::FileOpen`] or
    /// [`FrameSeekError::NoVideoStream`]; see [`FfmpegBackend::open`].
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self, FrameSeekError> {
        let backend = FfmpegBackend::open(path.as_ref(), &options)?;
        Ok(Self::build(backend, options, &path_label(path.as_ref())))
    }
}

impl<B: MediaBackend> StreamHandle<B> {
    /// Wrap an already opened backend.
    pub fn with_backend(backend: B, options: OpenOptions) -> Self {
        Self::build(backend, options, "stream")
    }

    fn build(backend: B, options: OpenOptions, default_label: &str) -> Self {
        let log = options.fetch_log(default_label);
        let (width, height) = (backend.info().width, backend.info().height);
        Self {
            engine: FetchEngine {
                backend,
                tracker: PositionTracker::new(),
                log,
                tuning: options.seek,
            },
            options,
            width,
            height,
            indices: HashMap::new(),
            proxies: HashMap::new(),
            failure: None,
        }
    }

    /// Fetch `frame_index` without a timecode index or proxy.
    ///
    /// # Errors
    ///
    /// See [`fetch_frame`](StreamHandle::fetch_frame).
    pub fn fetch(&mut self, frame_index: i64) -> Result<FetchedFrame, FrameSeekError> {
        self.fetch_frame(frame_index, TimecodeKind::None, ProxySize::None)
    }

    /// Fetch one frame.
    ///
    /// When `proxy` names an attached proxy, the request is redirected to it
    /// (through the `timecode` index when one is attached). Otherwise
    /// `timecode` selects the attached index used to locate the frame, and
    /// [`TimecodeKind::None`] estimates positions from the frame rate.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::FrameOutOfRange`] if `frame_index` is outside
    ///   `[0, duration)`; the decoder position is left untouched.
    /// - [`FrameSeekError::DecodeUnavailable`] if no picture at all could be
    ///   decoded.
    /// - [`FrameSeekError::FormatAssumption`] if the converted picture has an
    ///   unexpected layout; the handle is then marked failed.
    /// - [`FrameSeekError::StreamFailed`] if the handle was marked failed
    ///   earlier.
    pub fn fetch_frame(
        &mut self,
        frame_index: i64,
        timecode: TimecodeKind,
        proxy: ProxySize,
    ) -> Result<FetchedFrame, FrameSeekError> {
        if let Some(reason) = &self.failure {
            return Err(FrameSeekError::StreamFailed(reason.clone()));
        }

        if let Some(proxy_handle) = self.proxies.get_mut(&proxy) {
            let proxy_index = match self.indices.get(&timecode) {
                Some(index) => index.frame_slot(frame_index) as i64,
                None => frame_index,
            };
            emit!(
                self.engine.log,
                Debug,
                "frameseek::fetch",
                "frame {frame_index} redirected to {proxy:?} proxy frame {proxy_index}"
            );
            return proxy_handle.fetch_frame(proxy_index, TimecodeKind::None, ProxySize::None);
        }

        let duration = self.duration(timecode);
        if frame_index < 0 || frame_index >= duration {
            return Err(FrameSeekError::FrameOutOfRange { frame_index, duration });
        }

        let index = self.indices.get(&timecode).cloned();
        let target_pts = estimate_pts(self.engine.backend.info(), frame_index, index.as_deref());
        emit!(
            self.engine.log,
            Debug,
            "frameseek::fetch",
            "fetch frame {frame_index} (timecode {timecode:?}): target pts {target_pts}"
        );

        let flushed = self.engine.plan_and_execute_seek(frame_index, target_pts, index.as_deref());
        self.engine.scan_to_target(target_pts);
        self.refresh_resolution();

        let tracker = &self.engine.tracker;
        let Some(choice) = choose_picture(tracker.current.as_ref(), tracker.backup.as_ref(), target_pts) else {
            emit!(
                self.engine.log,
                Error,
                "frameseek::fetch",
                "no picture decoded for frame {frame_index}"
            );
            return Err(FrameSeekError::DecodeUnavailable { frame_index });
        };
        let picture = match choice.source {
            PictureSource::Current => tracker.current.as_ref(),
            PictureSource::Backup => tracker.backup.as_ref(),
        }
        .ok_or(FrameSeekError::DecodeUnavailable { frame_index })?;

        if !choice.exact {
            emit!(
                self.engine.log,
                Warn,
                "frameseek::fetch",
                "no picture covers pts {target_pts}, delivering pts {} instead",
                picture.pts
            );
        }
        emit!(
            self.engine.log,
            Debug,
            "frameseek::fetch",
            "frame {frame_index}: {:?} picture pts {} (flushed: {flushed})",
            choice.source,
            picture.pts
        );

        let pts = picture.pts;
        let rgba = match self.engine.backend.convert(&picture.frame) {
            Ok(rgba) => rgba,
            Err(error) => {
                if error.is_fatal() {
                    emit!(self.engine.log, Error, "frameseek::fetch", "handle marked failed: {error}");
                    self.failure = Some(error.to_string());
                }
                return Err(error);
            }
        };
        let image = finish_picture(rgba, self.engine.backend.info().has_alpha, &self.options);

        self.engine.tracker.finish_fetch(frame_index);
        Ok(FetchedFrame {
            image,
            frame_index,
            pts,
            exact: choice.exact,
            colorspace: self.options.colorspace.clone(),
        })
    }

    /// Fetch several frames in request order.
    ///
    /// Consecutive ascending indices decode without seeking.
    ///
    /// # Errors
    ///
    /// Stops at the first failing frame and returns its error.
    pub fn fetch_frames(
        &mut self,
        frame_indices: &[i64],
        timecode: TimecodeKind,
    ) -> Result<Vec<FetchedFrame>, FrameSeekError> {
        frame_indices
            .iter()
            .map(|&frame_index| self.fetch_frame(frame_index, timecode, ProxySize::None))
            .collect()
    }

    /// Number of addressable frames.
    ///
    /// With an attached index for `timecode`, the index decides; otherwise
    /// the estimate made at open time.
    pub fn duration(&self, timecode: TimecodeKind) -> i64 {
        match self.indices.get(&timecode) {
            Some(index) => index.duration(),
            None => self.engine.backend.info().duration_in_frames,
        }
    }

    /// Frame rate as an `i16` numerator over a denominator in seconds.
    pub fn frame_rate(&self) -> (i16, f64) {
        frame_rate_fraction(self.engine.backend.info().frame_rate)
    }

    /// Guessed frame rate as a rational.
    pub fn frame_rate_rational(&self) -> Rational {
        self.engine.backend.info().frame_rate
    }

    /// Picture width, refreshed after every fetch.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Picture height, refreshed after every fetch.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Start offset of the video stream in seconds.
    pub fn start_offset(&self) -> f64 {
        self.engine.backend.info().start_offset
    }

    /// Stream facts captured at open time.
    pub fn stream_info(&self) -> &StreamInfo {
        self.engine.backend.info()
    }

    /// Stream metadata with the current resolution and container tags.
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata::from_stream(
            self.engine.backend.info(),
            self.width,
            self.height,
            self.engine.backend.tags(),
        )
    }

    /// Where the decoder currently stands.
    pub fn position(&self) -> PositionState {
        self.engine.tracker.snapshot()
    }

    /// Whether the handle can still produce frames.
    pub fn can_produce_frames(&self) -> bool {
        self.failure.is_none()
    }

    /// The backend this handle drives.
    pub fn backend(&self) -> &B {
        &self.engine.backend
    }

    /// Use `index` for fetches that ask for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSeekError::InvalidIndex`] for [`TimecodeKind::None`].
    pub fn attach_index(&mut self, kind: TimecodeKind, index: Arc<dyn TimecodeIndex>) -> Result<(), FrameSeekError> {
        if kind == TimecodeKind::None {
            return Err(FrameSeekError::InvalidIndex(
                "an index cannot be attached to TimecodeKind::None".to_string(),
            ));
        }
        self.indices.insert(kind, index);
        Ok(())
    }

    /// Redirect fetches that ask for `size` to `proxy`.
    ///
    /// Attaching to [`ProxySize::None`] is ignored.
    pub fn attach_proxy(&mut self, size: ProxySize, proxy: StreamHandle<B>) {
        if size == ProxySize::None {
            return;
        }
        self.proxies.insert(size, proxy);
    }

    /// Scan the whole stream and attach the resulting index for `kind`.
    ///
    /// Rewinds the stream before and after the scan; the next fetch always
    /// seeks.
    ///
    /// # Errors
    ///
    /// Returns packet read errors, or [`FrameSeekError::InvalidIndex`] when
    /// the stream yields no timestamped packets.
    pub fn build_index(&mut self, kind: TimecodeKind) -> Result<Arc<FrameIndex>, FrameSeekError> {
        if let Some(reason) = &self.failure {
            return Err(FrameSeekError::StreamFailed(reason.clone()));
        }
        if kind == TimecodeKind::None {
            return Err(FrameSeekError::InvalidIndex(
                "cannot build an index without a timecode kind".to_string(),
            ));
        }

        self.rewind();
        let mut packets = Vec::new();
        let scanned = loop {
            match self.engine.backend.read_packet() {
                Ok(Some(packet)) => packets.push(PacketRecord {
                    pts: packet.pts(),
                    dts: packet.dts(),
                    is_key: packet.is_key(),
                    position: packet.position(),
                }),
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        self.rewind();
        scanned?;

        let info = self.engine.backend.info();
        let index = Arc::new(FrameIndex::from_packets(
            kind,
            &packets,
            steps_per_frame(info.frame_rate, info.time_base),
            info.start_pts.unwrap_or(0),
        )?);
        emit!(
            self.engine.log,
            Debug,
            "frameseek::fetch",
            "built {kind:?} index: {} packets, {} frames",
            packets.len(),
            index.duration()
        );

        self.indices.insert(kind, index.clone());
        Ok(index)
    }

    /// Fetch the first frame, then the middle one, and report thumbnail
    /// facts alongside the middle frame.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors.
    pub fn preview_frame(&mut self) -> Result<PreviewFrame, FrameSeekError> {
        self.fetch(0)?;
        let frame_count = self.duration(TimecodeKind::None);
        let frame = self.fetch(frame_count / 2)?;

        let frame_rate = self.frame_rate_rational();
        let has_rate = frame_rate.numerator() != 0 && frame_rate.denominator() != 0;
        Ok(PreviewFrame {
            frame,
            width: self.width,
            height: self.height,
            frame_count,
            frames_per_second: has_rate.then(|| f64::from(frame_rate)),
            duration_seconds: has_rate.then(|| frames_to_seconds(frame_count, frame_rate)),
        })
    }

    /// Release the stream and every buffered picture.
    pub fn close(self) {
        emit!(self.engine.log, Debug, "frameseek::fetch", "closing stream");
    }

    fn refresh_resolution(&mut self) {
        let (width, height) = self.engine.backend.coded_size();
        if width > 0 && height > 0 && (width, height) != (self.width, self.height) {
            emit!(
                self.engine.log,
                Debug,
                "frameseek::fetch",
                "resolution changed from {}x{} to {width}x{height}",
                self.width,
                self.height
            );
            self.width = width;
            self.height = height;
        }
    }

    fn rewind(&mut self) {
        let start = self.engine.backend.info().start_pts.unwrap_or(0);
        if let Err(error) = self.engine.backend.seek(SeekTarget::Timestamp(start)) {
            emit!(self.engine.log, Warn, "frameseek::seek", "rewind to {start} failed: {error}");
        }
        self.engine.backend.flush();
        self.engine.tracker.reset();
    }
}
