//! OpenOptions and SeekTuning tests.

mod common;

use std::sync::Arc;

use common::{CapturingLogger, SyntheticConfig, frame_number_of, handle_with};
use frameseek::{DEFAULT_COLORSPACE, OpenOptions, ProxySize, SeekTarget, SeekTuning};

// ── OpenOptions builder ────────────────────────────────────────────

#[test]
fn options_defaults() {
    let options = OpenOptions::new();
    let debug = format!("{options:?}");
    assert!(debug.contains("OpenOptions"));
    assert!(debug.contains("stream_index: 0"));
    assert!(debug.contains("deinterlace: false"));
    assert!(debug.contains(DEFAULT_COLORSPACE));
    assert!(debug.contains("has_logger: false"));
}

#[test]
fn options_builders() {
    let options = OpenOptions::new()
        .with_stream_index(1)
        .with_deinterlace(true)
        .with_decoder_threads(4)
        .with_label("cam-b")
        .with_logger(Arc::new(CapturingLogger::default()));
    let debug = format!("{options:?}");
    assert!(debug.contains("stream_index: 1"));
    assert!(debug.contains("deinterlace: true"));
    assert!(debug.contains("decoder_threads: Some(4)"));
    assert!(debug.contains("\"cam-b\""));
    assert!(debug.contains("has_logger: true"));
}

#[test]
fn seek_tuning_defaults() {
    let tuning = SeekTuning::default();
    assert_eq!(tuning.margin_frames, 3);
    assert_eq!(tuning.max_search_steps, 256);
}

#[test]
fn seek_tuning_is_clamped() {
    let options = OpenOptions::new().with_seek_tuning(SeekTuning {
        margin_frames: -4,
        max_search_steps: 0,
    });
    let debug = format!("{options:?}");
    assert!(debug.contains("margin_frames: 0"));
    assert!(debug.contains("max_search_steps: 1"));
}

#[test]
fn proxy_size_default() {
    assert_eq!(ProxySize::default(), ProxySize::None);
}

// ── tuning in effect ───────────────────────────────────────────────

#[test]
fn wider_margin_seeks_earlier() {
    let options = OpenOptions::new().with_seek_tuning(SeekTuning {
        margin_frames: 10,
        ..SeekTuning::default()
    });
    let mut handle = handle_with(SyntheticConfig::default(), options);

    let frame = handle.fetch(25).expect("Failed to fetch frame 25");
    assert_eq!(frame_number_of(&frame.image), 25);
    assert_eq!(handle.backend().seeks[0], SeekTarget::Timestamp(375));
}

#[test]
fn zero_margin_seeks_at_target() {
    let options = OpenOptions::new().with_seek_tuning(SeekTuning {
        margin_frames: 0,
        ..SeekTuning::default()
    });
    let mut handle = handle_with(SyntheticConfig::default(), options);

    let frame = handle.fetch(25).expect("Failed to fetch frame 25");
    assert_eq!(frame_number_of(&frame.image), 25);
    assert_eq!(handle.backend().seeks[0], SeekTarget::Timestamp(625));
}

#[test]
fn search_step_limit_bounds_key_frame_search() {
    let options = OpenOptions::new().with_seek_tuning(SeekTuning {
        max_search_steps: 1,
        ..SeekTuning::default()
    });
    let mut handle = handle_with(
        SyntheticConfig {
            native_seek: false,
            ..SyntheticConfig::default()
        },
        options,
    );

    // One probe at pts 300 lands mid-GOP; decoding starts there anyway.
    let frame = handle.fetch(15).expect("Failed to fetch frame 15");
    assert_eq!(frame_number_of(&frame.image), 15);
    assert_eq!(
        &handle.backend().seeks[..2],
        &[SeekTarget::Timestamp(300), SeekTarget::Timestamp(300)]
    );
}
