//! Fetch orchestration integration tests: range checks, fallbacks, failure
//! latching, proxies and the handle lifecycle.

mod common;

use std::sync::atomic::Ordering;

use common::{SyntheticBackend, SyntheticConfig, frame_number_of, handle, handle_with};
use frameseek::{
    DEFAULT_COLORSPACE, FrameSeekError, OpenOptions, ProxySize, StreamHandle, TimecodeKind,
};
use image::DynamicImage;

// ── range checks ───────────────────────────────────────────────────

#[test]
fn out_of_range_leaves_position_untouched() {
    let mut handle = handle(SyntheticConfig::default());
    handle.fetch(4).expect("Failed to fetch frame 4");
    let before = handle.position();
    let seeks_before = handle.backend().seeks.len();

    match handle.fetch(30) {
        Err(FrameSeekError::FrameOutOfRange { frame_index, duration }) => {
            assert_eq!(frame_index, 30);
            assert_eq!(duration, 30);
        }
        other => panic!("Expected FrameOutOfRange, got {other:?}"),
    }
    assert!(matches!(
        handle.fetch(-1),
        Err(FrameSeekError::FrameOutOfRange { .. })
    ));

    assert_eq!(handle.position(), before);
    assert_eq!(handle.backend().seeks.len(), seeks_before);

    // Sequential decoding continues as if nothing happened.
    let next = handle.fetch(5).expect("Failed to fetch frame 5");
    assert_eq!(frame_number_of(&next.image), 5);
    assert!(!handle.position().must_seek_before_decode);
}

#[test]
fn out_of_range_message() {
    let mut handle = handle(SyntheticConfig::default());
    let error_message = handle.fetch(999).expect_err("Expected an error").to_string();
    assert!(
        error_message.contains("out of range"),
        "Error message should mention out of range: {error_message}",
    );
}

// ── fallbacks ──────────────────────────────────────────────────────

#[test]
fn stream_ending_early_delivers_last_picture() {
    // The container claims 32 frames but only 30 decode.
    let mut handle = handle(SyntheticConfig {
        declared_frames: 32,
        ..SyntheticConfig::default()
    });

    let frame = handle.fetch(31).expect("Expected a best-effort frame");
    assert!(!frame.exact);
    assert_eq!(frame_number_of(&frame.image), 29);
    assert_eq!(handle.position().current_frame_index, Some(31));
}

#[test]
fn empty_stream_reports_decode_unavailable() {
    let mut handle = handle(SyntheticConfig {
        frame_count: 0,
        declared_frames: 5,
        ..SyntheticConfig::default()
    });

    match handle.fetch(2) {
        Err(FrameSeekError::DecodeUnavailable { frame_index }) => assert_eq!(frame_index, 2),
        other => panic!("Expected DecodeUnavailable, got {other:?}"),
    }
    assert_eq!(handle.position().current_frame_index, None);
    assert!(handle.can_produce_frames());
}

// ── failure latching ───────────────────────────────────────────────

#[test]
fn format_assumption_marks_handle_failed() {
    let mut handle = handle(SyntheticConfig {
        fail_convert: true,
        ..SyntheticConfig::default()
    });
    assert!(handle.can_produce_frames());

    assert!(matches!(
        handle.fetch(0),
        Err(FrameSeekError::FormatAssumption(_))
    ));
    assert!(!handle.can_produce_frames());

    let seeks = handle.backend().seeks.len();
    assert!(matches!(handle.fetch(1), Err(FrameSeekError::StreamFailed(_))));
    assert!(matches!(
        handle.build_index(TimecodeKind::RecordRun),
        Err(FrameSeekError::StreamFailed(_))
    ));
    assert_eq!(handle.backend().seeks.len(), seeks);
}

// ── lifecycle ──────────────────────────────────────────────────────

#[test]
fn close_releases_buffered_pictures() {
    let mut handle = handle(SyntheticConfig::default());
    let live = handle.backend().live_pictures();

    handle.fetch(5).expect("Failed to fetch frame 5");
    handle.fetch(6).expect("Failed to fetch frame 6");
    assert!(live.load(Ordering::SeqCst) > 0);

    handle.close();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn close_after_errors() {
    let mut handle = handle(SyntheticConfig::default());
    let live = handle.backend().live_pictures();
    assert!(handle.fetch(100).is_err());
    handle.close();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn resolution_follows_decoded_pictures() {
    let mut handle = handle(SyntheticConfig {
        resize_from: Some((20, 16, 8)),
        ..SyntheticConfig::default()
    });
    assert_eq!((handle.width(), handle.height()), (8, 4));

    let frame = handle.fetch(25).expect("Failed to fetch frame 25");
    assert_eq!((handle.width(), handle.height()), (16, 8));
    assert_eq!((frame.image.width(), frame.image.height()), (16, 8));

    handle.fetch(5).expect("Failed to fetch frame 5");
    assert_eq!((handle.width(), handle.height()), (8, 4));
}

// ── proxies ────────────────────────────────────────────────────────

#[test]
fn proxy_fetch_is_redirected() {
    let mut handle = handle(SyntheticConfig::default());
    let proxy: StreamHandle<SyntheticBackend> = common::handle(SyntheticConfig {
        width: 4,
        height: 2,
        ..SyntheticConfig::default()
    });
    handle.attach_proxy(ProxySize::Half, proxy);

    let frame = handle
        .fetch_frame(12, TimecodeKind::None, ProxySize::Half)
        .expect("Failed to fetch proxy frame");
    assert_eq!(frame_number_of(&frame.image), 12);
    assert_eq!((frame.image.width(), frame.image.height()), (4, 2));
    assert!(handle.backend().seeks.is_empty());
    assert_eq!(handle.position().current_frame_index, None);

    // Sizes without a proxy decode from the main stream.
    let frame = handle
        .fetch_frame(12, TimecodeKind::None, ProxySize::Quarter)
        .expect("Failed to fetch frame");
    assert_eq!((frame.image.width(), frame.image.height()), (8, 4));
}

#[test]
fn proxy_fetch_goes_through_index() {
    let mut handle = handle(SyntheticConfig::default());
    handle
        .build_index(TimecodeKind::RecordRunNoGaps)
        .expect("Failed to build index");
    handle.attach_proxy(ProxySize::Full, common::handle(SyntheticConfig::default()));

    // Past the end of the index the slot clamps to the last frame.
    let frame = handle
        .fetch_frame(40, TimecodeKind::RecordRunNoGaps, ProxySize::Full)
        .expect("Failed to fetch proxy frame");
    assert_eq!(frame_number_of(&frame.image), 29);
}

#[test]
fn proxy_none_is_not_attachable() {
    let mut handle = handle(SyntheticConfig::default());
    handle.attach_proxy(ProxySize::None, common::handle(SyntheticConfig::default()));
    handle.fetch(3).expect("Failed to fetch frame 3");
    assert!(!handle.backend().seeks.is_empty());
}

// ── output ─────────────────────────────────────────────────────────

#[test]
fn colorspace_tag_is_carried() {
    let mut default_handle = handle(SyntheticConfig::default());
    let frame = default_handle.fetch(0).expect("Failed to fetch frame 0");
    assert_eq!(frame.colorspace, DEFAULT_COLORSPACE);

    let mut linear = handle_with(
        SyntheticConfig::default(),
        OpenOptions::new().with_colorspace("Linear Rec.709"),
    );
    let frame = linear.fetch(0).expect("Failed to fetch frame 0");
    assert_eq!(frame.colorspace, "Linear Rec.709");
}

#[test]
fn opaque_streams_produce_rgb() {
    let mut handle = handle(SyntheticConfig::default());
    let frame = handle.fetch(0).expect("Failed to fetch frame 0");
    assert!(matches!(frame.image, DynamicImage::ImageRgb8(_)));
}

#[test]
fn fetch_frames_in_request_order() {
    let mut handle = handle(SyntheticConfig::default());
    let frames = handle
        .fetch_frames(&[3, 4, 5, 1], TimecodeKind::None)
        .expect("Failed to fetch frames");

    let numbers: Vec<u32> = frames.iter().map(|frame| frame_number_of(&frame.image)).collect();
    assert_eq!(numbers, vec![3, 4, 5, 1]);
    let indices: Vec<i64> = frames.iter().map(|frame| frame.frame_index).collect();
    assert_eq!(indices, vec![3, 4, 5, 1]);
}

#[test]
fn fetch_frames_stops_at_first_error() {
    let mut handle = handle(SyntheticConfig::default());
    let result = handle.fetch_frames(&[28, 29, 30], TimecodeKind::None);
    assert!(matches!(result, Err(FrameSeekError::FrameOutOfRange { .. })));
}

#[test]
fn start_offset_is_applied() {
    let mut handle = handle(SyntheticConfig {
        start_pts: 1200,
        ..SyntheticConfig::default()
    });
    assert!((handle.start_offset() - 2.0).abs() < 1e-9);

    let frame = handle.fetch(10).expect("Failed to fetch frame 10");
    assert_eq!(frame_number_of(&frame.image), 10);
    assert_eq!(frame.pts, 1450);
}

// ── metadata ───────────────────────────────────────────────────────

#[test]
fn frame_rate_and_duration() {
    let handle = handle(SyntheticConfig::default());
    assert_eq!(handle.frame_rate(), (24, 1.0));
    assert_eq!(handle.duration(TimecodeKind::None), 30);
    assert_eq!(handle.stream_info().format_name, "synthetic");
}

#[test]
fn metadata_reports_stream_facts() {
    let handle = handle(SyntheticConfig::default());
    let metadata = handle.metadata();

    assert_eq!((metadata.width, metadata.height), (8, 4));
    assert_eq!(metadata.duration_in_frames, 30);
    assert!((metadata.frames_per_second - 24.0).abs() < 1e-9);
    assert!((metadata.duration_seconds() - 1.25).abs() < 1e-9);
    assert_eq!(metadata.codec, "counter");
    assert!(!metadata.has_alpha);
    assert_eq!(metadata.tags.get("title").map(String::as_str), Some("synthetic"));
}

#[test]
fn preview_frame_is_middle_frame() {
    let mut handle = handle(SyntheticConfig::default());
    let preview = handle.preview_frame().expect("Failed to build preview");

    assert_eq!(preview.frame.frame_index, 15);
    assert_eq!(frame_number_of(&preview.frame.image), 15);
    assert_eq!(preview.frame_count, 30);
    assert_eq!((preview.width, preview.height), (8, 4));
    assert_eq!(preview.frames_per_second, Some(24.0));
    assert_eq!(preview.duration_seconds, Some(1.25));
}
