//! Frame index to timestamp arithmetic.
//!
//! All timestamps are integers in the stream's time base. Conversions go
//! through `f64`, the same way FFmpeg's `av_q2d` does.

use ffmpeg_next::Rational;

use crate::{backend::StreamInfo, timecode::TimecodeIndex};

/// Pick the presentation timestamp when present, the decode timestamp
/// otherwise.
pub fn pts_or_dts(pts: Option<i64>, dts: Option<i64>) -> Option<i64> {
    pts.or(dts)
}

/// Nominal number of time-base ticks between consecutive frames.
///
/// Computed as `1 / (frame_rate * time_base)`. Degenerate rates fall back to
/// one tick per frame.
pub fn steps_per_frame(frame_rate: Rational, time_base: Rational) -> f64 {
    let numerator = f64::from(time_base.denominator()) * f64::from(frame_rate.denominator());
    let denominator = f64::from(time_base.numerator()) * f64::from(frame_rate.numerator());
    let steps = numerator / denominator;
    if steps.is_finite() && steps > 0.0 { steps } else { 1.0 }
}

/// Estimate the presentation timestamp of `frame_index`.
///
/// With a timecode index the index entry's pts is authoritative. Otherwise
/// the estimate is `round(frame_index * steps_per_frame) + start_pts`.
pub fn estimate_pts(info: &StreamInfo, frame_index: i64, index: Option<&dyn TimecodeIndex>) -> i64 {
    match index {
        Some(index) => index.pts(index.frame_slot(frame_index)),
        None => {
            let steps = steps_per_frame(info.frame_rate, info.time_base);
            (frame_index as f64 * steps).round() as i64 + info.start_pts.unwrap_or(0)
        }
    }
}

/// Back off `margin_frames` nominal frames from `target_pts`, clamped at 0.
///
/// Seeking slightly early tolerates timestamp jitter and frames that are
/// presented before the key frame they depend on.
pub fn seek_margin_pts(target_pts: i64, steps_per_frame: f64, margin_frames: i64) -> i64 {
    let backed_off = (target_pts as f64 - steps_per_frame * margin_frames as f64) as i64;
    backed_off.max(0)
}

/// Express a frame rate as a small integer numerator over a fractional
/// denominator in seconds, e.g. 30000/1001 becomes `(3, 0.1001)`.
///
/// Powers of ten shared by both terms are stripped while the numerator stays
/// above 10. Numerators that still do not fit an `i16` are approximated.
pub fn frame_rate_fraction(frame_rate: Rational) -> (i16, f64) {
    const TIME_SCALE: f64 = 1_000_000.0;

    let mut numerator = i64::from(frame_rate.numerator());
    let mut denominator = f64::from(frame_rate.denominator()) * TIME_SCALE;

    if numerator <= 0 || denominator <= 0.0 {
        return (0, 1.0);
    }

    while numerator % 10 == 0 && denominator >= 2.0 && numerator > 10 {
        numerator /= 10;
        denominator /= 10.0;
    }

    if numerator > i64::from(i16::MAX) {
        denominator = denominator * f64::from(i16::MAX) / numerator as f64;
        numerator = i64::from(i16::MAX);
    }

    (numerator as i16, denominator / TIME_SCALE)
}

/// Convert a frame count to seconds at `frame_rate`.
pub fn frames_to_seconds(frames: i64, frame_rate: Rational) -> f64 {
    let fps = f64::from(frame_rate);
    if fps > 0.0 { frames as f64 / fps } else { 0.0 }
}
