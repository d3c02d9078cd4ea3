//! Picture post-processing.
//!
//! Backends hand over packed RGBA. This module strips row padding from
//! FFmpeg output, applies the optional field blend and vertical flip, and
//! drops the alpha channel for streams that have none.

use ffmpeg_next::frame::Video as VideoFrame;
use image::{DynamicImage, RgbaImage};

use crate::{config::OpenOptions, error::FrameSeekError};

/// Copy an RGBA frame into a tightly packed buffer.
///
/// # Errors
///
/// Returns [`FrameSeekError::FormatAssumption`] if a row is narrower than
/// `width * 4` bytes or the plane is shorter than `height` rows.
pub(crate) fn packed_rgba(frame: &VideoFrame, width: u32, height: u32) -> Result<Vec<u8>, FrameSeekError> {
    let row_bytes = width as usize * 4;
    let rows = height as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride < row_bytes {
        return Err(FrameSeekError::FormatAssumption(format!(
            "RGBA stride {stride} is smaller than a {width}-pixel row"
        )));
    }
    if rows > 0 && data.len() < stride * (rows - 1) + row_bytes {
        return Err(FrameSeekError::FormatAssumption(format!(
            "RGBA plane holds {} bytes, expected {width}x{height}",
            data.len()
        )));
    }

    if stride == row_bytes {
        return Ok(data[..row_bytes * rows].to_vec());
    }
    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in data.chunks(stride).take(rows) {
        buffer.extend_from_slice(&row[..row_bytes]);
    }
    Ok(buffer)
}

/// Blend interlaced fields with a vertical `[1, 2, 1] / 4` filter.
///
/// Edge rows are filtered against themselves.
pub fn blend_fields(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    if height < 2 {
        return image.clone();
    }
    RgbaImage::from_fn(width, height, |x, y| {
        let above = image.get_pixel(x, y.saturating_sub(1));
        let centre = image.get_pixel(x, y);
        let below = image.get_pixel(x, (y + 1).min(height - 1));
        let mut out = *centre;
        for channel in 0..4 {
            let sum = u16::from(above[channel]) + 2 * u16::from(centre[channel]) + u16::from(below[channel]);
            out[channel] = ((sum + 2) / 4) as u8;
        }
        out
    })
}

/// Apply the handle's post-processing to a converted picture.
pub fn finish_picture(rgba: RgbaImage, has_alpha: bool, options: &OpenOptions) -> DynamicImage {
    let mut rgba = if options.deinterlace { blend_fields(&rgba) } else { rgba };
    if options.flip_vertical {
        image::imageops::flip_vertical_in_place(&mut rgba);
    }
    if has_alpha {
        DynamicImage::ImageRgba8(rgba)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).into_rgb8())
    }
}
