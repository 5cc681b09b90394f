//! Video frame decoding for clip videos.
//!
//! Only compiled with the `video-support` feature, which links against the
//! system FFmpeg libraries via the ffmpeg-next crate.

use std::path::Path;
use std::sync::Once;

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use tracing::debug;

use crate::error::{Aspset510Error, Result};

static FFMPEG_INIT: Once = Once::new();

fn ensure_initialized() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            // Reported again, with context, when decoding is attempted.
            debug!(error = %e, "FFmpeg initialisation failed");
        }
    });
}

/// Decode a single frame of a video file into an RGB image.
///
/// Frames are decoded sequentially from the start of the file; dataset clips
/// are short enough that seeking is not worth the accuracy tradeoffs.
///
/// # Errors
/// Returns an error if the file cannot be opened, contains no video stream,
/// or has fewer than `frame_index + 1` frames.
pub fn decode_frame(path: &Path, frame_index: usize) -> Result<RgbImage> {
    ensure_initialized();

    let mut input = ffmpeg::format::input(&path).map_err(|e| {
        Aspset510Error::dataset(format!("failed to open video '{}': {e}", path.display()))
    })?;
    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| {
            Aspset510Error::dataset(format!("no video stream in '{}'", path.display()))
        })?;
    let stream_index = stream.index();

    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| Aspset510Error::dataset(format!("unsupported video codec: {e}")))?;
    let mut decoder = context
        .decoder()
        .video()
        .map_err(|e| Aspset510Error::dataset(format!("failed to open video decoder: {e}")))?;

    let mut decoded_count = 0usize;
    let mut frame = ffmpeg::util::frame::video::Video::empty();

    let mut receive = |decoder: &mut ffmpeg::decoder::Video| -> Result<Option<RgbImage>> {
        while decoder.receive_frame(&mut frame).is_ok() {
            if decoded_count == frame_index {
                return Ok(Some(frame_to_rgb(&frame)?));
            }
            decoded_count += 1;
        }
        Ok(None)
    };

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .map_err(|e| Aspset510Error::dataset(format!("failed to decode video packet: {e}")))?;
        if let Some(image) = receive(&mut decoder)? {
            return Ok(image);
        }
    }
    decoder
        .send_eof()
        .map_err(|e| Aspset510Error::dataset(format!("failed to flush video decoder: {e}")))?;
    if let Some(image) = receive(&mut decoder)? {
        return Ok(image);
    }

    Err(Aspset510Error::dataset(format!(
        "frame {frame_index} is out of range for '{}' ({decoded_count} frames)",
        path.display()
    )))
}

// Convert a decoded frame to RGB24 and copy it into an image buffer.
fn frame_to_rgb(frame: &ffmpeg::util::frame::video::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();

    let mut scaler = ffmpeg::software::scaling::Context::get(
        frame.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGB24,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| Aspset510Error::dataset(format!("failed to create frame scaler: {e}")))?;

    let mut rgb_frame = ffmpeg::util::frame::video::Video::empty();
    scaler
        .run(frame, &mut rgb_frame)
        .map_err(|e| Aspset510Error::dataset(format!("failed to convert frame to RGB: {e}")))?;

    let data = rgb_frame.data(0);
    let stride = rgb_frame.stride(0);
    let mut image = RgbImage::new(width, height);
    for y in 0..height {
        let row_start = y as usize * stride;
        for x in 0..width {
            let pixel_start = row_start + x as usize * 3;
            if pixel_start + 2 < data.len() {
                image.put_pixel(
                    x,
                    y,
                    image::Rgb([data[pixel_start], data[pixel_start + 1], data[pixel_start + 2]]),
                );
            }
        }
    }
    Ok(image)
}
