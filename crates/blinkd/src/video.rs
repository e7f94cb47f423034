//! Best-effort video side-channel encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blink_hw::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("frame buffer does not match its dimensions")]
    InvalidBuffer,
    #[error("jpeg encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Downsample a frame and encode it as a base64 JPEG payload.
///
/// Failures here must never stop blink counting; the caller reports
/// them as warnings and moves on.
pub fn encode_video_frame(
    frame: &Frame,
    target_width: u32,
    target_height: u32,
    quality: u8,
) -> Result<String, VideoError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or(VideoError::InvalidBuffer)?;
    let small = imageops::resize(&img, target_width, target_height, FilterType::Triangle);

    let mut jpeg = Vec::new();
    small.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality))?;

    Ok(STANDARD.encode(jpeg))
}
