//! H.264 encoding of outgoing frames using openh264

use openh264::encoder::Encoder;
use openh264::formats::YUVBuffer;
use thiserror::Error;

use crate::frame::ImageBuffer;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("failed to create encoder: {0}")]
    Setup(String),

    /// 4:2:0 chroma subsampling requires even frame dimensions
    #[error("frame dimensions must be even, got {width}x{height}")]
    OddDimensions { width: u32, height: u32 },

    #[error("unexpected frame size: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Encodes RGB24 frames to H.264 Annex B bitstream.
///
/// The encoder is created per track; frame dimensions are fixed at
/// construction and every submitted image must match them.
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
}

impl H264Encoder {
    pub fn new(width: u32, height: u32) -> Result<Self, EncoderError> {
        if width % 2 != 0 || height % 2 != 0 {
            return Err(EncoderError::OddDimensions { width, height });
        }
        let encoder = Encoder::new().map_err(|e| EncoderError::Setup(e.to_string()))?;
        Ok(Self {
            encoder,
            width,
            height,
        })
    }

    /// Encode one RGB24 image. Returns the Annex B NAL units for the frame;
    /// the encoder may emit an empty buffer for skipped frames.
    pub fn encode(&mut self, image: &ImageBuffer) -> Result<Vec<u8>, EncoderError> {
        let expected = (self.width * self.height * 3) as usize;
        if image.data.len() != expected {
            return Err(EncoderError::FrameSize {
                expected,
                actual: image.data.len(),
            });
        }

        let yuv = rgb_to_yuv420(&image.data, self.width, self.height);
        let buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| EncoderError::Encode(e.to_string()))?;

        Ok(bitstream.to_vec())
    }
}

/// Convert interleaved RGB24 to planar YUV420 (BT.601).
/// Dimensions must be even; the constructor enforces this.
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            // Subsample chroma over 2x2 blocks
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}
