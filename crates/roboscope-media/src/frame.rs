//! Image and frame types
//!
//! Images are interleaved RGB24, row-major, width*height*3 bytes. Frames add
//! the presentation timestamp the transport stamps onto the outgoing sample.

/// Clock rate for video presentation timestamps (RTP video clock)
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// An interleaved RGB24 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    /// Image filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// All-black image, used as the substitute for failed renders
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width * height * 3) as usize],
        }
    }

    pub fn byte_len(&self) -> usize {
        (self.width * self.height * 3) as usize
    }

    /// Concatenate two same-size images horizontally (left | right).
    ///
    /// The output is byte-for-byte the rows of `left` followed by the rows of
    /// `right`, interleaved per scanline.
    pub fn hconcat(left: &ImageBuffer, right: &ImageBuffer) -> ImageBuffer {
        debug_assert_eq!(left.width, right.width);
        debug_assert_eq!(left.height, right.height);

        let row_bytes = (left.width * 3) as usize;
        let mut data = Vec::with_capacity(left.data.len() + right.data.len());
        for row in 0..left.height as usize {
            let start = row * row_bytes;
            data.extend_from_slice(&left.data[start..start + row_bytes]);
            data.extend_from_slice(&right.data[start..start + row_bytes]);
        }

        ImageBuffer {
            width: left.width * 2,
            height: left.height,
            data,
        }
    }

    /// Set one pixel; out-of-bounds coordinates are ignored
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Read one pixel, or None when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// One video frame: an image plus its presentation timestamp in 90 kHz units
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: ImageBuffer,
    pub pts: i64,
}
