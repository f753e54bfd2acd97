//! Frame source
//!
//! Wraps the opaque scene renderer behind a total interface: every retrieval
//! mode returns correctly sized images even when the renderer fails. The test
//! pattern variants never touch the renderer at all and exist to validate the
//! transport path on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::ImageBuffer;

/// How often a repeated render failure is worth a log line
const RENDER_ERROR_LOG_EVERY: u64 = 100;

/// Which eye an image belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// The external render collaborator.
///
/// One call produces both eye images for the current scene state. The scene
/// state may be mutated concurrently by the simulation loop; implementations
/// must return a snapshot-consistent pair without blocking that loop.
pub trait SceneRenderer: Send + Sync {
    fn render(&self) -> anyhow::Result<(ImageBuffer, ImageBuffer)>;
}

/// Pulls stereo imagery from the scene renderer.
///
/// Rendering is treated as total: failures are converted to black frames of
/// the expected dimensions and logged at reduced frequency instead of being
/// propagated to the pacing loop.
pub struct FrameSource {
    renderer: Arc<dyn SceneRenderer>,
    width: u32,
    height: u32,
    render_failures: AtomicU64,
}

impl FrameSource {
    pub fn new(renderer: Arc<dyn SceneRenderer>, width: u32, height: u32) -> Self {
        Self {
            renderer,
            width,
            height,
            render_failures: AtomicU64::new(0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render the stereo pair; black frames on failure.
    ///
    /// An `Ok` result whose eyes do not match the configured dimensions is
    /// treated the same as a render error, so callers can index into the
    /// images without re-checking their shape.
    pub fn render_stereo(&self) -> (ImageBuffer, ImageBuffer) {
        match self.renderer.render() {
            Ok((left, right))
                if self.has_expected_shape(&left) && self.has_expected_shape(&right) =>
            {
                (left, right)
            }
            Ok((left, right)) => {
                self.count_failure(&format!(
                    "renderer produced {}x{} / {}x{} eyes, expected {}x{}",
                    left.width, left.height, right.width, right.height, self.width, self.height
                ));
                self.black_pair()
            }
            Err(e) => {
                self.count_failure(&e.to_string());
                self.black_pair()
            }
        }
    }

    fn has_expected_shape(&self, image: &ImageBuffer) -> bool {
        image.width == self.width
            && image.height == self.height
            && image.data.len() == image.byte_len()
    }

    fn black_pair(&self) -> (ImageBuffer, ImageBuffer) {
        (
            ImageBuffer::black(self.width, self.height),
            ImageBuffer::black(self.width, self.height),
        )
    }

    fn count_failure(&self, reason: &str) {
        let failures = self.render_failures.fetch_add(1, Ordering::Relaxed);
        if failures % RENDER_ERROR_LOG_EVERY == 0 {
            tracing::warn!(
                "Scene render failed ({} failures so far), substituting black frames: {}",
                failures + 1,
                reason
            );
        }
    }

    /// Render both eyes into a single side-by-side image.
    ///
    /// Byte-for-byte equal to horizontally concatenating the stereo pair.
    pub fn render_combined(&self) -> ImageBuffer {
        let (left, right) = self.render_stereo();
        ImageBuffer::hconcat(&left, &right)
    }

    /// Diagnostic pattern: solid color and a fixed-position eye label,
    /// a pure function of the configured dimensions
    pub fn test_pattern_stereo(&self) -> (ImageBuffer, ImageBuffer) {
        (
            test_pattern_eye(self.width, self.height, Eye::Left),
            test_pattern_eye(self.width, self.height, Eye::Right),
        )
    }

    /// Side-by-side variant of the diagnostic pattern
    pub fn test_pattern_combined(&self) -> ImageBuffer {
        let (left, right) = self.test_pattern_stereo();
        ImageBuffer::hconcat(&left, &right)
    }
}

/// Background color for the left-eye test pattern (red)
const LEFT_PATTERN_RGB: [u8; 3] = [200, 16, 16];
/// Background color for the right-eye test pattern (blue)
const RIGHT_PATTERN_RGB: [u8; 3] = [16, 16, 200];
const LABEL_RGB: [u8; 3] = [255, 255, 255];
const LABEL_X: u32 = 50;
const LABEL_SCALE: u32 = 8;

fn test_pattern_eye(width: u32, height: u32, eye: Eye) -> ImageBuffer {
    let (background, glyph) = match eye {
        Eye::Left => (LEFT_PATTERN_RGB, GLYPH_L),
        Eye::Right => (RIGHT_PATTERN_RGB, GLYPH_R),
    };
    let mut img = ImageBuffer::solid(width, height, background);
    draw_glyph(&mut img, glyph, LABEL_X, height / 2);
    img
}

// 5x7 bitmap glyphs, one row per byte, most significant of the low 5 bits
// is the leftmost column.
const GLYPH_L: [u8; 7] = [
    0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
];
const GLYPH_R: [u8; 7] = [
    0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
];

fn draw_glyph(img: &mut ImageBuffer, glyph: [u8; 7], origin_x: u32, origin_y: u32) {
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..5u32 {
            if bits & (0b10000 >> col) == 0 {
                continue;
            }
            for dy in 0..LABEL_SCALE {
                for dx in 0..LABEL_SCALE {
                    img.put_pixel(
                        origin_x + col * LABEL_SCALE + dx,
                        origin_y + row as u32 * LABEL_SCALE + dy,
                        LABEL_RGB,
                    );
                }
            }
        }
    }
}
