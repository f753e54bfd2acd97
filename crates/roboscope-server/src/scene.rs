//! Built-in demo scene
//!
//! A procedural stand-in for the physics/rendering collaborator: an animated
//! gradient backdrop with a foreground block drawn at a fixed depth. Each eye
//! sees the block shifted by the stereo disparity derived from the configured
//! eye separation and field of view, so the stream is verifiably stereoscopic
//! without a simulation engine attached.

use std::sync::Arc;
use std::time::Instant;

use roboscope_media::{ImageBuffer, SceneRenderer};

/// Depth of the foreground block in meters
const BLOCK_DEPTH_M: f32 = 2.0;

pub struct DemoScene {
    width: u32,
    height: u32,
    eye_separation_m: f32,
    fov_degrees: f32,
    started: Instant,
}

impl DemoScene {
    pub fn new(width: u32, height: u32, eye_separation_m: f32, fov_degrees: f32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            eye_separation_m,
            fov_degrees,
            started: Instant::now(),
        })
    }

    /// Horizontal disparity of the foreground block, in pixels.
    ///
    /// One eye is offset laterally by half the eye separation; projecting
    /// that offset at the block's depth through the configured FOV gives the
    /// per-eye pixel shift.
    fn disparity_px(&self) -> f32 {
        let half_fov = (self.fov_degrees.to_radians()) / 2.0;
        let view_width_m = 2.0 * BLOCK_DEPTH_M * half_fov.tan();
        (self.eye_separation_m / 2.0) / view_width_m * self.width as f32
    }

    fn render_eye(&self, eye_offset_px: f32, t: f32) -> ImageBuffer {
        let mut img = ImageBuffer::black(self.width, self.height);

        // Sky-to-floor gradient backdrop.
        for y in 0..self.height {
            let shade = (y * 200 / self.height.max(1)) as u8;
            for x in 0..self.width {
                img.put_pixel(x, y, [30, 40 + shade / 2, 60 + shade]);
            }
        }

        // Foreground block bobbing vertically over time.
        let block = self.width / 8;
        let cx = (self.width as f32 / 2.0 - eye_offset_px) as i64;
        let cy = (self.height as f32 / 2.0 + (t * 2.0).sin() * self.height as f32 / 8.0) as i64;
        for dy in -(block as i64) / 2..(block as i64) / 2 {
            for dx in -(block as i64) / 2..(block as i64) / 2 {
                let x = cx + dx;
                let y = cy + dy;
                if x >= 0 && y >= 0 {
                    img.put_pixel(x as u32, y as u32, [220, 140, 40]);
                }
            }
        }

        img
    }
}

impl SceneRenderer for DemoScene {
    fn render(&self) -> anyhow::Result<(ImageBuffer, ImageBuffer)> {
        let t = self.started.elapsed().as_secs_f32();
        let disparity = self.disparity_px();
        Ok((self.render_eye(-disparity, t), self.render_eye(disparity, t)))
    }
}
