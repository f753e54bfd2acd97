//! Paced frame delivery
//!
//! Converts the frame source's pull-based rendering into a fixed-rate
//! sequence of timestamped frames. Each pull yields exactly one frame; the
//! only suspension point is the cooperative pacing sleep, so many paced
//! tracks can share a runtime without starving each other.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;
use webrtc::media::Sample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::encoder::H264Encoder;
use crate::frame::{Frame, ImageBuffer, VIDEO_CLOCK_RATE};
use crate::source::{Eye, FrameSource};

/// What a paced track carries: one eye, or both eyes side by side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Combined,
    Eye(Eye),
}

/// Fixed-rate frame producer for one video track.
///
/// `next_frame` never fails and never skips: render errors and wrong-sized
/// renderer output become black frames of the expected dimensions, and the
/// pacing clock advances regardless so a bad render cannot skew the cadence.
pub struct PacedSource {
    source: Arc<FrameSource>,
    mode: TrackMode,
    test_pattern: bool,
    interval: Duration,
    pts_step: i64,
    pts: i64,
    last_emit: Option<Instant>,
}

impl PacedSource {
    pub fn new(source: Arc<FrameSource>, mode: TrackMode, test_pattern: bool, fps: u32) -> Self {
        // Clamped so the 90 kHz timestamp step is at least 1 and the
        // interval stays positive.
        let fps = fps.clamp(1, VIDEO_CLOCK_RATE);
        Self {
            source,
            mode,
            test_pattern,
            interval: Duration::from_secs_f64(1.0 / fps as f64),
            pts_step: (VIDEO_CLOCK_RATE / fps) as i64,
            pts: 0,
            last_emit: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Width of the frames this track emits
    pub fn frame_width(&self) -> u32 {
        match self.mode {
            TrackMode::Combined => self.source.width() * 2,
            TrackMode::Eye(_) => self.source.width(),
        }
    }

    /// Height of the frames this track emits
    pub fn frame_height(&self) -> u32 {
        self.source.height()
    }

    /// Produce the next frame, sleeping as needed to hold the target rate.
    ///
    /// Timestamps are strictly increasing by one frame interval in 90 kHz
    /// units per pull, independent of wall-clock jitter.
    pub async fn next_frame(&mut self) -> Frame {
        let pts = self.pts;
        self.pts += self.pts_step;

        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        // Updated before rendering: a slow or failing render must not
        // accumulate into the next pull's pacing interval.
        self.last_emit = Some(Instant::now());

        let image = self.render();
        let image = if image.width == self.frame_width() && image.height == self.frame_height() {
            image
        } else {
            tracing::warn!(
                "Renderer produced {}x{} image, expected {}x{}; substituting black",
                image.width,
                image.height,
                self.frame_width(),
                self.frame_height()
            );
            ImageBuffer::black(self.frame_width(), self.frame_height())
        };

        Frame { image, pts }
    }

    fn render(&self) -> ImageBuffer {
        match (self.mode, self.test_pattern) {
            (TrackMode::Combined, false) => self.source.render_combined(),
            (TrackMode::Combined, true) => self.source.test_pattern_combined(),
            (TrackMode::Eye(eye), false) => {
                let (left, right) = self.source.render_stereo();
                match eye {
                    Eye::Left => left,
                    Eye::Right => right,
                }
            }
            (TrackMode::Eye(eye), true) => {
                let (left, right) = self.source.test_pattern_stereo();
                match eye {
                    Eye::Left => left,
                    Eye::Right => right,
                }
            }
        }
    }
}

/// Drive a paced source into a WebRTC sample track until shutdown.
///
/// Spawned once per attached track when the transport reaches the connected
/// state; stops when the owning session flips the shutdown watch.
pub async fn run_track_writer(
    mut pacer: PacedSource,
    track: Arc<TrackLocalStaticSample>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut encoder = match H264Encoder::new(pacer.frame_width(), pacer.frame_height()) {
        Ok(encoder) => encoder,
        Err(e) => {
            tracing::error!("Could not create encoder for track {}: {}", track.id(), e);
            return;
        }
    };

    let duration = pacer.interval();
    tracing::info!(
        "Track writer started: {} ({}x{} @ {:.0} fps)",
        track.id(),
        pacer.frame_width(),
        pacer.frame_height(),
        1.0 / duration.as_secs_f64()
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = pacer.next_frame() => {
                let payload = match encoder.encode(&frame.image) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Encode failed on track {}: {}", track.id(), e);
                        continue;
                    }
                };
                if payload.is_empty() {
                    continue;
                }
                let sample = Sample {
                    data: Bytes::from(payload),
                    duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::debug!("write_sample on track {}: {}", track.id(), e);
                }
            }
        }
    }

    tracing::info!("Track writer stopped: {}", track.id());
}
