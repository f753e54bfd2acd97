//! Media pipeline for Roboscope
//!
//! This crate provides everything between the scene renderer and the WebRTC
//! transport:
//! - Image and frame types (interleaved RGB24)
//! - The frame source with stereo, side-by-side and test-pattern modes
//! - H.264 encoding (openh264)
//! - The paced track that adapts variable-cost rendering to a fixed frame rate

pub mod encoder;
pub mod frame;
pub mod pacer;
pub mod source;

pub use encoder::H264Encoder;
pub use frame::{Frame, ImageBuffer, VIDEO_CLOCK_RATE};
pub use pacer::{PacedSource, TrackMode, run_track_writer};
pub use source::{Eye, FrameSource, SceneRenderer};
