//! Shared wire types for Roboscope
//!
//! Defines the JSON signaling protocol spoken over the WebSocket channel and
//! the control samples carried over the negotiated data channel. Both sides
//! of the wire (the browser viewer and the server) agree on these shapes.

pub mod control;
pub mod messages;

pub use control::{
    ControlSample, ControllerButtons, ControllerState, Hand, HeadsetPose, Quat, Vec2, Vec3,
};
pub use messages::{ClientMessage, IceCandidatePayload, ServerMessage};
