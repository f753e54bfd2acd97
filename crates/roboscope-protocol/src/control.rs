use serde::{Deserialize, Serialize};

/// 3D position in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// 2D axis pair (thumbstick deflection)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

/// Analog button state of one controller, values in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerButtons {
    #[serde(default)]
    pub trigger: f64,
    #[serde(default)]
    pub grip: f64,
    #[serde(default)]
    pub thumbstick: Vec2,
}

/// Pose and input state of one tracked controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub hand: Hand,
    pub position: Vec3,
    pub rotation: Quat,
    #[serde(default)]
    pub buttons: ControllerButtons,
}

/// Headset pose
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadsetPose {
    pub position: Vec3,
    pub rotation: Quat,
}

/// One control update from the viewer, sent over the data channel at the
/// viewer's own cadence. Consumed immediately, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSample {
    /// Milliseconds since the viewer's time origin (`performance.now()`)
    pub timestamp: f64,
    pub headset: HeadsetPose,
    #[serde(default)]
    pub controllers: Vec<ControllerState>,
}
