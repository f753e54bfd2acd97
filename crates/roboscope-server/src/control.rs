//! Control-channel sink
//!
//! Inbound data-channel messages are parsed into control samples and handed
//! to a sink supplied at session construction. The robot-control collaborator
//! lives behind this trait; the session never buffers samples itself.

use std::sync::RwLock;

use roboscope_protocol::ControlSample;

/// Consumer of viewer control input. Called from the data-channel callback;
/// implementations must be cheap and non-blocking.
pub trait ControlSink: Send + Sync {
    fn apply_control(&self, sample: ControlSample);
}

/// Keeps only the most recent sample, for consumers that poll the pose at
/// their own cadence (the simulation loop does)
#[derive(Default)]
pub struct LatestControlSink {
    last: RwLock<Option<ControlSample>>,
}

impl LatestControlSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<ControlSample> {
        self.last
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ControlSink for LatestControlSink {
    fn apply_control(&self, sample: ControlSample) {
        tracing::trace!(
            timestamp = sample.timestamp,
            controllers = sample.controllers.len(),
            "control sample received"
        );
        *self
            .last
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roboscope_protocol::control::HeadsetPose;

    fn sample(timestamp: f64) -> ControlSample {
        ControlSample {
            timestamp,
            headset: HeadsetPose {
                position: Default::default(),
                rotation: Default::default(),
            },
            controllers: vec![],
        }
    }

    #[test]
    fn keeps_only_newest_sample() {
        let sink = LatestControlSink::new();
        assert!(sink.latest().is_none());

        sink.apply_control(sample(1.0));
        sink.apply_control(sample(2.0));

        assert_eq!(sink.latest().map(|s| s.timestamp), Some(2.0));
    }
}
