//! Media session lifecycle
//!
//! One `Session` owns one peer connection: description exchange, candidate
//! accumulation, data-channel binding, connection-state observation and
//! teardown. Sessions are tracked per signaling connection in the
//! [`SessionRegistry`].

mod registry;

pub use registry::SessionRegistry;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use roboscope_protocol::{ControlSample, IceCandidatePayload};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_H264, MediaEngine};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use roboscope_media::{Eye, FrameSource, PacedSource, TrackMode, run_track_writer};

use crate::control::ControlSink;
use crate::error::SessionError;
use crate::state::{Config, VideoMode};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No offer processed yet
    Idle,
    /// Answer produced, transport connecting
    Negotiating,
    /// Transport up, track writers running
    Connected,
    /// Transport reported failure; terminal
    Failed,
    /// Explicitly closed; terminal
    Closed,
}

/// Stream parameters a session needs from the application config
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub video_mode: VideoMode,
    pub fps: u32,
    pub test_pattern: bool,
    pub stun_servers: Vec<String>,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            video_mode: config.video_mode,
            fps: config.fps,
            test_pattern: config.test_pattern,
            stun_servers: config.stun_servers.clone(),
        }
    }
}

/// A track attached during negotiation, waiting for the transport to come up
struct PendingTrack {
    pacer: PacedSource,
    track: Arc<TrackLocalStaticSample>,
}

/// One viewer's media session.
///
/// State machine: `Idle -> Negotiating -> Connected -> {Failed, Closed}`.
/// `handle_offer` is valid only from `Idle`; there is no renegotiation.
/// Candidate application and control forwarding are best-effort and never
/// terminate the session; a transport failure report is the one terminal
/// condition besides an explicit `close`.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    source: Arc<FrameSource>,
    control: Arc<dyn ControlSink>,
    state: RwLock<SessionState>,
    pc: RwLock<Option<Arc<RTCPeerConnection>>>,
    pending_tracks: Mutex<Vec<PendingTrack>>,
    shutdown: watch::Sender<bool>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        source: Arc<FrameSource>,
        control: Arc<dyn ControlSink>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            source,
            control,
            state: RwLock::new(SessionState::Idle),
            pc: RwLock::new(None),
            pending_tracks: Mutex::new(Vec::new()),
            shutdown,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Process the viewer's offer and return the local answer.
    ///
    /// Constructs the transport, attaches one or two paced video tracks per
    /// the configured video mode, registers the data-channel and
    /// connection-state callbacks, and completes the description exchange.
    /// Candidate gathering finishes before the answer is returned, so the
    /// answer is self-contained even for non-trickling viewers.
    pub async fn handle_offer(
        self: &Arc<Self>,
        sdp: String,
    ) -> Result<RTCSessionDescription, SessionError> {
        {
            let mut state = self.state.write().await;
            if *state != SessionState::Idle {
                return Err(SessionError::InvalidState {
                    expected: SessionState::Idle,
                    actual: *state,
                });
            }
            *state = SessionState::Negotiating;
        }

        tracing::info!("Session {}: offer received, negotiating", self.id);

        match self.negotiate(sdp).await {
            Ok(answer) => {
                tracing::info!("Session {}: answer created", self.id);
                Ok(answer)
            }
            Err(e) => {
                tracing::error!("Session {}: negotiation failed: {}", self.id, e);
                self.shutdown_transport(SessionState::Failed).await;
                Err(e)
            }
        }
    }

    async fn negotiate(
        self: &Arc<Self>,
        sdp: String,
    ) -> Result<RTCSessionDescription, SessionError> {
        let offer = RTCSessionDescription::offer(sdp)?;

        let api = build_api()?;
        let rtc_config = RTCConfiguration {
            ice_servers: self
                .config
                .stun_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);
        *self.pc.write().await = Some(Arc::clone(&pc));

        self.attach_tracks(&pc).await?;
        self.register_data_channel_handler(&pc);
        self.register_state_handler(&pc);

        pc.set_remote_description(offer).await?;
        let answer = pc.create_answer(None).await?;
        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer).await?;
        let _ = gathered.recv().await;

        pc.local_description()
            .await
            .ok_or(SessionError::MissingLocalDescription)
    }

    /// One combined track, or a tagged pair of per-eye tracks
    async fn attach_tracks(&self, pc: &Arc<RTCPeerConnection>) -> Result<(), SessionError> {
        let layouts: &[(TrackMode, &str)] = match self.config.video_mode {
            VideoMode::Combined => &[(TrackMode::Combined, "video")],
            VideoMode::Dual => &[
                (TrackMode::Eye(Eye::Left), "left"),
                (TrackMode::Eye(Eye::Right), "right"),
            ],
        };

        let mut pending = self.pending_tracks.lock().await;
        for (mode, track_id) in layouts {
            let pacer = PacedSource::new(
                Arc::clone(&self.source),
                *mode,
                self.config.test_pattern,
                self.config.fps,
            );
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_owned(),
                    clock_rate: 90_000,
                    ..Default::default()
                },
                (*track_id).to_owned(),
                "roboscope".to_owned(),
            ));
            pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            tracing::debug!("Session {}: attached track {:?}", self.id, track_id);
            pending.push(PendingTrack { pacer, track });
        }

        Ok(())
    }

    /// Bind the viewer's data channel; each message parses as a control
    /// sample and is forwarded immediately. Malformed messages are dropped,
    /// never fatal.
    fn register_data_channel_handler(&self, pc: &Arc<RTCPeerConnection>) {
        let control = Arc::clone(&self.control);
        let session_id = self.id;
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let control = Arc::clone(&control);
            Box::pin(async move {
                tracing::info!(
                    "Session {}: data channel established: {}",
                    session_id,
                    dc.label()
                );
                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    let control = Arc::clone(&control);
                    Box::pin(async move {
                        match serde_json::from_slice::<ControlSample>(&msg.data) {
                            Ok(sample) => control.apply_control(sample),
                            Err(e) => {
                                tracing::warn!("Dropping malformed control message: {}", e);
                            }
                        }
                    })
                }));
            })
        }));
    }

    /// Edge-triggered transport state observer: `connected` starts the track
    /// writers, `failed` tears the session down.
    fn register_state_handler(self: &Arc<Self>, pc: &Arc<RTCPeerConnection>) {
        let session = Arc::downgrade(self);
        pc.on_peer_connection_state_change(Box::new(move |new_state: RTCPeerConnectionState| {
            let session = session.clone();
            Box::pin(async move {
                let Some(session) = session.upgrade() else {
                    return;
                };
                tracing::info!("Session {}: connection state {}", session.id, new_state);
                match new_state {
                    RTCPeerConnectionState::Connected => {
                        session.on_transport_connected().await;
                    }
                    RTCPeerConnectionState::Failed => {
                        tracing::warn!("Session {}: transport failed, closing", session.id);
                        session.shutdown_transport(SessionState::Failed).await;
                    }
                    _ => {}
                }
            })
        }));
    }

    async fn on_transport_connected(&self) {
        {
            let mut state = self.state.write().await;
            if *state != SessionState::Negotiating {
                return;
            }
            *state = SessionState::Connected;
        }

        let pending: Vec<PendingTrack> = self.pending_tracks.lock().await.drain(..).collect();
        let count = pending.len();
        for PendingTrack { pacer, track } in pending {
            tokio::spawn(run_track_writer(pacer, track, self.shutdown.subscribe()));
        }
        tracing::info!(
            "Session {}: connected, {} track writer(s) running",
            self.id,
            count
        );
    }

    /// Apply a trickled candidate to the transport.
    ///
    /// Best-effort by design: a candidate arriving before the offer or after
    /// close is silently ignored, and application errors (stale or duplicate
    /// candidates) are dropped without affecting the session.
    pub async fn add_ice_candidate(&self, candidate: IceCandidatePayload) {
        let pc = self.pc.read().await.clone();
        let Some(pc) = pc else {
            tracing::debug!(
                "Session {}: ignoring ICE candidate with no active transport",
                self.id
            );
            return;
        };

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        match pc.add_ice_candidate(init).await {
            Ok(()) => tracing::debug!("Session {}: ICE candidate added", self.id),
            Err(e) => tracing::debug!("Session {}: dropped ICE candidate: {}", self.id, e),
        }
    }

    /// Release the transport and stop all track writers. Idempotent; safe
    /// from any state.
    pub async fn close(&self) {
        self.shutdown_transport(SessionState::Closed).await;
    }

    async fn shutdown_transport(&self, final_state: SessionState) {
        let _ = self.shutdown.send(true);

        let pc = self.pc.write().await.take();
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                tracing::warn!("Session {}: error closing transport: {}", self.id, e);
            }
            tracing::info!("Session {}: transport released", self.id);
        }
        self.pending_tracks.lock().await.clear();

        let mut state = self.state.write().await;
        // A failure verdict sticks; close after failure stays Failed.
        if *state != SessionState::Failed {
            *state = final_state;
        }
    }
}

/// WebRTC API configured the way every session uses it: H.264 video with the
/// default interceptor set
fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();

    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90_000,
                channels: 0,
                // Baseline profile, packetization-mode=1 for NAL unit mode
                sdp_fmtp_line:
                    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                        .to_string(),
                rtcp_feedback: vec![],
            },
            payload_type: 96,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .with_setting_engine(SettingEngine::default())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::LatestControlSink;
    use roboscope_media::ImageBuffer;
    use roboscope_media::SceneRenderer;
    use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

    struct GrayScene;

    impl SceneRenderer for GrayScene {
        fn render(&self) -> anyhow::Result<(ImageBuffer, ImageBuffer)> {
            Ok((
                ImageBuffer::solid(64, 48, [90, 90, 90]),
                ImageBuffer::solid(64, 48, [90, 90, 90]),
            ))
        }
    }

    fn test_session(video_mode: VideoMode) -> Arc<Session> {
        let source = Arc::new(FrameSource::new(Arc::new(GrayScene), 64, 48));
        Session::new(
            SessionConfig {
                video_mode,
                fps: 30,
                test_pattern: true,
                stun_servers: vec![],
            },
            source,
            Arc::new(LatestControlSink::new()),
        )
    }

    /// Offer as the browser viewer builds it: a control data channel plus
    /// recvonly video transceivers.
    async fn viewer_offer(video_lines: usize) -> RTCSessionDescription {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).unwrap();
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        pc.create_data_channel("control", None).await.unwrap();
        for _ in 0..video_lines {
            pc.add_transceiver_from_kind(RTPCodecType::Video, None)
                .await
                .unwrap();
        }

        let offer = pc.create_offer(None).await.unwrap();
        pc.close().await.unwrap();
        offer
    }

    #[tokio::test]
    async fn offer_from_idle_yields_answer_and_negotiating_state() {
        let session = test_session(VideoMode::Combined);
        assert_eq!(session.state().await, SessionState::Idle);

        let offer = viewer_offer(1).await;
        let answer = session.handle_offer(offer.sdp).await.expect("answer");

        assert_eq!(answer.sdp_type, RTCSdpType::Answer);
        assert!(!answer.sdp.is_empty());
        assert_eq!(session.state().await, SessionState::Negotiating);

        session.close().await;
    }

    #[tokio::test]
    async fn second_offer_is_an_invalid_state_error() {
        let session = test_session(VideoMode::Dual);

        let offer = viewer_offer(2).await;
        session.handle_offer(offer.sdp).await.expect("first offer");

        let again = viewer_offer(2).await;
        let err = session.handle_offer(again.sdp).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                expected: SessionState::Idle,
                actual: SessionState::Negotiating,
            }
        ));

        session.close().await;
    }

    #[tokio::test]
    async fn malformed_offer_fails_the_call_and_the_session() {
        let session = test_session(VideoMode::Combined);

        let err = session
            .handle_offer("this is not sdp".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Negotiation(_)));
        assert_eq!(session.state().await, SessionState::Failed);

        // close after failure keeps the failure verdict
        session.close().await;
        assert_eq!(session.state().await, SessionState::Failed);
    }

    #[tokio::test]
    async fn candidate_before_offer_is_silently_ignored() {
        let session = test_session(VideoMode::Combined);

        session
            .add_ice_candidate(IceCandidatePayload {
                candidate: "candidate:1 1 udp 2122260223 127.0.0.1 50000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            })
            .await;

        assert_eq!(session.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn close_is_idempotent_from_any_state() {
        let session = test_session(VideoMode::Combined);
        session.close().await;
        session.close().await;
        assert_eq!(session.state().await, SessionState::Closed);

        let negotiated = test_session(VideoMode::Combined);
        let offer = viewer_offer(1).await;
        negotiated.handle_offer(offer.sdp).await.expect("answer");
        negotiated.close().await;
        negotiated.close().await;
        assert_eq!(negotiated.state().await, SessionState::Closed);
    }
}
