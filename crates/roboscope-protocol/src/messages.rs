use serde::{Deserialize, Serialize};

/// Messages sent from the viewer to the server over the signaling WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Session description offer starting a negotiation round
    Offer { sdp: String },

    /// Trickled ICE candidate; may arrive any time after the offer
    IceCandidate { candidate: IceCandidatePayload },

    /// Ping to keep the connection alive
    Ping,
}

/// Messages sent from the server to the viewer over the signaling WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Session description answer for a received offer
    Answer { sdp: String },

    /// Pong response to ping
    Pong,

    /// Per-message failure report; the connection stays open
    Error { message: String },
}

/// ICE candidate as serialized by the browser's `RTCIceCandidate.toJSON()`.
///
/// The candidate attributes (foundation, address, port, priority, protocol,
/// type) travel inside the `candidate` string in candidate-attribute syntax;
/// only the media-line association is broken out as separate fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}
