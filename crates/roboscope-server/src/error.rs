use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is only valid in a specific lifecycle state.
    /// Raised by `handle_offer` outside `Idle`; there is no renegotiation.
    #[error("invalid session state: expected {expected:?}, session is {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Transport negotiation failure (malformed descriptor, setup error).
    /// Scoped to the one offer; reported back to that viewer only.
    #[error("transport negotiation failed: {0}")]
    Negotiation(#[from] webrtc::Error),

    /// The transport finished negotiating without producing a local
    /// description to send back
    #[error("negotiation produced no local description")]
    MissingLocalDescription,
}
