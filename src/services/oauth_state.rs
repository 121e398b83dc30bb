//! Opaque OAuth state envelope
//!
//! The authorization round trip loses all request context: the provider
//! redirects the browser back to us with nothing but `code` and whatever we
//! packed into `state`. The envelope carries the user id, platform, and the
//! URI to send the browser back to, plus the gateway credential when the
//! hosting gateway needs it echoed on the callback. It travels through an
//! untrusted third party, so decoding treats it as hostile input: a typed
//! error, never a panic.

use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STATE_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEnvelope {
    #[serde(rename = "v", default = "default_version")]
    pub version: u8,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub platform: String,
    #[serde(rename = "origRedirect")]
    pub orig_redirect: String,
    #[serde(rename = "gatewayKey", skip_serializing_if = "Option::is_none", default)]
    pub gateway_key: Option<String>,
}

// Envelopes minted before the version tag existed carry no "v" field.
fn default_version() -> u8 {
    1
}

#[derive(Debug, thiserror::Error)]
pub enum StateDecodeError {
    #[error("state is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("state payload is not a valid envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state version {0}")]
    Version(u8),
}

impl StateEnvelope {
    pub fn new(
        user_id: Uuid,
        platform: &str,
        orig_redirect: &str,
        gateway_key: Option<String>,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            user_id,
            platform: platform.to_string(),
            orig_redirect: orig_redirect.to_string(),
            gateway_key,
        }
    }

    /// Serialize to the query-safe form the provider round-trips verbatim.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("state envelope serializes");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(state: &str) -> Result<Self, StateDecodeError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(state)?;
        let envelope: StateEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != STATE_VERSION {
            return Err(StateDecodeError::Version(envelope.version));
        }
        Ok(envelope)
    }
}
