use std::sync::Arc;

use crate::error::{DirtError, Result};
use crate::message::Message;

/// A reversible `(type, payload)` <-> bytes mapping, orthogonal to framing
/// (spec §4.1). Pluggable in principle — a single default is fixed
/// project-wide so two peers without prior negotiation interoperate.
pub trait Codec: Send + Sync + std::fmt::Debug + 'static {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Message>;

    /// Stable identifier, useful for logging which codec a connection
    /// negotiated (there is currently only ever one).
    fn name(&self) -> &'static str;
}

/// The project-fixed default codec. JSON keeps the payload human-inspectable
/// on the wire, which matters for a framework whose entire debug surface is
/// "connect a shell and look at what's flowing".
#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        serde_json::to_vec(message)
            .map_err(|err| DirtError::protocol(format!("failed to encode message: {err}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        serde_json::from_slice(bytes)
            .map_err(|err| DirtError::protocol(format!("failed to decode message: {err}")))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Returns the process-wide default codec. Every native connection uses
/// this unless a future binding explicitly negotiates another one.
pub fn default_codec() -> Arc<dyn Codec> {
    Arc::new(JsonCodec)
}
