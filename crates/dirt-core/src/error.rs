use std::time::Duration;

/// The stable error taxonomy shared by every layer of the RPC fabric.
///
/// # Why
/// Transport faults, protocol violations, remote-application failures and
/// local timeouts all need to be told apart by callers (the client retries
/// transport faults once, never retries a remote-application error) and by
/// the edge's stats (`errors` increments on every variant except
/// admission-saturation, which is never raised at all — see
/// [`DirtError::is_retryable`]).
///
/// # What
/// One variant per kind named in the specification's error-handling design:
/// transport, protocol, remote-application, timeout, not-found and
/// configuration. Admission-saturation has no variant: it is logged and the
/// caller simply waits on the semaphore.
#[derive(Debug, thiserror::Error)]
pub enum DirtError {
    /// Socket fault, short read, oversized frame, or codec failure.
    #[error("transport fault: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Unexpected message type or malformed call on an otherwise-live
    /// connection. Distinct from `Transport` because the socket itself is
    /// fine; the peer is speaking a dialect we don't.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer's method raised; `description` is its stable textual form.
    /// The spec is explicit that this string is never parsed back into
    /// structured data.
    #[error("remote application error: {0}")]
    RemoteApplication(String),

    /// Local admission/call timeout fired before the method returned.
    #[error("call `{name}` timed out after {elapsed:?}")]
    Timeout { name: String, elapsed: Duration },

    /// `head` resolved to nothing on the target API (or a non-`getdoc`
    /// suffix was used).
    #[error("no method `{0}`")]
    NotFound(String),

    /// Bad settings document, bad CLI invocation, bad flag combination.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl DirtError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn remote(description: impl Into<String>) -> Self {
        Self::RemoteApplication(description.into())
    }

    pub fn timeout(name: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            name: name.into(),
            elapsed,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Only transport faults are eligible for the client's single retry
    /// attempt (spec §4.4 step 5); every other kind propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Stable textual form sent to the peer in a `raise` message. The wire
    /// schema is deliberately minimal (a human-readable string), so this is
    /// just `Display`.
    pub fn to_wire_description(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, DirtError>;
