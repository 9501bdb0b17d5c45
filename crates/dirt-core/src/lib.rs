//! `dirt-core`: wire-level data model, framing/codec, and the abstract
//! registry contracts (`ClientBinding`/`ServerBinding`/`EdgeDispatch`/`Api`)
//! that the rest of the RPC fabric is built on.
//!
//! This crate has no opinion on what transport carries the bytes or what a
//! host process looks like — those live in `dirt-rpc` and `dirt-host`
//! respectively. Keeping them separate is what lets the protocol registry
//! (§4.7) hand back opaque `(ServerBinding, ClientBinding)` pairs instead of
//! the core ever matching on a URL scheme.

mod address;
mod call;
mod codec;
mod error;
mod framing;
mod message;
mod registry;
mod stats;
mod value;

pub use address::RemoteAddress;
pub use call::{Call, CallFlags, CallMeta};
pub use codec::{Codec, JsonCodec, default_codec};
pub use error::{DirtError, Result};
pub use framing::{MAX_FRAME_BYTES, read_frame, write_frame};
pub use message::Message;
pub use registry::{
    Api, ApiOutcome, BoxedValueStream, CallOutcome, ClientBinding, EdgeDispatch, ProtocolRegistry,
    ResponseStream, ServerBinding, ShutdownHandle, ShutdownSignal,
};
pub use stats::{ActiveCallSnapshot, ActiveCalls, CallId, CallStats};
pub use value::{Args, KwArgs, Value};
