//! `dirt-rpc`: the native wire protocol (connection, pool, client, server),
//! the edge that mediates every inbound call, and the attribute-chaining
//! proxy apps use to call one another.
//!
//! `dirt-core` defines the abstract contracts (`Api`, `ClientBinding`,
//! `ServerBinding`, `EdgeDispatch`, `ProtocolRegistry`); this crate supplies
//! the one concrete binding that ships out of the box plus the edge that
//! sits behind every `ServerBinding`.

mod debug_api;
mod edge;
pub mod native;
mod proxy;

pub use debug_api::DebugApi;
pub use edge::{DEFAULT_MAX_CONCURRENT_CALLS, Edge, EdgeConfig};
pub use proxy::Proxy;
