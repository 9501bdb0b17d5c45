//! The native `dirt://` scheme binding: the one `(ServerBinding,
//! ClientBinding)` pair this crate ships out of the box (spec §4.7's
//! "Two bindings are shipped" — the other, third-party-wrapping binding is
//! out of scope, see `DESIGN.md`).

mod client;
mod connection;
mod pool;
mod server;
mod stream;

pub use client::NativeClient;
pub use connection::NativeConnection;
pub use pool::Pool;
pub use server::NativeServer;
pub use stream::NativeResponseStream;

use std::sync::Arc;

use dirt_core::{Codec, ProtocolRegistry};

/// Builds the native binding pair and registers it under `dirt` in
/// `registry`. Apps/hosts call this once at startup.
pub fn register(registry: &ProtocolRegistry, codec: Arc<dyn Codec>) {
    let pool = Arc::new(Pool::new(codec.clone()));
    let client = Arc::new(NativeClient::new(pool, codec.clone()));
    let server = Arc::new(NativeServer::new(codec));
    registry.register("dirt", server, client);
}
