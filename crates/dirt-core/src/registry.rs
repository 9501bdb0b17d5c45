//! Protocol registry (spec §4.7 / C7) and the abstract contracts the rest of
//! the fabric talks to instead of ever matching on a URL scheme directly
//! (spec §9 Design Notes: "avoid conditional logic keyed on scheme").
//!
//! Only the native `dirt` scheme binding ships with this crate's sibling
//! `dirt-rpc`; the drop-in third-party binding spec.md §4.7 mentions as an
//! alternative is out of scope here (see Open Question #3 in `DESIGN.md`) —
//! but nothing in this module assumes there is ever only one binding.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;

use crate::address::RemoteAddress;
use crate::call::Call;
use crate::error::{DirtError, Result};
use crate::value::{Args, KwArgs, Value};

pub type BoxedValueStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// The result of a completed call: either a single value or a lazy sequence
/// of values (spec's "generator-valued result"). Kept as a distinct type
/// from a synchronous return, per the Design Notes' warning against
/// conflating the two.
pub enum CallOutcome {
    Value(Value),
    Stream(Box<dyn ResponseStream>),
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            CallOutcome::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// A lazy sequence of values still occupying its connection (spec §9
/// "Generator-valued results"). `next`/`close` are the only two operations;
/// whichever terminal event happens first (exhaustion, explicit close, or
/// an error) is responsible for releasing whatever the implementation is
/// holding exactly once (Testable Property 6).
#[async_trait]
pub trait ResponseStream: Send {
    /// `Ok(None)` means the stream is exhausted (a `stop` was observed).
    async fn next(&mut self) -> Result<Option<Value>>;

    /// Explicit early close. Implementations must make this — and the
    /// exhaustion path, and any error path — idempotent with respect to
    /// releasing the underlying connection.
    async fn close(&mut self) -> Result<()>;
}

/// What an app's API object exposes to the edge. There is no runtime
/// reflection in Rust, so `method_names`/`doc`/`no_timeout` replace
/// attribute introspection — `dirt-macros::api` generates this impl for a
/// plain `impl` block of `pub async fn` methods (see `dirt-rpc::Api`, which
/// re-exports this trait, for the canonical way to implement it).
#[async_trait]
pub trait Api: Send + Sync {
    /// Names of this API's callable, non-underscore-prefixed methods.
    fn method_names(&self) -> Vec<String>;

    /// Documentation string for `method`, if any — backs the `getdoc`
    /// reflective suffix (spec §4.6 step 5).
    fn doc(&self, method: &str) -> Option<String>;

    /// Whether `method` is exempt from the edge's call timeout.
    fn no_timeout(&self, method: &str) -> bool {
        let _ = method;
        false
    }

    async fn invoke(&self, method: &str, args: Args, kwargs: KwArgs) -> Result<ApiOutcome>;
}

/// Mirrors [`CallOutcome`] but at the API-object boundary, before the edge
/// has wrapped a stream for accounting purposes.
pub enum ApiOutcome {
    Value(Value),
    Stream(BoxedValueStream),
}

/// What a [`ServerBinding`] hands decoded calls to. Implemented by
/// `dirt-rpc::edge::Edge`; kept as a trait here so `dirt-core` (and any
/// future binding crate) never needs to depend on `dirt-rpc` concretely.
#[async_trait]
pub trait EdgeDispatch: Send + Sync {
    async fn dispatch(&self, call: Call, peer_address: Option<String>) -> Result<CallOutcome>;
}

/// What the client-side half of a binding does with a fully-built [`Call`].
#[async_trait]
pub trait ClientBinding: Send + Sync {
    async fn call(&self, address: &RemoteAddress, call: Call) -> Result<CallOutcome>;
}

/// What the server-side half of a binding does: accept connections on
/// `address` for as long as `shutdown` hasn't fired, dispatching every
/// decoded call to `edge`.
#[async_trait]
pub trait ServerBinding: Send + Sync {
    async fn serve(
        &self,
        address: &RemoteAddress,
        edge: Arc<dyn EdgeDispatch>,
        shutdown: ShutdownSignal,
    ) -> Result<()>;
}

/// Cooperative shutdown signal shared between a supervisor and whatever it
/// started serving. Cloning gives every holder an independent view of the
/// same underlying `watch` cell.
#[derive(Clone)]
pub struct ShutdownSignal(tokio::sync::watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolves once [`ShutdownHandle::trigger`] has been called.
    pub async fn recv(&mut self) {
        let _ = self.0.changed().await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

pub struct ShutdownHandle(tokio::sync::watch::Sender<bool>);

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (Self(tx), ShutdownSignal(rx))
    }

    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

type Binding = (Arc<dyn ServerBinding>, Arc<dyn ClientBinding>);

/// Process-wide mapping from URL scheme to a `(ServerBinding, ClientBinding)`
/// pair (spec §4.7 / C7). Populated once at startup by whoever assembles the
/// process (typically `dirt-host`'s child entry point), then consulted by
/// proxies and the supervisor for every remote address they touch.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    bindings: Arc<DashMap<String, Binding>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        scheme: impl Into<String>,
        server: Arc<dyn ServerBinding>,
        client: Arc<dyn ClientBinding>,
    ) {
        self.bindings.insert(scheme.into(), (server, client));
    }

    pub fn client_for(&self, scheme: &str) -> Result<Arc<dyn ClientBinding>> {
        self.bindings
            .get(scheme)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| DirtError::configuration(format!("no binding registered for scheme `{scheme}`")))
    }

    pub fn server_for(&self, scheme: &str) -> Result<Arc<dyn ServerBinding>> {
        self.bindings
            .get(scheme)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| DirtError::configuration(format!("no binding registered for scheme `{scheme}`")))
    }

    pub fn schemes(&self) -> Vec<String> {
        self.bindings.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopServer;
    #[async_trait]
    impl ServerBinding for NoopServer {
        async fn serve(
            &self,
            _address: &RemoteAddress,
            _edge: Arc<dyn EdgeDispatch>,
            _shutdown: ShutdownSignal,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct NoopClient;
    #[async_trait]
    impl ClientBinding for NoopClient {
        async fn call(&self, _address: &RemoteAddress, _call: Call) -> Result<CallOutcome> {
            Ok(CallOutcome::Value(Value::Null))
        }
    }

    #[test]
    fn unregistered_scheme_is_a_configuration_error() {
        let registry = ProtocolRegistry::new();
        let err = registry.client_for("dirt").unwrap_err();
        assert!(matches!(err, DirtError::Configuration(_)));
    }

    #[test]
    fn registered_scheme_round_trips() {
        let registry = ProtocolRegistry::new();
        registry.register("dirt", Arc::new(NoopServer), Arc::new(NoopClient));
        assert!(registry.client_for("dirt").is_ok());
        assert!(registry.server_for("dirt").is_ok());
    }
}
