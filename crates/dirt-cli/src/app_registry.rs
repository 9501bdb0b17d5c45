//! Maps a declared `app_class` name to the factory that builds it.
//!
//! Rust has no dynamic import equivalent to the `app_class` dotted path a
//! settings document names (spec §6); a process that wants to host an app
//! registers its factory here once at startup, the same way it would
//! register a mock (`dirt_host::MockRegistry`) or a protocol binding
//! (`dirt_core::ProtocolRegistry`).

use std::sync::Arc;

use dashmap::DashMap;
use dirt_core::{Api, DirtError, Result};
use dirt_host::Supervisor;

pub trait AppFactory: Send + Sync {
    /// Builds the app's API object. `supervisor` is handed through so an
    /// app can reach its siblings via `supervisor.get_api(name)`.
    fn build(&self, supervisor: Arc<Supervisor>) -> Arc<dyn Api>;
}

impl<F> AppFactory for F
where
    F: Fn(Arc<Supervisor>) -> Arc<dyn Api> + Send + Sync,
{
    fn build(&self, supervisor: Arc<Supervisor>) -> Arc<dyn Api> {
        (self)(supervisor)
    }
}

#[derive(Default)]
pub struct AppRegistry {
    factories: DashMap<String, Arc<dyn AppFactory>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, app_class: impl Into<String>, factory: Arc<dyn AppFactory>) {
        self.factories.insert(app_class.into(), factory);
    }

    pub fn build(&self, app_class: &str, supervisor: Arc<Supervisor>) -> Result<Arc<dyn Api>> {
        self.factories
            .get(app_class)
            .map(|f| f.build(supervisor))
            .ok_or_else(|| DirtError::configuration(format!("no app registered for `{app_class}`")))
    }
}
