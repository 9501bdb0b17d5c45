//! Mock fallback (spec §4.8 "API resolution", Testable Property 7). A mock
//! is anything that can stand in for an unreachable peer's API surface.

use std::sync::Arc;

use dashmap::DashMap;
use dirt_core::{Api, DirtError, Result};

pub trait MockFactory: Send + Sync {
    fn build(&self) -> Arc<dyn Api>;
}

impl<F> MockFactory for F
where
    F: Fn() -> Arc<dyn Api> + Send + Sync,
{
    fn build(&self) -> Arc<dyn Api> {
        (self)()
    }
}

/// Maps a declared `mock_cls` name to the factory that builds it. Apps
/// register their mocks here at startup (typically from `dirt-cli`'s
/// binary entry point) the same way they register their real API object.
#[derive(Default)]
pub struct MockRegistry {
    factories: DashMap<String, Arc<dyn MockFactory>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mock_cls: impl Into<String>, factory: Arc<dyn MockFactory>) {
        self.factories.insert(mock_cls.into(), factory);
    }

    pub fn build(&self, mock_cls: &str) -> Result<Arc<dyn Api>> {
        self.factories
            .get(mock_cls)
            .map(|f| f.build())
            .ok_or_else(|| DirtError::configuration(format!("no mock registered for `{mock_cls}`")))
    }
}
