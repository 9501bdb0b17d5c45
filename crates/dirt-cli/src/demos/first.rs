//! Reference app exercising Scenario S1: `second` calls `first.ping()`.

use std::sync::Arc;

use dirt_core::{Api, Args, KwArgs, Result, Value};
use dirt_host::Supervisor;

pub struct First;

#[dirt_macros::api]
impl First {
    /// Always answers `"pong"`.
    pub async fn ping(&self, _args: Args, _kwargs: KwArgs) -> Result<Value> {
        Ok(Value::String("pong".to_string()))
    }
}

pub fn build(_supervisor: Arc<Supervisor>) -> Arc<dyn Api> {
    Arc::new(First)
}

pub fn build_mock() -> Arc<dyn Api> {
    Arc::new(First)
}
