//! Reference app exercising Scenario S1: calls `first.ping()` through the
//! supervisor's `get_api` resolution rather than dialing `first` directly,
//! so it works whether `first` is a live peer or (with mocking enabled and
//! `first` unreachable) a mock standing in for it.

use std::sync::Arc;

use dirt_core::{Api, Args, KwArgs, Result, Value};
use dirt_host::Supervisor;

pub struct Second {
    supervisor: Arc<Supervisor>,
}

#[dirt_macros::api]
impl Second {
    /// Calls `first.ping()` and returns whatever it answered.
    pub async fn call_first(&self, _args: Args, _kwargs: KwArgs) -> Result<Value> {
        let first = self.supervisor.get_api("first").await?;
        first.call("ping", Vec::new(), KwArgs::new()).await
    }
}

pub fn build(supervisor: Arc<Supervisor>) -> Arc<dyn Api> {
    Arc::new(Second { supervisor })
}
