//! The edge (spec §4.6 / C6): the contract between wire-level calls and the
//! host app's methods. Owns method resolution, admission, timeout, the
//! active-call registry, call-stats, and the built-in debug API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dirt_core::{
    Api, ApiOutcome, Call, CallOutcome, DirtError, EdgeDispatch, Result, ResponseStream,
    ActiveCalls, CallId, CallStats, Value,
};
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::debug_api::DebugApi;

const DEBUG_NAME_PREFIX: &str = "debug.";

/// Default admission cap (spec §4.6: "capacity `max_concurrent_calls`
/// (default 64; `none` disables limiting)").
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 64;

pub struct EdgeConfig {
    pub max_concurrent_calls: Option<usize>,
    pub call_timeout: Option<Duration>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: Some(DEFAULT_MAX_CONCURRENT_CALLS),
            call_timeout: None,
        }
    }
}

/// Mediates every inbound call for one host app. `api` is the app's own
/// API object (resolved by whatever owns this edge — typically
/// `dirt-host`'s supervisor); the debug surface is always available under
/// the `debug.` prefix regardless of what `api` exposes.
pub struct Edge {
    api: Arc<dyn Api>,
    debug: DebugApi,
    semaphore: Option<Arc<Semaphore>>,
    call_timeout: Option<Duration>,
    stats: Arc<CallStats>,
    active_calls: Arc<ActiveCalls>,
    started_at: Instant,
}

impl Edge {
    pub fn new(api: Arc<dyn Api>, config: EdgeConfig) -> Self {
        let stats = Arc::new(CallStats::default());
        let active_calls = Arc::new(ActiveCalls::new());
        Self {
            debug: DebugApi::new(api.clone(), stats.clone(), active_calls.clone(), Instant::now()),
            api,
            semaphore: config.max_concurrent_calls.map(|n| Arc::new(Semaphore::new(n))),
            call_timeout: config.call_timeout,
            stats,
            active_calls,
            started_at: Instant::now(),
        }
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn active_calls(&self) -> &ActiveCalls {
        &self.active_calls
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Method resolution (spec §4.6 steps 1-3): a complete, self-contained
    /// phase that must fully succeed or fail *before* admission ever runs —
    /// a call that doesn't resolve to a real method was never admitted.
    fn check_resolvable(api_obj: &dyn Api, method: &str, suffix: Option<&str>) -> Result<()> {
        if method.starts_with('_') {
            return Err(DirtError::not_found(method));
        }
        if !api_obj.method_names().iter().any(|m| m == method) {
            return Err(DirtError::not_found(method));
        }
        if let Some(suffix) = suffix {
            if suffix != "getdoc" {
                return Err(DirtError::not_found(format!("{method}.{suffix}")));
            }
        }
        Ok(())
    }

    /// Runs the already-resolved call. Only reachable once
    /// `check_resolvable` has succeeded for the same `(api_obj, method,
    /// suffix)`.
    async fn execute(api_obj: &dyn Api, method: &str, suffix: Option<&str>, call: &Call) -> Result<ApiOutcome> {
        if suffix.is_some() {
            let doc = api_obj.doc(method).unwrap_or_default();
            return Ok(ApiOutcome::Value(Value::String(doc)));
        }
        api_obj
            .invoke(method, call.args().to_vec(), call.kwargs().clone())
            .await
    }

    /// `is_debug` only scopes which API's methods answer `no_timeout` —
    /// the debug surface bypasses the *admission semaphore*, not the call
    /// timeout (spec §4.6: "gates non-debug calls" is scoped to admission;
    /// the timeout rule that follows applies uniformly).
    fn no_timeout_for(&self, is_debug: bool, method: &str) -> bool {
        if is_debug {
            self.debug.no_timeout(method)
        } else {
            self.api.no_timeout(method)
        }
    }
}

#[async_trait]
impl EdgeDispatch for Edge {
    async fn dispatch(&self, mut call: Call, peer_address: Option<String>) -> Result<CallOutcome> {
        // Step 1: only the reserved `debug.` prefix selects a different API
        // object; anything else goes to the host app's own API with its
        // name untouched (spec §4.6 step 1).
        let (is_debug, remainder) = match call.name().strip_prefix(DEBUG_NAME_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, call.name()),
        };
        // Step 2: split the remainder at the first `.` into head/suffix.
        let (method, suffix) = match remainder.split_once('.') {
            Some((head, tail)) => (head.to_string(), Some(tail.to_string())),
            None => (remainder.to_string(), None),
        };

        let api_obj: &dyn Api = if is_debug { &self.debug } else { self.api.as_ref() };

        // Steps 3-5: resolve fully before admission touches the semaphore
        // or `active_calls` — a not-found call was never admitted.
        Self::check_resolvable(api_obj, &method, suffix.as_deref())?;

        // Admission: debug calls bypass the semaphore entirely (spec §4.6).
        let _permit = if is_debug {
            None
        } else if let Some(semaphore) = &self.semaphore {
            match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(call = call.name(), "too many concurrent callers, call is waiting");
                    Some(
                        semaphore
                            .clone()
                            .acquire_owned()
                            .await
                            .expect("semaphore never closed"),
                    )
                }
            }
        } else {
            None
        };

        // Admitted: record how long the call sat since receipt (queueing is
        // entirely the semaphore wait above, since there is no separate
        // executor queue in this cooperative model).
        let time_in_queue = call.meta().time_received().elapsed();
        call.meta_mut().set_time_in_queue(time_in_queue);
        let call_id: CallId = self.active_calls.admit(call.name().to_string(), peer_address);
        self.active_calls.mark_started(call_id, time_in_queue);

        let timeout = if self.no_timeout_for(is_debug, &method) {
            None
        } else {
            self.call_timeout
        };

        let started = Instant::now();
        let invocation = Self::execute(api_obj, &method, suffix.as_deref(), &call);

        let outcome = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, invocation).await {
                Ok(result) => result,
                Err(_) => Err(DirtError::timeout(call.name().to_string(), started.elapsed())),
            },
            None => invocation.await,
        };

        match outcome {
            Ok(ApiOutcome::Value(value)) => {
                self.finalize(call_id, false);
                Ok(CallOutcome::Value(value))
            }
            Ok(ApiOutcome::Stream(stream)) => {
                let wrapped = AccountedStream::new(stream, call_id, self.active_calls.clone(), self.stats.clone());
                Ok(CallOutcome::Stream(Box::new(wrapped)))
            }
            Err(err) => {
                self.finalize(call_id, true);
                Err(err)
            }
        }
    }
}

impl Edge {
    fn finalize(&self, call_id: CallId, failed: bool) {
        self.active_calls.remove(call_id);
        self.stats.record_finish(failed);
    }
}

/// Wraps a lazily-produced value sequence so every yielded item is counted
/// in `meta.yielded_items` and finalisation runs exactly once on whichever
/// terminal event comes first — exhaustion, explicit close, or an error
/// (spec §4.6 "Execution"/"Finalisation").
struct AccountedStream {
    inner: dirt_core::BoxedValueStream,
    call_id: CallId,
    active_calls: Arc<ActiveCalls>,
    stats: Arc<CallStats>,
    finalized: bool,
}

impl AccountedStream {
    fn new(
        inner: dirt_core::BoxedValueStream,
        call_id: CallId,
        active_calls: Arc<ActiveCalls>,
        stats: Arc<CallStats>,
    ) -> Self {
        Self {
            inner,
            call_id,
            active_calls,
            stats,
            finalized: false,
        }
    }

    fn finalize(&mut self, failed: bool) {
        if !self.finalized {
            self.finalized = true;
            self.active_calls.remove(self.call_id);
            self.stats.record_finish(failed);
        }
    }
}

impl Drop for AccountedStream {
    fn drop(&mut self) {
        self.finalize(false);
    }
}

#[async_trait]
impl ResponseStream for AccountedStream {
    async fn next(&mut self) -> Result<Option<Value>> {
        match self.inner.next().await {
            Some(Ok(value)) => {
                self.active_calls.record_yield(self.call_id);
                Ok(Some(value))
            }
            Some(Err(err)) => {
                self.finalize(true);
                Err(err)
            }
            None => {
                self.finalize(false);
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.finalize(false);
        Ok(())
    }
}
