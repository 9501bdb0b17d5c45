//! The built-in debug API (spec §4.6 "Built-in debug API"), always
//! reachable under the `debug.` prefix regardless of what the host app's own
//! API exposes.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use dirt_core::{Api, Args, DirtError, KwArgs, Value};
use dirt_core::{ActiveCalls, CallStats};
use serde_json::json;

pub struct DebugApi {
    api: Arc<dyn Api>,
    stats: Arc<CallStats>,
    active_calls: Arc<ActiveCalls>,
    started_at: Instant,
}

impl DebugApi {
    pub fn new(api: Arc<dyn Api>, stats: Arc<CallStats>, active_calls: Arc<ActiveCalls>, started_at: Instant) -> Self {
        Self {
            api,
            stats,
            active_calls,
            started_at,
        }
    }
}

fn bool_arg(args: &Args, kwargs: &KwArgs, name: &str, index: usize) -> bool {
    kwargs
        .get(name)
        .or_else(|| args.get(index))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[dirt_macros::api]
impl DebugApi {
    /// Liveness probe. Returns `"pong: <epoch-seconds>"`; raises if
    /// `raise_error` is true.
    pub async fn ping(&self, args: Args, kwargs: KwArgs) -> dirt_core::Result<Value> {
        if bool_arg(&args, &kwargs, "raise_error", 0) {
            return Err(DirtError::remote("ping raised on request"));
        }
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(Value::String(format!("pong: {epoch}")))
    }

    /// Names of the host API's callable, non-underscore-prefixed methods,
    /// plus the debug prefix itself.
    pub async fn api_methods(&self, _args: Args, _kwargs: KwArgs) -> dirt_core::Result<Value> {
        let mut names: Vec<Value> = self
            .api
            .method_names()
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .map(Value::String)
            .collect();
        names.push(Value::String("debug".to_string()));
        Ok(Value::Array(names))
    }

    /// Names of the debug API's own public methods (the `getdoc` sentinel
    /// is not a method and is never listed here).
    pub async fn debug_methods(&self, _args: Args, _kwargs: KwArgs) -> dirt_core::Result<Value> {
        Ok(Value::Array(
            vec!["ping", "api_methods", "debug_methods", "active_calls", "status"]
                .into_iter()
                .map(|name| Value::String(name.to_string()))
                .collect(),
        ))
    }

    /// `(address, snapshot)` pairs for every call currently admitted.
    pub async fn active_calls(&self, _args: Args, _kwargs: KwArgs) -> dirt_core::Result<Value> {
        let entries: Vec<Value> = self
            .active_calls
            .snapshot()
            .into_iter()
            .map(|(address, snapshot)| {
                json!({
                    "address": address,
                    "snapshot": {
                        "id": snapshot.id,
                        "name": snapshot.name,
                        "age_ms": snapshot.age().as_millis() as u64,
                        "time_in_queue_ms": snapshot.time_in_queue.map(|d| d.as_millis() as u64),
                        "yielded_items": snapshot.yielded_items,
                        "pending": snapshot.is_pending(),
                    },
                })
            })
            .collect();
        Ok(Value::Array(entries))
    }

    /// `{uptime, api_calls: {completed, errors, pending, active}}`.
    ///
    /// `pending` is admitted-but-not-yet-started (zero `time_in_queue`);
    /// `active` is the rest.
    pub async fn status(&self, _args: Args, _kwargs: KwArgs) -> dirt_core::Result<Value> {
        let snapshot = self.active_calls.snapshot();
        let pending = snapshot.iter().filter(|(_, s)| s.is_pending()).count();
        let active = snapshot.len() - pending;
        Ok(json!({
            "uptime_secs": self.started_at.elapsed().as_secs_f64(),
            "api_calls": {
                "completed": self.stats.completed(),
                "errors": self.stats.errors(),
                "pending": pending,
                "active": active,
            },
        }))
    }
}
