//! Per-remote connection pool (spec §4.3 / C3). One pool instance is shared
//! process-wide by every proxy/client talking to the native scheme; it is
//! keyed internally by `(host, port)` since a `Pool` only ever serves one
//! scheme (the native one).

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use dirt_core::{Codec, RemoteAddress, Result};
use tokio::sync::Mutex;

use super::connection::NativeConnection;

#[derive(Default)]
struct Idle(Mutex<VecDeque<NativeConnection>>);

/// `Pool::get` dials on demand (spec: "creating one on demand up to no
/// explicit cap"); `release` only keeps connections that are still open.
pub struct Pool {
    idle: DashMap<(String, u16), Arc<Idle>>,
    codec: Arc<dyn Codec>,
}

impl Pool {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            idle: DashMap::new(),
            codec,
        }
    }

    fn bucket(&self, address: &RemoteAddress) -> Arc<Idle> {
        self.idle
            .entry((address.host().to_string(), address.port()))
            .or_insert_with(|| Arc::new(Idle::default()))
            .clone()
    }

    pub async fn get(&self, address: &RemoteAddress) -> Result<NativeConnection> {
        let bucket = self.bucket(address);
        let popped = {
            let mut idle = bucket.0.lock().await;
            idle.pop_front()
        };
        match popped {
            Some(cxn) if cxn.is_open() => Ok(cxn),
            _ => NativeConnection::connect(address.host(), address.port(), self.codec.clone()).await,
        }
    }

    pub async fn release(&self, address: &RemoteAddress, cxn: NativeConnection) {
        if !cxn.is_open() {
            return;
        }
        let bucket = self.bucket(address);
        let mut idle = bucket.0.lock().await;
        idle.push_back(cxn);
    }

    /// Closes and drops every idle connection for `address`; borrowed
    /// connections are unaffected (they simply won't be accepted back in
    /// once their borrower calls `release`, since their bucket is now
    /// empty — this matches the spec's "close and drop all idle
    /// connections" scope).
    pub async fn disconnect(&self, address: &RemoteAddress) {
        if let Some(bucket) = self.idle.get(&(address.host().to_string(), address.port())) {
            let mut idle = bucket.0.lock().await;
            idle.clear();
        }
    }

    pub async fn idle_count(&self, address: &RemoteAddress) -> usize {
        match self.idle.get(&(address.host().to_string(), address.port())) {
            Some(bucket) => bucket.0.lock().await.len(),
            None => 0,
        }
    }
}
