//! The native `ClientBinding` (spec §4.4 / C4): borrows from the pool, walks
//! the send/receive/retry procedure, and hands back a [`CallOutcome`].

use std::sync::Arc;

use async_trait::async_trait;
use dirt_core::{Call, CallOutcome, Codec, ClientBinding, DirtError, Message, RemoteAddress, Result};
use tracing::warn;

use super::pool::Pool;
use super::stream::NativeResponseStream;

/// `retry_once` mirrors the spec's "client-level retry-once flag" — ANDed
/// with the call's own `can_retry` flag (Open Question #1, resolved in
/// `DESIGN.md`).
pub struct NativeClient {
    pool: Arc<Pool>,
    codec: Arc<dyn Codec>,
    retry_once: bool,
}

impl NativeClient {
    pub fn new(pool: Arc<Pool>, codec: Arc<dyn Codec>) -> Self {
        Self {
            pool,
            codec,
            retry_once: true,
        }
    }

    pub fn with_retry_once(mut self, retry_once: bool) -> Self {
        self.retry_once = retry_once;
        self
    }

    async fn attempt(&self, address: &RemoteAddress, call: &Call) -> Result<CallOutcome> {
        let mut cxn = self.pool.get(address).await?;
        let want_response = call.flags().want_response();

        let outgoing = if want_response {
            Message::Call {
                name: call.name().to_string(),
                args: call.args().to_vec(),
                kwargs: call.kwargs().clone(),
            }
        } else {
            Message::CallIgnore {
                name: call.name().to_string(),
                args: call.args().to_vec(),
                kwargs: call.kwargs().clone(),
            }
        };
        cxn.send_message(&outgoing).await?;

        if !want_response {
            self.pool.release(address, cxn).await;
            return Ok(CallOutcome::Value(dirt_core::Value::Null));
        }

        let reply = cxn.recv_message().await?;
        match reply {
            Message::Return(value) => {
                self.pool.release(address, cxn).await;
                Ok(CallOutcome::Value(value))
            }
            Message::Raise(description) => {
                self.pool.release(address, cxn).await;
                Err(DirtError::remote(description))
            }
            Message::Yield(first) => {
                let stream = NativeResponseStream::new(cxn, self.pool.clone(), address.clone(), Some(first));
                Ok(CallOutcome::Stream(Box::new(stream)))
            }
            Message::Stop => {
                let stream = NativeResponseStream::new(cxn, self.pool.clone(), address.clone(), None);
                Ok(CallOutcome::Stream(Box::new(stream)))
            }
            other => Err(DirtError::transport(format!(
                "unexpected message on the wire: {}",
                other.type_name()
            ))),
        }
    }
}

#[async_trait]
impl ClientBinding for NativeClient {
    async fn call(&self, address: &RemoteAddress, call: Call) -> Result<CallOutcome> {
        match self.attempt(address, &call).await {
            Ok(outcome) => Ok(outcome),
            Err(err)
                if err.is_retryable()
                    && call.flags().can_retry()
                    && call.flags().want_response()
                    && self.retry_once =>
            {
                warn!(call = call.name(), %err, "transport fault, retrying once");
                self.attempt(address, &call).await
            }
            Err(err) => Err(err),
        }
    }
}
