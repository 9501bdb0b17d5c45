//! Client-side streaming result (spec §4.4 step 4, §9 "Generator-valued
//! results"): owns the connection for the lifetime of the stream and
//! releases it to the pool exactly once, whichever terminal event comes
//! first (Testable Property 6).

use std::sync::Arc;

use async_trait::async_trait;
use dirt_core::{Message, RemoteAddress, ResponseStream, Result, Value};

use super::connection::NativeConnection;
use super::pool::Pool;

pub struct NativeResponseStream {
    cxn: Option<NativeConnection>,
    pool: Arc<Pool>,
    address: RemoteAddress,
    pending_first: Option<Value>,
    done: bool,
}

impl NativeResponseStream {
    pub fn new(cxn: NativeConnection, pool: Arc<Pool>, address: RemoteAddress, pending_first: Option<Value>) -> Self {
        Self {
            cxn: Some(cxn),
            pool,
            address,
            pending_first,
            done: false,
        }
    }

    async fn release(&mut self) {
        if let Some(cxn) = self.cxn.take() {
            self.pool.release(&self.address, cxn).await;
        }
    }
}

#[async_trait]
impl ResponseStream for NativeResponseStream {
    async fn next(&mut self) -> Result<Option<Value>> {
        if self.done {
            return Ok(None);
        }
        if let Some(value) = self.pending_first.take() {
            return Ok(Some(value));
        }
        let Some(cxn) = self.cxn.as_mut() else {
            return Ok(None);
        };
        match cxn.recv_message().await {
            Ok(Message::Yield(value)) => Ok(Some(value)),
            Ok(Message::Stop) => {
                self.done = true;
                self.release().await;
                Ok(None)
            }
            Ok(other) => {
                self.done = true;
                let err = dirt_core::DirtError::protocol(format!(
                    "unexpected message mid-stream: {}",
                    other.type_name()
                ));
                self.cxn.take();
                Err(err)
            }
            Err(err) => {
                self.done = true;
                self.cxn.take();
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.done = true;
        self.release().await;
        Ok(())
    }
}
