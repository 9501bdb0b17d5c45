//! Native `ServerBinding` and per-connection handler (spec §4.5 / C5).

use std::sync::Arc;

use async_trait::async_trait;
use dirt_core::{
    Call, CallFlags, CallOutcome, Codec, DirtError, EdgeDispatch, Message, RemoteAddress, Result,
    ServerBinding, ShutdownSignal,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use super::connection::NativeConnection;

pub struct NativeServer {
    codec: Arc<dyn Codec>,
}

impl NativeServer {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl ServerBinding for NativeServer {
    async fn serve(
        &self,
        address: &RemoteAddress,
        edge: Arc<dyn EdgeDispatch>,
        mut shutdown: ShutdownSignal,
    ) -> Result<()> {
        let listener = TcpListener::bind(address.host_port())
            .await
            .map_err(|e| DirtError::transport_io(format!("failed to bind {address}"), e))?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer) = accepted
                        .map_err(|e| DirtError::transport_io("accept failed", e))?;
                    let edge = edge.clone();
                    let codec = self.codec.clone();
                    let mut handler_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = handler_shutdown.recv() => {}
                            _ = handle_connection(stream, peer.to_string(), codec, edge) => {}
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: String,
    codec: Arc<dyn Codec>,
    edge: Arc<dyn EdgeDispatch>,
) {
    let mut cxn = NativeConnection::new(stream, codec, peer.clone());
    loop {
        let msg = match cxn.recv_message().await {
            Ok(msg) => msg,
            Err(DirtError::Transport { .. }) => {
                debug!(%peer, "connection closed");
                return;
            }
            Err(err) => {
                warn!(%peer, %err, "protocol fault, closing connection");
                return;
            }
        };

        let (name, args, kwargs, want_response) = match msg {
            Message::Call { name, args, kwargs } => (name, args, kwargs, true),
            Message::CallIgnore { name, args, kwargs } => (name, args, kwargs, false),
            other => {
                warn!(%peer, kind = other.type_name(), "unexpected message from peer, closing connection");
                return;
            }
        };

        let flags = CallFlags::new(want_response, true);
        let call = match Call::new(name, args, kwargs, flags) {
            Ok(call) => call,
            Err(err) => {
                warn!(%peer, %err, "malformed call, closing connection");
                return;
            }
        };

        let outcome = edge.dispatch(call, Some(peer.clone())).await;

        if !want_response {
            continue;
        }

        let send_result = match outcome {
            Ok(CallOutcome::Value(value)) => cxn.send_message(&Message::Return(value)).await,
            Ok(CallOutcome::Stream(mut stream)) => send_stream(&mut cxn, stream.as_mut()).await,
            Err(err) => cxn.send_message(&Message::Raise(err.to_wire_description())).await,
        };

        if send_result.is_err() {
            warn!(%peer, "transport fault writing response, closing connection");
            return;
        }
    }
}

async fn send_stream(cxn: &mut NativeConnection, stream: &mut dyn dirt_core::ResponseStream) -> Result<()> {
    loop {
        match stream.next().await {
            Ok(Some(value)) => cxn.send_message(&Message::Yield(value)).await?,
            Ok(None) => return cxn.send_message(&Message::Stop).await,
            Err(err) => {
                let _ = stream.close().await;
                return cxn.send_message(&Message::Raise(err.to_wire_description())).await;
            }
        }
    }
}
