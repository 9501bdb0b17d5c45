//! The native `dirt` scheme's connection type (spec §4.2 / C2): one socket,
//! two states, single-tenant between checkout and return (the pool, not
//! this type, enforces single-tenancy).

use std::sync::Arc;
use std::time::Duration;

use dirt_core::{Codec, DirtError, Message, Result, read_frame, write_frame};
use socket2::SockRef;
use tokio::net::TcpStream;

/// `SO_LINGER` applied to every native connection: on discard the kernel
/// still attempts a normal FIN/ACK close, but gives up and sends RST after
/// this long rather than holding the socket (and the port) open
/// indefinitely for a peer that never finishes closing.
const LINGER: Duration = Duration::from_secs(5);

/// A live `dirt` connection. Once a transport fault is observed the
/// connection is considered poisoned — callers must discard it rather than
/// reuse it (`is_open` reflects that, but discarding is the pool's job).
pub struct NativeConnection {
    stream: TcpStream,
    codec: Arc<dyn Codec>,
    peer: String,
    open: bool,
}

impl NativeConnection {
    pub fn new(stream: TcpStream, codec: Arc<dyn Codec>, peer: String) -> Self {
        stream.set_nodelay(true).ok();
        SockRef::from(&stream).set_linger(Some(LINGER)).ok();
        Self {
            stream,
            codec,
            peer,
            open: true,
        }
    }

    pub async fn connect(host: &str, port: u16, codec: Arc<dyn Codec>) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let stream = TcpStream::connect(&peer)
            .await
            .map_err(|e| DirtError::transport_io("failed to dial remote", e))?;
        Ok(Self::new(stream, codec, peer))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn send_message(&mut self, msg: &Message) -> Result<()> {
        match write_frame(&mut self.stream, self.codec.as_ref(), msg).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.open = false;
                Err(err)
            }
        }
    }

    pub async fn recv_message(&mut self) -> Result<Message> {
        match read_frame(&mut self.stream, self.codec.as_ref()).await {
            Ok(msg) => Ok(msg),
            Err(err) => {
                self.open = false;
                Err(err)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.open = false;
    }
}
