use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::Codec;
use crate::error::{DirtError, Result};
use crate::message::Message;

/// Fixed-width length prefix, per spec §4.1: 4 bytes, big-endian.
const LENGTH_PREFIX_BYTES: usize = 4;

/// Ceiling on the decoded length header. Anything past this is treated as a
/// transport fault rather than an attempt to allocate an unbounded buffer —
/// the spec calls this out explicitly ("oversized length beyond a
/// configured ceiling").
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Reads one length-prefixed frame and decodes it with `codec`. A zero-length
/// frame is illegal per spec §4.1.
pub async fn read_frame<R>(io: &mut R, codec: &dyn Codec) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; LENGTH_PREFIX_BYTES];
    io.read_exact(&mut len_bytes)
        .await
        .map_err(|err| DirtError::transport_io("short read on frame length", err))?;
    let len = u32::from_be_bytes(len_bytes);

    if len == 0 {
        return Err(DirtError::protocol("zero-length frame is illegal"));
    }
    if len > MAX_FRAME_BYTES {
        return Err(DirtError::transport(format!(
            "frame length {len} exceeds ceiling {MAX_FRAME_BYTES}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    io.read_exact(&mut payload)
        .await
        .map_err(|err| DirtError::transport_io("short read on frame payload", err))?;

    codec.decode(&payload)
}

/// Encodes `message` with `codec` and writes it as one length-prefixed
/// frame, flushing afterwards so the peer observes it promptly.
pub async fn write_frame<W>(io: &mut W, codec: &dyn Codec, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = codec.encode(message)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| DirtError::protocol("encoded message too large to frame"))?;
    if len > MAX_FRAME_BYTES {
        return Err(DirtError::protocol(format!(
            "encoded message of {len} bytes exceeds ceiling {MAX_FRAME_BYTES}"
        )));
    }

    io.write_all(&len.to_be_bytes())
        .await
        .map_err(|err| DirtError::transport_io("failed writing frame length", err))?;
    io.write_all(&payload)
        .await
        .map_err(|err| DirtError::transport_io("failed writing frame payload", err))?;
    io.flush()
        .await
        .map_err(|err| DirtError::transport_io("failed flushing frame", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[tokio::test]
    async fn round_trips_a_message() {
        let codec = JsonCodec;
        let mut buf = Vec::new();
        let msg = Message::Return(serde_json::json!({"ok": true}));
        write_frame(&mut buf, &codec, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor, &codec).await.unwrap();
        match decoded {
            Message::Return(value) => assert_eq!(value, serde_json::json!({"ok": true})),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_length_header() {
        let codec = JsonCodec;
        let mut bytes = (MAX_FRAME_BYTES + 1).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_frame(&mut cursor, &codec).await.unwrap_err();
        assert!(matches!(err, DirtError::Transport { .. }));
    }

    #[tokio::test]
    async fn rejects_zero_length_frame() {
        let codec = JsonCodec;
        let cursor_bytes = 0u32.to_be_bytes().to_vec();
        let mut cursor = std::io::Cursor::new(cursor_bytes);
        let err = read_frame(&mut cursor, &codec).await.unwrap_err();
        assert!(matches!(err, DirtError::Protocol(_)));
    }
}
