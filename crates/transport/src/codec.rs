//! Frame codec.
//!
//! Frame format: `[length:4][payload:N]`
//!
//! - **length**: payload size in bytes (little-endian u32)
//! - **payload**: bincode encoding of exactly one message
//!
//! Framing is a `LengthDelimitedCodec`; [`MessageCodec`] layers bincode on
//! top of it. One connection carries one request frame and at most one
//! response frame.

use crate::error::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite, LengthDelimitedCodec};

/// Header size: the length prefix.
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size (1MB). Larger frames are rejected both ways.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Bincode messages in length-delimited frames.
///
/// Decodes `D`; encodes any serializable message.
pub struct MessageCodec<D> {
    frames: LengthDelimitedCodec,
    _decodes: PhantomData<fn() -> D>,
}

impl<D> MessageCodec<D> {
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .little_endian()
                .length_field_length(HEADER_SIZE)
                .max_frame_length(MAX_FRAME_SIZE)
                .new_codec(),
            _decodes: PhantomData,
        }
    }
}

impl<D> Default for MessageCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned> Decoder for MessageCodec<D> {
    type Item = D;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(bincode::deserialize(&frame)?)),
            None => Ok(None),
        }
    }
}

impl<D, M: Serialize> Encoder<M> for MessageCodec<D> {
    type Error = TransportError;

    fn encode(&mut self, message: M, dst: &mut BytesMut) -> Result<()> {
        let payload = bincode::serialize(&message)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: payload.len(),
            });
        }
        self.frames.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}

/// Writes one framed message and flushes.
pub async fn write_message<W, T>(writer: W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    FramedWrite::new(writer, MessageCodec::<()>::new())
        .send(message)
        .await
}

/// Reads and decodes one message. `Ok(None)` means the peer closed the
/// connection cleanly before sending a frame.
pub async fn read_message<R, T>(reader: R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    FramedRead::new(reader, MessageCodec::<T>::new())
        .next()
        .await
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use corelib::Identifier;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frame_through_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let request = Request::FindSuccessor {
            key: Identifier(10),
            trace: true,
        };
        write_message(&mut client, &request).await.unwrap();
        let received: Request = read_message(&mut server).await.unwrap().unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let message: Option<Request> = read_message(&mut server).await.unwrap();
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn test_truncated_header_is_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[1, 0]).await.unwrap();
        drop(client);
        assert!(matches!(
            read_message::<_, Request>(&mut server).await,
            Err(TransportError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        match read_message::<_, Request>(&mut server).await {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected oversized frame error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_payload_is_not_encoded() {
        let mut codec = MessageCodec::<Response>::new();
        let mut buf = BytesMut::new();
        let response = Response::Err("x".repeat(MAX_FRAME_SIZE + 1));
        assert!(matches!(
            codec.encode(&response, &mut buf),
            Err(TransportError::FrameTooLarge { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_is_little_endian_length() {
        let mut codec = MessageCodec::<Response>::new();
        let mut buf = BytesMut::new();
        codec.encode(&Response::Ok, &mut buf).unwrap();
        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(length, buf.len() - HEADER_SIZE);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut codec = MessageCodec::<Response>::new();
        let mut frame = BytesMut::new();
        codec.encode(&Response::Err("late".into()), &mut frame).unwrap();

        let mut partial = BytesMut::from(&frame[..frame.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&frame[frame.len() - 1..]);
        assert_eq!(
            codec.decode(&mut partial).unwrap(),
            Some(Response::Err("late".into()))
        );
    }

    #[test]
    fn test_garbage_payload_is_codec_error() {
        let mut codec = MessageCodec::<Request>::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&5u32.to_le_bytes());
        buf.extend_from_slice(&[0xff; 5]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::Codec(_))
        ));
    }
}
