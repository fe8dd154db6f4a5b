//! Framed message reader and writer over tokio byte streams.

use crate::codec::{self, DecodeError, EncodeError};
use crate::framing::{FramingError, MessageBuffer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 16 * 1024;

/// Errors from framed stream operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

/// Reads length-prefixed payloads from a stream.
///
/// # Example
///
/// ```ignore
/// let (read_half, write_half) = stream.into_split();
/// let mut reader = MessageReader::new(read_half);
/// while let Some(msg) = reader.recv_message::<ClientMessage>().await? {
///     // ...
/// }
/// ```
pub struct MessageReader<R> {
    inner: R,
    buffer: MessageBuffer,
    read_buf: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: MessageBuffer::new(),
            read_buf: vec![0u8; READ_CHUNK],
            pending: VecDeque::new(),
        }
    }

    /// Receive the next complete payload.
    ///
    /// Returns `Ok(None)` once the peer closed the stream.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Ok(Some(msg));
            }

            let n = self.inner.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }

            for result in self.buffer.push(&self.read_buf[..n]) {
                self.pending.push_back(result?);
            }
        }
    }

    /// Receive and decode the next message.
    ///
    /// A payload that fails to decode is consumed and reported as
    /// [`ChannelError::Decode`]; the reader stays usable.
    pub async fn recv_message<M: DeserializeOwned>(&mut self) -> Result<Option<M>, ChannelError> {
        match self.recv().await? {
            Some(payload) => Ok(Some(codec::decode(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes length-prefixed payloads to a stream.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode, frame and write a message.
    pub async fn send_message<M: Serialize>(&mut self, message: &M) -> Result<(), ChannelError> {
        let framed = codec::encode_framed(message)?;
        self.inner.write_all(&framed).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use towber_protocol::{ChatChannel, ClientMessage};

    #[tokio::test]
    async fn test_messages_survive_small_chunks() {
        let (client, server) = tokio::io::duplex(8);
        let mut writer = MessageWriter::new(client);
        let mut reader = MessageReader::new(server);

        let first = ClientMessage::Chat {
            channel: ChatChannel::Global,
            text: "hello there".into(),
        };
        let second = ClientMessage::MailList;

        let sent = vec![first.clone(), second.clone()];
        let write = tokio::spawn(async move {
            for msg in &sent {
                writer.send_message(msg).await.unwrap();
            }
        });

        assert_eq!(reader.recv_message::<ClientMessage>().await.unwrap(), Some(first));
        assert_eq!(reader.recv_message::<ClientMessage>().await.unwrap(), Some(second));
        write.await.unwrap();
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_payload_does_not_poison_reader() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(server);

        let mut bytes = crate::frame_message(b"not json").unwrap();
        bytes.extend(codec::encode_framed(&ClientMessage::PetBagRequest).unwrap());
        client.write_all(&bytes).await.unwrap();

        assert!(matches!(
            reader.recv_message::<ClientMessage>().await,
            Err(ChannelError::Decode(_))
        ));
        assert_eq!(
            reader.recv_message::<ClientMessage>().await.unwrap(),
            Some(ClientMessage::PetBagRequest)
        );
    }
}
