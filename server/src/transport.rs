//! TCP transport: one reader and one writer task per connection.
//!
//! Frames are 4-byte big-endian length prefixed JSON. Incoming frames become
//! [`ClientMessage`]s fed to the session's inbox; outbound envelopes from the
//! session's queue are written back in order.

use crate::session::{self, Outbound, SessionHandle, SessionMessage};
use crate::{ServerContext, ServerError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use towber_helpers::{ChannelError, MessageReader, MessageWriter};
use towber_protocol::ClientMessage;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections forever.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<(), ServerError> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, Arc::clone(&ctx)));
            }
            Err(e) => {
                tracing::warn!("Accept failed: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "Could not set nodelay: {e}");
    }
    let (read_half, write_half) = stream.into_split();
    let (handle, outbound, session_task) = session::spawn_session(ctx);
    tracing::info!(client = %handle.id(), %peer, "Client connected");

    let writer = tokio::spawn(write_pump(MessageWriter::new(write_half), outbound, handle.clone()));
    read_pump(MessageReader::new(read_half), &handle).await;
    handle.close("read pump closed");

    if let Err(e) = session_task.await {
        tracing::error!(%peer, "Session task failed: {e}");
    }
    if let Err(e) = writer.await {
        tracing::error!(%peer, "Write pump failed: {e}");
    }
    tracing::info!(%peer, "Client disconnected");
}

async fn read_pump(mut reader: MessageReader<OwnedReadHalf>, handle: &SessionHandle) {
    loop {
        tokio::select! {
            biased;
            _ = handle.closed() => return,
            result = reader.recv_message::<ClientMessage>() => match result {
                Ok(Some(message)) => {
                    if handle.deliver(handle.id(), SessionMessage::Client(message)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(ChannelError::Decode(e)) => {
                    tracing::warn!(client = %handle.id(), "Malformed message skipped: {e}");
                }
                Err(e) => {
                    tracing::debug!(client = %handle.id(), "Read error: {e}");
                    return;
                }
            },
        }
    }
}

async fn write_pump(
    mut writer: MessageWriter<OwnedWriteHalf>,
    mut outbound: mpsc::Receiver<Outbound>,
    handle: SessionHandle,
) {
    loop {
        tokio::select! {
            biased;
            envelope = outbound.recv() => match envelope {
                Some(envelope) => {
                    if let Err(e) = writer.send_message(&envelope).await {
                        tracing::debug!(client = %handle.id(), "Write error: {e}");
                        handle.close("write failed");
                        return;
                    }
                }
                None => break,
            },
            _ = handle.closed() => break,
        }
    }

    // Flush what was queued before the close.
    outbound.close();
    while let Some(envelope) = outbound.recv().await {
        if writer.send_message(&envelope).await.is_err() {
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::trace!(client = %handle.id(), "Shutdown error: {e}");
    }
}
