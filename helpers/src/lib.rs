//! Helper utilities for towber connections.
//!
//! - Message framing (length-prefixed)
//! - JSON encoding of protocol messages
//! - Framed reader/writer over tokio streams

pub mod channel;
pub mod codec;
pub mod framing;

pub use channel::{ChannelError, MessageReader, MessageWriter};
pub use codec::{decode, encode, encode_framed, DecodeError, EncodeError};
pub use framing::{frame_message, FramingError, MessageBuffer, MAX_MESSAGE_SIZE};
