//! Message framing utilities.
//!
//! Every frame is a 4-byte big-endian length prefix followed by the payload.

use thiserror::Error;

/// Maximum payload size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Framing errors.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("message too large: {0} bytes (max {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),
    #[error("invalid frame: length prefix indicates {0} bytes")]
    InvalidFrame(usize),
}

/// Frame a payload with its length prefix.
///
/// # Example
///
/// ```
/// use towber_helpers::frame_message;
///
/// let framed = frame_message(b"hello").unwrap();
/// assert_eq!(&framed[..4], &[0, 0, 0, 5]);
/// assert_eq!(&framed[4..], b"hello");
/// ```
pub fn frame_message(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(payload.len()));
    }
    let len = (payload.len() as u32).to_be_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&len);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Accumulates bytes read from a stream and yields complete payloads.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buffer: Vec<u8>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push bytes and iterate over the payloads they complete.
    ///
    /// ```
    /// use towber_helpers::{MessageBuffer, frame_message};
    ///
    /// let mut buffer = MessageBuffer::new();
    /// let framed = frame_message(b"world").unwrap();
    ///
    /// assert_eq!(buffer.push(&framed[..6]).count(), 0);
    /// let messages: Vec<_> = buffer.push(&framed[6..]).collect();
    /// assert_eq!(messages[0].as_ref().unwrap(), b"world");
    /// ```
    pub fn push<'a>(&'a mut self, data: &[u8]) -> MessageIterator<'a> {
        self.buffer.extend_from_slice(data);
        MessageIterator { buffer: self }
    }

    fn try_extract(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        let header: [u8; HEADER_LEN] = self.buffer.get(..HEADER_LEN)?.try_into().ok()?;
        let len = u32::from_be_bytes(header) as usize;

        if len > MAX_MESSAGE_SIZE {
            // The stream is out of sync; nothing after this point can be trusted.
            self.buffer.clear();
            return Some(Err(FramingError::InvalidFrame(len)));
        }

        if self.buffer.len() < HEADER_LEN + len {
            return None;
        }

        let message = self.buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buffer.drain(..HEADER_LEN + len);
        Some(Ok(message))
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered bytes not yet returned.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

/// Iterator over the complete payloads in a [`MessageBuffer`].
pub struct MessageIterator<'a> {
    buffer: &'a mut MessageBuffer,
}

impl Iterator for MessageIterator<'_> {
    type Item = Result<Vec<u8>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_extract()
    }
}
