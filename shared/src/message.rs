use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::types::MessageId;

/// Errors a handler can hit while reading a message payload. Malformed
/// payloads beyond the id byte are the registered handler's responsibility,
/// so nothing here is surfaced by the session managers themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("unexpected end of message payload (wanted {wanted} more bytes, {remaining} left)")]
    UnexpectedEnd { wanted: usize, remaining: usize },
    #[error("message string field is not valid utf-8")]
    InvalidUtf8,
}

/// Writable buffer for composing one outbound message payload.
///
/// All integers are encoded little-endian.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes one outbound frame: the message id byte followed by whatever
    /// `write` appends.
    pub fn frame(id: MessageId, write: impl FnOnce(&mut MessageWriter)) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        writer.write_u8(id);
        write(&mut writer);
        writer.into_bytes()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a u16 length prefix followed by the utf-8 bytes of `value`.
    ///
    /// A string longer than `u16::MAX` bytes does not fit the prefix and is
    /// written as an empty string instead, keeping later fields aligned.
    pub fn write_str(&mut self, value: &str) {
        let Ok(len) = u16::try_from(value.len()) else {
            debug!("dropped oversized string field ({} bytes)", value.len());
            self.write_u16(0);
            return;
        };
        self.write_u16(len);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Read access to the remaining payload of one inbound message, after the
/// id byte has been consumed by dispatch.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], MessageError> {
        if len > self.remaining() {
            return Err(MessageError::UnexpectedEnd {
                wanted: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Consumes and returns everything left in the payload.
    pub fn read_to_end(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    pub fn read_u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, MessageError> {
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(self.read_bytes(2)?);
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32, MessageError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, MessageError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32, MessageError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read_bytes(4)?);
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Result<f32, MessageError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read_bytes(4)?);
        Ok(f32::from_le_bytes(bytes))
    }

    /// Reads a string written by [`MessageWriter::write_str`].
    pub fn read_str(&mut self) -> Result<&'a str, MessageError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| MessageError::InvalidUtf8)
    }
}

/// Mapping from a one-byte message identifier to a registered receive
/// handler. At most one handler per id; registering an id again replaces the
/// previous handler. Dispatch of an id with no registered handler is a
/// silent drop, since unrecognized ids are expected when peers run different
/// protocol versions.
pub struct MessageTable<H> {
    handlers: HashMap<MessageId, H>,
}

impl<H> MessageTable<H> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `id`, replacing any existing registration.
    pub fn register(&mut self, id: MessageId, handler: H) {
        self.handlers.insert(id, handler);
    }

    /// Removes the handler for `id` if present, no-op otherwise.
    pub fn unregister(&mut self, id: MessageId) {
        self.handlers.remove(&id);
    }

    pub fn get(&self, id: MessageId) -> Option<&H> {
        self.handlers.get(&id)
    }

    pub fn is_registered(&self, id: MessageId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H> Default for MessageTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
