use std::fmt;

/// One-byte identifier prefixed to every application message.
pub type MessageId = u8;

/// Opaque identifier referencing one peer socket association.
///
/// Handles are minted by the transport (on accept for servers, on
/// connect-request for clients) and are never reused while still registered.
/// Validity of the handle is distinct from "handshake complete".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}
