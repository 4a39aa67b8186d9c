// error.rs — transport error record and read events
//
// Every fatal transport error carries a typed kind, the captured OS
// errno when one applies, and bounded human-readable text. Transient
// conditions (would-block, out of buffers) are kinds too, so callers
// can match on them to retry after a flush.

use thiserror::Error;

/// Upper bound on error text; longer messages are truncated.
pub const MAX_ERROR_TEXT: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Establishing the connection failed (handshake included).
    ConnectionError,
    /// The channel is unusable (closed, peer reset, internal fault).
    ChannelError,
    /// The peer violated the framing or handshake protocol.
    ProtocolError,
    /// No buffer available; flush and retry.
    NoBuffers,
    /// A buffer or payload exceeded a negotiated limit.
    TooBig,
    /// Catch-all failure; the text explains.
    Failure,
}

/// The transport error record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {text}")]
pub struct TransportError {
    pub kind: ErrorKind,
    /// OS-level errno when the failure came from the wrapped transport.
    pub sys_error: i32,
    pub text: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, text: impl Into<String>) -> TransportError {
        let mut text = text.into();
        text.truncate(MAX_ERROR_TEXT);
        TransportError { kind, sys_error: 0, text }
    }

    pub fn with_sys(kind: ErrorKind, sys_error: i32, text: impl Into<String>) -> TransportError {
        let mut e = TransportError::new(kind, text);
        e.sys_error = sys_error;
        e
    }

    pub fn protocol(text: impl Into<String>) -> TransportError {
        TransportError::new(ErrorKind::ProtocolError, text)
    }

    pub fn channel(text: impl Into<String>) -> TransportError {
        TransportError::new(ErrorKind::ChannelError, text)
    }

    pub fn connection(text: impl Into<String>) -> TransportError {
        TransportError::new(ErrorKind::ConnectionError, text)
    }

    pub fn failure(text: impl Into<String>) -> TransportError {
        TransportError::new(ErrorKind::Failure, text)
    }

    pub fn no_buffers() -> TransportError {
        TransportError::new(ErrorKind::NoBuffers, "out of buffers, flush and retry")
    }

    pub fn from_io(kind: ErrorKind, e: &std::io::Error) -> TransportError {
        TransportError::with_sys(kind, e.raw_os_error().unwrap_or(0), e.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Outcome of one read call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete application message, reassembled and decompressed.
    Data(Vec<u8>),
    /// A ping arrived; the pong response has already been queued.
    Ping,
    /// An unsolicited pong arrived; no data is delivered.
    Pong,
    /// Nothing available on a non-blocking channel.
    WouldBlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_bounded() {
        let long = "x".repeat(5000);
        let e = TransportError::failure(long);
        assert_eq!(e.text.len(), MAX_ERROR_TEXT);
    }

    #[test]
    fn test_display_names_kind() {
        let e = TransportError::protocol("bad opcode");
        assert_eq!(e.to_string(), "ProtocolError: bad opcode");
    }
}
