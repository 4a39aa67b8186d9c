// error.rs — codec error taxonomy and success-state enums
//
// The wire codec distinguishes hard failures (returned as `CodecError`)
// from success states that carry extra information (blank data, end of
// container, partially encoded dictionary). The latter are expressed as
// dedicated enums at the call sites that can produce them.

use thiserror::Error;

/// Hard failure from an encode or decode operation.
///
/// Iterators remember the first failure and reject further operations
/// until cleared, so a failed entry cannot silently corrupt siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The target buffer has no room for the bytes an encoder must write.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The wire data ended before the value it claims to carry.
    #[error("incomplete data")]
    IncompleteData,

    /// A type byte names a data type this operation cannot handle.
    #[error("unsupported data type {0}")]
    UnsupportedDataType(u8),

    /// Caller misuse: wrong call sequence, bad parameter, uninitialized DB.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Wire data is structurally valid but semantically inconsistent.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// A set-definition database already holds a definition for this id.
    #[error("duplicate set definition id {0}")]
    DuplicateSetDefId(u16),

    /// Container nesting exceeded the iterator's fixed frame stack.
    #[error("too many nesting levels")]
    TooManyLevels,

    /// The iterator recorded an earlier failure and must be cleared.
    #[error("iterator unusable after earlier failure")]
    IteratorDead,

    /// Catch-all decode/DB failure with a fixed description.
    #[error("{0}")]
    Failure(&'static str),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Result of one multi-part dictionary encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryPart {
    /// More set definitions remain; call again with a fresh buffer.
    More,
    /// The final part has been encoded.
    Complete,
}

/// What `encode_msg_init` expects the caller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgInitNext {
    /// Header fully written; encode the payload (or complete immediately).
    Payload,
    /// The message key declares attrib data that is not pre-encoded:
    /// encode the attrib container now, then call
    /// `encode_msg_key_attrib_complete`.
    KeyAttrib,
    /// An extended header is declared but not pre-encoded: write it with
    /// `encode_extended_header`, which resumes the message.
    ExtendedHeader,
}
