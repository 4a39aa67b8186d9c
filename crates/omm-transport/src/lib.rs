// omm-transport — WebSocket transport for streaming market data
//
// RFC 6455 handshake and framing with permessage-deflate, layered over
// a pluggable byte transport, with pooled message buffers and priority
// write queues. Payloads are opaque here; the codec crate produces and
// consumes them.

pub mod buffer;
pub mod channel;
pub mod deflate;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod queue;
pub mod session;

pub use buffer::{BufferPool, SharedPool, TransportBuffer, WritePriority, PROTOCOL_HDR_LEN};
pub use channel::{
    AcceptOptions, Channel, ChannelState, ConnectOptions, IoTransport, Transport, WriteOptions,
};
pub use deflate::{DeflateParams, MIN_COMPRESS_SIZE};
pub use error::{ErrorKind, ReadEvent, TransportError, TransportResult, MAX_ERROR_TEXT};
pub use frame::{Opcode, MAX_FRAME_HEADER};
pub use handshake::{ClientOptions, ServerOptions, SubProtocol, DEFAULT_WS_PATH, WS_VERSION};
pub use session::{Role, WsSession, DEFAULT_MAX_PAYLOAD};
