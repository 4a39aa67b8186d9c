// omm-codec — wire-format codec for streaming market data
//
// Length-prefixed, self-describing binary encoding of primitives,
// containers and messages, driven by iterator objects that support
// partial-encode rollback and zero-copy decode.

pub mod array;
pub(crate) mod container;
pub mod element_list;
pub mod error;
pub mod field_list;
pub mod filter_list;
pub mod iter;
pub mod map;
pub mod msg;
pub mod primitive;
pub mod request;
pub mod series;
pub mod set_def;
pub mod set_dictionary;
pub mod stream;
pub mod types;
pub mod vector;

pub use container::EntryData;
pub use error::{CodecError, CodecResult, DictionaryPart, MsgInitNext};
pub use iter::{DecodeIterator, EncodeIterator, MAX_NESTING_DEPTH, RWF_MAJOR_VERSION, RWF_MINOR_VERSION};
pub use types::{
    DataState, DataType, Date, DateTime, PrimitiveValue, Qos, QosRate, QosTimeliness, Real,
    RealHint, State, StreamState, Time,
};
