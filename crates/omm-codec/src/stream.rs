// stream.rs — stream lifecycle tracking
//
// A stream is a logical subscription identified by stream id. Its
// phase advances on the messages that cross it; transitions outside
// the table are rejected so callers catch sequencing bugs instead of
// silently corrupting stream state.

use crate::error::{CodecError, CodecResult};
use crate::types::StreamState;

/// Lifecycle phase of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// No request issued yet.
    #[default]
    Idle,
    /// Request sent, complete refresh not yet received.
    Pending,
    /// Complete refresh received on a streaming request.
    Open,
    /// Closed by either side.
    Closed,
}

/// One tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream {
    pub id: i32,
    pub phase: StreamPhase,
    pub streaming: bool,
}

impl Stream {
    pub fn new(id: i32) -> Stream {
        Stream { id, phase: StreamPhase::Idle, streaming: false }
    }

    /// Request (or reissue) opens the stream.
    pub fn on_request(&mut self, streaming: bool) -> CodecResult<()> {
        match self.phase {
            StreamPhase::Idle | StreamPhase::Closed => {
                self.phase = StreamPhase::Pending;
                self.streaming = streaming;
                Ok(())
            }
            // reissue on a live stream does not change phase
            StreamPhase::Pending | StreamPhase::Open => {
                self.streaming = streaming;
                Ok(())
            }
        }
    }

    /// A refresh part; the completing part opens (or, for snapshots,
    /// finishes) the stream.
    pub fn on_refresh(&mut self, complete: bool) -> CodecResult<()> {
        match self.phase {
            StreamPhase::Pending | StreamPhase::Open => {
                if complete {
                    self.phase = if self.streaming { StreamPhase::Open } else { StreamPhase::Closed };
                }
                Ok(())
            }
            _ => Err(CodecError::InvalidArgument("refresh on a stream that is not open")),
        }
    }

    /// A status message's stream state drives recovery and closure.
    pub fn on_status(&mut self, state: StreamState) -> CodecResult<()> {
        if self.phase == StreamPhase::Idle {
            return Err(CodecError::InvalidArgument("status on an idle stream"));
        }
        match state {
            StreamState::Closed | StreamState::ClosedRedirected | StreamState::NonStreaming => {
                self.phase = StreamPhase::Closed;
            }
            StreamState::ClosedRecover => {
                self.phase = StreamPhase::Pending;
            }
            StreamState::Open | StreamState::Unspecified => {}
        }
        Ok(())
    }

    pub fn on_close(&mut self) -> CodecResult<()> {
        match self.phase {
            StreamPhase::Idle => Err(CodecError::InvalidArgument("close on an idle stream")),
            _ => {
                self.phase = StreamPhase::Closed;
                Ok(())
            }
        }
    }

    /// Post and generic traffic is only legal on an open stream.
    pub fn on_exchange(&mut self) -> CodecResult<()> {
        if self.phase == StreamPhase::Open {
            Ok(())
        } else {
            Err(CodecError::InvalidArgument("exchange on a stream that is not open"))
        }
    }
}
