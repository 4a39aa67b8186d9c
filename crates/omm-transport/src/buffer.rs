// buffer.rs — message buffers and the three-tier pool
//
// Every writeable buffer reserves headroom for the largest possible
// frame header, so the framer prepends without copying payload bytes.
// Acquisition order: the channel's guaranteed pool, then the shared
// overflow pool, then (for oversized requests) a one-off heap buffer.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{TransportError, TransportResult};

/// Headroom reserved in front of every payload: the widest frame
/// header (2 + 8 extended length + 4 mask key).
pub const PROTOCOL_HDR_LEN: usize = 14;

/// Queue selection for a finished buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePriority {
    #[default]
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferOrigin {
    Guaranteed,
    Shared,
    Heap,
}

/// A pooled message buffer. The payload region starts after the
/// protocol headroom; `prepend` claims headroom bytes and `wire`
/// exposes header plus payload for the transport write.
#[derive(Debug)]
pub struct TransportBuffer {
    data: Vec<u8>,
    /// Start of the wire region (headroom already claimed lies at
    /// start..payload_start).
    start: usize,
    payload_start: usize,
    len: usize,
    /// Bytes of the wire region already written to the transport.
    pub(crate) written: usize,
    pub priority: WritePriority,
    pub(crate) origin: BufferOrigin,
}

impl TransportBuffer {
    pub(crate) fn with_capacity(payload_capacity: usize, origin: BufferOrigin) -> TransportBuffer {
        TransportBuffer {
            data: vec![0u8; PROTOCOL_HDR_LEN + payload_capacity],
            start: PROTOCOL_HDR_LEN,
            payload_start: PROTOCOL_HDR_LEN,
            len: 0,
            written: 0,
            priority: WritePriority::High,
            origin,
        }
    }

    /// Usable payload capacity.
    pub fn capacity(&self) -> usize {
        self.data.len() - PROTOCOL_HDR_LEN
    }

    /// The writable payload region.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.payload_start..]
    }

    /// Declare how many payload bytes were written.
    pub fn set_len(&mut self, len: usize) -> TransportResult<()> {
        if len > self.capacity() {
            return Err(TransportError::failure("length exceeds buffer capacity"));
        }
        self.len = len;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_start..self.payload_start + self.len]
    }

    pub(crate) fn payload_region_mut(&mut self) -> &mut [u8] {
        let (s, l) = (self.payload_start, self.len);
        &mut self.data[s..s + l]
    }

    /// Claim `hdr.len()` bytes of headroom directly in front of the
    /// payload.
    pub(crate) fn prepend(&mut self, hdr: &[u8]) -> TransportResult<()> {
        if hdr.len() > self.start {
            return Err(TransportError::failure("protocol header exceeds headroom"));
        }
        self.start -= hdr.len();
        self.data[self.start..self.start + hdr.len()].copy_from_slice(hdr);
        Ok(())
    }

    /// Header plus payload, as it goes on the wire.
    pub(crate) fn wire(&self) -> &[u8] {
        &self.data[self.start..self.payload_start + self.len]
    }

    /// The unwritten remainder of the wire region.
    pub(crate) fn wire_pending(&self) -> &[u8] {
        &self.wire()[self.written..]
    }

    /// Reset for pool reuse.
    pub(crate) fn reset(&mut self) {
        self.start = PROTOCOL_HDR_LEN;
        self.payload_start = PROTOCOL_HDR_LEN;
        self.len = 0;
        self.written = 0;
        self.priority = WritePriority::High;
    }

    /// Replace the payload wholesale (compression path). The headroom
    /// is preserved.
    pub(crate) fn replace_payload(&mut self, payload: &[u8]) -> TransportResult<()> {
        if payload.len() > self.capacity() {
            // grow: heap-origin buffers may, pooled ones must not
            if self.origin != BufferOrigin::Heap {
                return Err(TransportError::failure("compressed payload exceeds buffer"));
            }
            self.data.resize(PROTOCOL_HDR_LEN + payload.len(), 0);
        }
        self.data[PROTOCOL_HDR_LEN..PROTOCOL_HDR_LEN + payload.len()].copy_from_slice(payload);
        self.start = PROTOCOL_HDR_LEN;
        self.payload_start = PROTOCOL_HDR_LEN;
        self.len = payload.len();
        Ok(())
    }
}

/// Server-wide overflow pool shared by every channel; internally
/// synchronized.
#[derive(Debug)]
pub struct SharedPool {
    buffer_size: usize,
    free: Mutex<Vec<TransportBuffer>>,
}

impl SharedPool {
    pub fn new(count: usize, buffer_size: usize) -> Arc<SharedPool> {
        let free = (0..count)
            .map(|_| TransportBuffer::with_capacity(buffer_size, BufferOrigin::Shared))
            .collect();
        Arc::new(SharedPool { buffer_size, free: Mutex::new(free) })
    }

    fn take(&self) -> Option<TransportBuffer> {
        self.free.lock().pop()
    }

    fn put(&self, mut buf: TransportBuffer) {
        buf.reset();
        self.free.lock().push(buf);
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

/// Per-channel buffer pool backed by an optional shared overflow pool.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    guaranteed: Vec<TransportBuffer>,
    shared: Option<Arc<SharedPool>>,
}

impl BufferPool {
    pub fn new(guaranteed_count: usize, buffer_size: usize, shared: Option<Arc<SharedPool>>) -> BufferPool {
        if let Some(s) = &shared {
            debug_assert_eq!(s.buffer_size, buffer_size);
        }
        BufferPool {
            buffer_size,
            guaranteed: (0..guaranteed_count)
                .map(|_| TransportBuffer::with_capacity(buffer_size, BufferOrigin::Guaranteed))
                .collect(),
            shared,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Acquire a buffer for `size` payload bytes. Oversized requests
    /// get a dedicated heap buffer; standard requests fall through the
    /// guaranteed then shared pools.
    pub fn get(&mut self, size: usize) -> TransportResult<TransportBuffer> {
        if size > self.buffer_size {
            return Ok(TransportBuffer::with_capacity(size, BufferOrigin::Heap));
        }
        if let Some(buf) = self.guaranteed.pop() {
            return Ok(buf);
        }
        if let Some(shared) = &self.shared {
            if let Some(buf) = shared.take() {
                return Ok(buf);
            }
        }
        Err(TransportError::no_buffers())
    }

    /// Return a buffer to the pool it came from; heap buffers are
    /// dropped.
    pub fn release(&mut self, mut buf: TransportBuffer) {
        match buf.origin {
            BufferOrigin::Guaranteed => {
                buf.reset();
                self.guaranteed.push(buf);
            }
            BufferOrigin::Shared => {
                if let Some(shared) = &self.shared {
                    shared.put(buf);
                }
            }
            BufferOrigin::Heap => {}
        }
    }

    pub fn guaranteed_available(&self) -> usize {
        self.guaranteed.len()
    }
}
