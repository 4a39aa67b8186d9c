// channel.rs — the per-connection channel
//
// One lock brackets every queue mutation and every wrapped transport
// call; different channels run on different threads without
// coordination. The channel owns the buffer pool, the priority write
// queues and the WebSocket session, and drives the handshake at
// construction time.

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::{BufferPool, SharedPool, TransportBuffer, WritePriority};
use crate::error::{ErrorKind, ReadEvent, TransportError, TransportResult};
use crate::frame::{
    apply_mask, build_close_payload, parse_frame_header, Opcode, CLOSE_MESSAGE_TOO_BIG,
    CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR,
};
use crate::handshake::{
    client_finish, client_request, server_accept, ClientOptions, ServerOptions,
};
use crate::session::{FrameEvent, Role, SessionConfig, WsSession, DEFAULT_MAX_PAYLOAD};

/// The transport seam: the socket layer the channel sits on. Only
/// these two calls may block, and only on a blocking transport.
pub trait Transport {
    fn read_transport(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_transport(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;
}

/// Adapter for anything that is std `Read` + `Write`.
pub struct IoTransport<T>(pub T);

impl<T: io::Read + io::Write> Transport for IoTransport<T> {
    fn read_transport(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn write_transport(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.0.write_vectored(bufs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Active,
    Closed,
}

/// Per-write knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub priority: WritePriority,
    /// Try a direct transport write when nothing is queued.
    pub force_flush: bool,
}

#[derive(Debug, Clone)]
pub struct AcceptOptions {
    pub handshake: ServerOptions,
    pub guaranteed_buffers: usize,
    pub buffer_size: usize,
    pub max_payload: usize,
}

impl Default for AcceptOptions {
    fn default() -> AcceptOptions {
        AcceptOptions {
            handshake: ServerOptions::default(),
            guaranteed_buffers: 16,
            buffer_size: 6144,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub handshake: ClientOptions,
    pub guaranteed_buffers: usize,
    pub buffer_size: usize,
    pub max_payload: usize,
}

impl Default for ConnectOptions {
    fn default() -> ConnectOptions {
        ConnectOptions {
            handshake: ClientOptions::default(),
            guaranteed_buffers: 16,
            buffer_size: 6144,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

struct Inner<T> {
    transport: T,
    session: WsSession,
    state: ChannelState,
    /// Unconsumed inbound bytes (partial frames carry across reads).
    input: Vec<u8>,
    pool: BufferPool,
    queues: crate::queue::WriteQueues,
    /// Control frames waiting for transport room; drained ahead of
    /// data buffers.
    pending_control: VecDeque<Vec<u8>>,
    /// First fatal error; replayed to every later call.
    pending_error: Option<TransportError>,
}

pub struct Channel<T> {
    inner: Mutex<Inner<T>>,
}

const READ_CHUNK: usize = 8192;
const MAX_BATCH: usize = 8;

impl<T: Transport> Channel<T> {
    // ------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------

    /// Run the server side of the opening handshake and build the
    /// channel. The reject response is written before erroring.
    pub fn accept(
        mut transport: T,
        opts: AcceptOptions,
        shared: Option<Arc<SharedPool>>,
    ) -> TransportResult<Channel<T>> {
        let (head, leftover) = read_http_head(&mut transport, opts.handshake.max_request_size)?;
        match server_accept(&head, &opts.handshake) {
            Ok(hs) => {
                write_all(&mut transport, &hs.response)?;
                debug!(
                    protocol = hs.protocol.name(),
                    deflate = hs.deflate.is_some(),
                    path = %hs.path,
                    "websocket session accepted"
                );
                Ok(Channel::new(
                    transport,
                    WsSession::new(SessionConfig {
                        role: Role::Server,
                        protocol: hs.protocol,
                        deflate: hs.deflate,
                        max_payload: opts.max_payload,
                    }),
                    leftover,
                    BufferPool::new(opts.guaranteed_buffers, opts.buffer_size, shared),
                ))
            }
            Err((response, err)) => {
                let _ = write_all(&mut transport, &response);
                debug!(error = %err, "websocket handshake rejected");
                Err(err)
            }
        }
    }

    /// Run the client side of the opening handshake.
    pub fn connect(
        mut transport: T,
        opts: ConnectOptions,
        shared: Option<Arc<SharedPool>>,
    ) -> TransportResult<Channel<T>> {
        let hs = client_request(&opts.handshake);
        write_all(&mut transport, &hs.request)?;
        let (head, leftover) = read_http_head(&mut transport, 16 * 1024)?;
        let (protocol, deflate) = client_finish(&head, &hs, &opts.handshake)?;
        debug!(protocol = protocol.name(), deflate = deflate.is_some(), "websocket connected");
        Ok(Channel::new(
            transport,
            WsSession::new(SessionConfig {
                role: Role::Client,
                protocol,
                deflate,
                max_payload: opts.max_payload,
            }),
            leftover,
            BufferPool::new(opts.guaranteed_buffers, opts.buffer_size, shared),
        ))
    }

    fn new(transport: T, session: WsSession, input: Vec<u8>, pool: BufferPool) -> Channel<T> {
        Channel {
            inner: Mutex::new(Inner {
                transport,
                session,
                state: ChannelState::Active,
                input,
                pool,
                queues: crate::queue::WriteQueues::new(),
                pending_control: VecDeque::new(),
                pending_error: None,
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    // ------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------

    /// Acquire a message buffer; `NoBuffers` means flush and retry.
    pub fn get_buffer(&self, size: usize) -> TransportResult<TransportBuffer> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.pool.get(size)
    }

    /// Return an unused buffer to the pool.
    pub fn release_buffer(&self, buf: TransportBuffer) {
        self.inner.lock().pool.release(buf);
    }

    // ------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------

    /// Frame a finished buffer and queue (or directly write) it.
    /// Returns the number of frames still pending across the queues.
    pub fn write(&self, mut buf: TransportBuffer, opts: WriteOptions) -> TransportResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        buf.priority = opts.priority;
        inner.session.frame_message(&mut buf)?;
        trace!(len = buf.len(), "message framed for write");

        if opts.force_flush && inner.queues.is_empty() && inner.pending_control.is_empty() {
            match inner.write_one(buf)? {
                None => return Ok(0),
                Some(partial) => inner.queues.push_front(partial),
            }
        } else {
            inner.queues.push(buf);
            if opts.force_flush {
                inner.flush_some()?;
            }
        }
        Ok(inner.pending_bytes())
    }

    /// Drain the queues through the transport; returns the number of
    /// frames still pending (0 means everything went out).
    pub fn flush(&self) -> TransportResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.flush_some()?;
        Ok(inner.pending_bytes())
    }

    // ------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------

    /// Read one event. Control traffic is handled internally (pings
    /// are answered); a peer close surfaces once as a failure, after
    /// which the channel is closed.
    pub fn read(&self) -> TransportResult<ReadEvent> {
        let mut inner = self.inner.lock();
        if let Some(e) = &inner.pending_error {
            return Err(e.clone());
        }
        inner.check_open()?;
        loop {
            match inner.try_parse_frame() {
                Ok(Some((hdr, payload))) => {
                    if let Err(e) = inner.session.check_mask_rule(&hdr) {
                        return Err(inner.fatal(Some(CLOSE_PROTOCOL_ERROR), e));
                    }
                    match inner.session.on_frame(&hdr, payload) {
                        Ok(FrameEvent::Message(data)) => {
                            trace!(len = data.len(), "message delivered");
                            return Ok(ReadEvent::Data(data));
                        }
                        Ok(FrameEvent::Ping(payload)) => {
                            let pong = inner.session.control_frame(Opcode::Pong, &payload);
                            inner.send_control(pong)?;
                            return Ok(ReadEvent::Ping);
                        }
                        Ok(FrameEvent::Pong) => return Ok(ReadEvent::Pong),
                        Ok(FrameEvent::Close(code, reason)) => {
                            let text = format!(
                                "peer closed websocket: {} {}",
                                code,
                                String::from_utf8_lossy(&reason)
                            );
                            if !inner.session.sent_close {
                                let frame = inner
                                    .session
                                    .control_frame(Opcode::Close, &build_close_payload(code, b""));
                                let _ = inner.send_control(frame);
                            }
                            return Err(inner.fatal(None, TransportError::failure(text)));
                        }
                        Ok(FrameEvent::Partial) => continue,
                        Err(e) if e.kind == ErrorKind::TooBig => {
                            return Err(inner.fatal(Some(CLOSE_MESSAGE_TOO_BIG), e));
                        }
                        Err(e) => return Err(inner.fatal(Some(CLOSE_PROTOCOL_ERROR), e)),
                    }
                }
                Ok(None) => match inner.fill_input() {
                    Ok(0) => {
                        return Err(inner.fatal(
                            None,
                            TransportError::channel("connection closed by peer"),
                        ))
                    }
                    Ok(_) => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(ReadEvent::WouldBlock)
                    }
                    Err(e) => {
                        let err = TransportError::from_io(ErrorKind::ChannelError, &e);
                        return Err(inner.fatal(None, err));
                    }
                },
                Err(e) => return Err(inner.fatal(Some(CLOSE_PROTOCOL_ERROR), e)),
            }
        }
    }

    // ------------------------------------------------------------
    // Control and lifecycle
    // ------------------------------------------------------------

    /// Send a ping carrying `payload`.
    pub fn ping(&self, payload: &[u8]) -> TransportResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let frame = inner.session.control_frame(Opcode::Ping, payload);
        inner.send_control(frame)
    }

    /// Send an unsolicited pong (application heartbeat).
    pub fn pong(&self, payload: &[u8]) -> TransportResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let frame = inner.session.control_frame(Opcode::Pong, payload);
        inner.send_control(frame)
    }

    /// Graceful close: send the close frame, flush what can be
    /// flushed, reclaim pending buffers.
    pub fn close(&self) -> TransportResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Closed {
            return Ok(());
        }
        if !inner.session.sent_close {
            let frame = inner
                .session
                .control_frame(Opcode::Close, &build_close_payload(CLOSE_NORMAL, b""));
            let _ = inner.send_control(frame);
        }
        let _ = inner.flush_some();
        inner.reclaim();
        inner.state = ChannelState::Closed;
        debug!("channel closed");
        Ok(())
    }
}

impl<T: Transport> Inner<T> {
    fn check_open(&self) -> TransportResult<()> {
        match self.state {
            ChannelState::Active => Ok(()),
            ChannelState::Closed => Err(TransportError::channel("channel is closed")),
        }
    }

    fn pending_bytes(&self) -> usize {
        // control frames count toward the pending total as well
        self.queues.len() + self.pending_control.len()
    }

    /// Record the first fatal error, optionally sending a close frame,
    /// and shut the channel.
    fn fatal(&mut self, close_code: Option<u16>, err: TransportError) -> TransportError {
        if let Some(code) = close_code {
            if !self.session.sent_close {
                let frame = self
                    .session
                    .control_frame(Opcode::Close, &build_close_payload(code, err.text.as_bytes()));
                let _ = self.try_write_raw(&frame);
            }
        }
        debug!(error = %err, "channel fatal");
        self.reclaim();
        self.state = ChannelState::Closed;
        self.pending_error = Some(TransportError::channel(format!("channel failed: {}", err.text)));
        err
    }

    /// Release every queued buffer back to the pool (channel close).
    fn reclaim(&mut self) {
        for buf in self.queues.drain_all() {
            self.pool.release(buf);
        }
        self.pending_control.clear();
    }

    // ------------------------------------------------------------
    // Outbound plumbing
    // ------------------------------------------------------------

    fn try_write_raw(&mut self, bytes: &[u8]) -> TransportResult<usize> {
        match self.transport.write_transport(&[IoSlice::new(bytes)]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::from_io(ErrorKind::ChannelError, &e)),
        }
    }

    /// Send a control frame, queueing the remainder when the transport
    /// pushes back.
    fn send_control(&mut self, frame: Vec<u8>) -> TransportResult<()> {
        if self.pending_control.is_empty() {
            let n = self.try_write_raw(&frame)?;
            if n == frame.len() {
                return Ok(());
            }
            self.pending_control.push_back(frame[n..].to_vec());
            return Ok(());
        }
        self.pending_control.push_back(frame);
        Ok(())
    }

    /// Write one framed buffer directly. Returns the buffer when only
    /// partially written.
    fn write_one(&mut self, mut buf: TransportBuffer) -> TransportResult<Option<TransportBuffer>> {
        let n = match self.transport.write_transport(&[IoSlice::new(buf.wire())]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(TransportError::from_io(ErrorKind::ChannelError, &e)),
        };
        if n == buf.wire().len() {
            self.pool.release(buf);
            return Ok(None);
        }
        buf.written = n;
        Ok(Some(buf))
    }

    /// Drain pending control frames then data buffers, interleaving
    /// priorities per the flush pattern, coalescing a batch of buffers
    /// into one vectored write.
    fn flush_some(&mut self) -> TransportResult<()> {
        while let Some(front) = self.pending_control.pop_front() {
            let n = self.try_write_raw(&front)?;
            if n < front.len() {
                self.pending_control.push_front(front[n..].to_vec());
                return Ok(());
            }
        }

        loop {
            let mut batch = self.queues.pop_batch(MAX_BATCH);
            if batch.is_empty() {
                return Ok(());
            }
            let wrote = {
                let slices: Vec<IoSlice<'_>> =
                    batch.iter().map(|b| IoSlice::new(b.wire_pending())).collect();
                match self.transport.write_transport(&slices) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                    Err(e) => {
                        // put the batch back before surfacing the error
                        for buf in batch.into_iter().rev() {
                            self.queues.push_front(buf);
                        }
                        return Err(TransportError::from_io(ErrorKind::ChannelError, &e));
                    }
                }
            };
            let mut remaining = wrote;
            let mut stalled = Vec::new();
            for mut buf in batch.drain(..) {
                let pending = buf.wire_pending().len();
                if remaining >= pending {
                    remaining -= pending;
                    self.pool.release(buf);
                } else {
                    buf.written += remaining;
                    remaining = 0;
                    stalled.push(buf);
                }
            }
            let made_progress = wrote > 0;
            let had_stall = !stalled.is_empty();
            for buf in stalled.into_iter().rev() {
                self.queues.push_front(buf);
            }
            if had_stall || !made_progress {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------
    // Inbound plumbing
    // ------------------------------------------------------------

    fn fill_input(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.transport.read_transport(&mut chunk)?;
        self.input.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Try to take one complete frame off the input buffer; the
    /// payload comes back unmasked.
    #[allow(clippy::type_complexity)]
    fn try_parse_frame(
        &mut self,
    ) -> TransportResult<Option<(crate::frame::FrameHeader, Vec<u8>)>> {
        let Some(hdr) = parse_frame_header(&self.input)? else {
            return Ok(None);
        };
        if hdr.payload_len > self.session.max_payload as u64 {
            return Err(TransportError::new(ErrorKind::TooBig, "frame exceeds payload limit"));
        }
        let total = hdr.header_len + hdr.payload_len as usize;
        if self.input.len() < total {
            return Ok(None);
        }
        let mut payload = self.input[hdr.header_len..total].to_vec();
        self.input.drain(..total);
        if hdr.masked {
            apply_mask(hdr.mask_key, &mut payload);
        }
        Ok(Some((hdr, payload)))
    }
}

// ------------------------------------------------------------
// Handshake I/O helpers
// ------------------------------------------------------------

/// Read transport bytes until the blank line ending an HTTP head;
/// returns the head and any bytes that followed it.
fn read_http_head<T: Transport>(
    transport: &mut T,
    max_size: usize,
) -> TransportResult<(Vec<u8>, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            let leftover = buf.split_off(end);
            return Ok((buf, leftover));
        }
        if buf.len() > max_size {
            return Err(TransportError::new(
                ErrorKind::ProtocolError,
                "handshake exceeds size limit",
            ));
        }
        let mut chunk = [0u8; 1024];
        match transport.read_transport(&mut chunk) {
            Ok(0) => {
                return Err(TransportError::connection("connection closed during handshake"))
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(TransportError::from_io(ErrorKind::ConnectionError, &e)),
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn write_all<T: Transport>(transport: &mut T, mut bytes: &[u8]) -> TransportResult<()> {
    while !bytes.is_empty() {
        match transport.write_transport(&[IoSlice::new(bytes)]) {
            Ok(0) => return Err(TransportError::connection("transport refused handshake bytes")),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(TransportError::from_io(ErrorKind::ConnectionError, &e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{build_frame_header, parse_close_payload, MAX_FRAME_HEADER};
    use crate::handshake::SubProtocol;

    /// Scripted transport: inbound bytes are queued by the test,
    /// outbound bytes are captured for inspection.
    #[derive(Default)]
    struct TestWire {
        inbound: Vec<u8>,
        outbound: Vec<u8>,
        /// Cap on bytes accepted per write call (simulates short
        /// writes); 0 means unlimited.
        write_limit: usize,
    }

    impl Transport for TestWire {
        fn read_transport(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbound.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let n = buf.len().min(self.inbound.len());
            buf[..n].copy_from_slice(&self.inbound[..n]);
            self.inbound.drain(..n);
            Ok(n)
        }

        fn write_transport(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
            let mut budget = if self.write_limit == 0 { usize::MAX } else { self.write_limit };
            let mut total = 0;
            for b in bufs {
                let take = b.len().min(budget);
                self.outbound.extend_from_slice(&b[..take]);
                total += take;
                budget -= take;
                if budget == 0 {
                    break;
                }
            }
            if total == 0 && !bufs.is_empty() && bufs.iter().any(|b| !b.is_empty()) {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            Ok(total)
        }
    }

    fn client_handshake_bytes() -> Vec<u8> {
        b"GET /WebSocket HTTP/1.1\r\n\
          Host: md.example.net\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 13\r\n\
          Sec-WebSocket-Protocol: rssl.rwf\r\n\r\n"
            .to_vec()
    }

    fn server_channel(extra_inbound: Vec<u8>) -> Channel<TestWire> {
        let mut wire = TestWire::default();
        wire.inbound = client_handshake_bytes();
        wire.inbound.extend_from_slice(&extra_inbound);
        let mut opts = AcceptOptions::default();
        opts.handshake.enable_deflate = false;
        let ch = Channel::accept(wire, opts, None).unwrap();
        // drop the 101 response from the capture so tests see only
        // frames
        ch.inner.lock().transport.outbound.clear();
        ch
    }

    fn masked_frame(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
        let key = [7u8, 21, 9, 3];
        let mut hdr = [0u8; MAX_FRAME_HEADER];
        let n = build_frame_header(&mut hdr, fin, false, opcode, Some(key), payload.len() as u64);
        let mut out = hdr[..n].to_vec();
        let mut body = payload.to_vec();
        apply_mask(key, &mut body);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_accept_and_read_message() {
        let frame = masked_frame(Opcode::Binary, true, b"first quote");
        let ch = server_channel(frame);
        assert_eq!(ch.read().unwrap(), ReadEvent::Data(b"first quote".to_vec()));
        assert_eq!(ch.read().unwrap(), ReadEvent::WouldBlock);
    }

    #[test]
    fn test_fragmented_message_across_reads() {
        let mut bytes = masked_frame(Opcode::Binary, false, b"part-one|");
        bytes.extend(masked_frame(Opcode::Continuation, true, b"part-two"));
        let ch = server_channel(bytes);
        assert_eq!(ch.read().unwrap(), ReadEvent::Data(b"part-one|part-two".to_vec()));
    }

    #[test]
    fn test_unmasked_client_frame_closes_1002() {
        // an unmasked data frame from the client side
        let mut hdr = [0u8; MAX_FRAME_HEADER];
        let n = build_frame_header(&mut hdr, true, false, Opcode::Text, None, 2);
        let mut frame = hdr[..n].to_vec();
        frame.extend_from_slice(b"hi");

        let ch = server_channel(frame);
        let err = ch.read().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolError);
        // the close frame went out with code 1002
        let sent = ch.inner.lock().transport.outbound.clone();
        let h = parse_frame_header(&sent).unwrap().unwrap();
        assert_eq!(h.opcode, Opcode::Close);
        let payload = &sent[h.header_len..];
        let (code, _) = parse_close_payload(payload);
        assert_eq!(code, 1002);
        // the channel stays failed
        let err = ch.read().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ChannelError);
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn test_ping_answered_with_identical_pong() {
        let frame = masked_frame(Opcode::Ping, true, b"hb-17");
        let ch = server_channel(frame);
        assert_eq!(ch.read().unwrap(), ReadEvent::Ping);
        let sent = ch.inner.lock().transport.outbound.clone();
        let h = parse_frame_header(&sent).unwrap().unwrap();
        assert_eq!(h.opcode, Opcode::Pong);
        assert_eq!(&sent[h.header_len..], b"hb-17");
    }

    #[test]
    fn test_peer_close_surfaces_once_as_failure() {
        let frame = masked_frame(Opcode::Close, true, &build_close_payload(1001, b"going away"));
        let ch = server_channel(frame);
        let err = ch.read().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Failure);
        assert!(err.text.contains("1001"));
        // the echo close went out
        let sent = ch.inner.lock().transport.outbound.clone();
        let h = parse_frame_header(&sent).unwrap().unwrap();
        assert_eq!(h.opcode, Opcode::Close);
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn test_write_and_flush_round_trip() {
        let ch = server_channel(Vec::new());
        let mut buf = ch.get_buffer(64).unwrap();
        buf.payload_mut()[..9].copy_from_slice(b"refresh-1");
        buf.set_len(9).unwrap();
        let pending = ch
            .write(buf, WriteOptions { priority: WritePriority::High, force_flush: true })
            .unwrap();
        assert_eq!(pending, 0);
        let sent = ch.inner.lock().transport.outbound.clone();
        let h = parse_frame_header(&sent).unwrap().unwrap();
        assert_eq!(h.opcode, Opcode::Binary);
        assert!(!h.masked);
        assert_eq!(&sent[h.header_len..], b"refresh-1");
    }

    #[test]
    fn test_short_write_queues_remainder() {
        let ch = server_channel(Vec::new());
        ch.inner.lock().transport.write_limit = 4;
        let mut buf = ch.get_buffer(64).unwrap();
        buf.payload_mut()[..10].copy_from_slice(b"0123456789");
        buf.set_len(10).unwrap();
        let pending = ch
            .write(buf, WriteOptions { priority: WritePriority::High, force_flush: true })
            .unwrap();
        assert!(pending > 0);
        // lift the cap and flush the rest
        ch.inner.lock().transport.write_limit = 0;
        assert_eq!(ch.flush().unwrap(), 0);
        let sent = ch.inner.lock().transport.outbound.clone();
        let h = parse_frame_header(&sent).unwrap().unwrap();
        assert_eq!(&sent[h.header_len..], b"0123456789");
    }

    #[test]
    fn test_buffers_reclaimed_on_close() {
        let ch = server_channel(Vec::new());
        ch.inner.lock().transport.write_limit = 1;
        let before = ch.inner.lock().pool.guaranteed_available();
        let mut buf = ch.get_buffer(16).unwrap();
        buf.payload_mut()[..3].copy_from_slice(b"abc");
        buf.set_len(3).unwrap();
        ch.write(buf, WriteOptions::default()).unwrap();
        ch.close().unwrap();
        assert_eq!(ch.inner.lock().pool.guaranteed_available(), before);
        assert!(ch.get_buffer(16).is_err());
    }

    #[test]
    fn test_handshake_leftover_frames_are_consumed() {
        // frame bytes pipelined right behind the handshake
        let frame = masked_frame(Opcode::Binary, true, b"early");
        let ch = server_channel(frame);
        // bytes were carried over from the handshake read
        assert_eq!(ch.read().unwrap(), ReadEvent::Data(b"early".to_vec()));
    }

    #[test]
    fn test_connect_against_accept() {
        // client produces a request, server validates it, client
        // validates the response; frames then flow client -> server
        let copts = ConnectOptions {
            handshake: ClientOptions {
                host: "md.example.net".to_string(),
                protocols: vec![SubProtocol::Rwf],
                enable_deflate: false,
                ..ClientOptions::default()
            },
            ..ConnectOptions::default()
        };
        let hs = client_request(&copts.handshake);
        let mut server_wire = TestWire::default();
        server_wire.inbound = hs.request.clone();
        let mut sopts = AcceptOptions::default();
        sopts.handshake.enable_deflate = false;
        let server = Channel::accept(server_wire, sopts, None).unwrap();
        let response = {
            let mut inner = server.inner.lock();
            let out = inner.transport.outbound.clone();
            inner.transport.outbound.clear();
            out
        };

        let mut client_wire = TestWire::default();
        client_wire.inbound = response;
        let client = Channel::connect(client_wire, copts, None).unwrap();

        let mut buf = client.get_buffer(32).unwrap();
        buf.payload_mut()[..5].copy_from_slice(b"login");
        buf.set_len(5).unwrap();
        client
            .write(buf, WriteOptions { priority: WritePriority::High, force_flush: true })
            .unwrap();
        let frames = client.inner.lock().transport.outbound.clone();
        // client frames must be masked
        let h = parse_frame_header(&frames).unwrap().unwrap();
        assert!(h.masked);

        server.inner.lock().input.extend_from_slice(&frames);
        assert_eq!(server.read().unwrap(), ReadEvent::Data(b"login".to_vec()));
    }
}
