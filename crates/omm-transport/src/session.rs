// session.rs — per-connection WebSocket session state
//
// Owns the negotiated parameters, the fragment reassembly buffer and
// the compression contexts. The channel feeds it parsed, unmasked
// frames and asks it to frame outbound messages; all byte-level header
// work lives in frame.rs.

use crate::buffer::TransportBuffer;
use crate::deflate::{DeflateContext, DeflateParams};
use crate::error::{ErrorKind, TransportError, TransportResult};
use crate::frame::{
    apply_mask, build_frame_header, parse_close_payload, FrameHeader, Opcode, MAX_FRAME_HEADER,
};
use crate::handshake::{SubProtocol, WS_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Default reassembly bound when the caller does not configure one.
pub const DEFAULT_MAX_PAYLOAD: usize = 6 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub role: Role,
    pub protocol: SubProtocol,
    pub deflate: Option<DeflateParams>,
    pub max_payload: usize,
}

/// What one inbound frame produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameEvent {
    /// A complete message, reassembled and decompressed.
    Message(Vec<u8>),
    /// Ping with its payload; the caller answers with a pong.
    Ping(Vec<u8>),
    Pong,
    /// Close with status code and reason.
    Close(u16, Vec<u8>),
    /// Fragment absorbed; nothing to deliver yet.
    Partial,
}

#[derive(Debug)]
pub struct WsSession {
    pub role: Role,
    pub protocol: SubProtocol,
    pub version: u8,
    pub max_payload: usize,
    pub sent_close: bool,
    pub recv_close: bool,
    deflate: Option<DeflateContext>,
    reassembly: Vec<u8>,
    frag_type: Option<Opcode>,
    frag_compressed: bool,
}

impl WsSession {
    pub fn new(cfg: SessionConfig) -> WsSession {
        let server = cfg.role == Role::Server;
        WsSession {
            role: cfg.role,
            protocol: cfg.protocol,
            version: WS_VERSION,
            max_payload: cfg.max_payload,
            sent_close: false,
            recv_close: false,
            deflate: cfg.deflate.map(|p| DeflateContext::new(p, server)),
            reassembly: Vec::new(),
            frag_type: None,
            frag_compressed: false,
        }
    }

    pub fn deflate_negotiated(&self) -> bool {
        self.deflate.is_some()
    }

    /// Opcode for outbound data frames: the JSON sub-protocol is text,
    /// the wire format is binary.
    fn data_opcode(&self) -> Opcode {
        match self.protocol {
            SubProtocol::Rwf => Opcode::Binary,
            SubProtocol::Json2 => Opcode::Text,
        }
    }

    /// Enforce the masking direction rule before payload processing.
    pub(crate) fn check_mask_rule(&self, hdr: &FrameHeader) -> TransportResult<()> {
        match self.role {
            Role::Server if !hdr.masked => {
                Err(TransportError::protocol("client frame without mask"))
            }
            Role::Client if hdr.masked => {
                Err(TransportError::protocol("masked frame from server"))
            }
            _ => Ok(()),
        }
    }

    /// Process one unmasked frame.
    pub(crate) fn on_frame(
        &mut self,
        hdr: &FrameHeader,
        payload: Vec<u8>,
    ) -> TransportResult<FrameEvent> {
        match hdr.opcode {
            Opcode::Close => {
                self.recv_close = true;
                let (code, reason) = parse_close_payload(&payload);
                return Ok(FrameEvent::Close(code, reason.to_vec()));
            }
            Opcode::Ping => return Ok(FrameEvent::Ping(payload)),
            Opcode::Pong => return Ok(FrameEvent::Pong),
            _ => {}
        }

        if hdr.rsv1 && self.deflate.is_none() {
            return Err(TransportError::protocol("compressed frame without negotiation"));
        }

        match self.frag_type {
            None => {
                if hdr.opcode == Opcode::Continuation {
                    return Err(TransportError::protocol("continuation without a first frame"));
                }
                if hdr.fin {
                    return self.finish_message(payload, hdr.rsv1);
                }
                self.frag_type = Some(hdr.opcode);
                self.frag_compressed = hdr.rsv1;
                self.reassembly = payload;
                self.check_reassembly_bound()?;
                Ok(FrameEvent::Partial)
            }
            Some(_) => {
                if hdr.opcode != Opcode::Continuation {
                    return Err(TransportError::protocol("new data frame inside a fragment"));
                }
                if hdr.rsv1 {
                    return Err(TransportError::protocol("rsv1 repeated on continuation"));
                }
                self.reassembly.extend_from_slice(&payload);
                self.check_reassembly_bound()?;
                if !hdr.fin {
                    return Ok(FrameEvent::Partial);
                }
                let compressed = self.frag_compressed;
                let whole = std::mem::take(&mut self.reassembly);
                self.frag_type = None;
                self.frag_compressed = false;
                self.finish_message(whole, compressed)
            }
        }
    }

    fn check_reassembly_bound(&self) -> TransportResult<()> {
        if self.reassembly.len() > self.max_payload {
            Err(TransportError::new(ErrorKind::TooBig, "reassembled message exceeds limit"))
        } else {
            Ok(())
        }
    }

    fn finish_message(&mut self, payload: Vec<u8>, compressed: bool) -> TransportResult<FrameEvent> {
        if payload.len() > self.max_payload {
            return Err(TransportError::new(ErrorKind::TooBig, "message exceeds limit"));
        }
        if compressed {
            let ctx = self
                .deflate
                .as_mut()
                .ok_or_else(|| TransportError::protocol("compressed frame without negotiation"))?;
            let max = self.max_payload;
            return Ok(FrameEvent::Message(ctx.decompress_message(&payload, max)?));
        }
        Ok(FrameEvent::Message(payload))
    }

    /// Compress (when worthwhile), mask (client role) and prepend the
    /// data-frame header onto a finished buffer.
    pub(crate) fn frame_message(&mut self, buf: &mut TransportBuffer) -> TransportResult<()> {
        let mut rsv1 = false;
        if let Some(ctx) = &mut self.deflate {
            if !ctx.below_threshold(buf.len()) {
                let compressed = ctx.compress_message(buf.payload())?;
                // incompressible payloads go out as-is
                if compressed.len() < buf.len() {
                    buf.replace_payload(&compressed)?;
                    rsv1 = true;
                }
            }
        }
        let mask_key = self.outbound_mask();
        if let Some(key) = mask_key {
            apply_mask(key, buf.payload_region_mut());
        }
        let mut hdr = [0u8; MAX_FRAME_HEADER];
        let n = build_frame_header(
            &mut hdr,
            true,
            rsv1,
            self.data_opcode(),
            mask_key,
            buf.len() as u64,
        );
        buf.prepend(&hdr[..n])
    }

    /// Standalone control frame (ping, pong, close) as wire bytes.
    pub(crate) fn control_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let mask_key = self.outbound_mask();
        let mut hdr = [0u8; MAX_FRAME_HEADER];
        let n = build_frame_header(&mut hdr, true, false, opcode, mask_key, payload.len() as u64);
        let mut out = Vec::with_capacity(n + payload.len());
        out.extend_from_slice(&hdr[..n]);
        let body_start = out.len();
        out.extend_from_slice(payload);
        if let Some(key) = mask_key {
            apply_mask(key, &mut out[body_start..]);
        }
        if opcode == Opcode::Close {
            self.sent_close = true;
        }
        out
    }

    fn outbound_mask(&self) -> Option<[u8; 4]> {
        match self.role {
            Role::Client => Some(rand::random()),
            Role::Server => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferOrigin, TransportBuffer};
    use crate::frame::parse_frame_header;

    fn server_session(deflate: bool) -> WsSession {
        WsSession::new(SessionConfig {
            role: Role::Server,
            protocol: SubProtocol::Rwf,
            deflate: deflate.then(DeflateParams::default),
            max_payload: 64 * 1024,
        })
    }

    fn data_frame(opcode: Opcode, fin: bool, rsv1: bool, payload: &[u8]) -> FrameHeader {
        FrameHeader {
            fin,
            rsv1,
            opcode,
            masked: true,
            mask_key: [0; 4],
            payload_len: payload.len() as u64,
            header_len: 6,
        }
    }

    #[test]
    fn test_single_frame_message() {
        let mut s = server_session(false);
        let hdr = data_frame(Opcode::Binary, true, false, b"quote");
        let ev = s.on_frame(&hdr, b"quote".to_vec()).unwrap();
        assert_eq!(ev, FrameEvent::Message(b"quote".to_vec()));
    }

    #[test]
    fn test_fragment_reassembly_matches_single_frame() {
        let message: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
        // split 1500/1500/1000
        let mut s = server_session(false);
        let h1 = data_frame(Opcode::Binary, false, false, &message[..1500]);
        let h2 = data_frame(Opcode::Continuation, false, false, &message[1500..3000]);
        let h3 = data_frame(Opcode::Continuation, true, false, &message[3000..]);
        assert_eq!(s.on_frame(&h1, message[..1500].to_vec()).unwrap(), FrameEvent::Partial);
        assert_eq!(s.on_frame(&h2, message[1500..3000].to_vec()).unwrap(), FrameEvent::Partial);
        let ev = s.on_frame(&h3, message[3000..].to_vec()).unwrap();
        assert_eq!(ev, FrameEvent::Message(message));
    }

    #[test]
    fn test_fragmented_compressed_message() {
        // deflate on the sending side, reassemble+inflate on the
        // receiving side, frames split mid-stream
        let mut sender = WsSession::new(SessionConfig {
            role: Role::Client,
            protocol: SubProtocol::Json2,
            deflate: Some(DeflateParams::default()),
            max_payload: 1 << 20,
        });
        let message = b"{\"Fields\":{\"BID\":45.01}}".repeat(500); // ~12KB
        let compressed = sender
            .deflate
            .as_mut()
            .unwrap()
            .compress_message(&message)
            .unwrap();

        let mut s = server_session(true);
        let cut1 = compressed.len() / 3;
        let cut2 = 2 * compressed.len() / 3;
        let h1 = data_frame(Opcode::Text, false, true, &compressed[..cut1]);
        let h2 = data_frame(Opcode::Continuation, false, false, &compressed[cut1..cut2]);
        let h3 = data_frame(Opcode::Continuation, true, false, &compressed[cut2..]);
        assert_eq!(s.on_frame(&h1, compressed[..cut1].to_vec()).unwrap(), FrameEvent::Partial);
        assert_eq!(
            s.on_frame(&h2, compressed[cut1..cut2].to_vec()).unwrap(),
            FrameEvent::Partial
        );
        let ev = s.on_frame(&h3, compressed[cut2..].to_vec()).unwrap();
        assert_eq!(ev, FrameEvent::Message(message));
    }

    #[test]
    fn test_fragment_protocol_violations() {
        let mut s = server_session(true);
        // continuation with nothing in progress
        let h = data_frame(Opcode::Continuation, true, false, b"x");
        assert!(s.on_frame(&h, b"x".to_vec()).is_err());

        // rsv1 on a continuation
        let mut s = server_session(true);
        let h1 = data_frame(Opcode::Binary, false, true, b"x");
        s.on_frame(&h1, b"x".to_vec()).unwrap();
        let h2 = data_frame(Opcode::Continuation, true, true, b"y");
        assert!(s.on_frame(&h2, b"y".to_vec()).is_err());

        // new data frame inside a fragment
        let mut s = server_session(false);
        let h1 = data_frame(Opcode::Binary, false, false, b"x");
        s.on_frame(&h1, b"x".to_vec()).unwrap();
        let h2 = data_frame(Opcode::Text, true, false, b"y");
        assert!(s.on_frame(&h2, b"y".to_vec()).is_err());

        // rsv1 without negotiation
        let mut s = server_session(false);
        let h = data_frame(Opcode::Binary, true, true, b"x");
        assert!(s.on_frame(&h, b"x".to_vec()).is_err());
    }

    #[test]
    fn test_reassembly_bound() {
        let mut s = server_session(false);
        s.max_payload = 10;
        let h1 = data_frame(Opcode::Binary, false, false, b"123456");
        s.on_frame(&h1, b"123456".to_vec()).unwrap();
        let h2 = data_frame(Opcode::Continuation, false, false, b"789012");
        let err = s.on_frame(&h2, b"789012".to_vec()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooBig);
    }

    #[test]
    fn test_mask_rule_by_role() {
        let s = server_session(false);
        let mut h = data_frame(Opcode::Binary, true, false, b"x");
        h.masked = false;
        assert!(s.check_mask_rule(&h).is_err());
        h.masked = true;
        assert!(s.check_mask_rule(&h).is_ok());

        let c = WsSession::new(SessionConfig {
            role: Role::Client,
            protocol: SubProtocol::Rwf,
            deflate: None,
            max_payload: 1024,
        });
        assert!(c.check_mask_rule(&h).is_err());
        h.masked = false;
        assert!(c.check_mask_rule(&h).is_ok());
    }

    #[test]
    fn test_frame_message_server_is_unmasked_binary() {
        let mut s = server_session(false);
        let mut buf = TransportBuffer::with_capacity(64, BufferOrigin::Heap);
        buf.payload_mut()[..5].copy_from_slice(b"bytes");
        buf.set_len(5).unwrap();
        s.frame_message(&mut buf).unwrap();
        let wire = buf.wire().to_vec();
        let hdr = parse_frame_header(&wire).unwrap().unwrap();
        assert!(hdr.fin);
        assert!(!hdr.masked);
        assert_eq!(hdr.opcode, Opcode::Binary);
        assert_eq!(&wire[hdr.header_len..], b"bytes");
    }

    #[test]
    fn test_client_frames_are_masked_and_recoverable() {
        let mut c = WsSession::new(SessionConfig {
            role: Role::Client,
            protocol: SubProtocol::Rwf,
            deflate: None,
            max_payload: 1024,
        });
        let mut buf = TransportBuffer::with_capacity(64, BufferOrigin::Heap);
        buf.payload_mut()[..5].copy_from_slice(b"bytes");
        buf.set_len(5).unwrap();
        c.frame_message(&mut buf).unwrap();
        let wire = buf.wire().to_vec();
        let hdr = parse_frame_header(&wire).unwrap().unwrap();
        assert!(hdr.masked);
        let mut payload = wire[hdr.header_len..].to_vec();
        assert_ne!(payload, b"bytes");
        apply_mask(hdr.mask_key, &mut payload);
        assert_eq!(payload, b"bytes");
    }

    #[test]
    fn test_close_control_frame_sets_flag() {
        let mut s = server_session(false);
        let frame = s.control_frame(Opcode::Close, &crate::frame::build_close_payload(1000, b"bye"));
        assert!(s.sent_close);
        let hdr = parse_frame_header(&frame).unwrap().unwrap();
        assert_eq!(hdr.opcode, Opcode::Close);
        assert_eq!(hdr.payload_len, 5);
    }
}
