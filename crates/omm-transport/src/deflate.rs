// deflate.rs — permessage-deflate message compression
//
// Raw deflate streams (no zlib header), one per direction. Each
// outbound message is sync-flushed and the trailing 00 00 FF FF marker
// stripped; inbound messages get the marker re-appended before
// inflating. The no-context-takeover options reset the corresponding
// stream at message boundaries.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{ErrorKind, TransportError, TransportResult};

/// Messages smaller than this are sent uncompressed even when the
/// extension is negotiated; tiny payloads inflate.
pub const MIN_COMPRESS_SIZE: usize = 100;

const SYNC_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Negotiated extension parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflateParams {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
}

/// Per-session compression state for both directions.
#[derive(Debug)]
pub struct DeflateContext {
    compress: Compress,
    decompress: Decompress,
    /// Reset the compressor after each outbound message.
    reset_compress: bool,
    /// Reset the decompressor after each inbound message.
    reset_decompress: bool,
    pub min_compress_size: usize,
}

impl DeflateContext {
    /// `server` selects which no-context-takeover flag applies to which
    /// direction.
    pub fn new(params: DeflateParams, server: bool) -> DeflateContext {
        let (reset_compress, reset_decompress) = if server {
            (params.server_no_context_takeover, params.client_no_context_takeover)
        } else {
            (params.client_no_context_takeover, params.server_no_context_takeover)
        };
        DeflateContext {
            compress: Compress::new(Compression::default(), false),
            decompress: Decompress::new(false),
            reset_compress,
            reset_decompress,
            min_compress_size: MIN_COMPRESS_SIZE,
        }
    }

    /// True when a payload of this size should bypass compression.
    pub fn below_threshold(&self, len: usize) -> bool {
        len < self.min_compress_size
    }

    /// Deflate one complete message; the sync-flush tail is stripped.
    pub fn compress_message(&mut self, data: &[u8]) -> TransportResult<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        let start_in = self.compress.total_in();
        loop {
            let consumed = (self.compress.total_in() - start_in) as usize;
            if out.len() == out.capacity() {
                out.reserve((data.len() / 4).max(256));
            }
            self.compress
                .compress_vec(&data[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| TransportError::failure(format!("deflate failed: {e}")))?;
            let consumed = (self.compress.total_in() - start_in) as usize;
            if consumed == data.len() && out.len() < out.capacity() {
                break;
            }
        }
        if !out.ends_with(&SYNC_TAIL) {
            return Err(TransportError::failure("deflate stream missing sync tail"));
        }
        out.truncate(out.len() - SYNC_TAIL.len());
        if self.reset_compress {
            self.compress.reset();
        }
        Ok(out)
    }

    /// Inflate one complete message, re-appending the sync tail first.
    /// `max_len` bounds the inflated size.
    pub fn decompress_message(&mut self, data: &[u8], max_len: usize) -> TransportResult<Vec<u8>> {
        let mut input = Vec::with_capacity(data.len() + SYNC_TAIL.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&SYNC_TAIL);

        let mut out = Vec::with_capacity((data.len() * 3).max(256));
        let start_in = self.decompress.total_in();
        loop {
            if out.len() > max_len {
                return Err(TransportError::new(ErrorKind::TooBig, "inflated message too big"));
            }
            let consumed = (self.decompress.total_in() - start_in) as usize;
            if out.len() == out.capacity() {
                out.reserve((out.len() / 2).max(256));
            }
            let status = self
                .decompress
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
                .map_err(|e| TransportError::protocol(format!("inflate failed: {e}")))?;
            let consumed = (self.decompress.total_in() - start_in) as usize;
            if consumed == input.len() && out.len() < out.capacity() {
                break;
            }
            if status == Status::StreamEnd {
                break;
            }
        }
        if out.len() > max_len {
            return Err(TransportError::new(ErrorKind::TooBig, "inflated message too big"));
        }
        if self.reset_decompress {
            self.decompress.reset(false);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(no_takeover: bool) -> (DeflateContext, DeflateContext) {
        let params = DeflateParams {
            server_no_context_takeover: no_takeover,
            client_no_context_takeover: no_takeover,
        };
        (DeflateContext::new(params, true), DeflateContext::new(params, false))
    }

    #[test]
    fn test_round_trip() {
        let (mut server, mut client) = ctx(false);
        let message = b"{\"Type\":\"Refresh\",\"Fields\":{\"BID\":45.01,\"ASK\":45.03}}".repeat(50);
        let compressed = server.compress_message(&message).unwrap();
        assert!(compressed.len() < message.len());
        assert!(!compressed.ends_with(&SYNC_TAIL));
        let inflated = client.decompress_message(&compressed, 1 << 20).unwrap();
        assert_eq!(inflated, message);
    }

    #[test]
    fn test_context_takeover_carries_window() {
        let (mut server, mut client) = ctx(false);
        let message = b"market data market data market data".to_vec();
        let first = server.compress_message(&message).unwrap();
        let second = server.compress_message(&message).unwrap();
        // the second message references the first's window
        assert!(second.len() <= first.len());
        assert_eq!(client.decompress_message(&first, 4096).unwrap(), message);
        assert_eq!(client.decompress_message(&second, 4096).unwrap(), message);
    }

    #[test]
    fn test_no_context_takeover_resets() {
        let (mut server, mut client) = ctx(true);
        let message = b"market data market data market data".to_vec();
        let first = server.compress_message(&message).unwrap();
        let second = server.compress_message(&message).unwrap();
        // with resets every message compresses from scratch
        assert_eq!(first, second);
        assert_eq!(client.decompress_message(&first, 4096).unwrap(), message);
        assert_eq!(client.decompress_message(&second, 4096).unwrap(), message);
    }

    #[test]
    fn test_inflate_bound_enforced() {
        let (mut server, mut client) = ctx(false);
        let message = vec![0u8; 100_000];
        let compressed = server.compress_message(&message).unwrap();
        let err = client.decompress_message(&compressed, 1000).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooBig);
    }

    #[test]
    fn test_threshold() {
        let (server, _) = ctx(false);
        assert!(server.below_threshold(10));
        assert!(!server.below_threshold(MIN_COMPRESS_SIZE));
    }
}
