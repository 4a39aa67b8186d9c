// handshake.rs — WebSocket opening handshake
//
// Single-pass HTTP header parsing (strict CRLF, case-insensitive field
// names, tolerant of extra whitespace), accept-key computation, and
// sub-protocol / extension negotiation. Sub-protocols are chosen by
// server preference order, not client order. Legacy protocol names are
// accepted unless the server is configured to reject them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::deflate::DeflateParams;
use crate::error::{ErrorKind, TransportError, TransportResult};

/// The accept-key GUID from RFC 6455.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default request target for connecting clients.
pub const DEFAULT_WS_PATH: &str = "/WebSocket";

/// The WebSocket protocol version both sides speak.
pub const WS_VERSION: u8 = 13;

const EXT_PERMESSAGE_DEFLATE: &str = "permessage-deflate";
const EXT_SERVER_NO_CONTEXT: &str = "server_no_context_takeover";
const EXT_CLIENT_NO_CONTEXT: &str = "client_no_context_takeover";

// ============================================================
// Sub-protocols
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubProtocol {
    /// Binary wire-format payloads.
    Rwf,
    /// Framed JSON payloads, handled outside this crate.
    Json2,
}

impl SubProtocol {
    pub fn name(self) -> &'static str {
        match self {
            SubProtocol::Rwf => "rssl.rwf",
            SubProtocol::Json2 => "rssl.json.v2",
        }
    }

    /// Deprecated wire names still spoken by older peers.
    pub fn legacy_name(self) -> &'static str {
        match self {
            SubProtocol::Rwf => "tr_rwf",
            SubProtocol::Json2 => "tr_json2",
        }
    }

    pub fn from_token(token: &str, accept_legacy: bool) -> Option<SubProtocol> {
        for p in [SubProtocol::Rwf, SubProtocol::Json2] {
            if token.eq_ignore_ascii_case(p.name()) {
                return Some(p);
            }
            if accept_legacy && token.eq_ignore_ascii_case(p.legacy_name()) {
                return Some(p);
            }
        }
        None
    }
}

// ============================================================
// Accept key
// ============================================================

/// base64(SHA1(client key + GUID)).
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Fresh 16-byte nonce, base64-encoded, for the client key header.
pub fn generate_key_nonce() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64.encode(nonce)
}

// ============================================================
// HTTP parsing
// ============================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct HttpMessage {
    /// Request: method; response: "HTTP/1.1".
    pub start1: String,
    /// Request: target; response: status code.
    pub start2: String,
    /// Request: version; response: reason phrase.
    pub start3: String,
    /// Field names lowercased; values trimmed.
    pub headers: Vec<(String, String)>,
}

impl HttpMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|(n, _)| n == name).count()
    }

    /// All comma-separated tokens across every occurrence of a header.
    pub fn header_tokens(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header_tokens(name)
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token))
    }
}

/// Parse one HTTP message head (through the blank line). Strict about
/// CRLF termination and the `:` delimiter, tolerant of surrounding
/// whitespace in values.
pub(crate) fn parse_http(bytes: &[u8]) -> TransportResult<HttpMessage> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TransportError::protocol("handshake is not valid UTF-8"))?;
    let mut lines = text.split("\r\n");
    let start = lines
        .next()
        .ok_or_else(|| TransportError::protocol("empty handshake"))?;
    let mut parts = start.splitn(3, ' ');
    let mut msg = HttpMessage {
        start1: parts.next().unwrap_or_default().to_string(),
        start2: parts.next().unwrap_or_default().trim().to_string(),
        start3: parts.next().unwrap_or_default().trim().to_string(),
        headers: Vec::new(),
    };
    if msg.start1.is_empty() || msg.start2.is_empty() {
        return Err(TransportError::protocol("malformed start line"));
    }
    for line in lines {
        if line.is_empty() {
            break;
        }
        let colon = line
            .find(':')
            .ok_or_else(|| TransportError::protocol("header line missing ':'"))?;
        let name = line[..colon].trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(TransportError::protocol("empty header field name"));
        }
        let value = line[colon + 1..].trim().to_string();
        msg.headers.push((name, value));
    }
    Ok(msg)
}

/// Percent-decode a request target.
pub(crate) fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = |b: u8| -> Option<u8> {
                match b {
                    b'0'..=b'9' => Some(b - b'0'),
                    b'a'..=b'f' => Some(b - b'a' + 10),
                    b'A'..=b'F' => Some(b - b'A' + 10),
                    _ => None,
                }
            };
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ============================================================
// Extension negotiation
// ============================================================

/// Parse the client's extension offers; returns the accepted
/// permessage-deflate parameters, if any offer is acceptable.
fn negotiate_deflate(msg: &HttpMessage, want_server_no_context: bool) -> Option<DeflateParams> {
    for value in msg
        .headers
        .iter()
        .filter(|(n, _)| n == "sec-websocket-extensions")
        .map(|(_, v)| v)
    {
        // offers are comma-separated; parameters semicolon-separated
        'offer: for offer in value.split(',') {
            let mut parts = offer.split(';').map(str::trim);
            let Some(ext) = parts.next() else { continue };
            if !ext.eq_ignore_ascii_case(EXT_PERMESSAGE_DEFLATE) {
                continue;
            }
            let mut params = DeflateParams::default();
            for p in parts {
                let p = p.split('=').next().unwrap_or(p).trim();
                if p.eq_ignore_ascii_case(EXT_SERVER_NO_CONTEXT) {
                    params.server_no_context_takeover = true;
                } else if p.eq_ignore_ascii_case(EXT_CLIENT_NO_CONTEXT) {
                    params.client_no_context_takeover = true;
                } else if p.eq_ignore_ascii_case("server_max_window_bits")
                    || p.eq_ignore_ascii_case("client_max_window_bits")
                {
                    // window-bits offers are declined; fall through to
                    // the next offer
                    continue 'offer;
                } else {
                    continue 'offer;
                }
            }
            if want_server_no_context {
                params.server_no_context_takeover = true;
            }
            return Some(params);
        }
    }
    None
}

fn deflate_response_value(params: &DeflateParams) -> String {
    let mut v = String::from(EXT_PERMESSAGE_DEFLATE);
    if params.server_no_context_takeover {
        v.push(';');
        v.push_str(EXT_SERVER_NO_CONTEXT);
    }
    if params.client_no_context_takeover {
        v.push(';');
        v.push_str(EXT_CLIENT_NO_CONTEXT);
    }
    v
}

// ============================================================
// Server side
// ============================================================

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Preference-ordered sub-protocols the server speaks.
    pub protocols: Vec<SubProtocol>,
    /// Refuse the deprecated tr_rwf / tr_json2 names.
    pub reject_deprecated_names: bool,
    pub enable_deflate: bool,
    /// Ask the client to let the server reset its compression context
    /// per message (lower memory per connection).
    pub server_no_context_takeover: bool,
    /// Requests larger than this are rejected with 413.
    pub max_request_size: usize,
    pub min_version: u8,
}

impl Default for ServerOptions {
    fn default() -> ServerOptions {
        ServerOptions {
            protocols: vec![SubProtocol::Rwf, SubProtocol::Json2],
            reject_deprecated_names: false,
            enable_deflate: true,
            server_no_context_takeover: false,
            max_request_size: 16 * 1024,
            min_version: WS_VERSION,
        }
    }
}

/// Everything the accept flow produced: the 101 response to send and
/// the negotiated session parameters.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    pub protocol: SubProtocol,
    pub deflate: Option<DeflateParams>,
    pub response: Vec<u8>,
    pub path: String,
    pub host: String,
    pub origin: String,
    pub user_agent: String,
    pub cookies: Vec<(String, String)>,
}

fn reject(status: &str, extra_headers: &str, text: &str) -> (Vec<u8>, TransportError) {
    let body = format!(
        "HTTP/1.1 {status}\r\nConnection: close\r\nContent-Length: 0\r\n{extra_headers}\r\n",
    );
    (body.into_bytes(), TransportError::protocol(text))
}

/// Validate an upgrade request and build the 101 response. On failure
/// the returned bytes are the reject response to write before closing.
pub fn server_accept(
    request: &[u8],
    opts: &ServerOptions,
) -> Result<ServerHandshake, (Vec<u8>, TransportError)> {
    if request.len() > opts.max_request_size {
        return Err(reject("413 Request Entity Too Large", "", "handshake too large"));
    }
    let msg = match parse_http(request) {
        Ok(m) => m,
        Err(e) => return Err(reject("400 Bad Request", "", &e.text.clone())),
    };
    if msg.start1 != "GET" || !msg.start3.starts_with("HTTP/1.1") {
        return Err(reject("400 Bad Request", "", "not a GET HTTP/1.1 request"));
    }
    if !msg
        .header("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
    {
        return Err(reject("400 Bad Request", "", "missing Upgrade: websocket"));
    }
    if !msg.header_has_token("connection", "upgrade") {
        return Err(reject("400 Bad Request", "", "Connection does not include upgrade"));
    }
    if msg.header_count("sec-websocket-key") != 1 {
        return Err(reject("400 Bad Request", "", "missing or duplicate Sec-WebSocket-Key"));
    }
    let key = msg.header("sec-websocket-key").unwrap_or_default().to_string();
    match BASE64.decode(&key) {
        Ok(nonce) if nonce.len() == 16 => {}
        _ => return Err(reject("400 Bad Request", "", "Sec-WebSocket-Key is not a 16-byte nonce")),
    }
    let version_ok = msg
        .header("sec-websocket-version")
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|v| v >= opts.min_version)
        .unwrap_or(false);
    if !version_ok {
        let vers = format!("Sec-WebSocket-Version: {WS_VERSION}\r\n");
        return Err(reject("400 Bad Request", &vers, "unsupported websocket version"));
    }

    // sub-protocol: walk the server preference list, accept the first
    // name the client offered
    let offered = msg.header_tokens("sec-websocket-protocol");
    let accept_legacy = !opts.reject_deprecated_names;
    let mut protocol = None;
    'pref: for want in &opts.protocols {
        for tok in &offered {
            if SubProtocol::from_token(tok, accept_legacy) == Some(*want) {
                protocol = Some(*want);
                break 'pref;
            }
        }
    }
    let Some(protocol) = protocol else {
        return Err(reject("400 Bad Request", "", "no acceptable sub-protocol"));
    };

    let deflate = if opts.enable_deflate {
        negotiate_deflate(&msg, opts.server_no_context_takeover)
    } else {
        None
    };

    let mut response = String::with_capacity(256);
    response.push_str("HTTP/1.1 101 Switching Protocols\r\n");
    response.push_str("Upgrade: websocket\r\n");
    response.push_str("Connection: Upgrade\r\n");
    response.push_str(&format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(&key)));
    response.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocol.name()));
    if let Some(params) = &deflate {
        response.push_str(&format!(
            "Sec-WebSocket-Extensions: {}\r\n",
            deflate_response_value(params)
        ));
    }
    response.push_str("\r\n");

    let cookies = msg
        .header_tokens("cookie")
        .iter()
        .flat_map(|t| t.split(';'))
        .filter_map(|c| {
            let c = c.trim();
            let eq = c.find('=')?;
            Some((c[..eq].to_string(), c[eq + 1..].to_string()))
        })
        .collect();

    Ok(ServerHandshake {
        protocol,
        deflate,
        response: response.into_bytes(),
        path: url_decode(&msg.start2),
        host: msg.header("host").unwrap_or_default().to_string(),
        origin: msg.header("origin").unwrap_or_default().to_string(),
        user_agent: msg.header("user-agent").unwrap_or_default().to_string(),
        cookies,
    })
}

// ============================================================
// Client side
// ============================================================

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub path: String,
    pub host: String,
    pub origin: String,
    pub user_agent: String,
    /// Offered sub-protocols, most preferred first.
    pub protocols: Vec<SubProtocol>,
    /// Offer the deprecated names instead of the current ones.
    pub use_legacy_names: bool,
    pub enable_deflate: bool,
    pub cookies: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            path: DEFAULT_WS_PATH.to_string(),
            host: String::new(),
            origin: String::new(),
            user_agent: String::new(),
            protocols: vec![SubProtocol::Rwf],
            use_legacy_names: false,
            enable_deflate: true,
            cookies: Vec::new(),
        }
    }
}

/// An in-flight client handshake: the request to send and the accept
/// key the 101 response must echo.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    pub request: Vec<u8>,
    pub key_nonce: String,
    pub expected_accept: String,
}

pub fn client_request(opts: &ClientOptions) -> ClientHandshake {
    let key_nonce = generate_key_nonce();
    let expected_accept = compute_accept_key(&key_nonce);

    let mut req = String::with_capacity(512);
    req.push_str(&format!("GET {} HTTP/1.1\r\n", opts.path));
    if !opts.host.is_empty() {
        req.push_str(&format!("Host: {}\r\n", opts.host));
    }
    req.push_str("Upgrade: websocket\r\n");
    req.push_str("Connection: Upgrade\r\n");
    req.push_str(&format!("Sec-WebSocket-Key: {key_nonce}\r\n"));
    req.push_str(&format!("Sec-WebSocket-Version: {WS_VERSION}\r\n"));
    let names: Vec<&str> = opts
        .protocols
        .iter()
        .map(|p| if opts.use_legacy_names { p.legacy_name() } else { p.name() })
        .collect();
    if !names.is_empty() {
        req.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", names.join(", ")));
    }
    if opts.enable_deflate {
        req.push_str(&format!("Sec-WebSocket-Extensions: {EXT_PERMESSAGE_DEFLATE}\r\n"));
    }
    if !opts.origin.is_empty() {
        req.push_str(&format!("Origin: {}\r\n", opts.origin));
    }
    if !opts.user_agent.is_empty() {
        req.push_str(&format!("User-Agent: {}\r\n", opts.user_agent));
    }
    if !opts.cookies.is_empty() {
        let jar: Vec<String> = opts.cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
        req.push_str(&format!("Cookie: {}\r\n", jar.join("; ")));
    }
    req.push_str("\r\n");

    ClientHandshake { request: req.into_bytes(), key_nonce, expected_accept }
}

/// Validate the server's 101 response; a wrong accept key terminates
/// the connect.
pub fn client_finish(
    response: &[u8],
    hs: &ClientHandshake,
    opts: &ClientOptions,
) -> TransportResult<(SubProtocol, Option<DeflateParams>)> {
    let msg = parse_http(response)?;
    if !msg.start1.starts_with("HTTP/1.1") || msg.start2 != "101" {
        return Err(TransportError::new(
            ErrorKind::ConnectionError,
            format!("server refused upgrade: {} {}", msg.start2, msg.start3),
        ));
    }
    match msg.header("sec-websocket-accept") {
        Some(got) if got == hs.expected_accept => {}
        _ => {
            return Err(TransportError::new(
                ErrorKind::ConnectionError,
                "Sec-WebSocket-Accept mismatch",
            ))
        }
    }
    let protocol = msg
        .header("sec-websocket-protocol")
        .and_then(|v| SubProtocol::from_token(v.trim(), true))
        .filter(|p| opts.protocols.contains(p))
        .ok_or_else(|| {
            TransportError::new(ErrorKind::ConnectionError, "server chose no offered sub-protocol")
        })?;

    let mut deflate = None;
    if opts.enable_deflate {
        for tok in msg.header_tokens("sec-websocket-extensions") {
            let mut parts = tok.split(';').map(str::trim);
            if parts
                .next()
                .map(|e| e.eq_ignore_ascii_case(EXT_PERMESSAGE_DEFLATE))
                .unwrap_or(false)
            {
                let mut params = DeflateParams::default();
                for p in parts {
                    if p.eq_ignore_ascii_case(EXT_SERVER_NO_CONTEXT) {
                        params.server_no_context_takeover = true;
                    } else if p.eq_ignore_ascii_case(EXT_CLIENT_NO_CONTEXT) {
                        params.client_no_context_takeover = true;
                    }
                }
                deflate = Some(params);
            }
        }
    }
    Ok((protocol, deflate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(protocols: &str, extras: &str) -> Vec<u8> {
        format!(
            "GET /WebSocket HTTP/1.1\r\n\
             Host: md.example.net\r\n\
             Upgrade: websocket\r\n\
             Connection: keep-alive, Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Protocol: {protocols}\r\n\
             {extras}\r\n",
        )
        .into_bytes()
    }

    #[test]
    fn test_accept_key_reference_vector() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_server_preference_wins() {
        let opts = ServerOptions::default(); // rssl.rwf preferred
        let req = sample_request("rssl.json.v2, rssl.rwf", "");
        let hs = server_accept(&req, &opts).unwrap();
        assert_eq!(hs.protocol, SubProtocol::Rwf);
        let text = String::from_utf8(hs.response).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: rssl.rwf\r\n"));
    }

    #[test]
    fn test_legacy_names_toggle() {
        let mut opts = ServerOptions::default();
        let req = sample_request("tr_json2", "");
        let hs = server_accept(&req, &opts).unwrap();
        assert_eq!(hs.protocol, SubProtocol::Json2);

        opts.reject_deprecated_names = true;
        let (response, err) = server_accept(&req, &opts).unwrap_err();
        assert!(String::from_utf8(response).unwrap().starts_with("HTTP/1.1 400"));
        assert_eq!(err.kind, ErrorKind::ProtocolError);
    }

    #[test]
    fn test_deflate_negotiation() {
        let opts = ServerOptions::default();
        let req = sample_request(
            "rssl.rwf",
            "Sec-WebSocket-Extensions: permessage-deflate;client_no_context_takeover\r\n",
        );
        let hs = server_accept(&req, &opts).unwrap();
        let params = hs.deflate.unwrap();
        assert!(params.client_no_context_takeover);
        assert!(!params.server_no_context_takeover);
        let text = String::from_utf8(hs.response).unwrap();
        assert!(text.contains("Sec-WebSocket-Extensions: permessage-deflate;client_no_context_takeover\r\n"));
    }

    #[test]
    fn test_unknown_extension_param_declines_offer() {
        let opts = ServerOptions::default();
        let req = sample_request(
            "rssl.rwf",
            "Sec-WebSocket-Extensions: permessage-deflate;client_max_window_bits=10\r\n",
        );
        let hs = server_accept(&req, &opts).unwrap();
        assert!(hs.deflate.is_none());
    }

    #[test]
    fn test_reject_paths() {
        let opts = ServerOptions::default();
        // no matching protocol
        let req = sample_request("chat", "");
        let (resp, _) = server_accept(&req, &opts).unwrap_err();
        assert!(String::from_utf8(resp).unwrap().starts_with("HTTP/1.1 400"));
        // bad version advertises the supported one
        let req = format!(
            "GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 8\r\nSec-WebSocket-Protocol: rssl.rwf\r\n\r\n"
        );
        let (resp, _) = server_accept(req.as_bytes(), &opts).unwrap_err();
        assert!(String::from_utf8(resp).unwrap().contains("Sec-WebSocket-Version: 13"));
        // duplicate key
        let req = sample_request("rssl.rwf", "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n");
        assert!(server_accept(&req, &opts).is_err());
        // oversized request
        let mut small = ServerOptions::default();
        small.max_request_size = 16;
        let req = sample_request("rssl.rwf", "");
        let (resp, _) = server_accept(&req, &small).unwrap_err();
        assert!(String::from_utf8(resp).unwrap().starts_with("HTTP/1.1 413"));
    }

    #[test]
    fn test_request_metadata_captured() {
        let opts = ServerOptions::default();
        let req = sample_request(
            "rssl.rwf",
            "Origin: https://console.example.net\r\nUser-Agent: mdclient/2.1\r\n\
             Cookie: session=abc123; region=eu\r\n",
        );
        let hs = server_accept(&req, &opts).unwrap();
        assert_eq!(hs.path, "/WebSocket");
        assert_eq!(hs.host, "md.example.net");
        assert_eq!(hs.origin, "https://console.example.net");
        assert_eq!(hs.user_agent, "mdclient/2.1");
        assert_eq!(
            hs.cookies,
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("region".to_string(), "eu".to_string())
            ]
        );
    }

    #[test]
    fn test_url_decoding() {
        assert_eq!(url_decode("/WebSocket%2Ffeed%20x"), "/WebSocket/feed x");
        assert_eq!(url_decode("/plain"), "/plain");
    }

    #[test]
    fn test_client_round_trip() {
        let copts = ClientOptions {
            host: "md.example.net".to_string(),
            protocols: vec![SubProtocol::Json2, SubProtocol::Rwf],
            ..ClientOptions::default()
        };
        let hs = client_request(&copts);
        let sopts = ServerOptions::default();
        let server = server_accept(&hs.request, &sopts).unwrap();
        // server preference picked rwf even though the client listed
        // json2 first
        assert_eq!(server.protocol, SubProtocol::Rwf);
        let (proto, deflate) = client_finish(&server.response, &hs, &copts).unwrap();
        assert_eq!(proto, SubProtocol::Rwf);
        assert!(deflate.is_some());
    }

    #[test]
    fn test_client_rejects_bad_accept_key() {
        let copts = ClientOptions::default();
        let hs = client_request(&copts);
        let response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
            Connection: Upgrade\r\nSec-WebSocket-Accept: bogus=\r\n\
            Sec-WebSocket-Protocol: rssl.rwf\r\n\r\n";
        let err = client_finish(response, &hs, &copts).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionError);
    }
}
