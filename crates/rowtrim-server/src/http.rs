// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing for the upload endpoint.
//
// One request is read per connection: the head up to the blank line, then
// exactly `Content-Length` body bytes. Clients that announce
// `Expect: 100-continue` get the interim response between the two.
// Responses always carry `Content-Length` and `Connection: close`. Chunked
// request bodies are not supported.

use rowtrim_core::error::{Result, RowtrimError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Size of each socket read while collecting the head.
const READ_CHUNK: usize = 8192;

/// Separator between head and body.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Interim response for clients that sent `Expect: 100-continue`.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A fully read HTTP request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// Request method as sent (e.g. `POST`).
    pub method: String,
    /// Decoded path without the query string.
    pub path: String,
    /// Decoded query pairs in order of appearance.
    pub query: Vec<(String, String)>,
    /// Header pairs; names are lower-cased.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First header with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First query parameter with the given name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Declared body length, if any.
    fn content_length(&self) -> Result<Option<usize>> {
        match self.header("content-length") {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                RowtrimError::MalformedRequest(format!("invalid Content-Length: {raw:?}"))
            }),
        }
    }
}

/// Parse the request line and headers. `head` excludes the blank line.
pub fn parse_head(head: &[u8]) -> Result<HttpRequest> {
    let text = std::str::from_utf8(head)
        .map_err(|_| RowtrimError::MalformedRequest("request head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| RowtrimError::MalformedRequest("missing request line".into()))?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RowtrimError::MalformedRequest(format!(
            "bad request line: {request_line:?}"
        )));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(RowtrimError::MalformedRequest(format!(
            "unsupported protocol version {version}"
        )));
    }

    let (raw_path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            RowtrimError::MalformedRequest(format!("bad header line: {line:?}"))
        })?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    Ok(HttpRequest {
        method: method.to_string(),
        path: percent_decode(raw_path),
        query: parse_query(raw_query),
        headers,
        body: Vec::new(),
    })
}

/// Split an `application/x-www-form-urlencoded` string into decoded pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (form_decode(key), form_decode(value)),
            None => (form_decode(pair), String::new()),
        })
        .collect()
}

/// Form decoding: `+` is a space, then percent escapes.
fn form_decode(raw: &str) -> String {
    percent_decode(&raw.replace('+', " "))
}

/// Decode `%XX` escapes. Invalid escapes are kept literally.
pub fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
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

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

/// Find the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A request whose head has been read but whose body has not.
///
/// The head stays available when body framing fails, so error responses can
/// still be built from its headers.
#[derive(Debug)]
pub struct PendingRequest {
    /// Parsed head; `body` is filled by [`read_body`](Self::read_body).
    pub request: HttpRequest,
    /// Bytes of the request line and headers, terminator included.
    head_len: usize,
    /// Body bytes that arrived together with the head.
    buffered: Vec<u8>,
}

impl PendingRequest {
    /// Validate body framing and return the declared body length.
    fn body_length(&self, max_bytes: usize) -> Result<usize> {
        if self.request.header("transfer-encoding").is_some() {
            return Err(RowtrimError::LengthRequired);
        }
        let content_length = self.request.content_length()?.unwrap_or(0);
        if self.head_len.saturating_add(content_length) > max_bytes {
            return Err(RowtrimError::PayloadTooLarge { limit: max_bytes });
        }
        Ok(content_length)
    }

    /// Whether the client holds its body back until it sees `100 Continue`.
    ///
    /// Framing errors are reported here, before the client uploads anything.
    pub fn awaits_continue(&self, max_bytes: usize) -> Result<bool> {
        let content_length = self.body_length(max_bytes)?;
        let expects = self
            .request
            .header("expect")
            .is_some_and(|value| value.eq_ignore_ascii_case("100-continue"));
        Ok(expects && self.buffered.len() < content_length)
    }

    /// Read exactly `Content-Length` body bytes into `self.request.body`.
    pub async fn read_body<R>(&mut self, reader: &mut R, max_bytes: usize) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let content_length = self.body_length(max_bytes)?;

        let mut body = std::mem::take(&mut self.buffered);
        body.truncate(content_length);
        if body.len() < content_length {
            let already = body.len();
            body.resize(content_length, 0);
            reader
                .read_exact(&mut body[already..])
                .await
                .map_err(|err| {
                    RowtrimError::MalformedRequest(format!(
                        "request body truncated after {already} of {content_length} bytes: {err}"
                    ))
                })?;
        }

        debug!(
            method = %self.request.method,
            path = %self.request.path,
            body_bytes = body.len(),
            "HTTP request read"
        );
        self.request.body = body;
        Ok(())
    }

    pub fn into_request(self) -> HttpRequest {
        self.request
    }
}

/// Read and parse one request head from `reader`.
///
/// Returns `Ok(None)` when the peer closes the connection before sending
/// anything.
pub async fn read_head<R>(reader: &mut R) -> Result<Option<PendingRequest>>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let head_end = loop {
        if let Some(pos) = find_subsequence(&buf, HEAD_TERMINATOR) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RowtrimError::MalformedRequest(format!(
                "request head exceeds {MAX_HEAD_BYTES} bytes"
            )));
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(RowtrimError::MalformedRequest(
                "connection closed inside request head".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let request = parse_head(&buf[..head_end])?;
    let head_len = head_end + HEAD_TERMINATOR.len();
    let buffered = buf.split_off(head_len);
    Ok(Some(PendingRequest {
        request,
        head_len,
        buffered,
    }))
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// An HTTP response ready to be written.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `200 OK` carrying PNG bytes.
    pub fn png(body: Vec<u8>) -> Self {
        Self::new(200)
            .with_header("Content-Type", "image/png")
            .with_body(body)
    }

    /// JSON error body of the form `{"detail": "..."}`.
    pub fn error(status: u16, detail: &str) -> Self {
        let body = serde_json::json!({ "detail": detail }).to_string();
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body.into_bytes())
    }

    /// Plain-text body.
    pub fn text(status: u16, text: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(text.as_bytes().to_vec())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialise status line, headers, and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Write the response and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(&self.to_bytes())
            .await
            .map_err(|e| RowtrimError::Server(format!("write response: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| RowtrimError::Server(format!("flush: {e}")))?;
        Ok(())
    }
}

/// Canonical reason phrase for the status codes this server emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
