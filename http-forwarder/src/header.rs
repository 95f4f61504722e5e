// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Header blocks
//!
//! Locating, reading and parsing the head of an HTTP/1.x message: the
//! request (or status) line plus header fields, terminated by a blank
//! line. Only as much of HTTP is understood as is needed to classify a
//! request and add one header field to it.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

const TERMINATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";
const READ_CHUNK: usize = 4096;

/// Which side of the exchange a header block is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadKind {
    Request,
    Response,
}

impl HeadKind {
    fn malformed(self) -> Error {
        match self {
            HeadKind::Request => Error::MalformedRequest,
            HeadKind::Response => Error::MalformedResponse,
        }
    }
}

/// Returns the offset of the blank line ending a header block.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

/// Reads from `reader` until a complete header block is buffered.
///
/// Returns the head (terminator included) and whatever was read past
/// it. Fails with the kind's malformed error once `limit` bytes are
/// buffered without a terminator, `PeerClosed` on EOF and
/// `IdleTimeout` when a single read stalls for `read_timeout`.
pub async fn read_header_block<R>(
    reader: &mut R,
    kind: HeadKind,
    limit: usize,
    read_timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(end) = find_terminator(&buf) {
            let rest = buf.split_off(end + TERMINATOR.len());
            return Ok((buf, rest));
        }
        if buf.len() >= limit {
            return Err(kind.malformed());
        }
        let want = (limit - buf.len()).min(READ_CHUNK);
        let n = match timeout(read_timeout, reader.read(&mut chunk[..want])).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::IdleTimeout),
        };
        if n == 0 {
            return Err(Error::PeerClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Room for every field a head could hold: one per line feed.
fn header_slots<'h>(head: &[u8]) -> Vec<httparse::Header<'h>> {
    vec![httparse::EMPTY_HEADER; head.iter().filter(|b| **b == b'\n').count()]
}

/// The first line of a head, skipping the empty lines httparse ignores.
fn first_line(head: &[u8]) -> &[u8] {
    let start = head.iter().position(|b| *b != b'\r' && *b != b'\n').unwrap_or(head.len());
    let line = &head[start..];
    let line = match line.iter().position(|b| *b == b'\n') {
        Some(end) => &line[..end],
        None => line,
    };
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// One header field. The value is kept as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: Vec<u8>,
}

/// A parsed request head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderBlock {
    method: String,
    request_line: Vec<u8>,
    fields: Vec<HeaderField>,
}

impl HeaderBlock {
    /// Parses a complete request head, terminator included.
    pub fn parse(head: &[u8]) -> Result<HeaderBlock> {
        let mut headers = header_slots(head);
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            _ => return Err(Error::MalformedRequest),
        }
        let method = req.method.ok_or(Error::MalformedRequest)?.to_string();
        let fields = req
            .headers
            .iter()
            .map(|h| HeaderField { name: h.name.to_string(), value: h.value.to_vec() })
            .collect();
        Ok(HeaderBlock { method, request_line: first_line(head).to_vec(), fields })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn request_line(&self) -> &[u8] {
        &self.request_line
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    /// Whether this request asks for a tunnel.
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// Case-insensitive lookup of the first field named `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)).map(|f| f.value.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Inserts a field as the first one after the request line.
    pub fn insert_after_request_line(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.fields.insert(0, HeaderField { name: name.into(), value: value.into() });
    }

    /// The declared `Content-Length`, if present and well formed.
    pub fn content_length(&self) -> Option<u64> {
        std::str::from_utf8(self.get("Content-Length")?).ok()?.trim().parse().ok()
    }

    /// Serializes the block back into wire form, terminator included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.request_line.len() + 64 * (self.fields.len() + 1));
        out.extend_from_slice(&self.request_line);
        out.extend_from_slice(CRLF);
        for field in &self.fields {
            out.extend_from_slice(field.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&field.value);
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);
        out
    }
}

/// Parses a response head, returning the status code and status line.
pub fn parse_status(head: &[u8]) -> Result<(u16, String)> {
    let mut headers = header_slots(head);
    let mut resp = httparse::Response::new(&mut headers);
    match resp.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(Error::MalformedResponse),
    }
    let code = resp.code.ok_or(Error::MalformedResponse)?;
    Ok((code, String::from_utf8_lossy(first_line(head)).into_owned()))
}
