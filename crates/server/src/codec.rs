//! Request-head decoding and response-head encoding.
//!
//! Only the head of a request is ever decoded: routing needs the request
//! line and handlers get the raw target, while request bodies stay on the
//! socket untouched. The response side writes a status line, the
//! accumulated headers and the terminating blank line; payload bytes are
//! copied separately by the response writer.

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ParseError;

/// Maximum accepted size of a request head.
pub(crate) const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Maximum number of request headers.
const MAX_HEADERS: usize = 64;

/// Decoded request line plus headers.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
}

/// Reads from `reader` until a complete request head is buffered, then
/// parses it.
pub(crate) async fn read_head<R>(reader: &mut R) -> Result<RequestHead, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_HEAD_SIZE);
    loop {
        if let Some(head) = parse_head(&buf)? {
            return Ok(head);
        }

        if buf.len() >= MAX_HEAD_SIZE {
            return Err(ParseError::too_large_header(buf.len(), MAX_HEAD_SIZE));
        }

        let read = reader.read_buf(&mut buf).await?;
        if read == 0 {
            return Err(ParseError::UnexpectedEof);
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);

    match parsed.parse(buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ParseError::invalid_head(e)),
    }

    let method = parsed
        .method
        .ok_or_else(|| ParseError::invalid_head("missing method"))?
        .parse::<Method>()
        .map_err(ParseError::invalid_head)?;

    let target = parsed
        .path
        .ok_or_else(|| ParseError::invalid_head("missing request target"))?
        .to_string();

    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => return Err(ParseError::invalid_head(format!("unsupported http version: {other:?}"))),
    };

    let mut header_map = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_head)?;
        let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_head)?;
        header_map.append(name, value);
    }

    Ok(Some(RequestHead { method, target, version, headers: header_map }))
}

/// Writes `HTTP/1.1 {status} {reason}\r\n` plus `headers` and the blank
/// line into `dst`.
///
/// A custom reason phrase wins over the canonical one; CR and LF inside it
/// are replaced so a caller-supplied message can't split the head.
pub(crate) fn encode_head(dst: &mut BytesMut, status: StatusCode, reason: Option<&str>, headers: &HeaderMap) {
    let reason = match reason {
        Some(custom) => sanitize_reason(custom),
        None => Cow::Borrowed(status.canonical_reason().unwrap_or("Unknown")),
    };

    dst.reserve(64 + headers.len() * 32);
    dst.put_slice(b"HTTP/1.1 ");
    dst.put_slice(status.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(reason.as_bytes());
    dst.put_slice(b"\r\n");

    for (name, value) in headers {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

fn sanitize_reason(reason: &str) -> Cow<'_, str> {
    if reason.contains(['\r', '\n']) {
        Cow::Owned(reason.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(reason)
    }
}
