//! Per-connection request/response state handed to handlers.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::codec::{self, RequestHead};
use crate::response::{self, Payload};

/// Type-erased write half of an accepted connection.
pub(crate) type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// State of one in-flight request, exclusively owned by the connection
/// task handling it.
///
/// The incoming side exposes the decoded request line and headers; the raw
/// target keeps its query string, routing works on a normalized copy. The
/// outgoing side accumulates a status code, an optional reason phrase and
/// headers until the head goes out with the first payload byte, or when
/// the dispatcher completes a bodyless response.
pub struct RequestContext {
    head: RequestHead,
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    output: BufWriter<OutputStream>,
    head_sent: bool,
}

impl RequestContext {
    pub(crate) fn new(head: RequestHead, output: OutputStream) -> Self {
        Self {
            head,
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            output: BufWriter::new(output),
            head_sent: false,
        }
    }

    /// HTTP method of the request.
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Raw request target exactly as received, query string included.
    pub fn target(&self) -> &str {
        &self.head.target
    }

    /// HTTP version of the request.
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Headers of the request.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Status code currently recorded for the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Reason phrase sent on the status line instead of the canonical text.
    pub fn set_status_text(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Sets a response header, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Writes `body` as the response payload with content type
    /// `application/json`.
    ///
    /// Success or failure is recorded in the response status; see
    /// [`respond_with`](Self::respond_with).
    pub async fn respond(&mut self, body: impl Into<Bytes> + Send) {
        let content_type = mime::APPLICATION_JSON.as_ref().parse().unwrap();
        response::write(self, Payload::full(body.into()), content_type).await;
    }

    /// Writes `body` as the response payload with an explicit content type.
    ///
    /// The response head goes out with the current status, the exact
    /// content length and the accumulated headers, then the payload is
    /// copied in fixed-size chunks. A failure anywhere records status 500
    /// instead of propagating; success records 200. The output is flushed
    /// either way.
    pub async fn respond_with(&mut self, body: impl Into<Bytes> + Send, content_type: HeaderValue) {
        response::write(self, Payload::full(body.into()), content_type).await;
    }

    /// Writes a byte-stream payload whose total length is known up front.
    pub async fn respond_reader(
        &mut self,
        reader: impl AsyncRead + Send + Sync + Unpin + 'static,
        len: u64,
        content_type: HeaderValue,
    ) {
        response::write(self, Payload::reader(reader, len), content_type).await;
    }

    /// Writes a file-backed payload; the content length is the file size
    /// read from metadata before the first byte goes out.
    pub async fn respond_file(&mut self, file: File, content_type: HeaderValue) {
        response::write(self, Payload::file(file), content_type).await;
    }

    /// Encodes and sends the response head with the given content length.
    pub(crate) async fn send_head(&mut self, content_length: u64) -> io::Result<()> {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));

        let mut dst = BytesMut::new();
        codec::encode_head(&mut dst, self.status, self.reason.as_deref(), &self.headers);

        self.head_sent = true;
        self.output.write_all(&dst).await
    }

    pub(crate) async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.output.write_all(chunk).await
    }

    pub(crate) async fn flush_output(&mut self) -> io::Result<()> {
        self.output.flush().await
    }

    /// Completes the response: emits a bodyless head if none was sent yet,
    /// then flushes and shuts the output stream down.
    pub(crate) async fn finish(&mut self) -> io::Result<()> {
        if !self.head_sent {
            self.send_head(0).await?;
        }
        self.output.flush().await?;
        self.output.shutdown().await
    }
}
