//! Response payload writing: one copy/flush path shared by text, reader
//! and file payloads.

use std::io;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::context::RequestContext;

/// Copy chunk size for payload bytes.
const CHUNK_SIZE: usize = 16 * 1024;

/// A response payload whose total byte length is known before the first
/// byte is written.
///
/// Unknown-length streaming is deliberately unsupported: the content-length
/// header is always exact, never chunked.
pub enum Payload {
    /// In-memory payload.
    Full(Bytes),
    /// Byte stream with a caller-supplied total length.
    Reader { reader: Box<dyn AsyncRead + Send + Sync + Unpin>, len: u64 },
    /// File-backed payload; the length comes from file metadata.
    File(File),
}

impl Payload {
    pub fn full(bytes: Bytes) -> Self {
        Payload::Full(bytes)
    }

    pub fn reader(reader: impl AsyncRead + Send + Sync + Unpin + 'static, len: u64) -> Self {
        Payload::Reader { reader: Box::new(reader), len }
    }

    pub fn file(file: File) -> Self {
        Payload::File(file)
    }

    /// Total byte length, resolved before any byte is written.
    async fn length(&self) -> io::Result<u64> {
        match self {
            Payload::Full(bytes) => Ok(bytes.len() as u64),
            Payload::Reader { len, .. } => Ok(*len),
            Payload::File(file) => Ok(file.metadata().await?.len()),
        }
    }

    fn into_reader(self) -> Box<dyn AsyncRead + Send + Sync + Unpin> {
        match self {
            Payload::Full(bytes) => Box::new(io::Cursor::new(bytes)),
            Payload::Reader { reader, .. } => reader,
            Payload::File(file) => Box::new(file),
        }
    }
}

/// Writes `payload` as the response body with `content_type`.
///
/// The head goes out with the context's current status, the content type
/// and an exact content length; the payload is then copied in fixed-size
/// chunks. The payload source is dropped once the copy ends, successfully
/// or not, and the output is flushed unconditionally as the final step. A
/// failure anywhere turns the recorded status into 500 and is not
/// propagated to the caller; success records 200.
pub(crate) async fn write(ctx: &mut RequestContext, payload: Payload, content_type: HeaderValue) {
    let copy_result = try_write(ctx, payload, content_type).await;

    // flush is unconditional; only the recorded status differs
    let flush_result = ctx.flush_output().await;

    if copy_result.is_ok() && flush_result.is_ok() {
        ctx.set_status(StatusCode::OK);
    } else {
        ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

async fn try_write(ctx: &mut RequestContext, payload: Payload, content_type: HeaderValue) -> io::Result<()> {
    let length = payload.length().await?;

    ctx.insert_header(CONTENT_TYPE, content_type);
    ctx.send_head(length).await?;

    copy_chunks(payload.into_reader(), ctx).await
}

async fn copy_chunks(mut reader: Box<dyn AsyncRead + Send + Sync + Unpin>, ctx: &mut RequestContext) -> io::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        ctx.write_chunk(&buf[..read]).await?;
    }
}
