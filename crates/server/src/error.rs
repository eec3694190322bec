use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Boxed error type returned by request handlers.
///
/// A handler error never escapes the connection that produced it: the
/// dispatcher turns it into a 500 response whose reason phrase is the
/// error's display text.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by server construction and startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("route table must be set")]
    MissingRoutes,

    #[error("server has already been started")]
    AlreadyRunning,

    #[error("bind {addr} error: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("can't read bound address: {source}")]
    LocalAddr {
        #[from]
        source: io::Error,
    },
}

impl ServerError {
    pub(crate) fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}

/// Errors produced while decoding a request head.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("invalid request head: {reason}")]
    InvalidHead { reason: String },

    #[error("connection closed before a full request head arrived")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub(crate) fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub(crate) fn invalid_head<S: ToString>(reason: S) -> Self {
        Self::InvalidHead { reason: reason.to_string() }
    }
}

/// Per-connection error, contained at the dispatcher boundary.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
