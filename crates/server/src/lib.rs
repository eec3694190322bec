//! A minimal embeddable HTTP server with bounded request admission.
//!
//! This crate binds a socket, accepts connections, limits how many requests
//! are handled concurrently, dispatches each request to a caller-registered
//! handler keyed by path, and writes the handler's output back to the
//! client. It is deliberately small: no TLS, no HTTP/2, no request body
//! parsing, no middleware, no path parameters.
//!
//! # Features
//!
//! - Asynchronous I/O using tokio
//! - Bounded concurrency: a counting gate admits at most a configured
//!   number of in-flight requests; beyond that the accept loop stalls and
//!   backpressure moves into the OS accept backlog
//! - Exact, method-agnostic path routing with slash and query-string
//!   normalization
//! - One response-writing contract for text, byte-stream and file payloads
//!   with an always-exact content length
//! - Contained failures: a handler error or a mid-copy write failure is
//!   expressed as a status code on that one response and never disturbs
//!   the accept loop or other in-flight requests
//!
//! # Example
//!
//! ```no_run
//! use quickserve::{BoxError, RequestContext, Routes, Server, handler_fn};
//!
//! async fn status(ctx: &mut RequestContext) -> Result<(), BoxError> {
//!     ctx.respond(r#"{"ok":true}"#).await;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let routes = Routes::builder().route("status", handler_fn(status)).build();
//!
//!     let mut server = Server::builder()
//!         .port(8080)
//!         .routes(routes)
//!         .max_in_flight(64)
//!         .build()
//!         .unwrap();
//!
//!     let url = server.start().await.unwrap();
//!     println!("serving on {url}");
//!
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.stop();
//! }
//! ```
//!
//! # Architecture
//!
//! - [`route`][Routes]: immutable-after-start route table and path
//!   normalization
//! - [`Handler`]: the capability invoked per matched request, with
//!   [`handler_fn`] adapting plain async functions
//! - [`RequestContext`]: per-connection request data and response builder,
//!   exclusively owned by the task handling that connection
//! - [`Server`]: listener lifecycle (bind, accept loop, stop) and the
//!   per-connection dispatcher
//!
//! One long-lived task runs the accept loop; each accepted connection is
//! handled on its own spawned task holding an admission permit that is
//! released when the task ends, whatever the outcome. Stopping the server
//! cancels the accept loop at its next await point and closes the listening
//! socket; in-flight requests are not awaited.

mod codec;
mod context;
mod error;
mod gate;
mod handler;
mod response;
mod route;
mod server;

pub use context::RequestContext;
pub use error::{BoxError, ParseError, ServerError};
pub use handler::{Handler, HandlerFn, HandlerFunc, handler_fn};
pub use response::Payload;
pub use route::{Routes, RoutesBuilder};
pub use server::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_PORT, Server, ServerBuilder};
