//! Listener lifecycle, bounded accept loop and per-connection dispatch.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, SERVER};
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec;
use crate::context::RequestContext;
use crate::error::{ConnectionError, ServerError};
use crate::gate::{AdmissionGate, GatePermit};
use crate::route::{self, Routes};

/// Fixed server identification header value.
const SERVER_ID: &str = concat!("quickserve/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_PORT: u16 = 1999;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 20;

/// Configures and creates a [`Server`].
pub struct ServerBuilder {
    address: IpAddr,
    port: u16,
    routes: Option<Routes>,
    max_in_flight: usize,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            routes: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Address to bind, 127.0.0.1 by default.
    pub fn address(mut self, address: impl Into<IpAddr>) -> Self {
        self.address = address.into();
        self
    }

    /// Port to bind, 1999 by default; 0 picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Route table the server dispatches against; required.
    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Upper bound on concurrently handled requests, 20 by default.
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let routes = self.routes.ok_or(ServerError::MissingRoutes)?;

        Ok(Server {
            address: SocketAddr::new(self.address, self.port),
            shared: Arc::new(Shared {
                routes,
                gate: AdmissionGate::new(self.max_in_flight),
                shutdown: CancellationToken::new(),
                max_in_flight: self.max_in_flight,
            }),
            accept_task: None,
        })
    }
}

/// State shared between the accept loop and its dispatched connection
/// tasks. The route table is read-only once serving starts; the gate is
/// the only shared mutable resource.
struct Shared {
    routes: Routes,
    gate: AdmissionGate,
    shutdown: CancellationToken,
    max_in_flight: usize,
}

/// An embeddable HTTP server: bind, serve, stop.
pub struct Server {
    address: SocketAddr,
    shared: Arc<Shared>,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listener, spawns the accept loop and returns the base URL
    /// of the running server, `http://{address}:{port}/`.
    ///
    /// Bind failures are logged and returned.
    pub async fn start(&mut self) -> Result<String, ServerError> {
        if self.accept_task.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = match TcpListener::bind(self.address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %self.address, cause = %e, "bind server error");
                return Err(ServerError::bind(self.address, e));
            }
        };

        // an ephemeral port (0) resolves at bind time, report the real one
        let bound = listener.local_addr()?;
        self.address = bound;
        info!(addr = %bound, max_in_flight = self.shared.max_in_flight, "server running");

        let shared = Arc::clone(&self.shared);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, shared)));

        Ok(format!("http://{}:{}/", bound.ip(), bound.port()))
    }

    /// Address the server is configured for; after a successful
    /// [`start`](Self::start) this is the actually bound address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting connections.
    ///
    /// The accept loop observes the cancellation at its next await point
    /// and drops the listening socket. In-flight requests are neither
    /// awaited nor cancelled; they run to completion on their own tasks.
    pub fn stop(&mut self) {
        self.shared.shutdown.cancel();
        drop(self.accept_task.take());
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        // admission first: at capacity the loop stalls here and
        // backpressure moves into the OS accept backlog
        let permit = select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            permit = shared.gate.acquire() => permit,
        };

        let accepted = select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote_addr)) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(dispatch(stream, remote_addr, shared, permit));
            }
            Err(e) => {
                // the permit drops at the end of this iteration, reopening
                // the slot this accept consumed
                warn!(cause = %e, "failed to accept");
            }
        }
    }
    info!("accept loop stopped");
}

/// Runs one connection to completion and releases its admission slot.
async fn dispatch(stream: TcpStream, remote_addr: SocketAddr, shared: Arc<Shared>, permit: GatePermit) {
    if let Err(e) = serve_connection(stream, &shared).await {
        error!(cause = %e, remote_addr = %remote_addr, "connection failed");
    }

    // dropping the permit is the release: exactly once per admitted
    // connection, whatever happened above
    drop(permit);
}

async fn serve_connection(stream: TcpStream, shared: &Shared) -> Result<(), ConnectionError> {
    let (mut read_half, write_half) = stream.into_split();

    let head = match codec::read_head(&mut read_half).await {
        Ok(head) => head,
        Err(e) => {
            reject_bad_request(write_half).await?;
            return Err(e.into());
        }
    };
    // request bodies are never read
    drop(read_half);

    let mut ctx = RequestContext::new(head, Box::new(write_half));
    ctx.insert_header(SERVER, HeaderValue::from_static(SERVER_ID));

    let handler = {
        let key = route::normalize(ctx.target());
        shared.routes.resolve(key)
    };

    match handler {
        Some(handler) => {
            if let Err(e) = handler.call(&mut ctx).await {
                ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                ctx.set_status_text(e.to_string());
            }
        }
        None => {
            ctx.set_status(StatusCode::NOT_FOUND);
            ctx.set_status_text("Endpoint not found");
        }
    }

    ctx.finish().await?;
    Ok(())
}

async fn reject_bad_request(mut write_half: OwnedWriteHalf) -> Result<(), ConnectionError> {
    let mut headers = HeaderMap::new();
    headers.insert(SERVER, HeaderValue::from_static(SERVER_ID));
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

    let mut head = BytesMut::new();
    codec::encode_head(&mut head, StatusCode::BAD_REQUEST, None, &headers);

    write_half.write_all(&head).await?;
    write_half.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::handler::{Handler, handler_fn};
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn greet(ctx: &mut RequestContext) -> Result<(), BoxError> {
        ctx.respond("hi").await;
        Ok(())
    }

    async fn failing(_ctx: &mut RequestContext) -> Result<(), BoxError> {
        Err("boom".into())
    }

    async fn start_on_ephemeral_port(routes: Routes, max_in_flight: usize) -> (Server, String) {
        let mut server = Server::builder()
            .port(0)
            .routes(routes)
            .max_in_flight(max_in_flight)
            .build()
            .unwrap();
        let url = server.start().await.unwrap();
        (server, url)
    }

    async fn send_request(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: test\r\n\r\n").as_bytes())
            .await
            .unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[test]
    fn build_without_routes_is_an_error() {
        let result = Server::builder().build();
        assert!(matches!(result, Err(ServerError::MissingRoutes)));
    }

    #[test]
    fn builder_defaults_match_the_contract() {
        let server = Server::builder().routes(Routes::builder().build()).build().unwrap();
        assert_eq!(server.address(), SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)));
    }

    #[tokio::test]
    async fn base_url_reflects_the_bound_address() {
        let routes = Routes::builder().route("greet", handler_fn(greet)).build();
        let (mut server, url) = start_on_ephemeral_port(routes, 20).await;

        let addr = server.address();
        assert_ne!(addr.port(), 0);
        assert_eq!(url, format!("http://{}:{}/", addr.ip(), addr.port()));

        server.stop();
    }

    #[tokio::test]
    async fn starting_twice_is_an_error() {
        let routes = Routes::builder().route("greet", handler_fn(greet)).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));
        server.stop();
    }

    #[tokio::test]
    async fn normalized_path_variants_reach_the_same_handler() {
        let routes = Routes::builder().route("greet", handler_fn(greet)).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;
        let addr = server.address();

        for target in ["/greet", "/greet/", "greet", "/greet?x=1"] {
            let response = send_request(addr, target).await;
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "target {target}: {response}");
            assert!(response.ends_with("hi"), "target {target}: {response}");
        }

        server.stop();
    }

    #[tokio::test]
    async fn response_carries_the_server_header() {
        let routes = Routes::builder().route("greet", handler_fn(greet)).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;

        let response = send_request(server.address(), "/greet").await;
        assert!(response.contains(&format!("server: {SERVER_ID}\r\n")));

        server.stop();
    }

    /// Flags whether any request ever reached it.
    struct Tracking {
        invoked: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handler for Tracking {
        async fn call(&self, ctx: &mut RequestContext) -> Result<(), BoxError> {
            self.invoked.store(true, Ordering::SeqCst);
            ctx.respond("tracked").await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_path_yields_404_without_invoking_any_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let routes = Routes::builder()
            .route("known", Tracking { invoked: Arc::clone(&invoked) })
            .build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;

        let response = send_request(server.address(), "/missing").await;
        assert!(response.starts_with("HTTP/1.1 404 Endpoint not found\r\n"), "{response}");
        assert!(!invoked.load(Ordering::SeqCst));

        server.stop();
    }

    #[tokio::test]
    async fn handler_error_becomes_500_and_serving_continues() {
        let routes = Routes::builder()
            .route("fail", handler_fn(failing))
            .route("greet", handler_fn(greet))
            .build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;
        let addr = server.address();

        let response = send_request(addr, "/fail").await;
        assert!(response.starts_with("HTTP/1.1 500 boom\r\n"), "{response}");

        let response = send_request(addr, "/greet").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");

        server.stop();
    }

    #[tokio::test]
    async fn malformed_request_head_is_rejected_with_400() {
        let routes = Routes::builder().route("greet", handler_fn(greet)).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;

        let mut stream = TcpStream::connect(server.address()).await.unwrap();
        stream.write_all(b"\x01\x02 garbage\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let response = String::from_utf8(raw).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");

        server.stop();
    }

    /// Tracks how many requests run inside the handler at once.
    struct Concurrency {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Concurrency {
        async fn call(&self, ctx: &mut RequestContext) -> Result<(), BoxError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(250)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            ctx.respond("done").await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn at_most_max_in_flight_requests_run_concurrently() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let routes = Routes::builder()
            .route(
                "busy",
                Concurrency { active: Arc::clone(&active), peak: Arc::clone(&peak) },
            )
            .build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 2).await;
        let addr = server.address();

        let responses = join_all((0..3).map(|_| send_request(addr, "/busy"))).await;

        for response in &responses {
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);

        server.stop();
    }

    /// Records the handler-execution span of each request.
    struct Spans {
        spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
    }

    #[async_trait]
    impl Handler for Spans {
        async fn call(&self, ctx: &mut RequestContext) -> Result<(), BoxError> {
            let entered = Instant::now();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let exited = Instant::now();
            self.spans.lock().unwrap().push((entered, exited));
            ctx.respond("ok").await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn with_one_permit_admissions_never_overlap() {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let routes = Routes::builder().route("busy", Spans { spans: Arc::clone(&spans) }).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 1).await;
        let addr = server.address();

        let _ = tokio::join!(send_request(addr, "/busy"), send_request(addr, "/busy"));

        let mut recorded = spans.lock().unwrap().clone();
        recorded.sort_by_key(|(entered, _)| *entered);
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].1 <= recorded[1].0, "second request admitted before the first released");

        server.stop();
    }

    async fn slow(ctx: &mut RequestContext) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        ctx.respond("late").await;
        Ok(())
    }

    #[tokio::test]
    async fn stop_halts_accepting_while_in_flight_requests_complete() {
        let routes = Routes::builder().route("slow", handler_fn(slow)).build();
        let (mut server, _url) = start_on_ephemeral_port(routes, 20).await;
        let addr = server.address();

        let in_flight = tokio::spawn(async move { send_request(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // the listener socket is gone, new connections are refused
        assert!(TcpStream::connect(addr).await.is_err());

        // but the admitted request still ran to completion
        let response = in_flight.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("late"), "{response}");
    }
}
