// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded HTTP server hosting the blank-row upload endpoint.
//
// The server listens on a configurable TCP port (default 8000). Every
// accepted connection is served on its own Tokio task: one request is read,
// routed, answered, and the connection is closed. Image work runs on the
// blocking pool so slow uploads never stall the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use rowtrim_core::error::{Result, RowtrimError};
use rowtrim_core::{FilterParams, RequestId, ServerConfig, ServerStatus};

use crate::cors::CorsPolicy;
use crate::http::{CONTINUE_RESPONSE, HttpResponse, PendingRequest, read_head};
use crate::routes::{RouteContext, dispatch, error_response};

// ---------------------------------------------------------------------------
// Shared state passed to connection handlers
// ---------------------------------------------------------------------------

/// State shared across all connection-handling tasks.
struct SharedState {
    /// Routing context (default parameters, CORS policy).
    routes: RouteContext,
    /// Upper bound on a single request.
    max_request_bytes: usize,
    /// Counter of active connections.
    active_connections: Arc<AtomicU32>,
}

// ---------------------------------------------------------------------------
// RowtrimServer
// ---------------------------------------------------------------------------

/// HTTP server for the upload endpoint.
///
/// Created in `Stopped` state; [`start`](Self::start) binds and begins
/// accepting, [`stop`](Self::stop) shuts the accept loop down.
pub struct RowtrimServer {
    /// Network settings.
    config: ServerConfig,
    /// Filter parameters applied when a request gives none.
    defaults: FilterParams,
    /// Current lifecycle state of the server.
    status: ServerStatus,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
    /// Counter of currently active TCP connections.
    active_connections: Arc<AtomicU32>,
    /// Address actually bound (differs from the config when port is 0).
    local_addr: Option<SocketAddr>,
}

impl RowtrimServer {
    pub fn new(config: ServerConfig, defaults: FilterParams) -> Self {
        Self {
            config,
            defaults,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            local_addr: None,
        }
    }

    /// Configured port (0 means ephemeral).
    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of client connections currently being served.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already in use or the listener cannot
    /// be created.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let (ServerStatus::Running, Some(addr)) = (self.status, self.local_addr) {
            debug!(%addr, "server already running");
            return Ok(addr);
        }

        self.status = ServerStatus::Starting;

        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Stopped;
                return Err(RowtrimError::Server(format!("bind {bind_addr}: {e}")));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| RowtrimError::Server(format!("local address: {e}")))?;

        info!(
            addr = %local_addr,
            threshold = self.defaults.threshold,
            spacing = self.defaults.spacing,
            "rowtrim server listening"
        );

        let shared = Arc::new(SharedState {
            routes: RouteContext {
                defaults: self.defaults,
                cors: CorsPolicy::new(&self.config.allowed_origins),
            },
            max_request_bytes: self.config.max_request_bytes,
            active_connections: Arc::clone(&self.active_connections),
        });
        let shutdown = Arc::clone(&self.shutdown_signal);

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, shared).await;
        });

        self.task_handle = Some(handle);
        self.local_addr = Some(local_addr);
        self.status = ServerStatus::Running;
        Ok(local_addr)
    }

    /// Gracefully stop the server.
    ///
    /// Requests already being served run to completion on their own tasks.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(addr = ?self.local_addr, "stopping rowtrim server");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| RowtrimError::Server(format!("task join: {e}")))?;
        }

        self.status = ServerStatus::Stopped;
        self.local_addr = None;
        info!("rowtrim server stopped");
        Ok(())
    }

    /// Accept connections until the shutdown signal fires.
    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, shared: Arc<SharedState>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer_addr, &state).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Serve a single request on `stream`, logging under a per-request span.
    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        state: &SharedState,
    ) -> Result<()> {
        let request_id = RequestId::new();
        let span = info_span!("request", id = %request_id, peer = %peer_addr);
        Self::serve(stream, state).instrument(span).await
    }

    async fn serve(mut stream: TcpStream, state: &SharedState) -> Result<()> {
        let mut pending = match read_head(&mut stream).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!("connection closed without a request");
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, "unreadable request head");
                return Self::respond(&mut stream, error_response(&err)).await;
            }
        };

        let response = match Self::receive_body(&mut stream, &mut pending, state).await {
            Ok(()) => {
                let request = pending.into_request();
                info!(method = %request.method, path = %request.path, "request");
                let response = dispatch(&request, &state.routes).await;
                info!(status = response.status, bytes = response.body.len(), "response");
                response
            }
            Err(err) => {
                warn!(error = %err, "unreadable request body");
                let mut response = error_response(&err);
                state.routes.cors.decorate(&pending.request, &mut response);
                response
            }
        };

        Self::respond(&mut stream, response).await
    }

    /// Read the body, answering `Expect: 100-continue` first when the client
    /// is waiting for it.
    async fn receive_body(
        stream: &mut TcpStream,
        pending: &mut PendingRequest,
        state: &SharedState,
    ) -> Result<()> {
        if pending.awaits_continue(state.max_request_bytes)? {
            debug!("sending 100 Continue");
            stream
                .write_all(CONTINUE_RESPONSE)
                .await
                .map_err(|e| RowtrimError::Server(format!("write interim response: {e}")))?;
            stream
                .flush()
                .await
                .map_err(|e| RowtrimError::Server(format!("flush: {e}")))?;
        }
        pending.read_body(stream, state.max_request_bytes).await
    }

    async fn respond(stream: &mut TcpStream, response: HttpResponse) -> Result<()> {
        response.write_to(stream).await?;
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "socket shutdown");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tokio::io::AsyncReadExt;

    const BOUNDARY: &str = "XyZrowtrim";

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..ServerConfig::default()
        }
    }

    /// 10x40 RGB page: content at the top, white below.
    fn page_png() -> Vec<u8> {
        let img = RgbImage::from_fn(10, 40, |x, y| {
            if y < 8 {
                Rgb([(x * 25) as u8, 40, 90])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn upload_request(path_and_query: &str, file: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"page.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut request = format!(
            "POST {path_and_query} HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
             Content-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(&body);
        request
    }

    /// Send raw bytes and return (status, head, body).
    async fn round_trip(addr: SocketAddr, raw: &[u8]) -> (u16, String, Vec<u8>) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();

        let split = crate::http::find_subsequence(&response, b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&response[..split]).to_string();
        let status = head[9..12].parse().unwrap();
        (status, head, response[split + 4..].to_vec())
    }

    #[test]
    fn initial_status_is_stopped() {
        let server = RowtrimServer::new(ServerConfig::default(), FilterParams::default());
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.port(), 8000);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn start_and_stop_cycle() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.status(), ServerStatus::Running);
        assert_eq!(server.start().await.unwrap(), addr);

        server.stop().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn upload_over_tcp_returns_trimmed_png() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();

        let (status, head, body) =
            round_trip(addr, &upload_request("/remove_blank_rows", &page_png())).await;
        assert_eq!(status, 200);
        assert!(head.contains("Content-Type: image/png"));

        let out = image::load_from_memory(&body).unwrap();
        assert_eq!((out.width(), out.height()), (10, 14));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn query_parameters_reach_the_filter() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();

        let (status, _, body) = round_trip(
            addr,
            &upload_request("/remove_blank_rows?threshold=10&spacing=1", &page_png()),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(image::load_from_memory(&body).unwrap().height(), 9);

        let (status, _, _) = round_trip(
            addr,
            &upload_request("/remove_blank_rows?spacing=-4", &page_png()),
        )
        .await;
        assert_eq!(status, 422);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let config = ServerConfig {
            max_request_bytes: 256,
            ..loopback_config()
        };
        let mut server = RowtrimServer::new(config, FilterParams::default());
        let addr = server.start().await.unwrap();

        let raw = b"POST /remove_blank_rows HTTP/1.1\r\nContent-Length: 100000\r\n\r\n";
        let (status, _, _) = round_trip(addr, raw).await;
        assert_eq!(status, 413);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn preflight_over_tcp() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();

        let raw = b"OPTIONS /remove_blank_rows HTTP/1.1\r\n\
                    Origin: http://localhost:5173\r\n\
                    Access-Control-Request-Method: POST\r\n\r\n";
        let (status, head, _) = round_trip(addr, raw).await;
        assert_eq!(status, 200);
        assert!(head.contains("Access-Control-Allow-Origin: http://localhost:5173"));
        assert!(head.contains("Access-Control-Allow-Credentials: true"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn expect_continue_gets_interim_response_before_body() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();

        let raw = upload_request("/remove_blank_rows", &page_png());
        let split = crate::http::find_subsequence(&raw, b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&raw[..split]).to_string();
        let head = format!("{head}\r\nExpect: 100-continue\r\n\r\n");

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(head.as_bytes()).await.unwrap();

        let mut interim = Vec::new();
        let mut chunk = [0u8; 256];
        tokio::time::timeout(Duration::from_secs(2), async {
            while crate::http::find_subsequence(&interim, b"\r\n\r\n").is_none() {
                let n = stream.read(&mut chunk).await.unwrap();
                assert_ne!(n, 0, "connection closed before the interim response");
                interim.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .expect("no interim response while the body was held back");
        assert_eq!(interim, CONTINUE_RESPONSE);

        stream.write_all(&raw[split + 4..]).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        let body_at = crate::http::find_subsequence(&response, b"\r\n\r\n").unwrap() + 4;
        let out = image::load_from_memory(&response[body_at..]).unwrap();
        assert_eq!(out.height(), 14);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_expecting_upload_is_refused_without_continue() {
        let config = ServerConfig {
            max_request_bytes: 256,
            ..loopback_config()
        };
        let mut server = RowtrimServer::new(config, FilterParams::default());
        let addr = server.start().await.unwrap();

        let raw = b"POST /remove_blank_rows HTTP/1.1\r\n\
                    Expect: 100-continue\r\n\
                    Content-Length: 2000000\r\n\r\n";
        let (status, head, _) = round_trip(addr, raw).await;
        assert_eq!(status, 413);
        assert!(!head.contains("100 Continue"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn framing_errors_carry_cors_headers() {
        let config = ServerConfig {
            max_request_bytes: 256,
            ..loopback_config()
        };
        let mut server = RowtrimServer::new(config, FilterParams::default());
        let addr = server.start().await.unwrap();

        let raw = b"POST /remove_blank_rows HTTP/1.1\r\n\
                    Origin: http://localhost:5173\r\n\
                    Content-Length: 100000\r\n\r\n";
        let (status, head, body) = round_trip(addr, raw).await;
        assert_eq!(status, 413);
        assert!(head.contains("Access-Control-Allow-Origin: http://localhost:5173"));
        assert!(head.contains("Access-Control-Allow-Credentials: true"));
        let detail: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(detail["detail"].is_string());

        let raw = b"POST /remove_blank_rows HTTP/1.1\r\n\
                    Origin: http://localhost:5173\r\n\
                    Transfer-Encoding: chunked\r\n\r\n";
        let (status, head, _) = round_trip(addr, raw).await;
        assert_eq!(status, 411);
        assert!(head.contains("Access-Control-Allow-Origin: http://localhost:5173"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_request_gets_bad_request() {
        let mut server = RowtrimServer::new(loopback_config(), FilterParams::default());
        let addr = server.start().await.unwrap();

        let (status, _, _) = round_trip(addr, b"HELLO\r\n\r\n").await;
        assert_eq!(status, 400);

        server.stop().await.unwrap();
    }
}
