//! Generic server-wide state and facilities
//!
//! The interesting type here is [`ServerState`]: the frozen form of an
//! [`ApiDescription`], holding the operation registry, the pre-serialized
//! schema document, and the static configuration.  It's built once, before
//! the server begins accepting traffic, and is read-only from then on — all
//! registration-time mutation has already happened, so request handling
//! needs no locks.  [`ServerState::handle_request`] is the single
//! request-handling entry point; the HTTP machinery below
//! ([`HttpServerStarter`], [`HttpServer`]) just wires it to a listener.

use crate::api_description::ApiDescription;
use crate::config::ConfigTurnstile;
use crate::docs::docs_page;
use crate::error::HttpError;
use crate::handler::RequestContext;
use crate::http_util::CONTENT_TYPE_HTML;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::HEADER_REQUEST_ID;

use http::Method;
use http::StatusCode;
use hyper::Request;
use hyper::Response;
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use scopeguard::guard;
use scopeguard::ScopeGuard;
use slog::Logger;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Static configuration associated with a running server.
#[derive(Debug)]
pub struct ServerConfig {
    /// maximum allowed size of a request body
    pub request_body_max_bytes: usize,
}

/// The frozen, shareable form of a registered API: operation registry,
/// schema document snapshot, documentation page, and static configuration.
///
/// Nothing here is mutated after construction.  Per-request state lives in
/// the [`RequestContext`] owned by each invocation, so concurrent requests
/// share this structure without synchronization.
pub struct ServerState {
    /// static server configuration parameters
    pub config: ServerConfig,
    /// server-wide log handle
    pub log: Logger,

    api: ApiDescription,
    /// schema document, serialized once and served verbatim
    openapi_document: String,
    docs_page: String,
}

impl ServerState {
    /// Freeze `api` for serving.  The schema document is synthesized and
    /// serialized here, once; a failure to serialize it is a startup error.
    pub fn new(
        api: ApiDescription,
        config: &ConfigTurnstile,
        log: Logger,
    ) -> Result<ServerState, serde_json::Error> {
        let mut openapi_document =
            serde_json::to_string(&api.openapi().json()?)?;
        openapi_document.push('\n');
        let docs_page = docs_page(api.title());
        Ok(ServerState {
            config: ServerConfig {
                request_body_max_bytes: config.request_body_max_bytes,
            },
            log,
            api,
            openapi_document,
            docs_page,
        })
    }

    /// Initial entry point for handling a request.  Exactly one response
    /// comes back out, no matter which internal path the request takes.
    pub async fn handle_request(
        &self,
        request: Request<crate::Body>,
        remote_addr: SocketAddr,
    ) -> Response<crate::Body> {
        let start_time = std::time::Instant::now();
        let request_id = generate_request_id();

        let request_log = self.log.new(o!(
            "remote_addr" => remote_addr.to_string(),
            "req_id" => request_id.clone(),
            "method" => request.method().as_str().to_string(),
            "uri" => format!("{}", request.uri()),
        ));
        trace!(request_log, "incoming request");

        // If the client disconnects early, this task is dropped mid-await;
        // the scopeguard records that the request never completed.
        let cancel_log = request_log.clone();
        let on_disconnect = guard((), move |_| {
            let latency_us = start_time.elapsed().as_micros() as u64;
            warn!(
                cancel_log,
                "request handling cancelled (client disconnected)";
                "latency_us" => latency_us,
            );
        });

        let maybe_response = self
            .http_request_handle(request, &request_id, request_log.new(o!()))
            .await;

        // The request wasn't cancelled, so defuse the scopeguard.
        let _ = ScopeGuard::into_inner(on_disconnect);

        let latency_us = start_time.elapsed().as_micros() as u64;
        let mut response = match maybe_response {
            Err(error) => {
                let message_external = error.external_message.clone();
                let message_internal = error.internal_message.clone();
                let response = error.into_response(&request_id);

                info!(request_log, "request completed";
                    "response_code" => response.status().as_u16(),
                    "latency_us" => latency_us,
                    "error_message_internal" => message_internal,
                    "error_message_external" => message_external,
                );

                response
            }

            Ok(response) => {
                info!(request_log, "request completed";
                    "response_code" => response.status().as_u16(),
                    "latency_us" => latency_us,
                );

                response
            }
        };

        // Valid by construction: request ids are UUIDs.
        let header_value =
            http::HeaderValue::from_str(&request_id).unwrap();
        response.headers_mut().insert(HEADER_REQUEST_ID, header_value);
        response
    }

    async fn http_request_handle(
        &self,
        request: Request<crate::Body>,
        request_id: &str,
        request_log: Logger,
    ) -> Result<Response<crate::Body>, HttpError> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        // The well-known endpoints are served from the frozen snapshot and
        // take precedence over registered operations.
        if method == Method::GET && path == "/openapi.json" {
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
                .body(self.openapi_document.clone().into())?);
        }
        if method == Method::GET && path == "/docs" {
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, CONTENT_TYPE_HTML)
                .body(self.docs_page.clone().into())?);
        }

        let lookup = self.api.lookup_route(&method, &path)?;
        let rqctx = RequestContext::new(
            request,
            lookup.variables,
            request_id.to_string(),
            request_log,
            self.config.request_body_max_bytes,
        );
        lookup.value.handler.handle_request(rqctx).await
    }
}

fn generate_request_id() -> String {
    format!("{}", Uuid::new_v4())
}

/// Set up an HTTP server bound on the configured address that runs the
/// registered operations.  You must invoke [`HttpServerStarter::start()`] on
/// the result to actually begin serving.
///
/// The listener is bound here, eagerly, so that a caller binding port 0 can
/// learn the assigned port before the server starts.
pub struct HttpServerStarter {
    state: Arc<ServerState>,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl HttpServerStarter {
    pub fn new(
        config: &ConfigTurnstile,
        api: ApiDescription,
        log: &Logger,
    ) -> Result<HttpServerStarter, GenericError> {
        let state = ServerState::new(api, config, log.new(o!()))?;

        let listener = std::net::TcpListener::bind(config.bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        for endpoint in state.api.endpoints() {
            debug!(state.log, "registered endpoint";
                "method" => endpoint.method.as_str().to_string(),
                "path" => endpoint.path.clone(),
            );
        }

        Ok(HttpServerStarter { state: Arc::new(state), listener, local_addr })
    }

    /// Begin accepting connections.  Must be called from within a tokio
    /// runtime.
    pub fn start(self) -> HttpServer {
        let (close_tx, mut close_rx) = tokio::sync::oneshot::channel::<()>();
        let state = Arc::clone(&self.state);
        let accept_log = state.log.new(o!());

        info!(state.log, "listening"; "local_addr" => self.local_addr.to_string());

        let std_listener = self.listener;
        let join_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(std_listener)
                .expect("failed to register listener with the runtime");
            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        info!(accept_log, "received request to begin graceful shutdown");
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, remote_addr) = match accepted {
                            Ok(accepted) => accepted,
                            Err(error) => {
                                warn!(accept_log, "accept failed";
                                    "error" => error.to_string());
                                continue;
                            }
                        };
                        info!(accept_log, "accepted connection";
                            "remote_addr" => remote_addr.to_string());
                        let conn_state = Arc::clone(&state);
                        let conn_log = accept_log.new(o!());
                        tokio::spawn(async move {
                            serve_connection(
                                conn_state, conn_log, stream, remote_addr,
                            )
                            .await;
                        });
                    }
                }
            }
        });

        HttpServer {
            local_addr: self.local_addr,
            join_handle,
            close_channel: Some(close_tx),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn serve_connection(
    state: Arc<ServerState>,
    log: Logger,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
) {
    let io = TokioIo::new(stream);
    let service = hyper::service::service_fn(
        move |request: hyper::Request<hyper::body::Incoming>| {
            let state = Arc::clone(&state);
            async move {
                let request = request.map(crate::Body::wrap);
                Ok::<_, std::convert::Infallible>(
                    state.handle_request(request, remote_addr).await,
                )
            }
        },
    );
    if let Err(error) =
        hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
    {
        debug!(log, "connection closed with error"; "error" => error.to_string());
    }
}

/// A running server.  Call [`HttpServer::close()`] for a graceful shutdown
/// that waits for the accept loop to wind down; dropping the handle also
/// stops the accept loop, but without waiting for it.
pub struct HttpServer {
    local_addr: SocketAddr,
    join_handle: tokio::task::JoinHandle<()>,
    close_channel: Option<tokio::sync::oneshot::Sender<()>>,
}

impl HttpServer {
    /// Returns the address on which this server is listening.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the server to stop accepting connections and wait for the
    /// accept loop to wind down.  Connections already being served run to
    /// completion.
    pub async fn close(mut self) -> Result<(), String> {
        self.close_channel
            .take()
            .expect("cannot close twice")
            .send(())
            .map_err(|_| String::from("server already shut down"))?;
        self.join_handle
            .await
            .map_err(|error| format!("waiting for server: {}", error))
    }
}
