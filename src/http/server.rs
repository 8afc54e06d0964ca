//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create the Axum router (liveness plus catch-all proxy route)
//! - Wire up middleware (tracing, request ID)
//! - Accept connections and serve HTTP/1.1 with graceful shutdown
//! - Fetch from the origin, transcode JPEG, forward everything else
//! - Classify connection-level write errors

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::{OyakiConfig, Quality};
use crate::convert::ConversionPipeline;
use crate::http::error::ProxyError;
use crate::http::request::{forwarded_headers, request_id, request_uri};
use crate::http::response::{self, UpstreamBodyError};
use crate::observability::{metrics, traced_codec, traced_encoder};
use crate::origin::{has_webp_suffix, OriginClient, WebpResolver};

/// Failures building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build origin client: {0}")]
    OriginClient(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub origin: OriginClient,
    pub resolver: WebpResolver,
    pub pipeline: ConversionPipeline,
    pub quality: Quality,
    pub unreachable_status: StatusCode,
}

impl AppState {
    /// State wired from configuration.
    pub fn from_config(config: &OyakiConfig) -> Result<Self, ServerError> {
        let mut pipeline = ConversionPipeline::from_config(&config.conversion);
        if config.observability.trace_conversions {
            pipeline = pipeline.map_collaborators(traced_codec, traced_encoder);
        }
        Self::with_pipeline(config, pipeline)
    }

    /// State with an explicit conversion pipeline.
    pub fn with_pipeline(config: &OyakiConfig, pipeline: ConversionPipeline) -> Result<Self, ServerError> {
        let origin = OriginClient::new(&config.origin)?;
        let unreachable_status =
            StatusCode::from_u16(config.origin.unreachable_status).unwrap_or(StatusCode::FORBIDDEN);

        Ok(Self {
            resolver: WebpResolver::new(origin.clone()),
            origin,
            pipeline,
            quality: config.conversion.quality,
            unreachable_status,
        })
    }
}

/// HTTP server for the image proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<OyakiConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: OyakiConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config)?;
        Ok(Self::with_state(config, state))
    }

    /// Create a server around prepared state.
    pub fn with_state(config: OyakiConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
            config: Arc::new(config),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(proxy_handler))
            .route("/{*path}", get(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &OyakiConfig {
        &self.config
    }

    /// Accept connections until `shutdown` fires, then drain for at most the
    /// configured grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = TowerToHyperService::new(self.router);
        let graceful = GracefulShutdown::new();
        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let conn = builder.serve_connection(TokioIo::new(stream), service.clone());
                    let conn = graceful.watch(conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            report_connection_error(&e, peer);
                        }
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);

        let grace = Duration::from_secs(self.config.listener.shutdown_grace_secs);
        tokio::select! {
            _ = graceful.shutdown() => tracing::info!("All connections drained"),
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed with connections still open");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let uri = request_uri(request.uri()).to_string();

    if request.uri().path() == "/" {
        metrics::record_request(StatusCode::OK.as_u16(), "liveness", start_time);
        return response::liveness();
    }

    tracing::debug!(request_id = %request_id, uri = %uri, "Proxying request");

    let span = tracing::info_span!("proxy", request_id = %request_id, uri = %uri);
    match proxy(&state, &request_id, &uri, request.headers()).instrument(span).await {
        Ok(response) => {
            metrics::record_request(response.status().as_u16(), "ok", start_time);
            response
        }
        Err(err) => {
            err.log(&request_id, &uri);
            metrics::record_request(err.status().as_u16(), err.kind(), start_time);
            err.into_response()
        }
    }
}

async fn proxy(
    state: &AppState,
    request_id: &str,
    uri: &str,
    incoming: &HeaderMap,
) -> Result<Response, ProxyError> {
    let from_origin = |e| ProxyError::from_origin(e, state.unreachable_status);

    // 1. Build origin URL
    let url = state.origin.url_for(uri).map_err(from_origin)?;
    let want_webp = has_webp_suffix(url.path());
    let headers = forwarded_headers(incoming);

    // 2. Fetch (the resolver strips `.webp` and accepts only 200/304)
    let upstream = if want_webp {
        state.resolver.resolve(&url, headers).await
    } else {
        state.origin.get(url, headers).await
    }
    .map_err(from_origin)?;

    // 3. Map origin status
    let last_modified = response::last_modified(upstream.headers());
    match upstream.status() {
        StatusCode::OK => {}
        StatusCode::NOT_MODIFIED => return Ok(response::not_modified(last_modified)),
        other => return Err(ProxyError::from_status(other)),
    }

    // 4. Anything that is not JPEG goes through untouched
    if !response::is_jpeg(upstream.headers().get(CONTENT_TYPE)) {
        return Ok(response::passthrough(upstream, last_modified, request_id));
    }

    // 5. Transcode
    let source = upstream.bytes().await.map_err(ProxyError::BodyRead)?;
    let converted = state.pipeline.convert(source, state.quality, want_webp).await?;

    Ok(response::converted(converted, last_modified))
}

fn report_connection_error(err: &hyper::Error, peer: SocketAddr) {
    if is_client_disconnect(err) {
        tracing::debug!(peer = %peer, error = %err, "Client went away");
        return;
    }
    if already_reported(err) {
        return;
    }
    tracing::error!(peer = %peer, error = %err, "Write response failed");
}

fn error_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Broken pipe, connection reset or aborted anywhere in the chain.
pub(crate) fn is_client_disconnect(err: &(dyn StdError + 'static)) -> bool {
    error_chain(err).any(|e| {
        e.downcast_ref::<io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            )
        })
    })
}

/// The failure was an origin body error that the handler already logged.
pub(crate) fn already_reported(err: &(dyn StdError + 'static)) -> bool {
    error_chain(err).any(|e| e.is::<UpstreamBodyError>())
}
