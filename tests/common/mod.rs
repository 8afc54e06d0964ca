//! Shared utilities for integration tests: a recording origin, a proxy
//! launcher and image fixtures.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Router;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::net::TcpListener;

use oyaki::config::{OriginConfig, OyakiConfig};
use oyaki::http::{AppState, HttpServer};
use oyaki::lifecycle::Shutdown;

/// Requests seen by a test origin: request URI and headers.
#[derive(Clone, Default)]
pub struct Recorded {
    inner: Arc<Mutex<Vec<(String, HeaderMap)>>>,
}

impl Recorded {
    pub fn push(&self, uri: String, headers: HeaderMap) {
        self.inner.lock().unwrap().push((uri, headers));
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn last(&self) -> (String, HeaderMap) {
        self.inner.lock().unwrap().last().cloned().expect("origin saw no request")
    }
}

/// Serve `router` on an ephemeral port and return its address.
pub async fn start_origin(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Origin that answers every request with `respond(uri, headers)` and
/// records what it saw.
pub async fn recording_origin<F>(recorded: Recorded, respond: F) -> SocketAddr
where
    F: Fn(&str, &HeaderMap) -> Response + Clone + Send + Sync + 'static,
{
    let router = Router::new().fallback(move |request: Request| {
        let recorded = recorded.clone();
        let respond = respond.clone();
        async move {
            let uri = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default();
            let response = respond(&uri, request.headers());
            recorded.push(uri, request.headers().clone());
            response
        }
    });
    start_origin(router).await
}

/// Default config pointed at a plain-HTTP origin.
pub fn proxy_config(origin: SocketAddr) -> OyakiConfig {
    OyakiConfig {
        origin: OriginConfig {
            scheme: "http".into(),
            host: origin.to_string(),
            ..OriginConfig::default()
        },
        ..OyakiConfig::default()
    }
}

/// Run a proxy for `config` on an ephemeral port.
pub async fn start_proxy(config: OyakiConfig) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(config).unwrap();
    serve(server).await
}

/// Run a proxy around prepared state.
pub async fn start_proxy_with_state(config: OyakiConfig, state: AppState) -> (SocketAddr, Shutdown) {
    serve(HttpServer::with_state(config, state)).await
}

async fn serve(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = (x * 7 + y * 13) ^ (x * y);
        Rgb([(v % 256) as u8, ((x * 3) % 256) as u8, ((y * 5 + v) % 256) as u8])
    })
}

pub fn jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = textured(width, height);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&img)
        .unwrap();
    out
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(textured(width, height))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Insert an EXIF APP1 segment carrying `orientation` right after SOI.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}
