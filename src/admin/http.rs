//! Admin HTTP server
//!
//! HTTP/1 over hyper, one task per connection. Handlers are plain async
//! functions of the request so they can be driven without a socket.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{AdminService, InstallRule};
use crate::error::{Error, Result};

type HttpResponse = Response<Full<Bytes>>;

// =============================================================================
// Server
// =============================================================================

/// Bound admin HTTP server
pub struct AdminServer {
    listener: TcpListener,
    admin: Arc<AdminService>,
}

impl AdminServer {
    pub async fn bind(addr: SocketAddr, admin: Arc<AdminService>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Admin(format!("Failed to bind admin server on {}: {}", addr, e)))?;

        info!("Admin server listening on {}", listener.local_addr()?);
        Ok(Self { listener, admin })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted
                    .map_err(|e| Error::Admin(format!("Admin server accept error: {}", e)))?,
            };

            let io = TokioIo::new(stream);
            let admin = self.admin.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| handle(admin.clone(), req));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%peer, "Admin connection error: {}", e);
                }
            });
        }

        info!("Admin server stopped");
        Ok(())
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Route one admin request
pub async fn handle<B>(
    admin: Arc<AdminService>,
    req: Request<B>,
) -> std::result::Result<HttpResponse, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    debug!(%method, %path, "Admin request");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/healthz") => {
            let health = admin.health();
            let status = if health.is_serving() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json(status, &health)
        }
        (&Method::GET, "/livez") => status_text(admin.lifecycle().is_live(), "shutting down"),
        (&Method::GET, "/readyz") => status_text(admin.lifecycle().is_ready(), "sockets not bound"),
        (&Method::GET, "/metrics") => match admin.metrics_text() {
            Ok((content_type, body)) => {
                let mut response = respond(StatusCode::OK, "text/plain", body);
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        (&Method::GET, "/stats") => json(StatusCode::OK, &admin.stats()),
        (&Method::GET, "/learned") => json(StatusCode::OK, &admin.learned()),
        (&Method::GET, "/rules") => json(StatusCode::OK, &admin.read_rules()),
        (&Method::POST, "/rules") => install_rule(&admin, req.into_body()).await,
        (&Method::DELETE, path) if path.starts_with("/rules/") => remove_rule(&admin, path),
        _ => failure(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

async fn install_rule<B>(admin: &AdminService, body: B) -> HttpResponse
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Failed to read body: {}", e)),
    };

    let rule: InstallRule = match serde_json::from_slice(&bytes) {
        Ok(rule) => rule,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid rule: {}", e)),
    };

    match admin.install_rule(rule.key, rule.value) {
        Ok(entry) => json(StatusCode::OK, &entry),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn remove_rule(admin: &AdminService, path: &str) -> HttpResponse {
    let raw = path.trim_start_matches("/rules/");
    let Ok(key) = raw.parse::<u32>() else {
        return failure(StatusCode::BAD_REQUEST, format!("Invalid key: {}", raw));
    };

    match admin.remove_rule(key) {
        Some(removed) => json(StatusCode::OK, &removed),
        None => failure(StatusCode::NOT_FOUND, format!("No rule for key {}", key)),
    }
}

// =============================================================================
// Response helpers
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    let body = serde_json::json!({ "error": message.into() }).to_string();
    respond(status, "application/json", body)
}

fn status_text(passing: bool, reason: &'static str) -> HttpResponse {
    if passing {
        respond(StatusCode::OK, "text/plain", "ok")
    } else {
        respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", reason)
    }
}

// =============================================================================
// Tests
// =============================================================================
