//! HTTP ingest endpoint.
//!
//! `GET {ingest_path}?id=<key>[&endpoint=<url>]` records one sighting of
//! `id`. When `endpoint` is present and the echo is enabled, the running
//! count of the open window is POSTed to that URL from a detached task; its
//! outcome is logged and never changes the response.

use crate::backend::CountingBackend;
use crate::counter::WindowResult;
use crate::sink::CallbackClient;
use chrono::Utc;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const OK: &str = "ok";
const FAILED: &str = "failed";

/// Query parameters of an ingest request. The first occurrence of each
/// parameter wins.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestParams {
    pub id: Option<String>,
    pub endpoint: Option<String>,
}

impl IngestParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(query) = query else {
            return params;
        };
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "id" if params.id.is_none() => params.id = Some(value.into_owned()),
                "endpoint" if params.endpoint.is_none() => params.endpoint = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

pub struct IngestServer {
    backend: Arc<dyn CountingBackend>,
    echo: Option<CallbackClient>,
    ingest_path: String,
}

impl IngestServer {
    /// `echo` is the client used for running-count callbacks; `None`
    /// disables them.
    pub fn new(backend: Arc<dyn CountingBackend>, echo: Option<CallbackClient>, ingest_path: &str) -> Self {
        Self {
            backend,
            echo,
            ingest_path: ingest_path.to_string(),
        }
    }

    /// Accepts connections on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!(%addr, path = %self.ingest_path, "Ingest server started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Ingest server: accept error");
                            continue;
                        }
                    };

                    let server = self.clone();
                    tokio::spawn(async move {
                        let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                            let server = server.clone();
                            async move { Ok::<_, Infallible>(server.handle(req).await) }
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                            debug!(?peer, error = %e, "Ingest server: serve_connection error");
                        }
                    });
                }
            }
        }

        info!("Ingest server stopped");
        Ok(())
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.uri().path() != self.ingest_path {
            return text(StatusCode::NOT_FOUND, "Not Found");
        }
        if req.method() != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        let params = IngestParams::from_query(req.uri().query());
        let Some(id) = params.id.filter(|id| !id.is_empty()) else {
            return text(StatusCode::BAD_REQUEST, FAILED);
        };

        if let Err(e) = self.backend.insert(&id).await {
            warn!(error = %e, "Failed to record key");
            return text(StatusCode::INTERNAL_SERVER_ERROR, FAILED);
        }

        if let (Some(client), Some(endpoint)) = (&self.echo, params.endpoint) {
            self.spawn_echo(client.clone(), endpoint);
        }
        text(StatusCode::OK, OK)
    }

    fn spawn_echo(&self, client: CallbackClient, endpoint: String) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let unique_count = match backend.running_count().await {
                Ok(count) => count,
                Err(e) => {
                    warn!(error = %e, "Echo skipped: running count unavailable");
                    return;
                }
            };
            let result = WindowResult::new(Utc::now(), unique_count);
            match client.post_result(&endpoint, &result).await {
                Ok(()) => debug!(%endpoint, unique_count, "Echo delivered"),
                Err(e) => warn!(%endpoint, error = %e, "Echo failed"),
            }
        });
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp
}
