//! Request/response messaging between peers.
//!
//! A node answers requests on its own `addr:port` through handlers
//! registered per path, and calls other nodes by posting a JSON payload
//! to `http://<peer>:<port><path>`.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshlink_core::NodeIdentity;

use crate::error::{MeshError, Result};
use crate::peers::PeerDescriptor;

/// JSON object carried as a request or response body.
pub type Payload = serde_json::Map<String, Value>;

/// A registered request handler.
///
/// Runs on the connection's task; the returned payload becomes the
/// response body.
pub type Handler = Arc<dyn Fn(Payload, RequestContext) -> Payload + Send + Sync>;

/// What a handler learns about an inbound request beyond its payload.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identity of the node answering the request.
    pub local: NodeIdentity,
    /// Socket address the request arrived from.
    pub remote: SocketAddr,
}

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct ServeState {
    identity: NodeIdentity,
    routes: Arc<RwLock<HashMap<String, Handler>>>,
}

/// Per-node request/response endpoint.
pub struct Messenger {
    identity: NodeIdentity,
    routes: Arc<RwLock<HashMap<String, Handler>>>,
    http: reqwest::Client,
    send_timeout: Duration,
}

impl Messenger {
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            routes: Arc::new(RwLock::new(HashMap::new())),
            http: reqwest::Client::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override the per-request deadline applied to [`Messenger::send`].
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Associate `path` with a handler.
    ///
    /// Re-registering a path replaces the previous handler: last
    /// registration wins, the usual route-table rule. Paths are
    /// normalized to a leading `/`. Registration works before or after
    /// serving starts; the route table is shared.
    pub async fn register<F>(&self, path: &str, handler: F)
    where
        F: Fn(Payload, RequestContext) -> Payload + Send + Sync + 'static,
    {
        let path = normalize_path(path);
        let mut routes = self.routes.write().await;
        if routes.insert(path.clone(), Arc::new(handler)).is_some() {
            debug!("handler for {} replaced", path);
        }
    }

    /// Bind the node's own address and serve inbound requests until
    /// `shutdown` flips.
    ///
    /// A bind failure is a fatal startup error for the caller. Requests
    /// to paths with no registered handler are answered with 404 and a
    /// JSON error body; they never disturb the serving loop.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let bind_addr = self.identity.socket_addr();
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|source| MeshError::Bind {
                addr: bind_addr,
                source,
            })?;

        let state = ServeState {
            identity: self.identity.clone(),
            routes: Arc::clone(&self.routes),
        };
        let app = Router::new()
            .route("/*path", post(dispatch))
            .with_state(state);

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        });

        info!("serving requests on {}", bind_addr);
        Ok(tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!("serving loop ended with error: {}", e);
            }
            debug!("server stopped");
        }))
    }

    /// Send `payload` to `path` on a peer and wait for its single
    /// response.
    ///
    /// Every request carries a deadline; an unreachable peer surfaces
    /// as [`MeshError::ConnectionFailed`] instead of blocking the
    /// caller forever. A non-success status becomes
    /// [`MeshError::PeerStatus`], and a body that is not a JSON object
    /// becomes [`MeshError::MalformedResponse`].
    pub async fn send(
        &self,
        peer: &PeerDescriptor,
        path: &str,
        payload: Payload,
    ) -> Result<Payload> {
        let path = normalize_path(path);
        let url = format!("http://{}{}", peer.socket_addr(), path);

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|source| MeshError::ConnectionFailed {
                peer: peer.id.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeshError::PeerStatus {
                peer: peer.id.clone(),
                status,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| MeshError::MalformedResponse {
                peer: peer.id.clone(),
            })?;
        match body {
            Value::Object(payload) => Ok(payload),
            _ => Err(MeshError::MalformedResponse {
                peer: peer.id.clone(),
            }),
        }
    }
}

async fn dispatch(
    State(state): State<ServeState>,
    Path(path): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(payload): Json<Payload>,
) -> Response {
    let path = normalize_path(&path);
    let handler = {
        let routes = state.routes.read().await;
        routes.get(&path).cloned()
    };
    match handler {
        Some(handler) => {
            let ctx = RequestContext {
                local: state.identity.clone(),
                remote,
            };
            Json(Value::Object(handler(payload, ctx))).into_response()
        }
        None => {
            debug!("no handler registered for {}", path);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("no handler for {}", path) })),
            )
                .into_response()
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/ping"), "/ping");
        assert_eq!(normalize_path("ping"), "/ping");
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let identity = NodeIdentity::new("127.0.0.1".parse().unwrap(), 4000).unwrap();
        let messenger = Messenger::new(identity.clone());

        messenger
            .register("/echo", |_, _| {
                let mut reply = Payload::new();
                reply.insert("version".into(), json!(1));
                reply
            })
            .await;
        messenger
            .register("echo", |_, _| {
                let mut reply = Payload::new();
                reply.insert("version".into(), json!(2));
                reply
            })
            .await;

        let routes = messenger.routes.read().await;
        assert_eq!(routes.len(), 1);
        let handler = routes.get("/echo").cloned().unwrap();
        let ctx = RequestContext {
            local: identity,
            remote: "127.0.0.1:9".parse().unwrap(),
        };
        let reply = handler(Payload::new(), ctx);
        assert_eq!(reply.get("version"), Some(&json!(2)));
    }
}
