//! HTTP surface: WebSocket admission, logout and health.
//!
//! Endpoint results follow the body-level `code` contract the frontend
//! expects — failures are reported as `{"code":400|500,...}` inside an
//! HTTP 200 response.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_shared::constants::{CLIENT_ID_MISSING_TEXT, LOGOUT_OK_TEXT, SYSTEM_ERROR_TEXT};
use parley_store::MessageStore;

use crate::client;
use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::transport::Transport;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn MessageStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/wss", get(ws_login))
        .route("/wslogout", post(ws_logout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body-level status envelope shared by the chat endpoints.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Deserialize)]
struct WsLoginParams {
    #[serde(default)]
    client_id: String,
}

#[derive(Deserialize)]
struct WsLogoutRequest {
    owner_id: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Admission: `GET /wss?client_id=<U-prefixed id>` upgrades the connection
/// and registers the client with the hub. A missing or empty `client_id` is
/// answered with a body-level 400 instead of completing the handshake.
async fn ws_login(
    State(state): State<AppState>,
    Query(params): Query<WsLoginParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.client_id.is_empty() {
        warn!("websocket login without client_id");
        return Json(ApiResponse {
            code: 400,
            message: CLIENT_ID_MISSING_TEXT.to_string(),
        })
        .into_response();
    }

    let client_id = params.client_id;
    ws.on_upgrade(move |socket| client::admission(socket, client_id, state))
}

/// Logout: tears down the client's connection. Idempotent — logging out an
/// id that is not registered still succeeds.
async fn ws_logout(
    State(state): State<AppState>,
    payload: Result<Json<WsLogoutRequest>, JsonRejection>,
) -> Json<ApiResponse> {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "malformed logout request");
            return Json(ApiResponse {
                code: 500,
                message: SYSTEM_ERROR_TEXT.to_string(),
            });
        }
    };

    state.hub.logout(&request.owner_id).await;
    info!(owner = %request.owner_id, "client logged out");
    Json(ApiResponse {
        code: 200,
        message: LOGOUT_OK_TEXT.to_string(),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parley_cache::MemoryCache;
    use parley_shared::IdGenerator;

    use crate::client::test_support::{RecordingSink, RecordingStore};
    use crate::client::Client;
    use crate::hub::Hub;
    use crate::transport::inproc::InProcTransport;

    fn test_state() -> AppState {
        let store = Arc::new(RecordingStore::default());
        let cache = Arc::new(MemoryCache::new());
        let transport = Arc::new(InProcTransport::new(16));
        let config = Arc::new(ServerConfig::default());

        let (hub, handle) = Hub::new(
            transport.clone(),
            store.clone(),
            cache,
            IdGenerator::new(),
            Duration::from_secs(60),
            16,
        );
        tokio::spawn(hub.run());

        AppState {
            hub: handle,
            transport,
            store,
            config,
        }
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let state = test_state();

        let sink = Arc::new(RecordingSink::default());
        let (client, _rx) = Client::new("U001", sink, 16);
        state.hub.register(client).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        for _ in 0..2 {
            let response = ws_logout(
                State(state.clone()),
                Ok(Json(WsLogoutRequest {
                    owner_id: "U001".to_string(),
                })),
            )
            .await;
            assert_eq!(response.0.code, 200);
            assert_eq!(response.0.message, LOGOUT_OK_TEXT);
        }
    }

    #[tokio::test]
    async fn logout_for_unknown_client_succeeds() {
        let state = test_state();

        let response = ws_logout(
            State(state),
            Ok(Json(WsLogoutRequest {
                owner_id: "U404".to_string(),
            })),
        )
        .await;
        assert_eq!(response.0.code, 200);
    }
}
