// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-only HTTP admin API.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Status and registry sizes
//! - `GET /api/v1/clients` - Connected stream clients
//! - `GET /api/v1/units` - Tracked units and points
//! - `GET /api/v1/units/:uid` - One tracked unit
//! - `GET /api/v1/info` - Relay info

use crate::server::{ClientInfo, ClientRegistry, Router, Unit, UnitRegistry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared admin state
pub struct AdminState {
    clients: Arc<ClientRegistry>,
    units: Arc<UnitRegistry>,
    router: Router,
}

impl AdminState {
    pub fn new(clients: Arc<ClientRegistry>, units: Arc<UnitRegistry>, router: Router) -> Self {
        Self {
            clients,
            units,
            router,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    fn not_found(what: impl Into<String>) -> Self {
        Self {
            error: what.into(),
            code: StatusCode::NOT_FOUND.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// API v1 routes
pub fn routes(state: Arc<AdminState>) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/clients", get(clients))
        .route("/api/v1/units", get(units))
        .route("/api/v1/units/:uid", get(unit))
        .route("/api/v1/info", get(info))
        .with_state(state)
}

/// Serve the admin API until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AdminState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = routes(state).layer(TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// GET /api/v1/health
pub async fn health(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "clients": state.clients.len().await,
        "units": state.units.len().await,
        "delivery": state.router.stats(),
    }))
}

/// GET /api/v1/clients
pub async fn clients(State(state): State<Arc<AdminState>>) -> Json<Vec<ClientInfo>> {
    Json(state.clients.snapshot().await)
}

/// GET /api/v1/units
pub async fn units(State(state): State<Arc<AdminState>>) -> Json<Vec<Unit>> {
    Json(state.units.snapshot().await)
}

/// GET /api/v1/units/:uid
pub async fn unit(
    State(state): State<Arc<AdminState>>,
    Path(uid): Path<String>,
) -> Result<Json<Unit>, ApiError> {
    state
        .units
        .get(&uid)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown unit: {}", uid)))
}

/// GET /api/v1/info
pub async fn info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "cot-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/v1/health",
            "/api/v1/clients",
            "/api/v1/units",
            "/api/v1/units/:uid",
            "/api/v1/info"
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::{Event, MessageKind};
    use crate::server::ClientHandle;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    async fn state_with_traffic() -> (Arc<AdminState>, mpsc::Receiver<bytes::Bytes>) {
        let clients = Arc::new(ClientRegistry::new());
        let units = Arc::new(UnitRegistry::new());

        let (tx, rx) = mpsc::channel(4);
        let peer = SocketAddr::from(([192, 168, 1, 20], 50000));
        clients
            .add("ANDROID-1", ClientHandle::new(1, peer, tx).with_callsign("ALPHA"))
            .await;

        let mut event = Event::new("a-f-G-U-C", "ANDROID-1", chrono::Duration::seconds(60));
        event.point.lat = 48.85;
        event.point.lon = 2.35;
        units
            .upsert("ANDROID-1", Unit::from_event(&event, MessageKind::Unit))
            .await;

        let router = Router::new(clients.clone());
        (Arc::new(AdminState::new(clients, units, router)), rx)
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _rx) = state_with_traffic().await;
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clients"], 1);
        assert_eq!(body["units"], 1);
        assert_eq!(body["delivery"]["messages_sent"], 0);
    }

    #[tokio::test]
    async fn test_clients_lists_registry() {
        let (state, _rx) = state_with_traffic().await;
        let Json(list) = clients(State(state)).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].uid, "ANDROID-1");
        assert_eq!(list[0].callsign, "ALPHA");
        assert_eq!(list[0].peer, "192.168.1.20:50000");
    }

    #[tokio::test]
    async fn test_units_and_unit_lookup() {
        let (state, _rx) = state_with_traffic().await;

        let Json(list) = units(State(state.clone())).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].lat, 48.85);

        let Json(found) = unit(State(state.clone()), Path("ANDROID-1".to_string()))
            .await
            .unwrap();
        assert_eq!(found.cot_type, "a-f-G-U-C");

        let missing = unit(State(state), Path("nope".to_string())).await.unwrap_err();
        assert_eq!(missing.code, 404);
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_info() {
        let Json(body) = info().await;
        assert_eq!(body["name"], "cot-relay");
        assert_eq!(body["api_version"], "v1");
    }

    #[tokio::test]
    async fn test_serve_over_http() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (state, _rx) = state_with_traffic().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, state, cancel.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/v1/units/nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
