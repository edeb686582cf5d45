use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::FireplaceCommand;
use crate::engine::FireplaceState;
use crate::engine::SendError;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct PowerRequest {
    on: bool,
}

#[derive(Deserialize)]
struct HeightRequest {
    height: u8,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/fireplaces
///
/// Returns the engine's last-known snapshot; a device that never answered a
/// poll is simply absent rather than reported with guessed state.
#[tracing::instrument(skip(state))]
async fn list_fireplaces(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<String, FireplaceState>> {
    Json(state.engine.state_snapshot().fireplaces.clone())
}

/// Handler for POST /v1/fireplaces/:serial/power
#[tracing::instrument(skip(state, request))]
async fn set_power(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
    Json(request): Json<PowerRequest>,
) -> impl IntoResponse {
    send_command(&state.engine, &serial, FireplaceCommand::Power(request.on)).await
}

/// Handler for POST /v1/fireplaces/:serial/refresh
///
/// Forces a live query outside the device's poll schedule. The result lands
/// in the snapshot asynchronously; this only acknowledges the request.
#[tracing::instrument(skip(state))]
async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> impl IntoResponse {
    match state.engine.request_refresh(&serial) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Handler for POST /v1/fireplaces/:serial/height
#[tracing::instrument(skip(state, request))]
async fn set_height(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
    Json(request): Json<HeightRequest>,
) -> impl IntoResponse {
    if !(1..=5).contains(&request.height) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: format!("height {} outside valid range 1-5", request.height),
            }),
        )
            .into_response();
    }
    send_command(
        &state.engine,
        &serial,
        FireplaceCommand::Height(request.height),
    )
    .await
    .into_response()
}

async fn send_command(
    engine: &Engine,
    serial: &str,
    command: FireplaceCommand,
) -> axum::response::Response {
    match engine.send_fireplace_command(serial, command).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            let status = match &e {
                SendError::UnknownSerial(_) => StatusCode::NOT_FOUND,
                SendError::Rejected(_) => StatusCode::BAD_GATEWAY,
                SendError::IntegrationGone(_) | SendError::Dropped => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/fireplaces", get(list_fireplaces))
        .route("/v1/fireplaces/:serial/power", post(set_power))
        .route("/v1/fireplaces/:serial/height", post(set_height))
        .route("/v1/fireplaces/:serial/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
