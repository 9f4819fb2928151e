//! # REST + WebSocket API
//!
//! The devnet node's HTTP face over the reference ledger and blob store.
//! Handlers share state through axum's `State` extractor.
//!
//! Mutating ledger calls identify the caller by the `x-caller-address`
//! header. The devnet trusts it as given; a deployment puts an
//! authenticating proxy in front.
//!
//! ## Endpoints
//!
//! | Method | Path                                          | Description                  |
//! |--------|-----------------------------------------------|------------------------------|
//! | GET    | `/health`                                     | Liveness probe               |
//! | GET    | `/status`                                     | Node status summary          |
//! | GET    | `/ws`                                         | Live delivery events         |
//! | POST   | `/blobs`                                      | Store a ciphertext blob      |
//! | GET    | `/blobs/:hash`                                | Fetch a blob by content hash |
//! | POST   | `/deliveries`                                 | Create a delivery            |
//! | GET    | `/deliveries`                                 | List ids (`?address=`)       |
//! | GET    | `/deliveries/:id`                             | Delivery overview            |
//! | POST   | `/deliveries/:id/accept`                      | Record an acceptance         |
//! | POST   | `/deliveries/:id/finish`                      | Record a response            |
//! | POST   | `/deliveries/:id/settle`                      | Pay out the deposit          |
//! | GET    | `/deliveries/:id/receivers/:address`          | Recorded receiver values     |
//! | GET    | `/deliveries/:id/receivers/:address/status`   | Receiver status              |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use edelivery_contracts::{
    AcceptCall, CreateDeliveryCall, DeliveryError, DeliveryId, DeliveryStatus, Ledger,
    LedgerError,
};
use edelivery_protocol::identity::Address;
use edelivery_protocol::storage::{BlobError, BlobStore, ContentHash};

use crate::metrics::SharedMetrics;

/// Header carrying the caller's address.
pub const CALLER_HEADER: &str = "x-caller-address";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network name.
    pub network: String,
    /// The ledger served by this node.
    pub ledger: Arc<dyn Ledger>,
    /// The blob store served by this node.
    pub blobs: Arc<dyn BlobStore>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A delivery was registered.
    DeliveryCreated {
        id: DeliveryId,
        sender: Address,
        receivers: Vec<Address>,
    },
    /// A receiver accepted.
    DeliveryAccepted { id: DeliveryId, receiver: Address },
    /// The sender answered a receiver.
    DeliveryFinished { id: DeliveryId, receiver: Address },
    /// The deposit was paid out.
    DeliverySettled { id: DeliveryId, total: u64 },
}

impl AppState {
    fn publish(&self, event: NodeEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/blobs", post(put_blob_handler))
        .route("/blobs/:hash", get(get_blob_handler))
        .route(
            "/deliveries",
            post(create_delivery_handler).get(list_deliveries_handler),
        )
        .route("/deliveries/:id", get(delivery_handler))
        .route("/deliveries/:id/accept", post(accept_handler))
        .route("/deliveries/:id/finish", post(finish_handler))
        .route("/deliveries/:id/settle", post(settle_handler))
        .route(
            "/deliveries/:id/receivers/:address",
            get(receiver_state_handler),
        )
        .route(
            "/deliveries/:id/receivers/:address/status",
            get(receiver_status_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deliveries`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDeliveryRequest {
    /// Creation arguments.
    pub call: CreateDeliveryCall,
    /// Deposit accompanying the call.
    pub value: u64,
}

/// Response of `POST /deliveries`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDeliveryResponse {
    /// The new delivery's id.
    pub id: DeliveryId,
}

/// Body of `POST /deliveries/:id/finish`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinishRequest {
    /// The receiver being answered.
    pub receiver: Address,
    /// The response `r`.
    pub r: String,
}

/// Response of `POST /blobs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutBlobResponse {
    /// Content address of the stored bytes.
    pub hash: ContentHash,
}

/// Response of the status endpoint for one receiver.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiverStatusResponse {
    /// Current status.
    pub status: DeliveryStatus,
}

/// Query of `GET /deliveries`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only deliveries this address takes part in.
    pub address: Option<Address>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network name.
    pub network: String,
    /// Deliveries registered.
    pub deliveries: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Generic error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::Rejected(rejection) => match rejection {
                DeliveryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                DeliveryError::UnknownDelivery(_) | DeliveryError::UnknownReceiver(_) => {
                    StatusCode::NOT_FOUND
                }
                DeliveryError::InvalidState { .. }
                | DeliveryError::DeadlineExceeded { .. }
                | DeliveryError::NotSettleable(_)
                | DeliveryError::AlreadySettled => StatusCode::CONFLICT,
                DeliveryError::InsufficientDeposit { .. } => StatusCode::PAYMENT_REQUIRED,
                DeliveryError::InvalidParameters(_)
                | DeliveryError::InvalidResponse
                | DeliveryError::Crypto(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            LedgerError::Malformed(_) => StatusCode::BAD_REQUEST,
            LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        let status = match &e {
            BlobError::NotFound(_) => StatusCode::NOT_FOUND,
            BlobError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BlobError::Serialization(_) => StatusCode::BAD_REQUEST,
            BlobError::IntegrityMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn caller(headers: &HeaderMap) -> Result<Address, ApiError> {
    let value = headers.get(CALLER_HEADER).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            format!("missing {} header", CALLER_HEADER),
        )
    })?;
    value
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("invalid {} header", CALLER_HEADER),
            )
        })
}

/// Times a ledger command and counts it as rejected on failure.
async fn command<T>(
    state: &AppState,
    fut: impl std::future::Future<Output = Result<T, LedgerError>>,
) -> Result<T, ApiError> {
    let started = Instant::now();
    let out = fut.await;
    state
        .metrics
        .command_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    out.map_err(|e| {
        if !e.is_retryable() {
            state.metrics.commands_rejected_total.inc();
        }
        tracing::debug!(error = %e, "ledger command failed");
        ApiError::from(e)
    })
}

// ---------------------------------------------------------------------------
// Node Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let deliveries = state.ledger.deliveries().await?.len() as u64;
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        deliveries,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /ws` — WebSocket upgrade for live event streaming. Client
/// messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Blob Handlers
// ---------------------------------------------------------------------------

/// `POST /blobs` — stores the raw request body.
async fn put_blob_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let hash = state.blobs.put(&body).await?;
    state.metrics.blobs_stored_total.inc();
    tracing::debug!(%hash, len = body.len(), "blob stored");
    Ok((StatusCode::CREATED, Json(PutBlobResponse { hash })))
}

/// `GET /blobs/:hash` — returns the stored bytes.
async fn get_blob_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let hash: ContentHash = hash.parse()?;
    let bytes = state.blobs.get(&hash).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

// ---------------------------------------------------------------------------
// Delivery Handlers
// ---------------------------------------------------------------------------

/// `POST /deliveries` — registers a delivery owned by the caller.
async fn create_delivery_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = caller(&headers)?;
    let receivers = req.call.receivers.clone();
    let id = command(
        &state,
        state.ledger.create_delivery(sender, req.call, req.value),
    )
    .await?;

    state.metrics.deliveries_created_total.inc();
    state.publish(NodeEvent::DeliveryCreated {
        id,
        sender,
        receivers,
    });
    Ok((StatusCode::CREATED, Json(CreateDeliveryResponse { id })))
}

/// `GET /deliveries` — every id, or those `?address=` takes part in.
async fn list_deliveries_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = match query.address {
        Some(address) => state.ledger.deliveries_of(address).await?,
        None => state.ledger.deliveries().await?,
    };
    Ok(Json(ids))
}

/// `GET /deliveries/:id` — delivery overview.
async fn delivery_handler(
    Path(id): Path<DeliveryId>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.delivery(id).await?))
}

/// `POST /deliveries/:id/accept` — the caller accepts.
async fn accept_handler(
    Path(id): Path<DeliveryId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(call): Json<AcceptCall>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver = caller(&headers)?;
    command(&state, state.ledger.accept(receiver, id, call)).await?;

    state.metrics.deliveries_accepted_total.inc();
    state.publish(NodeEvent::DeliveryAccepted { id, receiver });
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /deliveries/:id/finish` — the caller answers a receiver.
async fn finish_handler(
    Path(id): Path<DeliveryId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FinishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = caller(&headers)?;
    command(&state, state.ledger.finish(sender, id, req.receiver, req.r)).await?;

    state.metrics.deliveries_finished_total.inc();
    state.publish(NodeEvent::DeliveryFinished {
        id,
        receiver: req.receiver,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /deliveries/:id/settle` — pays out the deposit.
async fn settle_handler(
    Path(id): Path<DeliveryId>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let who = caller(&headers)?;
    let settlement = command(&state, state.ledger.settle(who, id)).await?;

    state.metrics.deliveries_settled_total.inc();
    state.publish(NodeEvent::DeliverySettled {
        id,
        total: settlement.total(),
    });
    Ok(Json(settlement))
}

/// `GET /deliveries/:id/receivers/:address` — recorded values.
async fn receiver_state_handler(
    Path((id, receiver)): Path<(DeliveryId, Address)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.receivers_state(id, receiver).await?))
}

/// `GET /deliveries/:id/receivers/:address/status` — status only.
async fn receiver_status_handler(
    Path((id, receiver)): Path<(DeliveryId, Address)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.ledger.get_state(id, receiver).await?;
    Ok(Json(ReceiverStatusResponse { status }))
}
