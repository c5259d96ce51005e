//! REST service exposing the reference registry.
//!
//! This module contains the wire types, handlers and router builder used by
//! the `registry` binary, the [`HttpLedger`](crate::http::HttpLedger) client
//! and the integration tests.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use use_delegation_sdk::{
    CapabilityId, CapabilityState, Ledger, LedgerError, MemoryLedger, PrincipalId, RegistryError,
    SignatureStatus, SignedOperation, TxSignature,
};

// ─── App State ───────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub ledger: MemoryLedger,
}

// ─── Request / Response DTOs ─────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AirdropReq {
    pub recipient: PrincipalId,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub signature: TxSignature,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: PrincipalId,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub slot: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RegistryError>,
}

// ─── Error helpers ───────────────────────────────────────────

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.into(),
            rejection: None,
        }),
    )
}

fn not_found(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: msg.into(),
            rejection: None,
        }),
    )
}

fn internal(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: msg.into(),
            rejection: None,
        }),
    )
}

fn rejected(rejection: RegistryError) -> ApiError {
    warn!(%rejection, "transaction rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: rejection.to_string(),
            rejection: Some(rejection),
        }),
    )
}

fn ledger_error(e: LedgerError) -> ApiError {
    match e {
        LedgerError::Rejected(r) => rejected(r),
        LedgerError::InvalidRequest(msg) => bad_request(msg),
        other => internal(other.to_string()),
    }
}

type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

// ─── Slot clock ──────────────────────────────────────────────

/// Start the background task that advances the registry slot. Periods
/// shorter than a millisecond are raised to one.
pub fn start_slot_clock(
    state: AppState,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    let interval = interval.max(std::time::Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.ledger.advance_slot().await;
        }
    })
}

// ─── GET /health ─────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            slot: state.ledger.slot().await,
        }),
    ))
}

// ─── POST /airdrop ───────────────────────────────────────────

async fn airdrop(
    State(state): State<AppState>,
    Json(req): Json<AirdropReq>,
) -> ApiResult<SignatureResponse> {
    let signature = state
        .ledger
        .request_airdrop(&req.recipient, req.amount)
        .await
        .map_err(ledger_error)?;
    info!(recipient = %req.recipient, amount = req.amount, %signature, "airdrop");
    Ok((StatusCode::CREATED, Json(SignatureResponse { signature })))
}

// ─── POST /transactions ──────────────────────────────────────

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<SignedOperation>,
) -> ApiResult<SignatureResponse> {
    let mut registry = state.ledger.registry().lock().await;
    let already_processed = registry.signature_status(&tx.signature).is_some();
    let signature = registry.process(&tx).map_err(rejected)?;
    let status = if already_processed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(SignatureResponse { signature })))
}

// ─── GET /transactions/{signature} ───────────────────────────

async fn get_transaction(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> ApiResult<SignatureStatus> {
    let signature: TxSignature = signature.parse().map_err(|e| bad_request(format!("{e}")))?;
    let status = state
        .ledger
        .signature_status(&signature)
        .await
        .map_err(ledger_error)?
        .ok_or_else(|| not_found("transaction not found"))?;
    Ok((StatusCode::OK, Json(status)))
}

// ─── GET /accounts/{address} ─────────────────────────────────

async fn get_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let address: PrincipalId = address.parse().map_err(|e| bad_request(format!("{e}")))?;
    let balance = state
        .ledger
        .get_balance(&address)
        .await
        .map_err(ledger_error)?;
    Ok((StatusCode::OK, Json(BalanceResponse { address, balance })))
}

// ─── GET /capabilities/{id} ──────────────────────────────────

async fn get_capability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CapabilityState> {
    let id: CapabilityId = id.parse().map_err(|e| bad_request(format!("{e}")))?;
    let capability = state
        .ledger
        .get_capability(&id)
        .await
        .map_err(ledger_error)?
        .ok_or_else(|| not_found("capability not found"))?;
    Ok((StatusCode::OK, Json(capability)))
}

// ─── Router ──────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/airdrop", post(airdrop))
        .route("/transactions", post(submit_transaction))
        .route("/transactions/{signature}", get(get_transaction))
        .route("/accounts/{address}", get(get_account))
        .route("/capabilities/{id}", get(get_capability))
        .with_state(state)
}
