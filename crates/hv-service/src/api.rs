use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use hv_types::{Address, Amount};
use serde::Deserialize;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::ServiceError;
use crate::flows::{ConfirmDeposit, ConfirmWithdrawal, Service};

pub type SharedService = Arc<Service>;

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route(
            "/v1/stats",
            get(stats).layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=30"),
            )),
        )
        .route("/v1/root", get(root))
        .route("/v1/witness/{leaf_index}", get(witness))
        .route("/v1/max-deposit/{address}", get(max_deposit))
        .route("/v1/deposit", post(deposit))
        .route("/v1/confirm-deposit", post(confirm_deposit))
        .route("/v1/withdraw", post(withdraw))
        .route("/v1/confirm-withdraw", post(confirm_withdraw))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(service)
}

// ── Request bodies ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DepositRequest {
    /// Decimal coin amount, e.g. `"1.5"`.
    pub amount: String,
    pub address: String,
}

#[derive(Deserialize)]
pub struct ConfirmDepositRequest {
    pub amount: String,
    pub address: String,
    pub note: String,
    /// Base64 signed payment from the depositor's wallet.
    pub signed_txn: String,
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub amount: String,
    pub address: String,
    pub note: String,
}

#[derive(Deserialize)]
pub struct ConfirmWithdrawRequest {
    pub amount: String,
    pub address: String,
    pub note: String,
    pub change_note: String,
    /// Hex-encoded proof.
    pub proof: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(service): State<SharedService>) -> Result<impl IntoResponse, ServiceError> {
    let stats = service.stats()?;
    Ok(Json(json!({
        "deposit_total": stats.deposit_total,
        "withdrawal_total": stats.withdrawal_total,
        "fee_total": stats.fee_total,
        "tvl": stats.tvl(),
        "deposit_count": stats.deposit_count,
        "note_count": stats.note_count,
        "spent_note_count": stats.spent_note_count(),
    })))
}

async fn root(State(service): State<SharedService>) -> Result<impl IntoResponse, ServiceError> {
    let (root, leaf_count) = service.root()?;
    Ok(Json(json!({
        "root": hex::encode(root),
        "leaf_count": leaf_count,
    })))
}

async fn witness(
    State(service): State<SharedService>,
    Path(leaf_index): Path<u64>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(service.merkle_witness(leaf_index)?))
}

async fn max_deposit(
    State(service): State<SharedService>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = parse_address(&address)?;
    let max = service.max_deposit(&address).await?;
    Ok(Json(json!({ "max_amount": max })))
}

async fn deposit(
    State(service): State<SharedService>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let amount = parse_amount(&req.amount)?;
    let address = parse_address(&req.address)?;
    let ticket = service.prepare_deposit(amount, address).await?;
    Ok(Json(ticket))
}

async fn confirm_deposit(
    State(service): State<SharedService>,
    Json(req): Json<ConfirmDepositRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let form = ConfirmDeposit {
        amount: parse_amount(&req.amount)?,
        address: parse_address(&req.address)?,
        note_text: req.note,
        signed_txn: req.signed_txn,
    };
    Ok(Json(service.confirm_deposit(form).await?))
}

async fn withdraw(
    State(service): State<SharedService>,
    Json(req): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let amount = parse_amount(&req.amount)?;
    let address = parse_address(&req.address)?;
    let data = service.prepare_withdrawal(amount, address, &req.note)?;
    Ok(Json(json!({
        "amount": data.amount,
        "fee": data.fee,
        "address": data.address,
        "change_amount": Amount::new(data.change_note.amount),
        "change_note": data.change_note.text(),
        "leaf_index": data.from_note.leaf_index(),
    })))
}

async fn confirm_withdraw(
    State(service): State<SharedService>,
    Json(req): Json<ConfirmWithdrawRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let proof = hex::decode(req.proof.trim().trim_start_matches("0x"))
        .map_err(|_| ServiceError::BadRequest("proof is not valid hex".into()))?;
    let form = ConfirmWithdrawal {
        amount: parse_amount(&req.amount)?,
        address: parse_address(&req.address)?,
        note_text: req.note,
        change_note_text: req.change_note,
        proof,
    };
    Ok(Json(service.confirm_withdrawal(form).await?))
}

fn parse_amount(input: &str) -> Result<u64, ServiceError> {
    Amount::parse_decimal(input)
        .map(|a| a.units)
        .map_err(|e| ServiceError::Validation(e.to_string()))
}

fn parse_address(input: &str) -> Result<Address, ServiceError> {
    Address::parse(input).map_err(|e| ServiceError::Validation(e.to_string()))
}
