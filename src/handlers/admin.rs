//! Operator routes. Mounted under `/admin` behind `operator_auth`.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::pix::parse_transaction_id;
use crate::error::AppError;
use crate::middleware::Operator;
use crate::services::settlement::SettlementOutcome;
use crate::validation::{sanitize_string, validate_confirmation_id};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManualConfirmRequest {
    pub bank_transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 1000;

pub async fn confirm_transaction(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
    Json(request): Json<ManualConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_transaction_id(&id)?;
    let bank_transaction_id = sanitize_string(&request.bank_transaction_id);
    validate_confirmation_id(&bank_transaction_id)?;

    let outcome = state
        .settlement
        .manual_confirm(id, &bank_transaction_id, &operator.0)
        .await?;

    let message = match &outcome {
        SettlementOutcome::Settled(_) => "Payment confirmed manually",
        _ => "Payment already confirmed",
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "transaction": outcome.transaction(),
    })))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_transaction_id(&id)?;
    let tx = state.store.get_by_id(id).await?;

    Ok(Json(json!({
        "success": true,
        "transaction": tx,
    })))
}

pub async fn list_expiring(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, AppError> {
    let minutes = query
        .minutes
        .unwrap_or(state.config.sweep.expiring_window_minutes);
    if !(0..=24 * 60).contains(&minutes) {
        return Err(AppError::Validation(
            "minutes must be between 0 and 1440".to_string(),
        ));
    }

    let transactions = state.sweeper.list_expiring(minutes).await?;

    Ok(Json(json!({
        "success": true,
        "windowMinutes": minutes,
        "count": transactions.len(),
        "transactions": transactions,
    })))
}

pub async fn cleanup_expired(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.sweeper.purge_expired().await?;
    tracing::info!(
        operator = %operator.0,
        expired = report.expired.len(),
        deleted = report.deleted,
        "Expired payment cleanup requested"
    );

    Ok(Json(json!({
        "success": true,
        "expired": report.expired.len(),
        "expiredIds": report.expired,
        "deleted": report.deleted,
        "attemptsDeleted": report.attempts_deleted,
    })))
}

pub async fn resync_bookings(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let resynced = state.sweeper.resync_bookings().await?;

    Ok(Json(json!({
        "success": true,
        "resynced": resynced,
    })))
}

pub async fn run_sweep(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.sweeper.run_once().await?;

    Ok(Json(json!({
        "success": true,
        "report": report,
    })))
}

pub async fn reconciliation_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let attempts = state.sweeper.reconciliation_history(limit).await?;

    Ok(Json(json!({
        "success": true,
        "count": attempts.len(),
        "attempts": attempts,
    })))
}

pub async fn reconciliation_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.sweeper.reconciliation_stats().await?;

    Ok(Json(json!({
        "success": true,
        "stats": stats,
    })))
}
