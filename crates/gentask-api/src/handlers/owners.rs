//! Owner balance handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use gentask_ledger::CreditLedger;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub owner_id: String,
    pub balance: u32,
}

/// Current spendable balance for an owner.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state
        .ledger
        .balance(&owner_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(BalanceResponse { owner_id, balance }))
}

/// Credit top-up request.
#[derive(Deserialize)]
pub struct TopUpRequest {
    pub amount: u32,
}

/// Add credits to an owner's balance (admin grant / top-up).
pub async fn top_up(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(req): Json<TopUpRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    if req.amount == 0 {
        return Err(ApiError::bad_request("amount must be positive"));
    }

    state.ledger.credit(&owner_id, req.amount).await;
    let balance = state
        .ledger
        .balance(&owner_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(BalanceResponse { owner_id, balance }))
}
