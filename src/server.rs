// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP surface: router, handlers, and the error-to-status mapping.
//!
//! The mapping from [`LedgerError`] to a status code is a total function
//! of the variant; handlers return errors and never pick status codes
//! themselves. Error bodies are `{"error": ..., "code": ...}` and server
//! errors carry a generic message with the cause logged server-side.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::engine::Engine;
use crate::error::LedgerError;
use crate::idempotency;
use crate::model::{Account, CreateAccountRequest, ListParams, TransferRequest};
use crate::store::{AccountStore, EntryStore, IdempotencyStore, TransactionStore};

/// Maximum accepted request body, enforced before JSON binding.
pub const MAX_BODY_SIZE: usize = 1 << 20; // 1 MiB

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub accounts: AccountStore,
    pub entries: EntryStore,
    pub transactions: TransactionStore,
    pub idempotency: IdempotencyStore,
    pub engine: Engine,
}

impl AppState {
    pub fn new(pool: PgPool, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            accounts: AccountStore::new(pool.clone()),
            entries: EntryStore::new(pool.clone()),
            transactions: TransactionStore::new(pool.clone()),
            idempotency: IdempotencyStore::new(pool.clone()),
            engine: Engine::new(pool.clone(), dispatcher),
            pool,
        }
    }
}

/// Error body shape shared by every failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl LedgerError {
    /// The status code and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            LedgerError::SameAccount => (StatusCode::BAD_REQUEST, "SAME_ACCOUNT"),
            LedgerError::CurrencyMismatch => (StatusCode::BAD_REQUEST, "CURRENCY_MISMATCH"),
            LedgerError::AccountNotFound
            | LedgerError::SourceAccountNotFound
            | LedgerError::DestinationAccountNotFound => {
                (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND")
            }
            LedgerError::EntryNotFound => (StatusCode::NOT_FOUND, "ENTRY_NOT_FOUND"),
            LedgerError::TransactionNotFound => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
            LedgerError::IdempotencyKeyNotFound => {
                (StatusCode::NOT_FOUND, "IDEMPOTENCY_KEY_NOT_FOUND")
            }
            LedgerError::InsufficientBalance => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
            }
            LedgerError::AccountHasReferences => {
                (StatusCode::CONFLICT, "ACCOUNT_HAS_REFERENCES")
            }
            LedgerError::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "BODY_TOO_LARGE"),
            LedgerError::ShuttingDown => (StatusCode::INTERNAL_SERVER_ERROR, "SHUTTING_DOWN"),
            LedgerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE"),
            LedgerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Builds the full application router.
///
/// The idempotency middleware wraps only the versioned API; probes stay
/// outside it. `request_timeout` bounds each in-flight request.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/{id}", get(get_account).delete(delete_account))
        .route("/accounts/{id}/entries", get(list_account_entries))
        .route("/accounts/{id}/transactions", get(list_account_transactions))
        .route("/entries/{id}", get(get_entry))
        .route("/transactions", axum::routing::post(create_transfer))
        .route("/transactions/{id}", get(get_transaction))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency::idempotency,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

// === Probes ===

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn readyz(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Json(json!({"status": "ready"})).into_response(),
        Err(err) => {
            error!(error = %err, "readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "error": "database connection failed",
                })),
            )
                .into_response()
        }
    }
}

// === Accounts ===

async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Json(req) = payload.map_err(invalid_json)?;
    req.validate()?;

    let account = state.accounts.create(req.owner.trim(), req.currency).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Account>, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("account"))?;
    Ok(Json(state.accounts.get(id).await?))
}

async fn list_accounts(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Query(params) = params.map_err(invalid_query)?;
    params.validate()?;
    Ok(Json(state.accounts.list(params).await?))
}

async fn delete_account(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("account"))?;
    state.accounts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Entries ===

async fn get_entry(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("entry"))?;
    Ok(Json(state.entries.get(id).await?))
}

async fn list_account_entries(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("account"))?;
    let Query(params) = params.map_err(invalid_query)?;
    params.validate()?;
    Ok(Json(state.entries.list_by_account(id, params).await?))
}

// === Transactions ===

async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Json(req) = payload.map_err(invalid_json)?;
    let result = state.engine.transfer(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn get_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("transaction"))?;
    Ok(Json(state.transactions.get(id).await?))
}

async fn list_account_transactions(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Path(id) = id.map_err(|_| invalid_id("account"))?;
    let Query(params) = params.map_err(invalid_query)?;
    params.validate()?;
    Ok(Json(state.transactions.list_by_account(id, params).await?))
}

// === Rejection mapping ===

fn invalid_json(rejection: JsonRejection) -> LedgerError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        LedgerError::BodyTooLarge
    } else {
        LedgerError::Validation(rejection.body_text())
    }
}

fn invalid_query(rejection: QueryRejection) -> LedgerError {
    LedgerError::Validation(rejection.body_text())
}

fn invalid_id(what: &str) -> LedgerError {
    LedgerError::Validation(format!("invalid {what} id"))
}
