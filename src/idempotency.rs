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

//! Idempotent request replay middleware.
//!
//! Requests carrying an `Idempotency-Key` header are scoped by
//! `(key, method, route pattern)`. A stored, unexpired response for the
//! triple is replayed verbatim; otherwise the handler runs, its response
//! body is buffered, and 2xx responses are persisted for later replay.
//!
//! These are reply-cache semantics, not mutual exclusion: two concurrent
//! first-time requests with the same key may both execute, and at most one
//! stored response wins the insert race.

use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use tracing::{debug, error};

use crate::error::LedgerError;
use crate::model::IdempotencyRecord;
use crate::server::AppState;

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const MAX_KEY_LENGTH: usize = 255;

/// Replays stored responses and records fresh successful ones.
pub async fn idempotency(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> axum::response::Response {
    let Some(raw_key) = request.headers().get(IDEMPOTENCY_KEY_HEADER) else {
        return next.run(request).await;
    };

    let key = match raw_key.to_str() {
        Ok(key) => key.to_owned(),
        Err(_) => {
            return LedgerError::Validation("idempotency key must be valid ASCII".to_string())
                .into_response();
        }
    };
    if key.len() > MAX_KEY_LENGTH {
        return LedgerError::Validation(
            "idempotency key must be at most 255 characters".to_string(),
        )
        .into_response();
    }

    let method = request.method().to_string();
    // Scope by the route pattern, not the raw URI, so `/accounts/{id}`
    // with two different IDs still shares one scope per route.
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    match state.idempotency.find(&key, &method, &path).await {
        Ok(cached) => {
            debug!(%key, %method, %path, "idempotency cache hit");
            return replay(cached);
        }
        Err(LedgerError::IdempotencyKeyNotFound) => {}
        Err(err) => return err.into_response(),
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    // Buffer the body so the stored response is byte-identical to what the
    // client received. Buffering only happens when the key is present.
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "failed to buffer response body");
            return LedgerError::Internal("response buffering failed".to_string()).into_response();
        }
    };

    if let Err(err) = state
        .idempotency
        .store(&key, &method, &path, i32::from(parts.status.as_u16()), &bytes)
        .await
    {
        error!(%key, error = %err, "failed to store idempotency key");
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn replay(record: IdempotencyRecord) -> axum::response::Response {
    let status = StatusCode::from_u16(record.status_code as u16).unwrap_or(StatusCode::OK);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(record.response_body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
