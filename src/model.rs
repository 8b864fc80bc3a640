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

//! Domain types and request/response shapes.
//!
//! Monetary amounts are signed 64-bit integers in minor units (cents).
//! Currency is validated against the supported set at the request edge;
//! the store treats it as an opaque string.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::LedgerError;

/// Currencies accepted at the API edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Brl,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Brl => "BRL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A holder of a single-currency balance.
///
/// `balance` is never persisted negative; the transfer path checks the
/// locked row before debiting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A signed, append-only change to one account's balance.
///
/// The sign encodes direction: negative for debits, positive for credits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A paired debit/credit record linking two accounts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A stored response for an `(idempotency_key, method, path)` triple.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub response_body: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /api/v1/accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub owner: String,
    pub currency: Currency,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.owner.trim().is_empty() {
            return Err(LedgerError::Validation("owner must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Body of `POST /api/v1/transactions`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
}

impl TransferRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::Validation("amount must be positive".to_string()));
        }
        Ok(())
    }
}

/// Everything a committed transfer produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub transaction: Transaction,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Pagination parameters shared by the listing endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListParams {
    #[serde(default = "ListParams::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl ListParams {
    const MAX_LIMIT: i64 = 100;

    fn default_limit() -> i64 {
        10
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.limit < 1 || self.limit > Self::MAX_LIMIT {
            return Err(LedgerError::Validation(
                "limit must be between 1 and 100".to_string(),
            ));
        }
        if self.offset < 0 {
            return Err(LedgerError::Validation("offset must be non-negative".to_string()));
        }
        Ok(())
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_accepts_supported_codes() {
        let usd: Currency = serde_json::from_str("\"USD\"").unwrap();
        assert_eq!(usd, Currency::Usd);
        assert_eq!(usd.to_string(), "USD");

        let eur: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(eur.as_str(), "EUR");

        let brl: Currency = serde_json::from_str("\"BRL\"").unwrap();
        assert_eq!(brl.as_str(), "BRL");
    }

    #[test]
    fn currency_rejects_unsupported_codes() {
        assert!(serde_json::from_str::<Currency>("\"GBP\"").is_err());
        assert!(serde_json::from_str::<Currency>("\"usd\"").is_err());
    }

    #[test]
    fn create_account_request_rejects_blank_owner() {
        let req = CreateAccountRequest {
            owner: "   ".to_string(),
            currency: Currency::Usd,
        };
        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn transfer_request_rejects_non_positive_amounts() {
        let mut req = TransferRequest {
            from_account_id: Uuid::new_v4(),
            to_account_id: Uuid::new_v4(),
            amount: 0,
            currency: Currency::Usd,
        };
        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));

        req.amount = -5;
        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));

        req.amount = 1;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn transfer_request_requires_all_fields() {
        let missing_amount = r#"{"from_account_id":"11111111-1111-1111-1111-111111111111",
            "to_account_id":"22222222-2222-2222-2222-222222222222","currency":"USD"}"#;
        assert!(serde_json::from_str::<TransferRequest>(missing_amount).is_err());
    }

    #[test]
    fn list_params_defaults_and_bounds() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 10);
        assert_eq!(params.offset, 0);
        assert!(params.validate().is_ok());

        let too_big = ListParams { limit: 101, offset: 0 };
        assert!(too_big.validate().is_err());

        let zero = ListParams { limit: 0, offset: 0 };
        assert!(zero.validate().is_err());

        let negative_offset = ListParams { limit: 10, offset: -1 };
        assert!(negative_offset.validate().is_err());

        let max = ListParams { limit: 100, offset: 0 };
        assert!(max.validate().is_ok());
    }
}
