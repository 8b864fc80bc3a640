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

//! Error types for the ledger service.
//!
//! Every fallible operation in the crate surfaces a [`LedgerError`] variant,
//! and the HTTP layer maps each variant to a status code. Handlers never
//! invent status codes of their own.

use thiserror::Error;

/// Ledger service errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed request: bad JSON, missing field, out-of-range parameter.
    #[error("{0}")]
    Validation(String),

    /// Account lookup by ID found no row.
    #[error("account not found")]
    AccountNotFound,

    /// The transfer's source account does not exist.
    #[error("source account not found")]
    SourceAccountNotFound,

    /// The transfer's destination account does not exist.
    #[error("destination account not found")]
    DestinationAccountNotFound,

    /// Entry lookup by ID found no row.
    #[error("entry not found")]
    EntryNotFound,

    /// Transaction lookup by ID found no row.
    #[error("transaction not found")]
    TransactionNotFound,

    /// No unexpired stored response for the `(key, method, path)` triple.
    #[error("idempotency key not found")]
    IdempotencyKeyNotFound,

    /// Transfer source and destination are the same account.
    #[error("cannot transfer to the same account")]
    SameAccount,

    /// Request currency differs from one of the account currencies.
    #[error("currency mismatch between accounts")]
    CurrencyMismatch,

    /// The locked source balance does not cover the transfer amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Account deletion blocked by referencing entries or transactions.
    #[error("account has existing entries or transactions")]
    AccountHasReferences,

    /// Request body exceeds the configured limit.
    #[error("request body too large")]
    BodyTooLarge,

    /// The worker pool no longer accepts commands.
    #[error("worker pool shutting down")]
    ShuttingDown,

    /// Underlying store failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else that should never reach a client verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::LedgerError;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::Validation("limit must be between 1 and 100".to_string()).to_string(),
            "limit must be between 1 and 100"
        );
        assert_eq!(LedgerError::AccountNotFound.to_string(), "account not found");
        assert_eq!(
            LedgerError::SourceAccountNotFound.to_string(),
            "source account not found"
        );
        assert_eq!(
            LedgerError::DestinationAccountNotFound.to_string(),
            "destination account not found"
        );
        assert_eq!(LedgerError::EntryNotFound.to_string(), "entry not found");
        assert_eq!(LedgerError::TransactionNotFound.to_string(), "transaction not found");
        assert_eq!(
            LedgerError::IdempotencyKeyNotFound.to_string(),
            "idempotency key not found"
        );
        assert_eq!(
            LedgerError::SameAccount.to_string(),
            "cannot transfer to the same account"
        );
        assert_eq!(
            LedgerError::CurrencyMismatch.to_string(),
            "currency mismatch between accounts"
        );
        assert_eq!(LedgerError::InsufficientBalance.to_string(), "insufficient balance");
        assert_eq!(
            LedgerError::AccountHasReferences.to_string(),
            "account has existing entries or transactions"
        );
        assert_eq!(LedgerError::BodyTooLarge.to_string(), "request body too large");
        assert_eq!(LedgerError::ShuttingDown.to_string(), "worker pool shutting down");
        assert_eq!(
            LedgerError::Internal("oneshot closed".to_string()).to_string(),
            "internal error: oneshot closed"
        );
    }
}
