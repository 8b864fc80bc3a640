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

//! Persistence primitives over PostgreSQL.
//!
//! Each store wraps the shared [`PgPool`]. Operations that must run inside
//! a surrounding database transaction take a `&mut PgConnection` instead of
//! using the pool; read-only operations outside any transaction go through
//! the pool directly. The two shapes are deliberate — a nullable handle
//! hides which callers are transactional.

use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::model::{Account, Currency, Entry, IdempotencyRecord, ListParams, Transaction};

/// PostgreSQL error code for foreign-key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Account persistence.
#[derive(Debug, Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, owner: &str, currency: Currency) -> Result<Account, LedgerError> {
        let account = sqlx::query_as(
            "INSERT INTO accounts (owner, currency) VALUES ($1, $2)
             RETURNING id, owner, balance, currency, created_at, updated_at",
        )
        .bind(owner)
        .bind(currency.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get(&self, id: Uuid) -> Result<Account, LedgerError> {
        sqlx::query_as(
            "SELECT id, owner, balance, currency, created_at, updated_at
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::AccountNotFound)
    }

    /// Fetches an account under a `FOR NO KEY UPDATE` row lock.
    ///
    /// The lock blocks concurrent balance updates and deletes of this row
    /// while still permitting key-referencing inserts (entries and
    /// transactions) from other database transactions.
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Account, LedgerError> {
        sqlx::query_as(
            "SELECT id, owner, balance, currency, created_at, updated_at
             FROM accounts WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(LedgerError::AccountNotFound)
    }

    /// Applies a signed delta to the balance and returns the updated row.
    pub async fn add_balance(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        delta: i64,
    ) -> Result<Account, LedgerError> {
        sqlx::query_as(
            "UPDATE accounts SET balance = balance + $1, updated_at = now() WHERE id = $2
             RETURNING id, owner, balance, currency, created_at, updated_at",
        )
        .bind(delta)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn list(&self, params: ListParams) -> Result<Vec<Account>, LedgerError> {
        let accounts = sqlx::query_as(
            "SELECT id, owner, balance, currency, created_at, updated_at
             FROM accounts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    /// Deletes an account with no referencing rows.
    pub async fn delete(&self, id: Uuid) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(LedgerError::AccountNotFound),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                Err(LedgerError::AccountHasReferences)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Entry persistence. Entries are append-only; there is no update or
/// delete path.
#[derive(Debug, Clone)]
pub struct EntryStore {
    pool: PgPool,
}

impl EntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one signed entry inside the caller's transaction.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        account_id: Uuid,
        amount: i64,
    ) -> Result<Entry, LedgerError> {
        let entry = sqlx::query_as(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2)
             RETURNING id, account_id, amount, created_at",
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(conn)
        .await?;
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> Result<Entry, LedgerError> {
        sqlx::query_as("SELECT id, account_id, amount, created_at FROM entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::EntryNotFound)
    }

    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        params: ListParams,
    ) -> Result<Vec<Entry>, LedgerError> {
        let entries = sqlx::query_as(
            "SELECT id, account_id, amount, created_at FROM entries
             WHERE account_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

/// Transaction persistence. Append-only like entries.
#[derive(Debug, Clone)]
pub struct TransactionStore {
    pool: PgPool,
}

impl TransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        conn: &mut PgConnection,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: i64,
    ) -> Result<Transaction, LedgerError> {
        let transaction = sqlx::query_as(
            "INSERT INTO transactions (from_account_id, to_account_id, amount)
             VALUES ($1, $2, $3)
             RETURNING id, from_account_id, to_account_id, amount, created_at",
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(conn)
        .await?;
        Ok(transaction)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, LedgerError> {
        sqlx::query_as(
            "SELECT id, from_account_id, to_account_id, amount, created_at
             FROM transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::TransactionNotFound)
    }

    /// Lists transactions touching the account on either side.
    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        params: ListParams,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = sqlx::query_as(
            "SELECT id, from_account_id, to_account_id, amount, created_at
             FROM transactions
             WHERE from_account_id = $1 OR to_account_id = $1
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }
}

/// Stored-response persistence for the idempotency layer.
#[derive(Debug, Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds an unexpired stored response for the triple.
    pub async fn find(
        &self,
        key: &str,
        method: &str,
        path: &str,
    ) -> Result<IdempotencyRecord, LedgerError> {
        sqlx::query_as(
            "SELECT id, idempotency_key, method, path, status_code, response_body,
                    created_at, expires_at
             FROM idempotency_keys
             WHERE idempotency_key = $1 AND method = $2 AND path = $3 AND expires_at > now()",
        )
        .bind(key)
        .bind(method)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::IdempotencyKeyNotFound)
    }

    /// Stores a response under the triple with a 24-hour TTL.
    ///
    /// Two racing first-time requests may both reach this insert; the
    /// conflict clause keeps at most one stored record.
    pub async fn store(
        &self,
        key: &str,
        method: &str,
        path: &str,
        status_code: i32,
        response_body: &[u8],
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO idempotency_keys
                 (idempotency_key, method, path, status_code, response_body, expires_at)
             VALUES ($1, $2, $3, $4, $5, now() + interval '24 hours')
             ON CONFLICT (idempotency_key, method, path) DO NOTHING",
        )
        .bind(key)
        .bind(method)
        .bind(path)
        .bind(status_code)
        .bind(response_body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
