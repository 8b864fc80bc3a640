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

//! Transfer coordinator.
//!
//! A transfer is validated outside any database transaction, then handed
//! to the dispatcher shard owning the source account. The shard worker
//! runs the body inside a single database transaction:
//!
//! 1. Lock both account rows in canonical order (ascending UUID bytes).
//! 2. Re-check the source balance against the locked row.
//! 3. Insert the transaction row and the paired entries (−amount, +amount).
//! 4. Apply both balance updates and commit.
//!
//! Locking in canonical order means any two transfers touching the same
//! account pair acquire locks in the same sequence, so neither can hold
//! one lock while waiting on the other's.

use std::sync::Arc;

use futures::FutureExt;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::oneshot;
use tracing::error;
use uuid::Uuid;

use crate::dispatcher::{Command, Dispatcher};
use crate::error::LedgerError;
use crate::model::{Account, TransferRequest, TransferResult};
use crate::store::{AccountStore, EntryStore, TransactionStore};

type PgTx = Transaction<'static, Postgres>;

/// Orders a pair of account IDs by their raw 16-byte representation.
///
/// Row locks are always acquired on the lower ID first. Byte order rather
/// than string order sidesteps any hex-formatting ambiguity.
pub fn canonical_lock_order(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Coordinates atomic transfers between accounts.
#[derive(Clone)]
pub struct Engine {
    pool: PgPool,
    dispatcher: Arc<Dispatcher>,
    accounts: AccountStore,
    entries: EntryStore,
    transactions: TransactionStore,
}

impl Engine {
    pub fn new(pool: PgPool, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            accounts: AccountStore::new(pool.clone()),
            entries: EntryStore::new(pool.clone()),
            transactions: TransactionStore::new(pool.clone()),
            pool,
            dispatcher,
        }
    }

    /// Executes a transfer and returns everything it produced.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] — non-positive amount.
    /// - [`LedgerError::SameAccount`] — source equals destination.
    /// - [`LedgerError::SourceAccountNotFound`] /
    ///   [`LedgerError::DestinationAccountNotFound`] — missing account.
    /// - [`LedgerError::CurrencyMismatch`] — request currency differs from
    ///   either account's currency.
    /// - [`LedgerError::InsufficientBalance`] — locked source balance does
    ///   not cover the amount.
    /// - [`LedgerError::ShuttingDown`] — the dispatcher no longer accepts
    ///   work.
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferResult, LedgerError> {
        req.validate()?;
        if req.from_account_id == req.to_account_id {
            return Err(LedgerError::SameAccount);
        }

        // Preflight existence and currency checks run against the pool;
        // the balance check below uses the locked row, because the
        // preflight copy is stale with respect to in-flight transfers.
        let from = self.get_preflight(req.from_account_id, req.from_account_id).await?;
        let to = self.get_preflight(req.to_account_id, req.from_account_id).await?;
        if from.currency != req.currency.as_str() || to.currency != req.currency.as_str() {
            return Err(LedgerError::CurrencyMismatch);
        }

        let (outcome, outcome_rx) = oneshot::channel();
        let engine = self.clone();
        let exec = async move {
            match engine.execute(req).await {
                Ok(result) => {
                    let _ = outcome.send(result);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        .boxed();

        let (cmd, completion) = Command::new(req.from_account_id, exec);
        self.dispatcher.submit(cmd).await?;

        // The worker sends exactly one result, or ShuttingDown when the
        // command was drained without running.
        completion.await.map_err(|_| LedgerError::ShuttingDown)??;
        outcome_rx
            .await
            .map_err(|_| LedgerError::Internal("transfer outcome channel closed".to_string()))
    }

    async fn get_preflight(&self, id: Uuid, from_id: Uuid) -> Result<Account, LedgerError> {
        self.accounts.get(id).await.map_err(|err| match err {
            LedgerError::AccountNotFound if id == from_id => LedgerError::SourceAccountNotFound,
            LedgerError::AccountNotFound => LedgerError::DestinationAccountNotFound,
            other => other,
        })
    }

    /// Runs the transfer body in one database transaction on the worker.
    async fn execute(&self, req: TransferRequest) -> Result<TransferResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        match self.apply(&mut tx, &req).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(err) => {
                // Surface the original error; a rollback failure is only
                // worth a log line since the connection is being returned
                // anyway.
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "failed to roll back transfer");
                }
                Err(err)
            }
        }
    }

    async fn apply(&self, tx: &mut PgTx, req: &TransferRequest) -> Result<TransferResult, LedgerError> {
        let (low, high) = canonical_lock_order(req.from_account_id, req.to_account_id);
        let first = self.lock_account(tx, low, req.from_account_id).await?;
        let second = self.lock_account(tx, high, req.from_account_id).await?;

        let locked_from = if first.id == req.from_account_id { &first } else { &second };
        if locked_from.balance < req.amount {
            return Err(LedgerError::InsufficientBalance);
        }

        let transaction = self
            .transactions
            .create(&mut *tx, req.from_account_id, req.to_account_id, req.amount)
            .await?;

        let from_entry = self
            .entries
            .create(&mut *tx, req.from_account_id, -req.amount)
            .await?;
        let to_entry = self
            .entries
            .create(&mut *tx, req.to_account_id, req.amount)
            .await?;

        let from_account = self
            .accounts
            .add_balance(&mut *tx, req.from_account_id, -req.amount)
            .await?;
        let to_account = self
            .accounts
            .add_balance(&mut *tx, req.to_account_id, req.amount)
            .await?;

        Ok(TransferResult {
            transaction,
            from_account,
            to_account,
            from_entry,
            to_entry,
        })
    }

    async fn lock_account(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        from_id: Uuid,
    ) -> Result<Account, LedgerError> {
        self.accounts
            .get_for_update(&mut *tx, id)
            .await
            .map_err(|err| match err {
                LedgerError::AccountNotFound if id == from_id => LedgerError::SourceAccountNotFound,
                LedgerError::AccountNotFound => LedgerError::DestinationAccountNotFound,
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_lock_order;
    use uuid::Uuid;

    #[test]
    fn lock_order_is_ascending_and_symmetric() {
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();

        assert_eq!(canonical_lock_order(a, b), (a, b));
        assert_eq!(canonical_lock_order(b, a), (a, b));
        assert_eq!(canonical_lock_order(a, a), (a, a));
    }

    #[test]
    fn lock_order_compares_bytes_not_strings() {
        // Byte comparison and lowercase-hex string comparison agree for
        // canonical formatting; the contract is the byte form.
        let a = Uuid::parse_str("0a000000-0000-0000-0000-000000000000").unwrap();
        let b = Uuid::parse_str("10000000-0000-0000-0000-000000000000").unwrap();
        assert_eq!(canonical_lock_order(b, a), (a, b));
    }
}
