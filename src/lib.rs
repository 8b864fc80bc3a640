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

//! # Payments Ledger
//!
//! A double-entry payments ledger service. Accounts hold single-currency
//! balances in integer minor units; transfers atomically produce one
//! transaction row, a debit/credit entry pair, and two balance updates,
//! all inside a single database transaction with row locks taken in
//! canonical order.
//!
//! ## Core Components
//!
//! - [`Engine`]: transfer coordinator running each transfer on the shard
//!   that owns its source account
//! - [`Dispatcher`]: fixed fan of single-consumer queues serializing work
//!   per source account
//! - [`store`]: persistence primitives over PostgreSQL, with explicit
//!   pool-backed and transaction-scoped operation shapes
//! - [`idempotency`]: middleware replaying stored responses for repeated
//!   `Idempotency-Key` requests
//! - [`LedgerError`]: the error taxonomy, mapped totally onto HTTP status
//!   codes by the [`server`] layer
//!
//! ## Example
//!
//! Dispatching work through the sharded pool:
//!
//! ```
//! use futures::FutureExt;
//! use payments_ledger::{Command, Dispatcher};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(4, 16);
//!
//!     let (cmd, completion) = Command::new(Uuid::new_v4(), async { Ok(()) }.boxed());
//!     dispatcher.submit(cmd).await.unwrap();
//!     assert!(completion.await.unwrap().is_ok());
//!
//!     dispatcher.shutdown().await;
//! }
//! ```
//!
//! ## Concurrency
//!
//! Transfers for one source account execute in strict submission order on
//! a single worker. Transfers across accounts run in parallel up to the
//! worker count, with database row locks (acquired in ascending UUID
//! order) providing cross-account atomicity and deadlock freedom.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod server;
pub mod store;

pub use config::Config;
pub use dispatcher::{Command, Dispatcher};
pub use engine::Engine;
pub use error::LedgerError;
pub use server::{router, AppState};
