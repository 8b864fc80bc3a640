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

//! Per-account-sharded command dispatcher.
//!
//! A fixed fan of bounded queues, each drained by one dedicated worker
//! task. Commands are routed by `fnv1a32(account_id) mod N`, so all
//! commands for the same source account land on the same queue and execute
//! in submission order with no overlap. Cross-account correctness still
//! relies on database row locking; the dispatcher shapes contention, it is
//! not a correctness primitive on its own.

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::LedgerError;

/// Default number of worker shards.
pub const DEFAULT_WORKERS: usize = 10;

/// Default per-shard queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// A unit of work routed by source account.
///
/// The completion channel always receives exactly one result: the outcome
/// of the executed future, or [`LedgerError::ShuttingDown`] when the pool
/// drains the command without running it.
pub struct Command {
    pub account_id: Uuid,
    exec: BoxFuture<'static, Result<(), LedgerError>>,
    completion: oneshot::Sender<Result<(), LedgerError>>,
}

impl Command {
    /// Pairs a command with the receiver for its completion result.
    pub fn new(
        account_id: Uuid,
        exec: BoxFuture<'static, Result<(), LedgerError>>,
    ) -> (Self, oneshot::Receiver<Result<(), LedgerError>>) {
        let (completion, receiver) = oneshot::channel();
        (
            Self {
                account_id,
                exec,
                completion,
            },
            receiver,
        )
    }
}

/// Fixed pool of single-consumer queues, one worker task per queue.
pub struct Dispatcher {
    queues: Vec<mpsc::Sender<Command>>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns `workers` queue-draining tasks with `queue_size` capacity
    /// each. Zero falls back to the defaults.
    pub fn new(workers: usize, queue_size: usize) -> Self {
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let queue_size = if queue_size == 0 { DEFAULT_QUEUE_SIZE } else { queue_size };

        let (shutdown, _) = watch::channel(false);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (sender, receiver) = mpsc::channel(queue_size);
            queues.push(sender);
            handles.push(tokio::spawn(process_queue(
                worker_id,
                receiver,
                shutdown.subscribe(),
            )));
        }

        info!(workers, queue_size, "worker pool started");
        Self {
            queues,
            shutdown,
            workers: Mutex::new(handles),
        }
    }

    /// Submits a command to its shard.
    ///
    /// Returns [`LedgerError::ShuttingDown`] once shutdown has begun;
    /// otherwise waits until the target queue accepts the command, so a
    /// full queue backpressures the caller.
    pub async fn submit(&self, cmd: Command) -> Result<(), LedgerError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(LedgerError::ShuttingDown);
        }

        let index = self.shard_index(cmd.account_id);
        tokio::select! {
            sent = self.queues[index].send(cmd) => sent.map_err(|_| LedgerError::ShuttingDown),
            _ = shutdown.changed() => Err(LedgerError::ShuttingDown),
        }
    }

    /// Number of shards in the pool.
    pub fn shard_count(&self) -> usize {
        self.queues.len()
    }

    fn shard_index(&self, account_id: Uuid) -> usize {
        fnv1a32(account_id.as_bytes()) as usize % self.queues.len()
    }

    /// Signals cancellation and waits for every worker to exit.
    ///
    /// Workers finish their in-flight command, fail anything still queued
    /// with [`LedgerError::ShuttingDown`], and return. No submitted command
    /// is ever left without a completion result.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task failed");
            }
        }
        info!("worker pool shut down");
    }
}

async fn process_queue(
    worker_id: usize,
    mut queue: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                drain_queue(&mut queue);
                return;
            }
            next = queue.recv() => match next {
                Some(cmd) => run_command(worker_id, cmd).await,
                None => return,
            },
        }
    }
}

async fn run_command(worker_id: usize, cmd: Command) {
    let account_id = cmd.account_id;
    let result = cmd.exec.await;
    if let Err(err) = &result {
        error!(worker = worker_id, %account_id, error = %err, "command execution failed");
    }
    // The caller may have given up waiting; a dropped receiver is fine.
    let _ = cmd.completion.send(result);
}

fn drain_queue(queue: &mut mpsc::Receiver<Command>) {
    while let Ok(cmd) = queue.try_recv() {
        let _ = cmd.completion.send(Err(LedgerError::ShuttingDown));
    }
}

/// 32-bit FNV-1a over arbitrary bytes. Used as the shard routing hash.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a32_reference_vectors() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[tokio::test]
    async fn shard_index_is_deterministic_and_in_range() {
        let dispatcher = Dispatcher::new(7, 4);
        for _ in 0..100 {
            let id = Uuid::new_v4();
            let first = dispatcher.shard_index(id);
            assert!(first < dispatcher.shard_count());
            assert_eq!(first, dispatcher.shard_index(id));
        }
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn zero_sizes_fall_back_to_defaults() {
        let dispatcher = Dispatcher::new(0, 0);
        assert_eq!(dispatcher.shard_count(), DEFAULT_WORKERS);
        dispatcher.shutdown().await;
    }
}
