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

//! Behavioral tests for the sharded command dispatcher: per-account
//! ordering, cross-shard parallelism, backpressure, and shutdown draining.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use payments_ledger::dispatcher::fnv1a32;
use payments_ledger::{Command, Dispatcher, LedgerError};
use tokio::sync::{oneshot, Barrier, Mutex};
use tokio::time::timeout;
use uuid::Uuid;

#[tokio::test]
async fn same_account_commands_run_in_submission_order() {
    let dispatcher = Dispatcher::new(4, 100);
    let account_id = Uuid::new_v4();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut completions = Vec::new();
    for i in 0..50usize {
        let order = order.clone();
        let (cmd, completion) = Command::new(
            account_id,
            async move {
                order.lock().await.push(i);
                Ok(())
            }
            .boxed(),
        );
        dispatcher.submit(cmd).await.unwrap();
        completions.push(completion);
    }

    for completion in completions {
        completion.await.unwrap().unwrap();
    }

    let observed = order.lock().await.clone();
    let expected: Vec<usize> = (0..50).collect();
    assert_eq!(observed, expected, "one shard must preserve FIFO order");

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn different_shards_run_concurrently() {
    const WORKERS: usize = 8;
    let dispatcher = Dispatcher::new(WORKERS, 16);

    // Pick two accounts routed to different shards.
    let first = Uuid::new_v4();
    let second = loop {
        let candidate = Uuid::new_v4();
        let shard_a = fnv1a32(first.as_bytes()) as usize % WORKERS;
        let shard_b = fnv1a32(candidate.as_bytes()) as usize % WORKERS;
        if shard_a != shard_b {
            break candidate;
        }
    };

    // Both commands block on the same barrier: they only complete if the
    // two shards execute them at the same time.
    let barrier = Arc::new(Barrier::new(2));
    let mut completions = Vec::new();
    for account_id in [first, second] {
        let barrier = barrier.clone();
        let (cmd, completion) = Command::new(
            account_id,
            async move {
                barrier.wait().await;
                Ok(())
            }
            .boxed(),
        );
        dispatcher.submit(cmd).await.unwrap();
        completions.push(completion);
    }

    for completion in completions {
        timeout(Duration::from_secs(5), completion)
            .await
            .expect("shards must not serialize independent accounts")
            .unwrap()
            .unwrap();
    }

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn full_queue_backpressures_submit() {
    let dispatcher = Arc::new(Dispatcher::new(1, 1));
    let account_id = Uuid::new_v4();

    // Occupy the single worker.
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let (blocker, blocker_done) = Command::new(
        account_id,
        async move {
            let _ = gate_rx.await;
            Ok(())
        }
        .boxed(),
    );
    dispatcher.submit(blocker).await.unwrap();

    // Fill the queue behind it.
    let (queued, queued_done) = Command::new(account_id, async { Ok(()) }.boxed());
    dispatcher.submit(queued).await.unwrap();

    // A third submission has nowhere to go and must block.
    let (overflow, overflow_done) = Command::new(account_id, async { Ok(()) }.boxed());
    let submitter = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.submit(overflow).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!submitter.is_finished(), "submit should wait for queue capacity");

    let _ = gate_tx.send(());

    submitter.await.unwrap().unwrap();
    blocker_done.await.unwrap().unwrap();
    queued_done.await.unwrap().unwrap();
    overflow_done.await.unwrap().unwrap();

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_finishes_in_flight_and_fails_queued() {
    let dispatcher = Arc::new(Dispatcher::new(1, 100));
    let account_id = Uuid::new_v4();

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let (blocker, blocker_done) = Command::new(
        account_id,
        async move {
            let _ = started_tx.send(());
            let _ = gate_rx.await;
            Ok(())
        }
        .boxed(),
    );
    dispatcher.submit(blocker).await.unwrap();
    started_rx.await.unwrap();

    // These sit in the queue behind the in-flight command.
    let mut queued = Vec::new();
    for _ in 0..5 {
        let (cmd, completion) = Command::new(account_id, async { Ok(()) }.boxed());
        dispatcher.submit(cmd).await.unwrap();
        queued.push(completion);
    }

    let shutdown = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.shutdown().await })
    };

    // Let the cancellation signal land before releasing the worker.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = gate_tx.send(());

    // The in-flight command completed normally.
    blocker_done.await.unwrap().unwrap();

    // Everything still queued was failed, not dropped.
    for completion in queued {
        let result = completion.await.unwrap();
        assert!(matches!(result, Err(LedgerError::ShuttingDown)));
    }

    timeout(Duration::from_secs(5), shutdown)
        .await
        .expect("shutdown must terminate")
        .unwrap();
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let dispatcher = Dispatcher::new(2, 10);
    dispatcher.shutdown().await;

    let (cmd, _completion) = Command::new(Uuid::new_v4(), async { Ok(()) }.boxed());
    let result = dispatcher.submit(cmd).await;
    assert!(matches!(result, Err(LedgerError::ShuttingDown)));
}
