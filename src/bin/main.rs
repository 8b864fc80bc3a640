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

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use payments_ledger::{router, AppState, Config, Dispatcher};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How long in-flight requests get to drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            process::exit(1);
        }
    };

    init_tracing(&cfg);

    let pool = match PgPoolOptions::new().connect(&cfg.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to database");
            process::exit(1);
        }
    };

    match Migrator::new(Path::new(&cfg.migrations_path)).await {
        Ok(migrator) => {
            if let Err(err) = migrator.run(&pool).await {
                error!(error = %err, "failed to run migrations");
                process::exit(1);
            }
            info!("database migrations applied");
        }
        Err(err) => {
            error!(error = %err, path = %cfg.migrations_path, "failed to load migrations");
            process::exit(1);
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(cfg.worker_pool_size, cfg.worker_queue_size));
    let state = AppState::new(pool, dispatcher.clone());
    let app = router(state, cfg.write_timeout);

    let listener = match TcpListener::bind(("0.0.0.0", cfg.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, port = cfg.port, "failed to bind listener");
            process::exit(1);
        }
    };
    info!(port = cfg.port, environment = %cfg.environment, "server starting");

    let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = close_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = close_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => {
            error!(error = %err, "server failed");
            process::exit(1);
        }
        Ok(Err(err)) => {
            error!(error = %err, "server task failed");
            process::exit(1);
        }
        Err(_) => {
            error!("server forced to shutdown");
            process::exit(1);
        }
    }

    // Queued transfers past this point complete with a shutting-down error.
    dispatcher.shutdown().await;
    info!("server stopped gracefully");
}

fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::new(cfg.log_level().to_string());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if cfg.is_production() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
