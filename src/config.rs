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

//! Service configuration loaded from environment variables.
//!
//! Every variable except `DATABASE_URL` has a default. Malformed duration
//! and integer values fall back to their defaults; a malformed `PORT` is a
//! hard error because silently serving on the wrong port is worse than
//! refusing to start.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
}

/// Runtime configuration for the ledger service.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub environment: String,
    pub port: u16,
    pub log_level: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub database_url: String,
    pub migrations_path: String,
    pub worker_pool_size: usize,
    pub worker_queue_size: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] when `PORT` is not a valid port
    /// number and [`ConfigError::MissingDatabaseUrl`] when `DATABASE_URL`
    /// is absent or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_or("PORT", "8080").parse::<u16>()?;

        let database_url = env_or("DATABASE_URL", "");
        if database_url.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            app_name: env_or("APP_NAME", "payments-ledger"),
            environment: env_or("ENVIRONMENT", "development"),
            port,
            log_level: env_or("LOG_LEVEL", "info"),
            read_timeout: duration_or(env_var("READ_TIMEOUT"), Duration::from_secs(5)),
            write_timeout: duration_or(env_var("WRITE_TIMEOUT"), Duration::from_secs(10)),
            idle_timeout: duration_or(env_var("IDLE_TIMEOUT"), Duration::from_secs(120)),
            database_url,
            migrations_path: env_or("MIGRATIONS_PATH", "migrations"),
            worker_pool_size: int_or(env_var("WORKER_POOL_SIZE"), 10),
            worker_queue_size: int_or(env_var("WORKER_QUEUE_SIZE"), 100),
        })
    }

    /// Maps the configured log level string onto a [`tracing::Level`].
    ///
    /// Unknown values fall back to `INFO`.
    pub fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Production deployments emit JSON logs and terse error bodies.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_or(key: &str, fallback: &str) -> String {
    env_var(key).unwrap_or_else(|| fallback.to_string())
}

/// Parses a Go-style duration string (`5s`, `120s`, `1m30s`), falling back
/// on missing or malformed input.
fn duration_or(raw: Option<String>, fallback: Duration) -> Duration {
    raw.and_then(|value| humantime::parse_duration(&value).ok())
        .unwrap_or(fallback)
}

fn int_or(raw: Option<String>, fallback: usize) -> usize {
    raw.and_then(|value| value.parse().ok()).unwrap_or(fallback)
}
