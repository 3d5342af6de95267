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

//! Runtime configuration.
//!
//! Loaded from a JSON document or from `BORROW_*` environment variables, with
//! defaults for every field.

use crate::engine::Policy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("{0} must be greater than 0")]
    NotPositive(&'static str),

    #[error("{name} must be at most {max}")]
    TooLarge { name: &'static str, max: i64 },
}

/// Longest sweep interval accepted, one day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Longest pending grace accepted, one year.
pub const MAX_PENDING_GRACE_MINUTES: i64 = 366 * 24 * 60;

/// Sweep intervals, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub activate_interval_secs: u64,
    pub complete_interval_secs: u64,
    pub cancel_pending_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            activate_interval_secs: 60,
            complete_interval_secs: 60,
            cancel_pending_interval_secs: 300,
        }
    }
}

/// Business limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Non-cancelled borrowings allowed per requester.
    pub max_borrowings: usize,
    /// Minutes an unverified booking may wait before it is cancelled.
    pub pending_grace_minutes: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_borrowings: 3,
            pending_grace_minutes: 30,
        }
    }
}

impl From<&PolicyConfig> for Policy {
    /// Out-of-range graces saturate; an unvalidated config never panics here.
    fn from(config: &PolicyConfig) -> Self {
        Policy {
            max_borrowings: config.max_borrowings,
            pending_grace: chrono::Duration::try_minutes(config.pending_grace_minutes)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub policy: PolicyConfig,
}

impl Config {
    /// Validates every interval and limit.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotPositive`] - A value is zero or negative.
    /// - [`ConfigError::TooLarge`] - An interval exceeds [`MAX_INTERVAL_SECS`] or the
    ///   grace exceeds [`MAX_PENDING_GRACE_MINUTES`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("activate_interval_secs", self.scheduler.activate_interval_secs > 0),
            ("complete_interval_secs", self.scheduler.complete_interval_secs > 0),
            (
                "cancel_pending_interval_secs",
                self.scheduler.cancel_pending_interval_secs > 0,
            ),
            ("max_borrowings", self.policy.max_borrowings > 0),
            ("pending_grace_minutes", self.policy.pending_grace_minutes > 0),
        ];
        for (name, ok) in positive {
            if !ok {
                return Err(ConfigError::NotPositive(name));
            }
        }

        let intervals = [
            ("activate_interval_secs", self.scheduler.activate_interval_secs),
            ("complete_interval_secs", self.scheduler.complete_interval_secs),
            (
                "cancel_pending_interval_secs",
                self.scheduler.cancel_pending_interval_secs,
            ),
        ];
        for (name, secs) in intervals {
            if secs > MAX_INTERVAL_SECS {
                return Err(ConfigError::TooLarge {
                    name,
                    max: MAX_INTERVAL_SECS as i64,
                });
            }
        }
        if self.policy.pending_grace_minutes > MAX_PENDING_GRACE_MINUTES {
            return Err(ConfigError::TooLarge {
                name: "pending_grace_minutes",
                max: MAX_PENDING_GRACE_MINUTES,
            });
        }
        Ok(())
    }

    /// Parses configuration from a JSON string and validates it.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from the process environment.
    ///
    /// Unset variables keep their defaults. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let scheduler = &mut config.scheduler;
        read_var(&lookup, "BORROW_ACTIVATE_INTERVAL_SECS", &mut scheduler.activate_interval_secs)?;
        read_var(&lookup, "BORROW_COMPLETE_INTERVAL_SECS", &mut scheduler.complete_interval_secs)?;
        read_var(
            &lookup,
            "BORROW_CANCEL_INTERVAL_SECS",
            &mut scheduler.cancel_pending_interval_secs,
        )?;
        read_var(&lookup, "BORROW_MAX_BORROWINGS", &mut config.policy.max_borrowings)?;
        read_var(
            &lookup,
            "BORROW_PENDING_GRACE_MINUTES",
            &mut config.policy.pending_grace_minutes,
        )?;
        config.validate()?;
        Ok(config)
    }
}

fn read_var<F, T>(lookup: &F, name: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(name) {
        let parsed = value.trim().parse::<T>();
        match parsed {
            Ok(parsed) => *slot = parsed,
            Err(_) => return Err(ConfigError::InvalidVar { name, value }),
        }
    }
    Ok(())
}
