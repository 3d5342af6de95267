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

//! Time-driven reconciliation.
//!
//! Three independent workers each run one [`Sweep`] on their own timer:
//!
//! | Sweep | Selects | Effect |
//! |-------|---------|--------|
//! | [`Sweep::Activate`] | accepted bookings whose start has passed | `active`, ledger re-asserted |
//! | [`Sweep::Complete`] | active borrowings whose end has passed | `completed`, resources released |
//! | [`Sweep::CancelPending`] | pending bookings older than the grace period | `cancelled`/`rejected`, resources released |
//!
//! Workers share nothing but the [`Engine`]. A sweep is re-entrant: anything a
//! previous run already moved simply no longer matches the selection.

use crate::config::SchedulerConfig;
use crate::engine::Engine;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// One kind of time-driven transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
    Activate,
    Complete,
    CancelPending,
}

impl Sweep {
    pub const ALL: [Sweep; 3] = [Sweep::Activate, Sweep::Complete, Sweep::CancelPending];

    pub fn name(self) -> &'static str {
        match self {
            Sweep::Activate => "auto-activate",
            Sweep::Complete => "auto-complete",
            Sweep::CancelPending => "auto-cancel-pending",
        }
    }

    fn interval(self, config: &SchedulerConfig) -> Duration {
        let secs = match self {
            Sweep::Activate => config.activate_interval_secs,
            Sweep::Complete => config.complete_interval_secs,
            Sweep::CancelPending => config.cancel_pending_interval_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Spawns the sweep workers.
pub struct Scheduler {
    engine: Arc<Engine>,
    intervals: Vec<(Sweep, Duration)>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, config: &SchedulerConfig) -> Self {
        let intervals = Sweep::ALL
            .iter()
            .map(|&sweep| (sweep, sweep.interval(config)))
            .collect();
        Self { engine, intervals }
    }

    /// Overrides one sweep's interval.
    pub fn with_interval(mut self, sweep: Sweep, interval: Duration) -> Self {
        for entry in &mut self.intervals {
            if entry.0 == sweep {
                entry.1 = interval;
            }
        }
        self
    }

    /// Starts one worker thread per sweep.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a worker thread cannot be spawned. Workers
    /// already started are stopped before returning.
    pub fn spawn(self) -> std::io::Result<SchedulerHandle> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let mut handle = SchedulerHandle {
            shutdown: Some(shutdown_tx),
            workers: Vec::with_capacity(self.intervals.len()),
        };

        for (sweep, interval) in self.intervals {
            let engine = Arc::clone(&self.engine);
            let shutdown = shutdown_rx.clone();
            let worker = thread::Builder::new()
                .name(sweep.name().to_owned())
                .spawn(move || run_worker(&engine, sweep, interval, &shutdown))?;
            handle.workers.push(worker);
        }

        info!(workers = handle.workers.len(), "scheduler started");
        Ok(handle)
    }
}

/// Running scheduler. Dropping it stops the workers.
pub struct SchedulerHandle {
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops every worker after its current sweep and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the only sender disconnects every worker's receiver.
        self.shutdown.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("scheduler worker panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(engine: &Engine, sweep: Sweep, interval: Duration, shutdown: &Receiver<()>) {
    debug!(sweep = sweep.name(), ?interval, "worker started");
    let ticker = channel::tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                // A panicking sweep must not end the worker; the next tick retries.
                match panic::catch_unwind(AssertUnwindSafe(|| engine.sweep(sweep))) {
                    Ok(report) if report.selected > 0 => info!(
                        sweep = sweep.name(),
                        applied = report.applied.len(),
                        failed = report.failed.len(),
                        "sweep finished"
                    ),
                    Ok(_) => {}
                    Err(_) => error!(sweep = sweep.name(), "sweep panicked"),
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!(sweep = sweep.name(), "worker stopped");
}
