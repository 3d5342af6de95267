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

//! # Borrow Ledger
//!
//! This library manages the borrowing lifecycle of institutional assets and
//! rooms: reservation, staff verification, pickup/return scanning, and
//! time-driven activation, completion, and expiry.
//!
//! ## Core Components
//!
//! - [`Engine`]: Lifecycle state machine, pairing every status write with its ledger write
//! - [`Store`]: Transactional backing store for borrowings, the ledger, and the scan log
//! - [`Ledger`]: Availability of asset units and catalog locations
//! - [`ScanLog`]: Append-only pickup/return scan events
//! - [`Scheduler`]: Background sweeps driving time-based transitions
//! - [`BorrowingError`]: Typed failures, classified by [`ErrorKind`]
//!
//! ## Example
//!
//! ```
//! use borrow_ledger_rs::{
//!     AssetUnit, CatalogTypeId, Engine, Location, LocationCode, LocationStatus, ManualClock,
//!     MemoryCatalog, NewBorrowing, RequesterId, Store, UnitCode, UnitStatus,
//! };
//! use chrono::{Duration, TimeZone, Utc};
//! use std::sync::Arc;
//!
//! let now = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
//! let store = Store::new();
//! store.register_unit(AssetUnit {
//!     code: UnitCode::new("NUP-001"),
//!     catalog_type: CatalogTypeId::new("laptop"),
//!     home: None,
//!     status: UnitStatus::Available,
//! });
//! store.register_location(Location {
//!     code: LocationCode::new("R101"),
//!     name: "Room 101".into(),
//!     status: LocationStatus::Free,
//! });
//!
//! let engine = Engine::new(store, Arc::new(MemoryCatalog::new()), Arc::new(ManualClock::new(now)));
//!
//! // File a borrowing
//! let created = engine
//!     .create(NewBorrowing {
//!         requester: RequesterId::new("u1"),
//!         location: Some(LocationCode::new("R101")),
//!         alternate_location: None,
//!         phone: "081234567890".into(),
//!         agenda: "Seminar".into(),
//!         start: now + Duration::hours(1),
//!         end: now + Duration::hours(3),
//!         units: vec![UnitCode::new("NUP-001")],
//!     })
//!     .unwrap();
//!
//! // Its resources are reserved immediately
//! assert_eq!(created.units[0].status, UnitStatus::Unavailable);
//! assert_eq!(created.location.unwrap().status, LocationStatus::Occupied);
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Send + Sync`. Foreground calls and scheduler sweeps may run
//! concurrently; every transition is one serializable store transaction.

mod base;
pub mod borrowing;
pub mod catalog;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod ledger;
pub mod scan_log;
pub mod scheduler;
mod store;
pub mod telemetry;

pub use base::{BorrowingId, CatalogTypeId, LocationCode, RequesterId, StaffId, UnitCode};
pub use borrowing::{
    Borrowing, BorrowingDetails, BorrowingFilter, BorrowingStatus, Decision, Destination,
    NewBorrowing, Verification,
};
pub use catalog::{Catalog, Category, MemoryCatalog, Role, Routing};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use engine::{Engine, Policy, SweepReport};
pub use error::{BorrowingError, ErrorKind};
pub use ledger::{AssetUnit, Ledger, LedgerChange, Location, LocationStatus, UnitStatus};
pub use scan_log::{ScanEvent, ScanKind, ScanLog};
pub use scheduler::{Scheduler, SchedulerHandle, Sweep};
pub use store::{Store, Transaction};
