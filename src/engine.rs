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

//! Borrowing lifecycle engine.
//!
//! The [`Engine`] is the central component that moves borrowings between
//! states and keeps the resource ledger in step with them.
//!
//! # Transitions
//!
//! - **Create**: Inserts a `booking`/`pending` borrowing and reserves its units and location.
//! - **Verify**: Accepts (verification only) or rejects (cancel and release).
//! - **Activate**: Moves an accepted booking to `active`.
//! - **Scan pickup**: Logs a pickup, stamps the first pickup, promotes a booking to `active`.
//! - **Scan return**: Logs a return and stamps the latest return time.
//! - **Complete**: Finishes an active borrowing and releases its resources.
//! - **Cancel**: Requester withdraws a booking and releases its resources.
//!
//! The same transitions are driven on a timer by [`Engine::sweep`], one
//! [`Engine::auto_activate`], [`Engine::auto_complete`], or
//! [`Engine::auto_cancel_pending`] call per selected borrowing.
//!
//! # Thread Safety
//!
//! Every mutating operation runs inside one [`Store::transaction`]. Guards are
//! evaluated against the row as re-read inside that transaction, so two racing
//! calls on the same borrowing resolve to one winner and one guard failure.

use crate::base::{BorrowingId, LocationCode, RequesterId, StaffId, UnitCode};
use crate::borrowing::{
    Borrowing, BorrowingDetails, BorrowingFilter, BorrowingStatus, Decision, NewBorrowing,
    Verification,
};
use crate::catalog::{Catalog, Category, Role, Routing};
use crate::clock::Clock;
use crate::error::BorrowingError;
use crate::ledger::{Ledger, UnitStatus};
use crate::scan_log::{ScanEvent, ScanKind};
use crate::scheduler::Sweep;
use crate::store::{Store, Transaction};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Business limits applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum non-cancelled borrowings per requester.
    pub max_borrowings: usize,
    /// Age after which an unverified booking expires.
    pub pending_grace: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_borrowings: 3,
            pending_grace: Duration::minutes(30),
        }
    }
}

/// Outcome of one scheduler sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub sweep: Sweep,
    /// Borrowings that matched the selection filter.
    pub selected: usize,
    pub applied: Vec<BorrowingId>,
    pub failed: Vec<(BorrowingId, BorrowingError)>,
}

/// Borrowing lifecycle engine.
///
/// # Invariants
///
/// - An `active` borrowing is always `accepted`.
/// - A requester has at most one `booking` or `active` borrowing.
/// - Units of an open borrowing are `unavailable`; its catalog location is `occupied`.
/// - `completed` and `cancelled` are terminal.
pub struct Engine {
    store: Store,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    policy: Policy,
}

impl Engine {
    /// Creates an engine over `store` with the default [`Policy`].
    pub fn new(store: Store, catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>) -> Self {
        Engine {
            store,
            catalog,
            clock,
            policy: Policy::default(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Files a new borrowing and reserves its resources.
    ///
    /// # Errors
    ///
    /// Guards run in this order, each rejecting without any state change:
    ///
    /// - Validation: [`EmptyItems`], [`MissingDestination`], [`ConflictingDestination`],
    ///   [`DuplicateUnit`], [`InvalidWindow`], [`InvalidPhone`], [`InvalidAgenda`].
    /// - [`OpenBorrowingExists`] - Requester has a booking or active borrowing.
    /// - [`QuotaExceeded`] - Requester has reached the non-cancelled limit.
    /// - [`UnitsNotFound`] / [`UnitsUnavailable`] - A unit is unknown or taken.
    /// - [`LocationNotFound`] / [`LocationOccupied`] / [`LocationUnavailable`] - Location not free.
    ///
    /// [`EmptyItems`]: BorrowingError::EmptyItems
    /// [`MissingDestination`]: BorrowingError::MissingDestination
    /// [`ConflictingDestination`]: BorrowingError::ConflictingDestination
    /// [`DuplicateUnit`]: BorrowingError::DuplicateUnit
    /// [`InvalidWindow`]: BorrowingError::InvalidWindow
    /// [`InvalidPhone`]: BorrowingError::InvalidPhone
    /// [`InvalidAgenda`]: BorrowingError::InvalidAgenda
    /// [`OpenBorrowingExists`]: BorrowingError::OpenBorrowingExists
    /// [`QuotaExceeded`]: BorrowingError::QuotaExceeded
    /// [`UnitsNotFound`]: BorrowingError::UnitsNotFound
    /// [`UnitsUnavailable`]: BorrowingError::UnitsUnavailable
    /// [`LocationNotFound`]: BorrowingError::LocationNotFound
    /// [`LocationOccupied`]: BorrowingError::LocationOccupied
    /// [`LocationUnavailable`]: BorrowingError::LocationUnavailable
    pub fn create(&self, draft: NewBorrowing) -> Result<BorrowingDetails, BorrowingError> {
        let requester = draft.requester.clone();
        let destination = draft.validate().inspect_err(|e| {
            debug!(requester = %requester, error = %e, "create rejected");
        })?;
        let now = self.clock.now();
        let limit = self.policy.max_borrowings;

        self.store
            .transaction(|tx| {
                let mut has_open = false;
                let mut counted = 0;
                for existing in tx.borrowings().filter(|b| b.requester == draft.requester) {
                    has_open |= existing.status.is_open();
                    if existing.status != BorrowingStatus::Cancelled {
                        counted += 1;
                    }
                }
                if has_open {
                    return Err(BorrowingError::OpenBorrowingExists);
                }
                if counted >= limit {
                    return Err(BorrowingError::QuotaExceeded { limit });
                }

                check_units(tx.ledger(), &draft.units)?;
                if let Some(code) = destination.location() {
                    tx.ledger().check_location_free(code)?;
                }

                let id = tx.next_id();
                let units = draft.units.clone();
                let location = destination.location().cloned();
                tx.insert_borrowing(Borrowing::new(id, draft, destination, now));
                tx.reserve(&units, location.as_ref())?;
                tx.details(id)
            })
            .inspect(|details| {
                info!(
                    borrowing = %details.borrowing.id,
                    requester = %requester,
                    units = details.units.len(),
                    "borrowing created"
                );
            })
            .inspect_err(|e| debug!(requester = %requester, error = %e, "create rejected"))
    }

    /// Records a verifier's decision on a booking.
    ///
    /// Acceptance only changes the verification. Rejection also cancels the
    /// borrowing and releases its resources.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotBooking`] - Borrowing is not in `booking`.
    /// - [`BorrowingError::RoleCannotVerify`] - Role is not a verifier.
    /// - [`BorrowingError::ProjectorOnlyRequiresProgramStaff`] - Program staff on a mixed borrowing.
    /// - [`BorrowingError::ProjectorOnlyNotForAcademicHead`] - Academic head on a projector-only borrowing.
    pub fn verify(
        &self,
        id: BorrowingId,
        decision: Decision,
        role: Role,
    ) -> Result<BorrowingDetails, BorrowingError> {
        self.store
            .transaction(|tx| {
                let current = tx.borrowing(id)?;
                if current.status != BorrowingStatus::Booking {
                    return Err(BorrowingError::NotBooking(current.status));
                }
                self.routing(tx.ledger(), current).authorize(role)?;

                match decision {
                    Decision::Accepted => {
                        tx.update_borrowing(id, |b| b.verification = Verification::Accepted)?;
                    }
                    Decision::Rejected => {
                        let (units, location) = resources(current);
                        tx.update_borrowing(id, |b| {
                            b.verification = Verification::Rejected;
                            b.status = BorrowingStatus::Cancelled;
                        })?;
                        tx.release(&units, location.as_ref());
                    }
                }
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, ?decision, %role, "borrowing verified"))
            .inspect_err(|e| debug!(borrowing = %id, %role, error = %e, "verify rejected"))
    }

    /// Manually activates an accepted booking.
    ///
    /// Resources were reserved at creation, so the ledger is not touched.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotVerified`] - Borrowing is not accepted.
    /// - [`BorrowingError::NotBooking`] - Borrowing is not in `booking`.
    pub fn activate(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        self.store
            .transaction(|tx| {
                ensure_activatable(tx.borrowing(id)?)?;
                tx.update_borrowing(id, |b| b.status = BorrowingStatus::Active)?;
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, "borrowing activated"))
            .inspect_err(|e| debug!(borrowing = %id, error = %e, "activate rejected"))
    }

    /// Logs a pickup scan.
    ///
    /// The pickup time is the first pickup in the scan log. A scan on a booking promotes it
    /// to `active`. Repeated scans only add log entries.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotVerified`] - Borrowing is not accepted.
    /// - [`BorrowingError::NotPickupable`] - Borrowing is finished.
    pub fn scan_pickup(
        &self,
        id: BorrowingId,
        staff: StaffId,
    ) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| {
                let current = tx.borrowing(id)?;
                if current.verification != Verification::Accepted {
                    return Err(BorrowingError::NotVerified);
                }
                if !current.status.is_open() {
                    return Err(BorrowingError::NotPickupable(current.status));
                }

                tx.append_scan(ScanEvent {
                    borrowing: id,
                    kind: ScanKind::Pickup,
                    at: now,
                    staff: staff.clone(),
                });
                let first_pickup = tx.scans().first_pickup(id);
                tx.update_borrowing(id, |b| {
                    b.picked_up_at = first_pickup;
                    b.status = BorrowingStatus::Active;
                })?;
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, staff = %staff, "pickup scanned"))
            .inspect_err(|e| debug!(borrowing = %id, error = %e, "pickup scan rejected"))
    }

    /// Logs a return scan and stamps the latest return time from the scan log.
    ///
    /// The borrowing stays `active` until [`Engine::complete`].
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotActive`] - Borrowing is not `active`.
    pub fn scan_return(
        &self,
        id: BorrowingId,
        staff: StaffId,
    ) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| {
                ensure_active(tx.borrowing(id)?)?;
                tx.append_scan(ScanEvent {
                    borrowing: id,
                    kind: ScanKind::Return,
                    at: now,
                    staff: staff.clone(),
                });
                let last_return = tx.scans().last_return(id);
                tx.update_borrowing(id, |b| b.returned_at = last_return)?;
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, staff = %staff, "return scanned"))
            .inspect_err(|e| debug!(borrowing = %id, error = %e, "return scan rejected"))
    }

    /// Finishes an active borrowing and releases its resources.
    ///
    /// A return time already stamped by a return scan is kept.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotActive`] - Borrowing is not `active`.
    pub fn complete(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| {
                let current = tx.borrowing(id)?;
                ensure_active(current)?;
                let (units, location) = resources(current);
                tx.update_borrowing(id, |b| {
                    b.status = BorrowingStatus::Completed;
                    b.returned_at.get_or_insert(now);
                })?;
                tx.release(&units, location.as_ref());
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, "borrowing completed"))
            .inspect_err(|e| debug!(borrowing = %id, error = %e, "complete rejected"))
    }

    /// Requester withdraws a booking, pending or accepted.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotOwner`] - Caller did not file the borrowing.
    /// - [`BorrowingError::AlreadyCompleted`] - Borrowing is `completed`.
    /// - [`BorrowingError::AlreadyCancelled`] - Borrowing is `cancelled`.
    /// - [`BorrowingError::AlreadyActive`] - Borrowing is `active`.
    pub fn cancel(
        &self,
        id: BorrowingId,
        requester: &RequesterId,
    ) -> Result<BorrowingDetails, BorrowingError> {
        self.store
            .transaction(|tx| {
                let current = tx.borrowing(id)?;
                if current.requester != *requester {
                    return Err(BorrowingError::NotOwner);
                }
                match current.status {
                    BorrowingStatus::Completed => return Err(BorrowingError::AlreadyCompleted),
                    BorrowingStatus::Cancelled => return Err(BorrowingError::AlreadyCancelled),
                    BorrowingStatus::Active => return Err(BorrowingError::AlreadyActive),
                    BorrowingStatus::Booking => {}
                }
                let (units, location) = resources(current);
                cancel_and_release(tx, id, &units, location.as_ref())?;
                tx.details(id)
            })
            .inspect(|_| info!(borrowing = %id, requester = %requester, "borrowing cancelled"))
            .inspect_err(|e| debug!(borrowing = %id, error = %e, "cancel rejected"))
    }

    /// Returns a borrowing with its units and location expanded.
    ///
    /// # Errors
    ///
    /// Returns [`BorrowingError::BorrowingNotFound`] for an unknown id.
    pub fn get(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        self.store.details(id)
    }

    /// Lists borrowings matching `filter`, newest created first.
    pub fn list(&self, filter: &BorrowingFilter) -> Vec<Borrowing> {
        self.store.list(filter)
    }

    /// Returns the scan log of a borrowing, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`BorrowingError::BorrowingNotFound`] for an unknown id.
    pub fn scans(&self, id: BorrowingId) -> Result<Vec<ScanEvent>, BorrowingError> {
        if self.store.borrowing(id).is_none() {
            return Err(BorrowingError::BorrowingNotFound(id));
        }
        Ok(self.store.scans(id))
    }

    /// Runs one time-driven sweep at the clock's current time.
    ///
    /// Every selected borrowing is transitioned in its own transaction. A
    /// failure is logged and reported but never stops the rest of the sweep;
    /// the borrowing is picked up again on the next sweep if it still matches.
    pub fn sweep(&self, sweep: Sweep) -> SweepReport {
        let now = self.clock.now();
        let due = self.store.select(|b| self.is_due(sweep, b, now));
        self.sweep_ids(sweep, due)
    }

    /// Transitions each id in its own transaction, collecting failures.
    fn sweep_ids(&self, sweep: Sweep, due: Vec<BorrowingId>) -> SweepReport {
        let mut report = SweepReport {
            sweep,
            selected: due.len(),
            applied: Vec::with_capacity(due.len()),
            failed: Vec::new(),
        };
        if due.is_empty() {
            return report;
        }
        debug!(sweep = sweep.name(), selected = due.len(), "sweep started");

        for id in due {
            let result = match sweep {
                Sweep::Activate => self.auto_activate(id),
                Sweep::Complete => self.auto_complete(id),
                Sweep::CancelPending => self.auto_cancel_pending(id),
            };
            match result {
                Ok(_) => {
                    info!(sweep = sweep.name(), borrowing = %id, "sweep applied");
                    report.applied.push(id);
                }
                Err(e) => {
                    warn!(sweep = sweep.name(), borrowing = %id, error = %e, "sweep item failed");
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    /// Activates an accepted booking whose start time has passed, re-asserting
    /// its reservation in the ledger.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotVerified`] / [`BorrowingError::NotBooking`] - Not an accepted booking.
    /// - [`BorrowingError::NotDue`] - Start time not reached.
    pub fn auto_activate(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let current = tx.borrowing(id)?;
            ensure_activatable(current)?;
            self.ensure_due(Sweep::Activate, current, now)?;
            let (units, location) = resources(current);
            tx.update_borrowing(id, |b| b.status = BorrowingStatus::Active)?;
            tx.reassert(&units, location.as_ref());
            tx.details(id)
        })
    }

    /// Completes an active borrowing whose end time has passed.
    ///
    /// No return time is stamped.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotActive`] - Borrowing is not `active`.
    /// - [`BorrowingError::NotDue`] - End time not reached.
    pub fn auto_complete(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let current = tx.borrowing(id)?;
            ensure_active(current)?;
            self.ensure_due(Sweep::Complete, current, now)?;
            let (units, location) = resources(current);
            tx.update_borrowing(id, |b| b.status = BorrowingStatus::Completed)?;
            tx.release(&units, location.as_ref());
            tx.details(id)
        })
    }

    /// Cancels a booking left unverified past the grace period.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::BorrowingNotFound`] - Unknown id.
    /// - [`BorrowingError::NotBooking`] - Borrowing is not in `booking`.
    /// - [`BorrowingError::NotPending`] - Borrowing was already verified.
    /// - [`BorrowingError::NotDue`] - Grace period not over.
    pub fn auto_cancel_pending(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let current = tx.borrowing(id)?;
            if current.status != BorrowingStatus::Booking {
                return Err(BorrowingError::NotBooking(current.status));
            }
            if current.verification != Verification::Pending {
                return Err(BorrowingError::NotPending(current.verification));
            }
            self.ensure_due(Sweep::CancelPending, current, now)?;
            let (units, location) = resources(current);
            cancel_and_release(tx, id, &units, location.as_ref())?;
            tx.details(id)
        })
    }

    fn is_due(&self, sweep: Sweep, borrowing: &Borrowing, now: DateTime<Utc>) -> bool {
        match sweep {
            Sweep::Activate => {
                borrowing.status == BorrowingStatus::Booking
                    && borrowing.verification == Verification::Accepted
                    && borrowing.start <= now
            }
            Sweep::Complete => {
                borrowing.status == BorrowingStatus::Active && borrowing.end <= now
            }
            Sweep::CancelPending => {
                borrowing.status == BorrowingStatus::Booking
                    && borrowing.verification == Verification::Pending
                    && now
                        .checked_sub_signed(self.policy.pending_grace)
                        .is_some_and(|cutoff| borrowing.created_at <= cutoff)
            }
        }
    }

    fn ensure_due(
        &self,
        sweep: Sweep,
        borrowing: &Borrowing,
        now: DateTime<Utc>,
    ) -> Result<(), BorrowingError> {
        if self.is_due(sweep, borrowing, now) {
            Ok(())
        } else {
            Err(BorrowingError::NotDue)
        }
    }

    fn routing(&self, ledger: &Ledger, borrowing: &Borrowing) -> Routing {
        Routing::of(borrowing.items.iter().map(|code| {
            ledger
                .unit(code)
                .map(|unit| self.catalog.category(&unit.catalog_type))
                .unwrap_or(Category::Other)
        }))
    }
}

/// Rejects unknown units first, then units that are not available.
fn check_units(ledger: &Ledger, units: &[UnitCode]) -> Result<(), BorrowingError> {
    let missing: Vec<UnitCode> = units
        .iter()
        .filter(|code| ledger.unit(code).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(BorrowingError::UnitsNotFound(missing));
    }

    let unavailable: Vec<UnitCode> = units
        .iter()
        .filter(|code| {
            ledger
                .unit(code)
                .is_some_and(|unit| unit.status != UnitStatus::Available)
        })
        .cloned()
        .collect();
    if !unavailable.is_empty() {
        return Err(BorrowingError::UnitsUnavailable(unavailable));
    }
    Ok(())
}

fn ensure_activatable(borrowing: &Borrowing) -> Result<(), BorrowingError> {
    if borrowing.verification != Verification::Accepted {
        return Err(BorrowingError::NotVerified);
    }
    if borrowing.status != BorrowingStatus::Booking {
        return Err(BorrowingError::NotBooking(borrowing.status));
    }
    Ok(())
}

fn ensure_active(borrowing: &Borrowing) -> Result<(), BorrowingError> {
    if borrowing.status != BorrowingStatus::Active {
        return Err(BorrowingError::NotActive(borrowing.status));
    }
    Ok(())
}

fn resources(borrowing: &Borrowing) -> (Vec<UnitCode>, Option<LocationCode>) {
    (borrowing.items.clone(), borrowing.location().cloned())
}

fn cancel_and_release(
    tx: &mut Transaction<'_>,
    id: BorrowingId,
    units: &[UnitCode],
    location: Option<&LocationCode>,
) -> Result<(), BorrowingError> {
    tx.update_borrowing(id, |b| {
        b.status = BorrowingStatus::Cancelled;
        b.verification = Verification::Rejected;
    })?;
    tx.release(units, location);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::CatalogTypeId;
    use crate::catalog::MemoryCatalog;
    use crate::clock::ManualClock;
    use crate::ledger::AssetUnit;
    use chrono::TimeZone;

    fn engine() -> (Engine, Arc<ManualClock>) {
        let store = Store::new();
        for (code, status) in [
            ("A", UnitStatus::Available),
            ("B", UnitStatus::Unavailable),
            ("C", UnitStatus::Available),
            ("D", UnitStatus::Available),
        ] {
            store.register_unit(AssetUnit {
                code: UnitCode::new(code),
                catalog_type: CatalogTypeId::new("t"),
                home: None,
                status,
            });
        }
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let engine = Engine::new(store, Arc::new(MemoryCatalog::new()), clock.clone());
        (engine, clock)
    }

    fn draft(requester: &str, unit: &str) -> NewBorrowing {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        NewBorrowing {
            requester: RequesterId::new(requester),
            location: None,
            alternate_location: Some("Hall".into()),
            phone: "081234567890".into(),
            agenda: "Seminar".into(),
            start,
            end: start + Duration::hours(1),
            units: vec![UnitCode::new(unit)],
        }
    }

    /// Creates and accepts a booking for one unit.
    fn accepted(engine: &Engine, requester: &str, unit: &str) -> BorrowingId {
        let id = engine.create(draft(requester, unit)).unwrap().borrowing.id;
        engine
            .verify(id, Decision::Accepted, Role::AcademicHead)
            .unwrap();
        id
    }

    #[test]
    fn check_units_reports_missing_before_unavailable() {
        let (engine, _) = engine();
        engine
            .store
            .transaction(|tx| {
                let codes = [UnitCode::new("B"), UnitCode::new("X"), UnitCode::new("Y")];
                assert_eq!(
                    check_units(tx.ledger(), &codes),
                    Err(BorrowingError::UnitsNotFound(vec![
                        UnitCode::new("X"),
                        UnitCode::new("Y")
                    ]))
                );
                assert_eq!(
                    check_units(tx.ledger(), &[UnitCode::new("A"), UnitCode::new("B")]),
                    Err(BorrowingError::UnitsUnavailable(vec![UnitCode::new("B")]))
                );
                assert!(check_units(tx.ledger(), &[UnitCode::new("A")]).is_ok());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn pending_grace_boundary_is_inclusive() {
        let (engine, _) = engine();
        let created = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
        let draft = draft("u1", "A");
        let destination = draft.validate().unwrap();
        let borrowing = Borrowing::new(BorrowingId(1), draft, destination, created);

        let grace = engine.policy().pending_grace;
        assert!(!engine.is_due(
            Sweep::CancelPending,
            &borrowing,
            created + grace - Duration::seconds(1)
        ));
        assert!(engine.is_due(Sweep::CancelPending, &borrowing, created + grace));
        assert!(!engine.is_due(Sweep::Activate, &borrowing, created + Duration::hours(3)));
    }

    #[test]
    fn grace_beyond_date_range_is_never_due() {
        let (engine, clock) = engine();
        let engine = engine.with_policy(Policy {
            pending_grace: Duration::MAX,
            ..Policy::default()
        });
        let id = engine.create(draft("u1", "A")).unwrap().borrowing.id;
        clock.advance(Duration::days(365));

        let report = engine.sweep(Sweep::CancelPending);
        assert_eq!(report.selected, 0);
        assert_eq!(
            engine.get(id).unwrap().borrowing.verification,
            Verification::Pending
        );
    }

    #[test]
    fn failed_item_does_not_block_siblings() {
        let (engine, clock) = engine();
        let first = accepted(&engine, "u1", "A");
        let already_active = accepted(&engine, "u2", "C");
        let last = accepted(&engine, "u3", "D");
        engine.activate(already_active).unwrap();
        clock.set(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap());

        let report = engine.sweep_ids(
            Sweep::Activate,
            vec![first, BorrowingId(99), already_active, last],
        );

        assert_eq!(report.selected, 4);
        assert_eq!(report.applied, vec![first, last]);
        assert_eq!(
            report.failed,
            vec![
                (BorrowingId(99), BorrowingError::BorrowingNotFound(BorrowingId(99))),
                (
                    already_active,
                    BorrowingError::NotBooking(BorrowingStatus::Active)
                ),
            ]
        );
        for id in [first, last] {
            assert_eq!(
                engine.get(id).unwrap().borrowing.status,
                BorrowingStatus::Active
            );
        }
    }

    #[test]
    fn scan_times_come_from_the_scan_log() {
        let (engine, clock) = engine();
        let id = accepted(&engine, "u1", "A");
        let pickup = Utc.with_ymd_and_hms(2025, 3, 3, 8, 50, 0).unwrap();

        clock.set(pickup);
        engine.scan_pickup(id, StaffId::new("s1")).unwrap();
        clock.advance(Duration::minutes(5));
        engine.scan_pickup(id, StaffId::new("s2")).unwrap();
        clock.advance(Duration::minutes(30));
        engine.scan_return(id, StaffId::new("s1")).unwrap();
        clock.advance(Duration::minutes(10));
        let details = engine.scan_return(id, StaffId::new("s1")).unwrap();

        let store = engine.store();
        store
            .transaction(|tx| {
                assert_eq!(tx.scans().first_pickup(id), Some(pickup));
                assert_eq!(
                    tx.scans().last_return(id),
                    Some(pickup + Duration::minutes(45))
                );
                Ok(())
            })
            .unwrap();
        assert_eq!(details.borrowing.picked_up_at, Some(pickup));
        assert_eq!(details.borrowing.returned_at, Some(pickup + Duration::minutes(45)));
    }
}
