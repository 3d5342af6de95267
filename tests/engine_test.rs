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

//! Engine public API integration tests.

use borrow_ledger_rs::{
    AssetUnit, BorrowingError, BorrowingFilter, BorrowingId, BorrowingStatus, CatalogTypeId,
    Decision, Destination, Engine, ErrorKind, Location, LocationCode, LocationStatus, ManualClock,
    MemoryCatalog, NewBorrowing, Policy, RequesterId, Role, ScanKind, StaffId, Store, Sweep,
    UnitCode, UnitStatus, Verification,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
}

/// Projectors P1, P2; laptops L1, L2; rooms R101, R102 (free) and R999 (unavailable).
fn setup() -> (Engine, Arc<ManualClock>) {
    let store = Store::new();
    let catalog = MemoryCatalog::new();
    catalog.register(CatalogTypeId::new("proj"), "Proyektor Epson");
    catalog.register(CatalogTypeId::new("laptop"), "Laptop Lenovo");

    for (code, kind) in [("P1", "proj"), ("P2", "proj"), ("L1", "laptop"), ("L2", "laptop")] {
        store.register_unit(AssetUnit {
            code: UnitCode::new(code),
            catalog_type: CatalogTypeId::new(kind),
            home: None,
            status: UnitStatus::Available,
        });
    }
    for (code, status) in [
        ("R101", LocationStatus::Free),
        ("R102", LocationStatus::Free),
        ("R999", LocationStatus::Unavailable),
    ] {
        store.register_location(Location {
            code: LocationCode::new(code),
            name: format!("Room {code}"),
            status,
        });
    }

    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let engine = Engine::new(store, Arc::new(catalog), clock.clone());
    (engine, clock)
}

fn draft(requester: &str, units: &[&str], location: Option<&str>) -> NewBorrowing {
    NewBorrowing {
        requester: RequesterId::new(requester),
        location: location.map(LocationCode::new),
        alternate_location: location.is_none().then(|| "Lobby".to_string()),
        phone: "081234567890".into(),
        agenda: "Seminar".into(),
        start: at(9, 0),
        end: at(11, 0),
        units: units.iter().map(|code| UnitCode::new(*code)).collect(),
    }
}

fn unit_status(engine: &Engine, code: &str) -> UnitStatus {
    engine.store().unit(&UnitCode::new(code)).unwrap().status
}

fn location_status(engine: &Engine, code: &str) -> LocationStatus {
    engine.store().location(&LocationCode::new(code)).unwrap().status
}

/// Creates and accepts a borrowing, returning its id.
fn accepted(engine: &Engine, requester: &str, units: &[&str], location: Option<&str>) -> BorrowingId {
    let id = engine
        .create(draft(requester, units, location))
        .unwrap()
        .borrowing
        .id;
    let role = if units.iter().all(|u| u.starts_with('P')) {
        Role::ProgramStaff
    } else {
        Role::AcademicHead
    };
    engine.verify(id, Decision::Accepted, role).unwrap();
    id
}

// === Create ===

#[test]
fn create_reserves_units_and_location() {
    let (engine, _) = setup();
    let details = engine.create(draft("u1", &["L1", "L2"], Some("R101"))).unwrap();

    assert_eq!(details.borrowing.status, BorrowingStatus::Booking);
    assert_eq!(details.borrowing.verification, Verification::Pending);
    assert_eq!(details.borrowing.created_at, at(8, 0));
    assert_eq!(details.units.len(), 2);
    assert!(details.units.iter().all(|u| u.status == UnitStatus::Unavailable));
    assert_eq!(details.location.unwrap().status, LocationStatus::Occupied);
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Unavailable);
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Occupied);
}

#[test]
fn create_with_alternate_location_leaves_rooms_untouched() {
    let (engine, _) = setup();
    let details = engine.create(draft("u1", &["L1"], None)).unwrap();

    assert_eq!(
        details.borrowing.destination,
        Destination::Alternate("Lobby".into())
    );
    assert!(details.location.is_none());
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Free);
}

#[test]
fn create_assigns_increasing_ids() {
    let (engine, _) = setup();
    let first = engine.create(draft("u1", &["L1"], None)).unwrap();
    let second = engine.create(draft("u2", &["L2"], None)).unwrap();
    assert!(second.borrowing.id > first.borrowing.id);
}

#[test]
fn create_validation_errors() {
    let (engine, _) = setup();

    let mut empty = draft("u1", &[], None);
    empty.units.clear();
    assert_eq!(engine.create(empty), Err(BorrowingError::EmptyItems));

    let mut nowhere = draft("u1", &["L1"], None);
    nowhere.alternate_location = Some("   ".into());
    assert_eq!(engine.create(nowhere), Err(BorrowingError::MissingDestination));

    let mut both = draft("u1", &["L1"], Some("R101"));
    both.alternate_location = Some("Lobby".into());
    assert_eq!(engine.create(both), Err(BorrowingError::ConflictingDestination));

    assert_eq!(
        engine.create(draft("u1", &["L1", "L1"], None)),
        Err(BorrowingError::DuplicateUnit(UnitCode::new("L1")))
    );

    let mut backwards = draft("u1", &["L1"], None);
    backwards.end = backwards.start;
    assert_eq!(engine.create(backwards), Err(BorrowingError::InvalidWindow));

    let mut phone = draft("u1", &["L1"], None);
    phone.phone = "0812".into();
    assert_eq!(engine.create(phone), Err(BorrowingError::InvalidPhone));

    let mut agenda = draft("u1", &["L1"], None);
    agenda.agenda = " ab ".into();
    let err = engine.create(agenda).unwrap_err();
    assert_eq!(err, BorrowingError::InvalidAgenda);
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(engine.list(&BorrowingFilter::default()).is_empty());
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
}

#[test]
fn create_rejects_unknown_units_before_unavailable_ones() {
    let (engine, _) = setup();
    engine.create(draft("u1", &["L1"], None)).unwrap();

    let err = engine
        .create(draft("u2", &["L1", "X9"], None))
        .unwrap_err();
    assert_eq!(err, BorrowingError::UnitsNotFound(vec![UnitCode::new("X9")]));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine
        .create(draft("u2", &["L2", "L1"], None))
        .unwrap_err();
    assert_eq!(err, BorrowingError::UnitsUnavailable(vec![UnitCode::new("L1")]));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(unit_status(&engine, "L2"), UnitStatus::Available);
}

#[test]
fn create_rejects_location_not_free() {
    let (engine, _) = setup();
    engine.create(draft("u1", &["L1"], Some("R101"))).unwrap();

    assert_eq!(
        engine.create(draft("u2", &["L2"], Some("R101"))),
        Err(BorrowingError::LocationOccupied(LocationCode::new("R101")))
    );
    assert_eq!(
        engine.create(draft("u2", &["L2"], Some("R999"))),
        Err(BorrowingError::LocationUnavailable(LocationCode::new("R999")))
    );
    assert_eq!(
        engine.create(draft("u2", &["L2"], Some("R404"))),
        Err(BorrowingError::LocationNotFound(LocationCode::new("R404")))
    );
    // Units untouched by the failed attempts
    assert_eq!(unit_status(&engine, "L2"), UnitStatus::Available);
}

#[test]
fn create_rejects_second_open_borrowing() {
    let (engine, _) = setup();
    engine.create(draft("u1", &["L1"], None)).unwrap();

    let err = engine.create(draft("u1", &["L2"], None)).unwrap_err();
    assert_eq!(err, BorrowingError::OpenBorrowingExists);
    assert_eq!(unit_status(&engine, "L2"), UnitStatus::Available);
}

#[test]
fn create_enforces_quota_on_non_cancelled_borrowings() {
    let (engine, _) = setup();
    let engine = engine.with_policy(Policy {
        max_borrowings: 2,
        ..Policy::default()
    });

    for _ in 0..2 {
        let id = accepted(&engine, "u1", &["L1"], None);
        engine.scan_pickup(id, StaffId::new("s1")).unwrap();
        engine.complete(id).unwrap();
    }
    assert_eq!(
        engine.create(draft("u1", &["L1"], None)),
        Err(BorrowingError::QuotaExceeded { limit: 2 })
    );
}

#[test]
fn cancelled_borrowings_do_not_count_toward_quota() {
    let (engine, _) = setup();
    let engine = engine.with_policy(Policy {
        max_borrowings: 1,
        ..Policy::default()
    });

    let id = engine.create(draft("u1", &["L1"], None)).unwrap().borrowing.id;
    engine.cancel(id, &RequesterId::new("u1")).unwrap();

    assert!(engine.create(draft("u1", &["L1"], None)).is_ok());
}

#[test]
fn reservation_failure_mid_transaction_reserves_nothing() {
    let (engine, _) = setup();

    let result: Result<(), BorrowingError> = engine.store().transaction(|tx| {
        tx.reserve(&[UnitCode::new("L1"), UnitCode::new("L2")], None)?;
        // Injected failure after the units were marked
        Err(BorrowingError::UnitsUnavailable(vec![UnitCode::new("P1")]))
    });

    assert!(result.is_err());
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
    assert_eq!(unit_status(&engine, "L2"), UnitStatus::Available);
}

// === Verify ===

#[test]
fn verify_routes_projector_only_to_program_staff() {
    let (engine, _) = setup();
    let id = engine.create(draft("u1", &["P1", "P2"], None)).unwrap().borrowing.id;

    let err = engine
        .verify(id, Decision::Accepted, Role::AcademicHead)
        .unwrap_err();
    assert_eq!(err, BorrowingError::ProjectorOnlyNotForAcademicHead);
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let details = engine
        .verify(id, Decision::Accepted, Role::ProgramStaff)
        .unwrap();
    assert_eq!(details.borrowing.verification, Verification::Accepted);
    assert_eq!(details.borrowing.status, BorrowingStatus::Booking);
}

#[test]
fn verify_routes_mixed_to_academic_head() {
    let (engine, _) = setup();
    let id = engine.create(draft("u1", &["P1", "L1"], None)).unwrap().borrowing.id;

    assert_eq!(
        engine.verify(id, Decision::Accepted, Role::ProgramStaff),
        Err(BorrowingError::ProjectorOnlyRequiresProgramStaff)
    );
    assert_eq!(
        engine.verify(id, Decision::Accepted, Role::Borrower),
        Err(BorrowingError::RoleCannotVerify(Role::Borrower))
    );
    assert!(engine.verify(id, Decision::Accepted, Role::AcademicHead).is_ok());
}

#[test]
fn verify_reject_cancels_and_releases() {
    let (engine, _) = setup();
    let id = engine
        .create(draft("u1", &["L1"], Some("R101")))
        .unwrap()
        .borrowing
        .id;

    let details = engine
        .verify(id, Decision::Rejected, Role::AcademicHead)
        .unwrap();
    assert_eq!(details.borrowing.status, BorrowingStatus::Cancelled);
    assert_eq!(details.borrowing.verification, Verification::Rejected);
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Free);
}

#[test]
fn verify_requires_booking() {
    let (engine, _) = setup();
    let id = engine.create(draft("u1", &["L1"], None)).unwrap().borrowing.id;
    engine.verify(id, Decision::Rejected, Role::AcademicHead).unwrap();

    let err = engine
        .verify(id, Decision::Accepted, Role::AcademicHead)
        .unwrap_err();
    assert_eq!(err, BorrowingError::NotBooking(BorrowingStatus::Cancelled));
    assert_eq!(err.kind(), ErrorKind::State);

    assert_eq!(
        engine.verify(BorrowingId(99), Decision::Accepted, Role::AcademicHead),
        Err(BorrowingError::BorrowingNotFound(BorrowingId(99)))
    );
}

// === Activate ===

#[test]
fn activate_requires_acceptance() {
    let (engine, _) = setup();
    let id = engine.create(draft("u1", &["L1"], None)).unwrap().borrowing.id;

    assert_eq!(engine.activate(id), Err(BorrowingError::NotVerified));

    engine.verify(id, Decision::Accepted, Role::AcademicHead).unwrap();
    let details = engine.activate(id).unwrap();
    assert_eq!(details.borrowing.status, BorrowingStatus::Active);
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Unavailable);

    assert_eq!(
        engine.activate(id),
        Err(BorrowingError::NotBooking(BorrowingStatus::Active))
    );
}

// === Scans ===

#[test]
fn pickup_scan_activates_and_stamps_first_pickup() {
    let (engine, clock) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);

    clock.set(at(8, 55));
    let details = engine.scan_pickup(id, StaffId::new("s1")).unwrap();
    assert_eq!(details.borrowing.status, BorrowingStatus::Active);
    assert_eq!(details.borrowing.picked_up_at, Some(at(8, 55)));

    clock.set(at(9, 10));
    let details = engine.scan_pickup(id, StaffId::new("s2")).unwrap();
    assert_eq!(details.borrowing.picked_up_at, Some(at(8, 55)));

    let scans = engine.scans(id).unwrap();
    assert_eq!(scans.len(), 2);
    assert!(scans.iter().all(|s| s.kind == ScanKind::Pickup));
    assert_eq!(scans[1].staff, StaffId::new("s2"));
}

#[test]
fn pickup_scan_requires_acceptance_and_open_status() {
    let (engine, _) = setup();
    let id = engine.create(draft("u1", &["L1"], None)).unwrap().borrowing.id;
    assert_eq!(
        engine.scan_pickup(id, StaffId::new("s1")),
        Err(BorrowingError::NotVerified)
    );

    engine.verify(id, Decision::Accepted, Role::AcademicHead).unwrap();
    engine.scan_pickup(id, StaffId::new("s1")).unwrap();
    engine.complete(id).unwrap();
    assert_eq!(
        engine.scan_pickup(id, StaffId::new("s1")),
        Err(BorrowingError::NotPickupable(BorrowingStatus::Completed))
    );
    assert_eq!(engine.scans(id).unwrap().len(), 1);
}

#[test]
fn return_scans_log_every_event_and_keep_the_latest() {
    let (engine, clock) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);
    engine.scan_pickup(id, StaffId::new("s1")).unwrap();

    clock.set(at(10, 0));
    engine.scan_return(id, StaffId::new("s1")).unwrap();
    clock.set(at(10, 30));
    let details = engine.scan_return(id, StaffId::new("s1")).unwrap();

    assert_eq!(details.borrowing.status, BorrowingStatus::Active);
    assert_eq!(details.borrowing.returned_at, Some(at(10, 30)));
    let returns = engine
        .scans(id)
        .unwrap()
        .into_iter()
        .filter(|s| s.kind == ScanKind::Return)
        .count();
    assert_eq!(returns, 2);
}

#[test]
fn return_scan_requires_active() {
    let (engine, _) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);
    assert_eq!(
        engine.scan_return(id, StaffId::new("s1")),
        Err(BorrowingError::NotActive(BorrowingStatus::Booking))
    );
    assert!(engine.scans(id).unwrap().is_empty());
}

// === Complete ===

#[test]
fn return_then_complete_releases_and_keeps_return_time() {
    let (engine, clock) = setup();
    let id = accepted(&engine, "u1", &["L1", "L2"], Some("R101"));
    engine.scan_pickup(id, StaffId::new("s1")).unwrap();

    clock.set(at(10, 45));
    engine.scan_return(id, StaffId::new("s1")).unwrap();
    clock.set(at(11, 5));
    let details = engine.complete(id).unwrap();

    assert_eq!(details.borrowing.status, BorrowingStatus::Completed);
    assert_eq!(details.borrowing.returned_at, Some(at(10, 45)));
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
    assert_eq!(unit_status(&engine, "L2"), UnitStatus::Available);
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Free);
}

#[test]
fn complete_without_return_scan_stamps_now() {
    let (engine, clock) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);
    engine.activate(id).unwrap();

    clock.set(at(11, 0));
    let details = engine.complete(id).unwrap();
    assert_eq!(details.borrowing.returned_at, Some(at(11, 0)));
}

#[test]
fn complete_requires_active() {
    let (engine, _) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);
    let err = engine.complete(id).unwrap_err();
    assert_eq!(err, BorrowingError::NotActive(BorrowingStatus::Booking));
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Unavailable);
}

// === Cancel ===

#[test]
fn cancel_releases_resources() {
    let (engine, _) = setup();
    let id = accepted(&engine, "u1", &["L1"], Some("R101"));

    let details = engine.cancel(id, &RequesterId::new("u1")).unwrap();
    assert_eq!(details.borrowing.status, BorrowingStatus::Cancelled);
    assert_eq!(details.borrowing.verification, Verification::Rejected);
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Free);
}

#[test]
fn cancel_on_completed_fails_and_changes_nothing() {
    let (engine, _) = setup();
    let id = accepted(&engine, "u1", &["L1"], Some("R101"));
    engine.scan_pickup(id, StaffId::new("s1")).unwrap();
    engine.complete(id).unwrap();

    // Another borrowing now holds the released room
    engine.create(draft("u2", &["L2"], Some("R101"))).unwrap();
    let before = engine.get(id).unwrap();

    let err = engine.cancel(id, &RequesterId::new("u1")).unwrap_err();
    assert_eq!(err, BorrowingError::AlreadyCompleted);
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(engine.get(id).unwrap().borrowing, before.borrowing);
    assert_eq!(location_status(&engine, "R101"), LocationStatus::Occupied);
    assert_eq!(unit_status(&engine, "L1"), UnitStatus::Available);
}

#[test]
fn cancel_rejects_other_requesters_and_active_borrowings() {
    let (engine, _) = setup();
    let id = accepted(&engine, "u1", &["L1"], None);

    assert_eq!(
        engine.cancel(id, &RequesterId::new("u2")),
        Err(BorrowingError::NotOwner)
    );

    engine.activate(id).unwrap();
    assert_eq!(
        engine.cancel(id, &RequesterId::new("u1")),
        Err(BorrowingError::AlreadyActive)
    );

    let other = engine.create(draft("u3", &["L2"], None)).unwrap().borrowing.id;
    engine.cancel(other, &RequesterId::new("u3")).unwrap();
    assert_eq!(
        engine.cancel(other, &RequesterId::new("u3")),
        Err(BorrowingError::AlreadyCancelled)
    );
}

// === Queries ===

#[test]
fn list_filters_and_orders_newest_first() {
    let (engine, clock) = setup();
    let first = engine.create(draft("u1", &["L1"], None)).unwrap().borrowing.id;
    clock.advance(Duration::minutes(1));
    let second = engine.create(draft("u2", &["L2"], None)).unwrap().borrowing.id;
    engine.verify(second, Decision::Accepted, Role::AcademicHead).unwrap();

    let all: Vec<_> = engine
        .list(&BorrowingFilter::default())
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(all, vec![second, first]);

    let pending = engine.list(&BorrowingFilter {
        verification: Some(Verification::Pending),
        ..BorrowingFilter::default()
    });
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first);

    let mine = engine.list(&BorrowingFilter {
        requester: Some(RequesterId::new("u2")),
        status: Some(BorrowingStatus::Booking),
        ..BorrowingFilter::default()
    });
    assert_eq!(mine.len(), 1);
}

#[test]
fn get_and_scans_report_unknown_ids() {
    let (engine, _) = setup();
    assert_eq!(
        engine.get(BorrowingId(7)),
        Err(BorrowingError::BorrowingNotFound(BorrowingId(7)))
    );
    assert_eq!(
        engine.scans(BorrowingId(7)),
        Err(BorrowingError::BorrowingNotFound(BorrowingId(7)))
    );
}

// === Sweeps ===

#[test]
fn full_lifecycle_via_sweeps() {
    let (engine, clock) = setup();
    let id = accepted(&engine, "u1", &["P1"], Some("R102"));

    clock.set(at(9, 0));
    engine.sweep(Sweep::Activate);
    assert_eq!(engine.get(id).unwrap().borrowing.status, BorrowingStatus::Active);

    clock.set(at(11, 0));
    engine.sweep(Sweep::Complete);
    let details = engine.get(id).unwrap();
    assert_eq!(details.borrowing.status, BorrowingStatus::Completed);
    assert_eq!(details.units[0].status, UnitStatus::Available);
    assert_eq!(location_status(&engine, "R102"), LocationStatus::Free);
}
