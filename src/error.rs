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

//! Error types for borrowing lifecycle operations.
//!
//! Every failure is raised before any mutation is attempted, or the enclosing
//! store transaction is rolled back. Callers never observe partial application.

use crate::base::{BorrowingId, LocationCode, UnitCode};
use crate::borrowing::{BorrowingStatus, Verification};
use crate::catalog::Role;
use thiserror::Error;

/// Coarse failure classes, used by callers to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// Resource unavailable, quota exceeded, or duplicate in-flight request.
    Conflict,
    /// Unknown identifier.
    NotFound,
    /// Role or identity not permitted for this transition.
    Authorization,
    /// Operation not valid for the current status.
    State,
}

/// Borrowing lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BorrowingError {
    /// No asset units were requested
    #[error("at least one asset unit must be requested")]
    EmptyItems,

    /// Neither a catalog location nor an alternate location was given
    #[error("a catalog location or an alternate location is required")]
    MissingDestination,

    /// Both a catalog location and an alternate location were given
    #[error("catalog location and alternate location are mutually exclusive")]
    ConflictingDestination,

    /// The same asset unit appears twice in one request
    #[error("asset unit {0} is listed more than once")]
    DuplicateUnit(UnitCode),

    /// Requested end is not after requested start
    #[error("requested end must be after requested start")]
    InvalidWindow,

    /// Contact phone is too short
    #[error("contact phone must have at least 10 characters")]
    InvalidPhone,

    /// Agenda is blank or too short
    #[error("agenda must have at least 5 characters")]
    InvalidAgenda,

    /// Requester already has a booking or active borrowing
    #[error("requester already has an open borrowing")]
    OpenBorrowingExists,

    /// Requester reached the maximum number of non-cancelled borrowings
    #[error("requester reached the limit of {limit} borrowings")]
    QuotaExceeded { limit: usize },

    /// One or more requested units are not available
    #[error("asset units not available: {}", join(.0))]
    UnitsUnavailable(Vec<UnitCode>),

    /// Ledger refused to reserve a unit that is already unavailable
    #[error("asset unit {0} is already unavailable")]
    AlreadyUnavailable(UnitCode),

    /// Catalog location is occupied by another borrowing
    #[error("location {0} is occupied")]
    LocationOccupied(LocationCode),

    /// Catalog location is not open for borrowing
    #[error("location {0} is unavailable")]
    LocationUnavailable(LocationCode),

    /// Referenced borrowing does not exist
    #[error("borrowing {0} not found")]
    BorrowingNotFound(BorrowingId),

    /// One or more requested units do not exist
    #[error("asset units not found: {}", join(.0))]
    UnitsNotFound(Vec<UnitCode>),

    /// Referenced catalog location does not exist
    #[error("location {0} not found")]
    LocationNotFound(LocationCode),

    /// Caller does not own the borrowing
    #[error("requester does not own this borrowing")]
    NotOwner,

    /// Role may not verify borrowings at all
    #[error("role {0} cannot verify borrowings")]
    RoleCannotVerify(Role),

    /// Borrowing contains non-projector units, outside program staff authority
    #[error("program staff may only verify projector-only borrowings")]
    ProjectorOnlyRequiresProgramStaff,

    /// Borrowing is projector-only and must go to program staff
    #[error("projector-only borrowings must be verified by program staff")]
    ProjectorOnlyNotForAcademicHead,

    /// Operation requires a booking borrowing
    #[error("borrowing is {0}, only booking borrowings qualify")]
    NotBooking(BorrowingStatus),

    /// Operation requires an accepted verification
    #[error("borrowing has not been accepted")]
    NotVerified,

    /// Operation requires an active borrowing
    #[error("borrowing is {0}, only active borrowings qualify")]
    NotActive(BorrowingStatus),

    /// Expiry of a booking that is no longer awaiting verification
    #[error("borrowing verification is {0}, only pending borrowings expire")]
    NotPending(Verification),

    /// Time-driven transition attempted before its trigger time
    #[error("borrowing is not yet due for this transition")]
    NotDue,

    /// Pickup scan on a finished borrowing
    #[error("borrowing is {0} and cannot be picked up")]
    NotPickupable(BorrowingStatus),

    /// Cancellation of a borrowing that is already in use
    #[error("borrowing is already active, contact staff to cancel")]
    AlreadyActive,

    /// Cancellation of a finished borrowing
    #[error("borrowing is already completed")]
    AlreadyCompleted,

    /// Cancellation of a cancelled borrowing
    #[error("borrowing is already cancelled")]
    AlreadyCancelled,
}

impl BorrowingError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        use BorrowingError::*;
        match self {
            EmptyItems | MissingDestination | ConflictingDestination | DuplicateUnit(_)
            | InvalidWindow | InvalidPhone | InvalidAgenda => ErrorKind::Validation,
            OpenBorrowingExists
            | QuotaExceeded { .. }
            | UnitsUnavailable(_)
            | AlreadyUnavailable(_)
            | LocationOccupied(_)
            | LocationUnavailable(_) => ErrorKind::Conflict,
            BorrowingNotFound(_) | UnitsNotFound(_) | LocationNotFound(_) => ErrorKind::NotFound,
            NotOwner
            | RoleCannotVerify(_)
            | ProjectorOnlyRequiresProgramStaff
            | ProjectorOnlyNotForAcademicHead => ErrorKind::Authorization,
            NotBooking(_) | NotVerified | NotActive(_) | NotPending(_) | NotDue
            | NotPickupable(_) | AlreadyActive | AlreadyCompleted | AlreadyCancelled => ErrorKind::State,
        }
    }
}

fn join(units: &[UnitCode]) -> String {
    units
        .iter()
        .map(UnitCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
