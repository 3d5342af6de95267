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

//! Borrowing records.
//!
//! A borrowing follows a state machine:
//! - [`Booking`] → [`Active`] (via activate, pickup scan, or the scheduler)
//! - [`Booking`] → [`Cancelled`] (via cancel, rejection, or pending expiry)
//! - [`Active`] → [`Completed`] (via complete or the scheduler)
//!
//! [`Booking`]: BorrowingStatus::Booking
//! [`Active`]: BorrowingStatus::Active
//! [`Cancelled`]: BorrowingStatus::Cancelled
//! [`Completed`]: BorrowingStatus::Completed

use crate::base::{BorrowingId, LocationCode, RequesterId, UnitCode};
use crate::error::BorrowingError;
use crate::ledger::{AssetUnit, Location};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Lifecycle status of a borrowing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Booking,
    Active,
    Completed,
    Cancelled,
}

impl BorrowingStatus {
    /// Booking and active borrowings hold resources.
    pub fn is_open(self) -> bool {
        matches!(self, BorrowingStatus::Booking | BorrowingStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BorrowingStatus::Booking => "booking",
            BorrowingStatus::Active => "active",
            BorrowingStatus::Completed => "completed",
            BorrowingStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Staff verification of a borrowing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verification::Pending => "pending",
            Verification::Accepted => "accepted",
            Verification::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Verifier's decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

/// Where the borrowed units will be used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Ledger-tracked catalog location.
    Catalog(LocationCode),
    /// Free-text location, never reserved in the ledger.
    Alternate(String),
}

impl Destination {
    /// Builds a destination from the two mutually exclusive request fields.
    ///
    /// Blank strings count as absent.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::MissingDestination`] - Neither field is set.
    /// - [`BorrowingError::ConflictingDestination`] - Both fields are set.
    pub fn from_parts(
        location: Option<LocationCode>,
        alternate: Option<String>,
    ) -> Result<Self, BorrowingError> {
        let location = location.filter(|code| !code.as_str().trim().is_empty());
        let alternate = alternate.filter(|text| !text.trim().is_empty());
        match (location, alternate) {
            (Some(code), None) => Ok(Destination::Catalog(code)),
            (None, Some(text)) => Ok(Destination::Alternate(text)),
            (None, None) => Err(BorrowingError::MissingDestination),
            (Some(_), Some(_)) => Err(BorrowingError::ConflictingDestination),
        }
    }

    /// The ledger-tracked location, if any.
    pub fn location(&self) -> Option<&LocationCode> {
        match self {
            Destination::Catalog(code) => Some(code),
            Destination::Alternate(_) => None,
        }
    }
}

/// Input for creating a borrowing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBorrowing {
    pub requester: RequesterId,
    pub location: Option<LocationCode>,
    pub alternate_location: Option<String>,
    pub phone: String,
    pub agenda: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub units: Vec<UnitCode>,
}

impl NewBorrowing {
    const MIN_PHONE_LEN: usize = 10;
    const MIN_AGENDA_LEN: usize = 5;

    /// Runs the stateless create guards and resolves the destination.
    ///
    /// Guards run in order: item list, destination, unit uniqueness, window,
    /// phone, agenda.
    pub(crate) fn validate(&self) -> Result<Destination, BorrowingError> {
        if self.units.is_empty() {
            return Err(BorrowingError::EmptyItems);
        }
        let destination =
            Destination::from_parts(self.location.clone(), self.alternate_location.clone())?;

        let mut seen = HashSet::with_capacity(self.units.len());
        for unit in &self.units {
            if !seen.insert(unit) {
                return Err(BorrowingError::DuplicateUnit(unit.clone()));
            }
        }

        if self.end <= self.start {
            return Err(BorrowingError::InvalidWindow);
        }
        if self.phone.trim().chars().count() < Self::MIN_PHONE_LEN {
            return Err(BorrowingError::InvalidPhone);
        }
        if self.agenda.trim().chars().count() < Self::MIN_AGENDA_LEN {
            return Err(BorrowingError::InvalidAgenda);
        }
        Ok(destination)
    }
}

/// A borrowing request and its line items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Borrowing {
    pub id: BorrowingId,
    pub requester: RequesterId,
    pub destination: Destination,
    pub phone: String,
    pub agenda: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BorrowingStatus,
    pub verification: Verification,
    /// First pickup scan.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Latest return scan, or the completion time.
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// One item per asset unit.
    pub items: Vec<UnitCode>,
}

impl Borrowing {
    pub(crate) fn new(
        id: BorrowingId,
        draft: NewBorrowing,
        destination: Destination,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester: draft.requester,
            destination,
            phone: draft.phone,
            agenda: draft.agenda,
            start: draft.start,
            end: draft.end,
            status: BorrowingStatus::Booking,
            verification: Verification::Pending,
            picked_up_at: None,
            returned_at: None,
            created_at,
            items: draft.units,
        }
    }

    pub fn location(&self) -> Option<&LocationCode> {
        self.destination.location()
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.status != BorrowingStatus::Active || self.verification == Verification::Accepted,
            "Invariant violated: borrowing {} is active without acceptance",
            self.id
        );
        debug_assert!(
            self.status != BorrowingStatus::Cancelled
                || self.verification != Verification::Accepted,
            "Invariant violated: borrowing {} is cancelled but accepted",
            self.id
        );
        debug_assert!(
            !self.items.is_empty(),
            "Invariant violated: borrowing {} has no items",
            self.id
        );
    }
}

/// A borrowing with its units and location expanded.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BorrowingDetails {
    pub borrowing: Borrowing,
    pub units: Vec<AssetUnit>,
    pub location: Option<Location>,
}

/// Optional filters for listing borrowings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BorrowingFilter {
    pub requester: Option<RequesterId>,
    pub status: Option<BorrowingStatus>,
    pub verification: Option<Verification>,
}

impl BorrowingFilter {
    pub fn matches(&self, borrowing: &Borrowing) -> bool {
        self.requester
            .as_ref()
            .is_none_or(|requester| *requester == borrowing.requester)
            && self.status.is_none_or(|status| status == borrowing.status)
            && self
                .verification
                .is_none_or(|verification| verification == borrowing.verification)
    }
}
