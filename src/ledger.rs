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

//! Resource ledger.
//!
//! Tracks availability of asset units and catalog locations:
//!
//! ```text
//!  Unit:      Available ──reserve──► Unavailable ──release──► Available
//!  Location:  Free ──reserve──► Occupied ──release──► Free
//!             Unavailable (set by the location catalog, never reserved)
//! ```
//!
//! Every mutating call returns the [`LedgerChange`]s it made so the store can
//! undo them if the surrounding transaction fails.

use crate::base::{CatalogTypeId, LocationCode, UnitCode};
use crate::error::BorrowingError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Free,
    Occupied,
    Unavailable,
}

/// One physically trackable asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetUnit {
    pub code: UnitCode,
    pub catalog_type: CatalogTypeId,
    /// Where the unit is normally kept.
    pub home: Option<LocationCode>,
    pub status: UnitStatus,
}

/// A ledger-tracked room or space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub code: LocationCode,
    pub name: String,
    pub status: LocationStatus,
}

/// Prior value of one ledger row, recorded before a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    Unit {
        code: UnitCode,
        previous: Option<UnitStatus>,
    },
    Location {
        code: LocationCode,
        previous: Option<LocationStatus>,
    },
}

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    units: HashMap<UnitCode, AssetUnit>,
    locations: HashMap<LocationCode, Location>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(&self, code: &UnitCode) -> Option<&AssetUnit> {
        self.units.get(code)
    }

    pub fn location(&self, code: &LocationCode) -> Option<&Location> {
        self.locations.get(code)
    }

    /// Inserts or replaces a unit. Returns the undo record.
    pub(crate) fn put_unit(&mut self, unit: AssetUnit) -> LedgerChange {
        let code = unit.code.clone();
        let previous = self.units.insert(code.clone(), unit).map(|u| u.status);
        LedgerChange::Unit { code, previous }
    }

    /// Inserts or replaces a location. Returns the undo record.
    pub(crate) fn put_location(&mut self, location: Location) -> LedgerChange {
        let code = location.code.clone();
        let previous = self
            .locations
            .insert(code.clone(), location)
            .map(|l| l.status);
        LedgerChange::Location { code, previous }
    }

    /// Marks every unit unavailable and the location occupied.
    ///
    /// All-or-nothing: every guard runs before the first write.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::UnitsNotFound`] - A unit does not exist.
    /// - [`BorrowingError::AlreadyUnavailable`] - A unit is not available.
    /// - [`BorrowingError::LocationNotFound`] - The location does not exist.
    /// - [`BorrowingError::LocationOccupied`] / [`BorrowingError::LocationUnavailable`] - The location is not free.
    pub fn reserve(
        &mut self,
        units: &[UnitCode],
        location: Option<&LocationCode>,
    ) -> Result<Vec<LedgerChange>, BorrowingError> {
        for code in units {
            match self.units.get(code) {
                None => return Err(BorrowingError::UnitsNotFound(vec![code.clone()])),
                Some(unit) if unit.status != UnitStatus::Available => {
                    return Err(BorrowingError::AlreadyUnavailable(code.clone()));
                }
                Some(_) => {}
            }
        }
        if let Some(code) = location {
            self.check_location_free(code)?;
        }

        let mut changes = Vec::with_capacity(units.len() + 1);
        for code in units {
            changes.extend(self.set_unit(code, UnitStatus::Unavailable));
        }
        if let Some(code) = location {
            changes.extend(self.set_location(code, LocationStatus::Occupied));
        }
        Ok(changes)
    }

    /// Returns units to available and an occupied location to free.
    ///
    /// Unknown codes are skipped. A location the catalog marked unavailable
    /// keeps that status.
    pub fn release(
        &mut self,
        units: &[UnitCode],
        location: Option<&LocationCode>,
    ) -> Vec<LedgerChange> {
        let mut changes = Vec::with_capacity(units.len() + 1);
        for code in units {
            changes.extend(self.set_unit(code, UnitStatus::Available));
        }
        if let Some(code) = location {
            if self.location_status(code) == Some(LocationStatus::Occupied) {
                changes.extend(self.set_location(code, LocationStatus::Free));
            }
        }
        changes
    }

    /// Forces units unavailable and a free location occupied, without guards.
    ///
    /// Used when a borrowing becomes active to repair a ledger that drifted
    /// from the borrowing's reservation.
    pub fn reassert(
        &mut self,
        units: &[UnitCode],
        location: Option<&LocationCode>,
    ) -> Vec<LedgerChange> {
        let mut changes = Vec::new();
        for code in units {
            if self.units.get(code).map(|u| u.status) == Some(UnitStatus::Available) {
                changes.extend(self.set_unit(code, UnitStatus::Unavailable));
            }
        }
        if let Some(code) = location {
            if self.location_status(code) == Some(LocationStatus::Free) {
                changes.extend(self.set_location(code, LocationStatus::Occupied));
            }
        }
        changes
    }

    /// Reverts one recorded change.
    pub(crate) fn undo(&mut self, change: LedgerChange) {
        match change {
            LedgerChange::Unit { code, previous } => match previous {
                Some(status) => {
                    if let Some(unit) = self.units.get_mut(&code) {
                        unit.status = status;
                    }
                }
                None => {
                    self.units.remove(&code);
                }
            },
            LedgerChange::Location { code, previous } => match previous {
                Some(status) => {
                    if let Some(location) = self.locations.get_mut(&code) {
                        location.status = status;
                    }
                }
                None => {
                    self.locations.remove(&code);
                }
            },
        }
    }

    pub(crate) fn check_location_free(&self, code: &LocationCode) -> Result<(), BorrowingError> {
        match self.location_status(code) {
            None => Err(BorrowingError::LocationNotFound(code.clone())),
            Some(LocationStatus::Occupied) => Err(BorrowingError::LocationOccupied(code.clone())),
            Some(LocationStatus::Unavailable) => {
                Err(BorrowingError::LocationUnavailable(code.clone()))
            }
            Some(LocationStatus::Free) => Ok(()),
        }
    }

    fn location_status(&self, code: &LocationCode) -> Option<LocationStatus> {
        self.locations.get(code).map(|l| l.status)
    }

    fn set_unit(&mut self, code: &UnitCode, status: UnitStatus) -> Option<LedgerChange> {
        let unit = self.units.get_mut(code)?;
        let previous = std::mem::replace(&mut unit.status, status);
        Some(LedgerChange::Unit {
            code: code.clone(),
            previous: Some(previous),
        })
    }

    fn set_location(&mut self, code: &LocationCode, status: LocationStatus) -> Option<LedgerChange> {
        let location = self.locations.get_mut(code)?;
        let previous = std::mem::replace(&mut location.status, status);
        Some(LedgerChange::Location {
            code: code.clone(),
            previous: Some(previous),
        })
    }
}
