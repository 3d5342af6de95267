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

//! Append-only log of pickup and return scans.

use crate::base::{BorrowingId, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Pickup,
    Return,
}

/// A physical pickup or return check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanEvent {
    pub borrowing: BorrowingId,
    pub kind: ScanKind,
    pub at: DateTime<Utc>,
    pub staff: StaffId,
}

/// Scan events in append order, indexed by borrowing.
#[derive(Debug, Default, Clone)]
pub struct ScanLog {
    events: Vec<ScanEvent>,
    by_borrowing: HashMap<BorrowingId, Vec<usize>>,
}

impl ScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn append(&mut self, event: ScanEvent) {
        self.by_borrowing
            .entry(event.borrowing)
            .or_default()
            .push(self.events.len());
        self.events.push(event);
    }

    /// Removes the newest event. Only a rolled-back transaction may call this.
    pub(crate) fn truncate_last(&mut self) {
        let Some(event) = self.events.pop() else {
            return;
        };
        if let Some(indices) = self.by_borrowing.get_mut(&event.borrowing) {
            indices.pop();
            if indices.is_empty() {
                self.by_borrowing.remove(&event.borrowing);
            }
        }
    }

    /// Events for one borrowing, oldest first.
    pub fn for_borrowing(&self, id: BorrowingId) -> impl Iterator<Item = &ScanEvent> {
        self.by_borrowing
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&index| &self.events[index])
    }

    /// Time of the first pickup scan for a borrowing.
    pub fn first_pickup(&self, id: BorrowingId) -> Option<DateTime<Utc>> {
        self.for_borrowing(id)
            .find(|event| event.kind == ScanKind::Pickup)
            .map(|event| event.at)
    }

    /// Time of the latest return scan for a borrowing.
    pub fn last_return(&self, id: BorrowingId) -> Option<DateTime<Utc>> {
        self.for_borrowing(id)
            .filter(|event| event.kind == ScanKind::Return)
            .last()
            .map(|event| event.at)
    }
}
