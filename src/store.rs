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

//! Transactional in-memory store.
//!
//! The [`Store`] owns every borrowing row, the resource [`Ledger`], and the
//! [`ScanLog`]. All writes go through [`Store::transaction`], which runs a
//! closure with serializable isolation and an undo journal:
//!
//! - `Ok` commits every write made by the closure.
//! - `Err` (or a panic) rolls every write back in reverse order.
//!
//! Guards that read inside the closure therefore see the post-commit state of
//! any transaction that finished before it, never a half-applied one.

use crate::base::{BorrowingId, LocationCode, UnitCode};
use crate::borrowing::{Borrowing, BorrowingDetails, BorrowingFilter};
use crate::error::BorrowingError;
use crate::ledger::{AssetUnit, Ledger, LedgerChange, Location};
use crate::scan_log::{ScanEvent, ScanLog};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Tables {
    borrowings: BTreeMap<BorrowingId, Borrowing>,
    ledger: Ledger,
    scans: ScanLog,
    last_id: u64,
}

impl Tables {
    fn details(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        let borrowing = self
            .borrowings
            .get(&id)
            .ok_or(BorrowingError::BorrowingNotFound(id))?;
        let units = borrowing
            .items
            .iter()
            .filter_map(|code| self.ledger.unit(code).cloned())
            .collect();
        let location = borrowing
            .location()
            .and_then(|code| self.ledger.location(code).cloned());
        Ok(BorrowingDetails {
            borrowing: borrowing.clone(),
            units,
            location,
        })
    }
}

/// Prior state recorded before each write.
#[derive(Debug)]
enum Undo {
    Inserted(BorrowingId),
    Replaced(Box<Borrowing>),
    Ledger(LedgerChange),
    ScanAppended,
    LastId(u64),
}

/// Write access to the store for the duration of one atomic unit.
pub struct Transaction<'a> {
    tables: &'a mut Tables,
    journal: Vec<Undo>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            journal: Vec::new(),
            committed: false,
        }
    }

    /// Re-reads a borrowing inside the transaction.
    pub fn borrowing(&self, id: BorrowingId) -> Result<&Borrowing, BorrowingError> {
        self.tables
            .borrowings
            .get(&id)
            .ok_or(BorrowingError::BorrowingNotFound(id))
    }

    pub fn borrowings(&self) -> impl Iterator<Item = &Borrowing> {
        self.tables.borrowings.values()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.tables.ledger
    }

    pub fn scans(&self) -> &ScanLog {
        &self.tables.scans
    }

    pub fn details(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        self.tables.details(id)
    }

    /// Allocates the next borrowing id.
    pub fn next_id(&mut self) -> BorrowingId {
        self.journal.push(Undo::LastId(self.tables.last_id));
        self.tables.last_id += 1;
        BorrowingId(self.tables.last_id)
    }

    pub fn insert_borrowing(&mut self, borrowing: Borrowing) {
        borrowing.assert_invariants();
        let id = borrowing.id;
        match self.tables.borrowings.insert(id, borrowing) {
            Some(previous) => self.journal.push(Undo::Replaced(Box::new(previous))),
            None => self.journal.push(Undo::Inserted(id)),
        }
    }

    /// Applies `change` to a borrowing and returns the updated row.
    pub fn update_borrowing<F>(
        &mut self,
        id: BorrowingId,
        change: F,
    ) -> Result<&Borrowing, BorrowingError>
    where
        F: FnOnce(&mut Borrowing),
    {
        let row = self
            .tables
            .borrowings
            .get_mut(&id)
            .ok_or(BorrowingError::BorrowingNotFound(id))?;
        self.journal.push(Undo::Replaced(Box::new(row.clone())));
        change(row);
        row.assert_invariants();
        Ok(row)
    }

    pub fn reserve(
        &mut self,
        units: &[UnitCode],
        location: Option<&LocationCode>,
    ) -> Result<(), BorrowingError> {
        let changes = self.tables.ledger.reserve(units, location)?;
        self.journal.extend(changes.into_iter().map(Undo::Ledger));
        Ok(())
    }

    pub fn release(&mut self, units: &[UnitCode], location: Option<&LocationCode>) {
        let changes = self.tables.ledger.release(units, location);
        self.journal.extend(changes.into_iter().map(Undo::Ledger));
    }

    pub fn reassert(&mut self, units: &[UnitCode], location: Option<&LocationCode>) {
        let changes = self.tables.ledger.reassert(units, location);
        self.journal.extend(changes.into_iter().map(Undo::Ledger));
    }

    pub fn append_scan(&mut self, event: ScanEvent) {
        self.tables.scans.append(event);
        self.journal.push(Undo::ScanAppended);
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Inserted(id) => {
                    self.tables.borrowings.remove(&id);
                }
                Undo::Replaced(previous) => {
                    self.tables.borrowings.insert(previous.id, *previous);
                }
                Undo::Ledger(change) => self.tables.ledger.undo(change),
                Undo::ScanAppended => self.tables.scans.truncate_last(),
                Undo::LastId(id) => self.tables.last_id = id,
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

/// Backing store for borrowings, the ledger, and the scan log.
///
/// Every transaction runs under one lock, so isolation is serializable across
/// all borrowings and transactions on unrelated rows never overlap.
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` as one atomic unit.
    ///
    /// Transactions are serialized: a second caller blocks until the first
    /// commits or rolls back.
    ///
    /// # Errors
    ///
    /// Returns whatever error `work` returns, after rolling back its writes.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, BorrowingError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, BorrowingError>,
    {
        let mut tables = self.tables.lock();
        let mut tx = Transaction::new(&mut tables);
        let result = work(&mut tx);
        if result.is_ok() {
            tx.commit();
        }
        result
    }

    /// Adds or replaces an asset unit in the ledger.
    pub fn register_unit(&self, unit: AssetUnit) {
        self.tables.lock().ledger.put_unit(unit);
    }

    /// Adds or replaces a catalog location in the ledger.
    pub fn register_location(&self, location: Location) {
        self.tables.lock().ledger.put_location(location);
    }

    pub fn borrowing(&self, id: BorrowingId) -> Option<Borrowing> {
        self.tables.lock().borrowings.get(&id).cloned()
    }

    pub fn details(&self, id: BorrowingId) -> Result<BorrowingDetails, BorrowingError> {
        self.tables.lock().details(id)
    }

    /// Borrowings matching `filter`, newest created first.
    pub fn list(&self, filter: &BorrowingFilter) -> Vec<Borrowing> {
        let tables = self.tables.lock();
        let mut rows: Vec<Borrowing> = tables
            .borrowings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    /// Ids of borrowings matching `predicate`, in id order.
    pub fn select<P>(&self, predicate: P) -> Vec<BorrowingId>
    where
        P: Fn(&Borrowing) -> bool,
    {
        self.tables
            .lock()
            .borrowings
            .values()
            .filter(|b| predicate(b))
            .map(|b| b.id)
            .collect()
    }

    pub fn unit(&self, code: &UnitCode) -> Option<AssetUnit> {
        self.tables.lock().ledger.unit(code).cloned()
    }

    pub fn location(&self, code: &LocationCode) -> Option<Location> {
        self.tables.lock().ledger.location(code).cloned()
    }

    /// Scan events for a borrowing, oldest first.
    pub fn scans(&self, id: BorrowingId) -> Vec<ScanEvent> {
        self.tables
            .lock()
            .scans
            .for_borrowing(id)
            .cloned()
            .collect()
    }
}
