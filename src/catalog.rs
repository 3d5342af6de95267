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

//! Catalog classification and verification routing.
//!
//! Verification authority is split between two staff roles by the category
//! of the borrowed units:
//!
//! | Routing | Who may verify |
//! |---------|----------------|
//! | [`Routing::ProjectorOnly`] | [`Role::ProgramStaff`] |
//! | [`Routing::MixedOrNonProjector`] | [`Role::AcademicHead`] |

use crate::base::CatalogTypeId;
use crate::error::BorrowingError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed classification of a catalog type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Projector,
    Other,
}

impl Category {
    const PROJECTOR_MARKERS: [&'static str; 4] = ["proyektor", "projector", "infokus", "infocus"];

    /// Classifies a catalog kind label such as `"Proyektor Epson"`.
    pub fn classify(kind: &str) -> Self {
        let kind = kind.to_lowercase();
        if Self::PROJECTOR_MARKERS
            .iter()
            .any(|marker| kind.contains(marker))
        {
            Category::Projector
        } else {
            Category::Other
        }
    }
}

/// Which verifier role a borrowing is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    ProjectorOnly,
    MixedOrNonProjector,
}

impl Routing {
    /// Derives the routing from the categories of every item in a borrowing.
    ///
    /// An empty item set routes to [`Routing::MixedOrNonProjector`].
    pub fn of<I>(categories: I) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        let mut seen_any = false;
        for category in categories {
            if category != Category::Projector {
                return Routing::MixedOrNonProjector;
            }
            seen_any = true;
        }
        if seen_any {
            Routing::ProjectorOnly
        } else {
            Routing::MixedOrNonProjector
        }
    }

    /// Checks that `role` is the verifier this routing requires.
    ///
    /// # Errors
    ///
    /// - [`BorrowingError::RoleCannotVerify`] - Role never verifies.
    /// - [`BorrowingError::ProjectorOnlyRequiresProgramStaff`] - Program staff on a mixed borrowing.
    /// - [`BorrowingError::ProjectorOnlyNotForAcademicHead`] - Academic head on a projector-only borrowing.
    pub fn authorize(self, role: Role) -> Result<(), BorrowingError> {
        match (role, self) {
            (Role::ProgramStaff, Routing::ProjectorOnly) => Ok(()),
            (Role::ProgramStaff, Routing::MixedOrNonProjector) => {
                Err(BorrowingError::ProjectorOnlyRequiresProgramStaff)
            }
            (Role::AcademicHead, Routing::MixedOrNonProjector) => Ok(()),
            (Role::AcademicHead, Routing::ProjectorOnly) => {
                Err(BorrowingError::ProjectorOnlyNotForAcademicHead)
            }
            (role, _) => Err(BorrowingError::RoleCannotVerify(role)),
        }
    }
}

/// Caller role, trusted as already authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Borrower,
    Staff,
    ProgramStaff,
    AcademicHead,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Borrower => "borrower",
            Role::Staff => "staff",
            Role::ProgramStaff => "program_staff",
            Role::AcademicHead => "academic_head",
        };
        f.write_str(name)
    }
}

/// Catalog lookup from an asset's type to its category.
pub trait Catalog: Send + Sync {
    /// Category of the given catalog type. Unknown types are [`Category::Other`].
    fn category(&self, type_id: &CatalogTypeId) -> Category;
}

/// In-memory catalog keyed by catalog type.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    types: DashMap<CatalogTypeId, Category>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog type, classifying it from its kind label.
    pub fn register(&self, type_id: CatalogTypeId, kind: &str) -> Category {
        let category = Category::classify(kind);
        self.types.insert(type_id, category);
        category
    }
}

impl Catalog for MemoryCatalog {
    fn category(&self, type_id: &CatalogTypeId) -> Category {
        self.types
            .get(type_id)
            .map(|entry| *entry.value())
            .unwrap_or(Category::Other)
    }
}
