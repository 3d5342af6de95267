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

use borrow_ledger_rs::{
    AssetUnit, BorrowingFilter, BorrowingId, BorrowingStatus, CatalogTypeId, Config, Decision,
    Destination, Engine, Location, LocationCode, LocationStatus, ManualClock, MemoryCatalog, NewBorrowing,
    Policy, RequesterId, Role, StaffId, Store, Sweep, UnitCode, UnitStatus, Verification,
    telemetry,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Borrow Ledger - Replay borrowing commands against an inventory
///
/// Loads asset units and locations, replays lifecycle commands in order with
/// the clock set to each command's timestamp, runs the scheduler sweeps
/// before every command, and prints the final borrowings to stdout.
#[derive(Parser, Debug)]
#[command(name = "borrow-ledger-rs")]
#[command(about = "Replays borrowing lifecycle commands and prints borrowing states", long_about = None)]
struct Args {
    /// Inventory CSV
    ///
    /// Expected format: kind,code,name,location,status
    #[arg(value_name = "INVENTORY")]
    inventory: PathBuf,

    /// Command CSV
    ///
    /// Expected format: at,command,borrowing,actor,role,units,location,alternate,phone,agenda,start,end,decision
    #[arg(value_name = "COMMANDS")]
    commands: PathBuf,

    /// JSON configuration file (defaults to BORROW_* environment variables)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a final sweep at this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    until: Option<DateTime<Utc>>,
}

fn main() {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let inventory = match File::open(&args.inventory) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening file '{}': {}", args.inventory.display(), e);
            process::exit(1);
        }
    };
    let commands = match File::open(&args.commands) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening file '{}': {}", args.commands.display(), e);
            process::exit(1);
        }
    };

    let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
    let engine = match load_inventory(BufReader::new(inventory)) {
        Ok((store, catalog)) => Engine::new(store, Arc::new(catalog), clock.clone())
            .with_policy(Policy::from(&config.policy)),
        Err(e) => {
            error!("Error loading inventory: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = replay(&engine, &clock, BufReader::new(commands)) {
        error!("Error processing commands: {}", e);
        process::exit(1);
    }

    if let Some(until) = args.until {
        clock.set(until);
        run_sweeps(&engine);
    }

    if let Err(e) = write_borrowings(&engine, std::io::stdout()) {
        error!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    match &args.config {
        Some(path) => Ok(Config::from_json_str(&fs::read_to_string(path)?)?),
        None => Ok(Config::from_env()?),
    }
}

/// Raw inventory row.
///
/// Units carry their catalog kind label in `name` (e.g. `Proyektor Epson`),
/// locations their display name.
#[derive(Debug, Deserialize)]
struct InventoryRecord {
    kind: String,
    code: String,
    name: String,
    location: Option<String>,
    status: Option<String>,
}

/// Builds the store and catalog from an inventory CSV.
///
/// Rows with an unknown kind or status are skipped.
///
/// # CSV Format
///
/// ```csv
/// kind,code,name,location,status
/// unit,NUP-001,Proyektor Epson,R101,available
/// location,R101,Room 101,,free
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn load_inventory<R: Read>(reader: R) -> Result<(Store, MemoryCatalog), csv::Error> {
    let store = Store::new();
    let catalog = MemoryCatalog::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<InventoryRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed inventory row: {}", e);
                continue;
            }
        };
        let status = record.status.as_deref().unwrap_or("").to_lowercase();
        match record.kind.to_lowercase().as_str() {
            "unit" => {
                let status = match status.as_str() {
                    "" | "available" => UnitStatus::Available,
                    "unavailable" => UnitStatus::Unavailable,
                    other => {
                        warn!(unit = %record.code, status = other, "Skipping unit with unknown status");
                        continue;
                    }
                };
                let catalog_type = CatalogTypeId::new(record.name.as_str());
                catalog.register(catalog_type.clone(), &record.name);
                store.register_unit(AssetUnit {
                    code: UnitCode::new(record.code),
                    catalog_type,
                    home: record.location.map(LocationCode::new),
                    status,
                });
            }
            "location" => {
                let status = match status.as_str() {
                    "" | "free" => LocationStatus::Free,
                    "occupied" => LocationStatus::Occupied,
                    "unavailable" => LocationStatus::Unavailable,
                    other => {
                        warn!(location = %record.code, status = other, "Skipping location with unknown status");
                        continue;
                    }
                };
                store.register_location(Location {
                    code: LocationCode::new(record.code),
                    name: record.name,
                    status,
                });
            }
            other => warn!(kind = other, "Skipping inventory row of unknown kind"),
        }
    }

    Ok((store, catalog))
}

/// Raw command row. Columns not used by a command are left empty.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    at: DateTime<Utc>,
    command: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    borrowing: Option<u64>,
    actor: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    role: Option<Role>,
    units: Option<String>,
    location: Option<String>,
    alternate: Option<String>,
    phone: Option<String>,
    agenda: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "csv::invalid_option")]
    end: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "csv::invalid_option")]
    decision: Option<Decision>,
}

#[derive(Debug)]
enum Command {
    Create(NewBorrowing),
    Verify {
        id: BorrowingId,
        decision: Decision,
        role: Role,
    },
    Activate(BorrowingId),
    ScanPickup(BorrowingId, StaffId),
    ScanReturn(BorrowingId, StaffId),
    Complete(BorrowingId),
    Cancel(BorrowingId, RequesterId),
    Tick,
}

impl CommandRecord {
    /// Converts a command record into a Command.
    ///
    /// Returns `None` for unknown commands or missing required fields.
    fn into_command(self) -> Option<Command> {
        let id = self.borrowing.map(BorrowingId);
        match self.command.to_lowercase().as_str() {
            "create" => {
                let units = self
                    .units
                    .unwrap_or_default()
                    .split('|')
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(UnitCode::from)
                    .collect();
                Some(Command::Create(NewBorrowing {
                    requester: RequesterId::new(self.actor?),
                    location: self.location.map(LocationCode::new),
                    alternate_location: self.alternate,
                    phone: self.phone.unwrap_or_default(),
                    agenda: self.agenda.unwrap_or_default(),
                    start: self.start?,
                    end: self.end?,
                    units,
                }))
            }
            "verify" => Some(Command::Verify {
                id: id?,
                decision: self.decision?,
                role: self.role?,
            }),
            "activate" => Some(Command::Activate(id?)),
            "pickup" => Some(Command::ScanPickup(id?, StaffId::new(self.actor?))),
            "return" => Some(Command::ScanReturn(id?, StaffId::new(self.actor?))),
            "complete" => Some(Command::Complete(id?)),
            "cancel" => Some(Command::Cancel(id?, RequesterId::new(self.actor?))),
            "tick" => Some(Command::Tick),
            _ => None,
        }
    }
}

fn run_sweeps(engine: &Engine) {
    for sweep in Sweep::ALL {
        engine.sweep(sweep);
    }
}

/// Replays commands from a CSV reader.
///
/// Before each command the clock is set to the row's `at` and every sweep
/// runs once. Malformed rows and rejected commands are logged and skipped.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay<R: Read>(engine: &Engine, clock: &ManualClock, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CommandRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed command row: {}", e);
                continue;
            }
        };
        clock.set(record.at);
        run_sweeps(engine);

        let Some(command) = record.into_command() else {
            warn!(line = line + 1, "Skipping invalid command record");
            continue;
        };
        debug!(?command, "applying command");

        let outcome = match command {
            Command::Create(draft) => engine.create(draft).map(|d| d.borrowing.id),
            Command::Verify { id, decision, role } => {
                engine.verify(id, decision, role).map(|_| id)
            }
            Command::Activate(id) => engine.activate(id).map(|_| id),
            Command::ScanPickup(id, staff) => engine.scan_pickup(id, staff).map(|_| id),
            Command::ScanReturn(id, staff) => engine.scan_return(id, staff).map(|_| id),
            Command::Complete(id) => engine.complete(id).map(|_| id),
            Command::Cancel(id, requester) => engine.cancel(id, &requester).map(|_| id),
            Command::Tick => continue,
        };
        match outcome {
            Ok(id) => info!(line = line + 1, borrowing = %id, "command applied"),
            Err(e) => warn!(line = line + 1, error = %e, kind = ?e.kind(), "command rejected"),
        }
    }

    Ok(())
}

/// Flattened borrowing for CSV output.
#[derive(Debug, Serialize)]
struct BorrowingRow {
    id: BorrowingId,
    requester: RequesterId,
    status: BorrowingStatus,
    verification: Verification,
    location: String,
    items: String,
    picked_up_at: Option<DateTime<Utc>>,
    returned_at: Option<DateTime<Utc>>,
}

/// Writes every borrowing, in id order, as CSV.
///
/// # CSV Format
///
/// ```csv
/// id,requester,status,verification,location,items,picked_up_at,returned_at
/// 1,u1,completed,accepted,R101,NUP-001|NUP-002,2025-03-03T09:05:00Z,2025-03-03T11:00:00Z
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_borrowings<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut borrowings = engine.list(&BorrowingFilter::default());
    borrowings.sort_by_key(|b| b.id);
    for b in borrowings {
        let location = match &b.destination {
            Destination::Catalog(code) => code.to_string(),
            Destination::Alternate(text) => text.clone(),
        };
        wtr.serialize(BorrowingRow {
            id: b.id,
            requester: b.requester,
            status: b.status,
            verification: b.verification,
            location,
            items: b
                .items
                .iter()
                .map(UnitCode::as_str)
                .collect::<Vec<_>>()
                .join("|"),
            picked_up_at: b.picked_up_at,
            returned_at: b.returned_at,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
