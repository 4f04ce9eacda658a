//! Register persistence
//!
//! The backing table mirrors the in-memory register map: one row per
//! configured cell, keyed by `(reg_type, address)`. Rows are created once at
//! startup (hydration inserts a default for every address the table does not
//! know yet) and updated on every accepted write; the engine never deletes
//! them.
//!
//! Mirroring is best-effort. The in-memory map is the source of truth for
//! serving requests; a write that cannot be persisted is logged and dropped
//! after a single reconnect-and-retry, never surfaced to the client.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::error::{RegMirrorError, Result};

use super::map::{CellValue, RegisterMap, RegisterSpace};

/// External representation of one persisted cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRow {
    pub reg_type: u8,
    pub address: u16,
    pub value: u16,
    pub modified_count: u64,
}

/// Contract of the backing table.
///
/// `select_sorted` must return rows in strictly ascending address order; the
/// hydration merge depends on it. The SQLite implementation enforces this
/// with `ORDER BY`, and any other implementation has to honour the same
/// contract.
pub trait PersistentTable {
    /// All rows of one register type, ascending by address.
    fn select_sorted(&mut self, reg_type: u8) -> Result<Vec<PersistedRow>>;

    /// Create a zero-valued row for a cell the table does not know yet.
    fn insert_default(&mut self, reg_type: u8, address: u16) -> Result<()>;

    /// Overwrite a row's value and bump its modification counter.
    fn update_value(&mut self, reg_type: u8, address: u16, value: u16) -> Result<()>;

    /// Re-establish the connection after a failure.
    fn reconnect(&mut self) -> Result<()>;
}

// =============================================================================
// SQLite implementation
// =============================================================================

/// SQLite-backed register table.
///
/// A connect failure leaves the table disconnected rather than failing the
/// caller: the server starts with a zero-defaulted map and every later write
/// gets its reconnect attempt.
pub struct SqliteTable {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteTable {
    const TABLE_SQL: &'static str = "CREATE TABLE IF NOT EXISTS registers (
        reg_type INTEGER NOT NULL,
        address INTEGER NOT NULL,
        value INTEGER NOT NULL DEFAULT 0,
        modified_count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (reg_type, address)
    )";

    /// Open the backing database, tolerating failure.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let conn = match Self::connect(&path) {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("cannot open backing store {}: {e}", path.display());
                None
            }
        };
        Self { path, conn }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch(Self::TABLE_SQL)?;
        Ok(conn)
    }

    fn conn(&mut self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| RegMirrorError::Persistence(self.path.display().to_string()))
    }
}

impl PersistentTable for SqliteTable {
    fn select_sorted(&mut self, reg_type: u8) -> Result<Vec<PersistedRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, value, modified_count FROM registers
             WHERE reg_type = ?1 ORDER BY address ASC",
        )?;
        let rows = stmt.query_map([reg_type], |row| {
            Ok(PersistedRow {
                reg_type,
                address: row.get(0)?,
                value: row.get(1)?,
                modified_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_default(&mut self, reg_type: u8, address: u16) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO registers (reg_type, address, value, modified_count)
             VALUES (?1, ?2, 0, 0)",
            params![reg_type, address],
        )?;
        Ok(())
    }

    fn update_value(&mut self, reg_type: u8, address: u16, value: u16) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE registers SET value = ?3, modified_count = modified_count + 1
             WHERE reg_type = ?1 AND address = ?2",
            params![reg_type, address, value],
        )?;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.conn = None;
        self.conn = Some(Self::connect(&self.path)?);
        debug!("reconnected backing store {}", self.path.display());
        Ok(())
    }
}

// =============================================================================
// Register store
// =============================================================================

/// The register map together with its backing table.
pub struct RegisterStore<T: PersistentTable> {
    map: RegisterMap,
    table: T,
}

impl<T: PersistentTable> RegisterStore<T> {
    pub fn new(map: RegisterMap, table: T) -> Self {
        Self { map, table }
    }

    /// The map, for the protocol library's read path.
    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// The map, for the protocol library's write path.
    pub fn map_mut(&mut self) -> &mut RegisterMap {
        &mut self.map
    }

    /// The backing table.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Load the map from the backing table.
    ///
    /// For each space, in type-code order, the sorted row stream is merged
    /// against the configured address window with two cursors: a row matching
    /// the current address loads its value into the cell and both advance; a
    /// missing row gets a default inserted; rows outside the window are
    /// skipped without effect. Returns the number of loaded rows.
    ///
    /// Running hydration twice against an unchanged table yields the same map
    /// and inserts nothing new. A failed query leaves that space at defaults;
    /// startup continues either way.
    pub fn hydrate(&mut self) -> Result<u64> {
        let mut loaded = 0u64;
        for space in RegisterSpace::IN_TYPE_ORDER {
            let rows = match self.table.select_sorted(space.type_code()) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("hydration query for {} space failed: {e}", space.name());
                    continue;
                }
            };

            let (start, count) = self.map.window(space);
            let mut rows = rows.into_iter().peekable();
            for address in u32::from(start)..u32::from(start) + u32::from(count) {
                let address = address as u16;
                // drop rows below the cursor (outside the window, or stale
                // duplicates a buggy table might hand us)
                while rows.next_if(|row| row.address < address).is_some() {}

                if let Some(row) = rows.next_if(|row| row.address == address) {
                    self.map
                        .set(space, address, CellValue::for_space(space, row.value))?;
                    loaded += 1;
                } else if let Err(e) = self.table.insert_default(space.type_code(), address) {
                    warn!(
                        "cannot seed {} row for address {address}: {e}",
                        space.name()
                    );
                }
            }
            // rows past the window end fall off here, never matched
        }
        info!("{loaded} values loaded into register map");
        Ok(loaded)
    }

    /// Read one cell from the map.
    pub fn read(&self, space: RegisterSpace, address: u16) -> Result<CellValue> {
        self.map.get(space, address)
    }

    /// Write one cell: the map first, synchronously, then a best-effort
    /// mirror into the backing table. A persistence failure never fails the
    /// write - the map already holds the new value and serves it to every
    /// subsequent read.
    pub fn write(&mut self, space: RegisterSpace, address: u16, value: CellValue) -> Result<()> {
        self.map.set(space, address, value)?;
        self.mirror(space, address, value.as_raw());
        Ok(())
    }

    /// Mirror one accepted write. On failure: exactly one reconnect-and-retry,
    /// then the write is dropped from persistence. There is no backoff and no
    /// queued replay; a dropped mirror stays dropped until the next write to
    /// that cell.
    fn mirror(&mut self, space: RegisterSpace, address: u16, raw: u16) {
        let reg_type = space.type_code();
        if let Err(e) = self.table.update_value(reg_type, address, raw) {
            warn!("{e} - reconnecting");
            let retried = self
                .table
                .reconnect()
                .and_then(|()| self.table.update_value(reg_type, address, raw));
            if let Err(e) = retried {
                warn!(
                    "dropping mirror of {} address {address}: {e}",
                    space.name()
                );
            }
        }
    }
}
