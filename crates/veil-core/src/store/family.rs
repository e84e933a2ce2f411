//! Family-reachable activity storage.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::cast_sign_loss, clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OpenFlags};

use super::StoreError;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("family_schema.sql");

/// One entry on a subject's activity timeline.
///
/// Real and synthetic entries share this shape exactly; nothing on the
/// entry or in the family schema distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    /// Entry identifier.
    pub id: String,
    /// Subject this entry belongs to.
    pub subject_id: String,
    /// Entry instant, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    /// Activity kind (open vocabulary from the capture pipeline).
    pub kind: String,
    /// JSON metadata.
    pub metadata: String,
}

/// An aggregated slice of a subject's history used for profile building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySample {
    /// Local-agnostic hour-of-day bucket (0..=23, in UTC).
    pub hour_bucket: u8,
    /// Activity kind.
    pub kind: String,
    /// Number of entries observed in this bucket.
    pub count: u64,
}

/// The family-reachable storage client.
///
/// Its method set covers the activity timeline and nothing else; sealed
/// data has no query path from this type.
pub struct FamilyStore {
    conn: Arc<Mutex<Connection>>,
}

impl FamilyStore {
    /// Opens or creates the family database at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory family store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts an activity entry, ignoring duplicates by id.
    ///
    /// Returns `true` if the entry was inserted, `false` if an entry with
    /// the same id already existed. Duplicate-id inserts are a no-op so
    /// that replayed writes stay idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_activity(&self, entry: &ActivityEntry) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO activity_entries (id, subject_id, timestamp_ns, kind, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id,
                entry.subject_id,
                entry.timestamp_ns,
                entry.kind,
                entry.metadata,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Reads a subject's timeline within `[from_ns, to_ns)`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn timeline(
        &self,
        subject_id: &str,
        from_ns: u64,
        to_ns: u64,
        limit: u64,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, timestamp_ns, kind, metadata
             FROM activity_entries
             WHERE subject_id = ?1 AND timestamp_ns >= ?2 AND timestamp_ns < ?3
             ORDER BY timestamp_ns ASC
             LIMIT ?4",
        )?;

        let entries = stmt
            .query_map(params![subject_id, from_ns, to_ns, limit], |row| {
                Ok(ActivityEntry {
                    id: row.get(0)?,
                    subject_id: row.get(1)?,
                    timestamp_ns: row.get::<_, i64>(2)? as u64,
                    kind: row.get(3)?,
                    metadata: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Counts entries for a subject within `[from_ns, to_ns)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_in_interval(
        &self,
        subject_id: &str,
        from_ns: u64,
        to_ns: u64,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_entries
             WHERE subject_id = ?1 AND timestamp_ns >= ?2 AND timestamp_ns < ?3",
            params![subject_id, from_ns, to_ns],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Aggregates a subject's history into hour-of-day buckets per kind,
    /// over `[from_ns, to_ns)`.
    ///
    /// The backfill profile builder consumes this. Bucketing is done in
    /// UTC; the caller shifts buckets into subject-local time.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn history_samples(
        &self,
        subject_id: &str,
        from_ns: u64,
        to_ns: u64,
    ) -> Result<Vec<HistorySample>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT (timestamp_ns / 3600000000000) % 24 AS hour_bucket, kind, COUNT(*)
             FROM activity_entries
             WHERE subject_id = ?1 AND timestamp_ns >= ?2 AND timestamp_ns < ?3
             GROUP BY hour_bucket, kind",
        )?;

        let samples = stmt
            .query_map(params![subject_id, from_ns, to_ns], |row| {
                Ok(HistorySample {
                    hour_bucket: row.get::<_, i64>(0)? as u8,
                    kind: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }
}
