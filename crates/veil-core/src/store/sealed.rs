//! Sealed-domain storage.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::cast_sign_loss, clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::StoreError;
use crate::audit::{AuditFilter, ChainHash, SealedAuditEntry, HASH_LEN};
use crate::blackout::{BlackoutExtension, BlackoutStatus, SignalBlackout};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("sealed_schema.sql");

/// The sealed-domain storage client.
///
/// Holds blackouts, the append-only audit chain, synthetic companion tags,
/// and subject salts. Constructed only by the protection core and the
/// compliance surface; no family-scoped code path receives one.
///
/// Audit entries are append-only at the contract level: this type exposes
/// no update or delete for them.
pub struct SealedStore {
    conn: Arc<Mutex<Connection>>,
}

impl SealedStore {
    /// Opens or creates the sealed database at the specified path.
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

    /// Creates an in-memory sealed store for testing.
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

    // -----------------------------------------------------------------
    // Subject salts
    // -----------------------------------------------------------------

    /// Returns the subject's schedule salt, generating and persisting one
    /// on first use.
    ///
    /// The salt never leaves the sealed domain; callers wrap it in
    /// [`secrecy::Secret`] immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or insert fails.
    pub fn subject_salt(&self, subject_id: &str) -> Result<[u8; 32], StoreError> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<Vec<u8>> = conn
            .query_row(
                "SELECT salt FROM subject_salts WHERE subject_id = ?1",
                params![subject_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(bytes) = existing {
            return bytes
                .try_into()
                .map_err(|_| StoreError::Corrupt {
                    table: "subject_salts",
                    details: format!("salt for {subject_id} is not 32 bytes"),
                });
        }

        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        // INSERT OR IGNORE so a racing first-use keeps whichever salt landed.
        conn.execute(
            "INSERT OR IGNORE INTO subject_salts (subject_id, salt) VALUES (?1, ?2)",
            params![subject_id, salt.as_slice()],
        )?;

        let stored: Vec<u8> = conn.query_row(
            "SELECT salt FROM subject_salts WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )?;
        stored.try_into().map_err(|_| StoreError::Corrupt {
            table: "subject_salts",
            details: format!("salt for {subject_id} is not 32 bytes"),
        })
    }

    // -----------------------------------------------------------------
    // Blackouts
    // -----------------------------------------------------------------

    /// Inserts a new blackout.
    ///
    /// Returns `false` without writing if a blackout already exists for the
    /// signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_blackout(&self, blackout: &SignalBlackout) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blackouts
                 (id, subject_id, signal_id, started_at_ns, expires_at_ns, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                blackout.id,
                blackout.subject_id,
                blackout.signal_id,
                blackout.started_at_ns,
                blackout.expires_at_ns,
                blackout.status.as_str(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Loads a blackout with its extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored status is invalid.
    pub fn load_blackout(&self, signal_id: &str) -> Result<Option<SignalBlackout>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, subject_id, signal_id, started_at_ns, expires_at_ns, status
                 FROM blackouts WHERE signal_id = ?1",
                params![signal_id],
                Self::blackout_from_row,
            )
            .optional()?;

        let Some(mut blackout) = row else {
            return Ok(None);
        };
        blackout.extensions = Self::extensions_for(&conn, signal_id)?;
        Ok(Some(blackout))
    }

    /// Loads all blackouts currently marked active, with extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active_blackouts(&self) -> Result<Vec<SignalBlackout>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, signal_id, started_at_ns, expires_at_ns, status
             FROM blackouts WHERE status = 'active'
             ORDER BY started_at_ns ASC",
        )?;
        let mut blackouts = stmt
            .query_map([], Self::blackout_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for blackout in &mut blackouts {
            blackout.extensions = Self::extensions_for(&conn, &blackout.signal_id)?;
        }
        Ok(blackouts)
    }

    /// Conditionally transitions a blackout from `expected` status,
    /// optionally moving its deadline, and appends an extension record when
    /// one is supplied — all in one transaction.
    ///
    /// Returns `false` if the blackout was not in `expected` status (a
    /// competing transition won); nothing is written in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn transition_blackout(
        &self,
        signal_id: &str,
        expected: BlackoutStatus,
        new_status: BlackoutStatus,
        new_expires_at_ns: Option<u64>,
        extension: Option<&BlackoutExtension>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE blackouts
             SET status = ?1, expires_at_ns = COALESCE(?2, expires_at_ns)
             WHERE signal_id = ?3 AND status = ?4",
            params![
                new_status.as_str(),
                new_expires_at_ns,
                signal_id,
                expected.as_str(),
            ],
        )?;

        if updated == 0 {
            // Leave the transaction to roll back untouched.
            return Ok(false);
        }

        if let Some(ext) = extension {
            tx.execute(
                "INSERT INTO blackout_extensions
                     (signal_id, extended_by, extended_at_ns, additional_hours, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    signal_id,
                    ext.extended_by,
                    ext.extended_at_ns,
                    ext.additional_hours,
                    ext.reason,
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn blackout_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SignalBlackout> {
        let status_text: String = row.get(5)?;
        let status = BlackoutStatus::parse(&status_text).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("invalid blackout status: {status_text}").into(),
            )
        })?;
        Ok(SignalBlackout {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            signal_id: row.get(2)?,
            started_at_ns: row.get::<_, i64>(3)? as u64,
            expires_at_ns: row.get::<_, i64>(4)? as u64,
            extensions: Vec::new(),
            status,
        })
    }

    fn extensions_for(
        conn: &Connection,
        signal_id: &str,
    ) -> Result<Vec<BlackoutExtension>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT extended_by, extended_at_ns, additional_hours, reason
             FROM blackout_extensions WHERE signal_id = ?1 ORDER BY seq ASC",
        )?;
        let extensions = stmt
            .query_map(params![signal_id], |row| {
                Ok(BlackoutExtension {
                    extended_by: row.get(0)?,
                    extended_at_ns: row.get::<_, i64>(1)? as u64,
                    additional_hours: row.get::<_, i64>(2)? as u32,
                    reason: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(extensions)
    }

    // -----------------------------------------------------------------
    // Synthetic companion tags
    // -----------------------------------------------------------------

    /// Records the sealed companion tag for a synthetic entry, ignoring
    /// duplicates so that backfill replay stays idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn tag_synthetic(
        &self,
        entry_id: &str,
        subject_id: &str,
        gap_start_ns: u64,
        gap_end_ns: u64,
        created_at_ns: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO synthetic_tags
                 (entry_id, subject_id, gap_start_ns, gap_end_ns, created_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry_id, subject_id, gap_start_ns, gap_end_ns, created_at_ns],
        )?;
        Ok(())
    }

    /// Marks a gap interval as filled.
    ///
    /// Returns `false` if the interval was already marked.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn mark_interval_filled(
        &self,
        subject_id: &str,
        gap_start_ns: u64,
        gap_end_ns: u64,
        entry_count: u32,
        filled_at_ns: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO backfill_intervals
                 (subject_id, gap_start_ns, gap_end_ns, entry_count, filled_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subject_id, gap_start_ns, gap_end_ns, entry_count, filled_at_ns],
        )?;
        Ok(inserted > 0)
    }

    /// Whether a gap interval has already been filled.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn interval_filled(
        &self,
        subject_id: &str,
        gap_start_ns: u64,
        gap_end_ns: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM backfill_intervals
                 WHERE subject_id = ?1 AND gap_start_ns = ?2 AND gap_end_ns = ?3",
                params![subject_id, gap_start_ns, gap_end_ns],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // -----------------------------------------------------------------
    // Audit chain
    // -----------------------------------------------------------------

    /// Appends an audit entry and returns its assigned sequence number.
    ///
    /// The caller (the sealed audit log) has already computed the chained
    /// hashes; appends are serialized above this layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn append_audit(&self, entry: &SealedAuditEntry) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_entries
                 (id, action, actor_id, timestamp_ns, subject_ref, metadata, prev_hash, integrity_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.action,
                entry.actor_id,
                entry.timestamp_ns,
                entry.subject_ref,
                entry.metadata,
                entry.prev_hash.as_slice(),
                entry.integrity_hash.as_slice(),
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Returns the sequence number and hash of the newest audit entry, or
    /// `None` if the chain is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_audit(&self) -> Result<Option<(u64, ChainHash)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(i64, Vec<u8>)> = conn
            .query_row(
                "SELECT seq, integrity_hash FROM audit_entries ORDER BY seq DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((seq, bytes)) => {
                let hash = Self::decode_hash(bytes)?;
                Ok(Some((seq as u64, hash)))
            }
        }
    }

    /// Reads audit entries with `seq >= cursor`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn read_audit_from(
        &self,
        cursor: u64,
        limit: u64,
    ) -> Result<Vec<SealedAuditEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, id, action, actor_id, timestamp_ns, subject_ref, metadata,
                    prev_hash, integrity_hash
             FROM audit_entries
             WHERE seq >= ?1
             ORDER BY seq ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor, limit], Self::audit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::finish_audit_row).collect()
    }

    /// Reads audit entries matching a filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<SealedAuditEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, id, action, actor_id, timestamp_ns, subject_ref, metadata,
                    prev_hash, integrity_hash
             FROM audit_entries
             WHERE (?1 IS NULL OR actor_id = ?1)
               AND (?2 IS NULL OR subject_ref = ?2)
               AND (?3 IS NULL OR action LIKE ?3 || '%')
             ORDER BY seq ASC
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(
                params![
                    filter.actor_id,
                    filter.subject_ref,
                    filter.action_prefix,
                    filter.limit,
                ],
                Self::audit_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::finish_audit_row).collect()
    }

    /// Number of audit entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn audit_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    #[allow(clippy::type_complexity)]
    fn audit_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(i64, String, String, String, i64, String, String, Vec<u8>, Vec<u8>)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn finish_audit_row(
        raw: (i64, String, String, String, i64, String, String, Vec<u8>, Vec<u8>),
    ) -> Result<SealedAuditEntry, StoreError> {
        let (seq, id, action, actor_id, timestamp_ns, subject_ref, metadata, prev, hash) = raw;
        Ok(SealedAuditEntry {
            seq: Some(seq as u64),
            id,
            action,
            actor_id,
            timestamp_ns: timestamp_ns as u64,
            subject_ref,
            metadata,
            prev_hash: Self::decode_hash(prev)?,
            integrity_hash: Self::decode_hash(hash)?,
        })
    }

    fn decode_hash(bytes: Vec<u8>) -> Result<ChainHash, StoreError> {
        let len = bytes.len();
        bytes.try_into().map_err(|_| StoreError::Corrupt {
            table: "audit_entries",
            details: format!("hash is {len} bytes, expected {HASH_LEN}"),
        })
    }
}
