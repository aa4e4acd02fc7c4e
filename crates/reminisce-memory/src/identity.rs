//! Identity Store.
//!
//! Persists enrolled people, their face descriptors, conversation history and
//! topical tags to a local SQLite database. Records are keyed by the
//! person's unique name.
//!
//! # Storage layout
//!
//! | table | columns |
//! |-------|---------|
//! | `identities` | `name` (PK), `bio`, `contact`, `embedding` (little-endian f32 BLOB), `tags` (JSON array) |
//! | `history` | `seq` (autoincrement), `identity`, `timestamp` (RFC-3339), `summary`, `emotion`, `transcript` |
//!
//! History order is insertion order (`seq`), which is the order consolidations
//! were merged.
//!
//! # Example
//!
//! ```rust
//! use reminisce_memory::identity::IdentityStore;
//!
//! let store = IdentityStore::open_in_memory().unwrap();
//! store.enroll("Ana", "Daughter, lives nearby", None, vec![0.1, 0.2]).unwrap();
//!
//! let ana = store.get("Ana").unwrap();
//! assert_eq!(ana.history[0].summary, "Initial Bio: Daughter, lives nearby");
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use reminisce_hal::DescriptorGallery;
use reminisce_types::{Emotion, Identity, MemoryEntry, ReminisceError};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Tag encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("An identity named {0} already exists")]
    DuplicateName(String),
    #[error("No identity named {0}")]
    NotFound(String),
    #[error("Identity name must not be blank")]
    BlankName,
    #[error("Face descriptor must not be empty")]
    EmptyEmbedding,
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for ReminisceError {
    fn from(e: StoreError) -> Self {
        ReminisceError::Storage(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Merge freshly extracted tags into an identity's existing set.
///
/// New tags come first, then existing ones; duplicates (compared
/// case-insensitively after trimming) and blanks are dropped, and the result
/// is truncated to `cap`.
pub fn merge_tags(new: &[String], existing: &[String], cap: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(cap);
    for tag in new.iter().chain(existing) {
        if merged.len() >= cap {
            break;
        }
        let tag = tag.trim();
        if tag.is_empty() || merged.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        merged.push(tag.to_string());
    }
    merged
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store of enrolled identities.
///
/// The connection sits behind a mutex so one store can be shared as
/// `Arc<IdentityStore>` between the session core, the recognizer gallery and
/// the operator console. Every operation is a short, synchronous statement.
pub struct IdentityStore {
    conn: Mutex<Connection>,
}

impl IdentityStore {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                name      TEXT NOT NULL PRIMARY KEY,
                bio       TEXT NOT NULL,
                contact   TEXT,
                embedding BLOB NOT NULL,
                tags      TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS history (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                identity   TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                summary    TEXT NOT NULL,
                emotion    TEXT NOT NULL,
                transcript TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS history_by_identity ON history (identity, seq);",
        )?;
        Ok(())
    }

    /// Enroll a new person.
    ///
    /// The history is seeded with an `Initial Bio: <bio>` entry so the
    /// greeting model has context from the first encounter on.
    pub fn enroll(
        &self,
        name: &str,
        bio: &str,
        contact: Option<&str>,
        embedding: Vec<f32>,
    ) -> Result<Identity, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::BlankName);
        }
        if embedding.is_empty() {
            return Err(StoreError::EmptyEmbedding);
        }
        let seed = MemoryEntry::new(format!("Initial Bio: {bio}"), Emotion::Neutral, "");

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: Option<String> = tx
            .query_row(
                "SELECT name FROM identities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        tx.execute(
            "INSERT INTO identities (name, bio, contact, embedding, tags)
             VALUES (?1, ?2, ?3, ?4, '[]')",
            params![name, bio, contact, embedding_to_bytes(&embedding)],
        )?;
        insert_entry(&tx, name, &seed)?;
        tx.commit()?;
        info!(identity = name, "identity enrolled");

        Ok(Identity {
            name: name.to_string(),
            bio: bio.to_string(),
            contact: contact.map(str::to_string),
            embedding,
            history: vec![seed],
            tags: Vec::new(),
        })
    }

    /// Fetch one identity with its full history.
    pub fn get(&self, name: &str) -> Result<Identity, StoreError> {
        let conn = self.lock()?;
        load_identity(&conn, name)?.ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// All identities, ordered by name.
    pub fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.lock()?;
        let names: Vec<String> = {
            let mut stmt = conn.prepare("SELECT name FROM identities ORDER BY name ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(identity) = load_identity(&conn, &name)? {
                out.push(identity);
            }
        }
        Ok(out)
    }

    /// Remove an identity and all of its history.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM identities WHERE name = ?1", params![name])?;
        if removed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        tx.execute("DELETE FROM history WHERE identity = ?1", params![name])?;
        tx.commit()?;
        info!(identity = name, "identity deleted");
        Ok(())
    }

    pub fn update_contact(&self, name: &str, contact: Option<&str>) -> Result<(), StoreError> {
        let updated = self.lock()?.execute(
            "UPDATE identities SET contact = ?1 WHERE name = ?2",
            params![contact, name],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Append a consolidated memory and merge its tags.
    ///
    /// Runs as one transaction. When `history_cap` is set, the oldest entries
    /// beyond it are evicted.
    pub fn append_memory(
        &self,
        name: &str,
        entry: &MemoryEntry,
        new_tags: &[String],
        tag_cap: usize,
        history_cap: Option<usize>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let tags_json: Option<String> = tx
            .query_row(
                "SELECT tags FROM identities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(tags_json) = tags_json else {
            return Err(StoreError::NotFound(name.to_string()));
        };
        let existing: Vec<String> = serde_json::from_str(&tags_json)?;
        let merged = merge_tags(new_tags, &existing, tag_cap);

        insert_entry(&tx, name, entry)?;
        tx.execute(
            "UPDATE identities SET tags = ?1 WHERE name = ?2",
            params![serde_json::to_string(&merged)?, name],
        )?;
        if let Some(cap) = history_cap {
            // The entry just appended always survives.
            let cap = cap.max(1);
            let evicted = tx.execute(
                "DELETE FROM history WHERE identity = ?1 AND seq NOT IN (
                     SELECT seq FROM history WHERE identity = ?1 ORDER BY seq DESC LIMIT ?2
                 )",
                params![name, cap as i64],
            )?;
            if evicted > 0 {
                debug!(identity = name, evicted, "history trimmed");
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// `(name, descriptor)` for every enrolled identity.
    pub fn embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, embedding FROM identities ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((name, bytes_to_embedding(&blob)))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::Sqlite)
    }
}

impl DescriptorGallery for IdentityStore {
    fn descriptors(&self) -> Result<Vec<(String, Vec<f32>)>, ReminisceError> {
        Ok(self.embeddings()?)
    }
}

fn insert_entry(conn: &Connection, name: &str, entry: &MemoryEntry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO history (identity, timestamp, summary, emotion, transcript)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            entry.timestamp.to_rfc3339(),
            entry.summary,
            entry.emotion.to_string(),
            entry.transcript_excerpt,
        ],
    )?;
    Ok(())
}

fn load_identity(conn: &Connection, name: &str) -> Result<Option<Identity>, StoreError> {
    let row = conn
        .query_row(
            "SELECT name, bio, contact, embedding, tags FROM identities WHERE name = ?1",
            params![name],
            |row| {
                let name: String = row.get(0)?;
                let bio: String = row.get(1)?;
                let contact: Option<String> = row.get(2)?;
                let blob: Vec<u8> = row.get(3)?;
                let tags: String = row.get(4)?;
                Ok((name, bio, contact, blob, tags))
            },
        )
        .optional()?;
    let Some((name, bio, contact, blob, tags)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT timestamp, summary, emotion, transcript
         FROM history WHERE identity = ?1 ORDER BY seq ASC",
    )?;
    let history = stmt
        .query_map(params![name], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Identity {
        name,
        bio,
        contact,
        embedding: bytes_to_embedding(&blob),
        history,
        tags: serde_json::from_str(&tags)?,
    }))
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let ts_str: String = row.get(0)?;
    let summary: String = row.get(1)?;
    let emotion_str: String = row.get(2)?;
    let transcript_excerpt: String = row.get(3)?;
    let timestamp = ts_str.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text)
    })?;
    let emotion = emotion_str.parse::<Emotion>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, emotion_str, rusqlite::types::Type::Text)
    })?;
    Ok(MemoryEntry {
        timestamp,
        summary,
        emotion,
        transcript_excerpt,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
