//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait
//! for film records.

use crate::extract::FilmRecord;
use crate::state::{CrawlProgress, ItemId, Partition, PartitionStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::ErrorEntry;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL with synchronous=NORMAL: commits survive a process kill, but the
        // last few may be lost on power failure
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Every stored film with a known year, as `(id, year)`
    pub fn film_years(&self) -> StorageResult<Vec<(ItemId, i32)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, year FROM film WHERE year IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((ItemId(row.get(0)?), row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Loads a stored film with its countries and credits
    pub fn load_film(&self, id: ItemId) -> StorageResult<Option<FilmRecord>> {
        let film = self
            .conn
            .query_row(
                "SELECT title, alternative_title, year, slogan, length_minutes
                 FROM film WHERE id = ?1",
                params![id.get()],
                |row| {
                    Ok(FilmRecord {
                        id,
                        title: row.get(0)?,
                        alternative_title: row.get(1)?,
                        year: row.get(2)?,
                        slogan: row.get(3)?,
                        length_minutes: row.get(4)?,
                        countries: Vec::new(),
                        credits: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut film) = film else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name FROM film_country fc
             JOIN country c ON c.id = fc.country_id
             WHERE fc.film_id = ?1 ORDER BY c.id",
        )?;
        film.countries = stmt
            .query_map(params![id.get()], |row| {
                Ok(crate::extract::Country {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, fp.role FROM film_person fp
             JOIN person p ON p.id = fp.person_id
             WHERE fp.film_id = ?1 ORDER BY fp.rowid",
        )?;
        let credits = stmt
            .query_map(params![id.get()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        film.credits = credits
            .into_iter()
            .map(|(person_id, name, role)| {
                known_role(&role)
                    .map(|role| crate::extract::Credit {
                        person_id,
                        name,
                        role,
                    })
                    .ok_or_else(|| StorageError::Serialization(format!("unknown role '{}'", role)))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Some(film))
    }

    /// Number of stored films
    pub fn count_films(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM film", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of failure log entries
    pub fn count_errors(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawl_errors", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Most recent failure log entries, newest first
    pub fn recent_errors(&self, limit: usize) -> StorageResult<Vec<ErrorEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT partition, item_id, message, worker, logged_at
             FROM crawl_errors ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(partition, item_id, message, worker, logged_at)| -> StorageResult<ErrorEntry> {
                Ok(ErrorEntry {
                    partition: partition.map(Partition::new),
                    item_id: ItemId(item_id),
                    message,
                    worker,
                    logged_at: parse_timestamp(&logged_at)?,
                })
            })
            .collect()
    }
}

/// Raw `crawl_progress` row, converted outside the rusqlite closure so that
/// bad enum or timestamp values surface as [`StorageError::Serialization`]
struct ProgressRow {
    partition: String,
    page: i64,
    pages_total: i64,
    items_total: i64,
    items_done: i64,
    last_item_id: Option<i64>,
    worker: String,
    status: String,
    updated_at: String,
}

const PROGRESS_COLUMNS: &str = "partition, page, pages_total, items_total, items_done, \
                                last_item_id, worker, status, updated_at";

impl ProgressRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            partition: row.get(0)?,
            page: row.get(1)?,
            pages_total: row.get(2)?,
            items_total: row.get(3)?,
            items_done: row.get(4)?,
            last_item_id: row.get(5)?,
            worker: row.get(6)?,
            status: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_progress(self) -> StorageResult<CrawlProgress> {
        let status = PartitionStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Serialization(format!(
                "partition {} has unknown status '{}'",
                self.partition, self.status
            ))
        })?;

        Ok(CrawlProgress {
            partition: Partition::new(self.partition),
            page: to_u32(self.page)?,
            pages_total: to_u32(self.pages_total)?,
            items_total: to_u64(self.items_total)?,
            items_done: to_u64(self.items_done)?,
            last_item_id: self.last_item_id.map(ItemId),
            worker: self.worker,
            status,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn to_u32(value: i64) -> StorageResult<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("counter out of range: {}", value)))
}

fn to_u64(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("counter out of range: {}", value)))
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("counter out of range: {}", value)))
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn known_role(role: &str) -> Option<&'static str> {
    [
        "director", "writer", "producer", "operator", "composer", "design", "editor",
    ]
    .into_iter()
    .find(|known| *known == role)
}

impl Storage for SqliteStorage {
    type Record = FilmRecord;

    // ===== Records =====

    fn record_exists(&self, id: ItemId) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM film WHERE id = ?1", params![id.get()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert(&mut self, film: &FilmRecord) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO film (id, title, alternative_title, year, slogan, length_minutes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                alternative_title = excluded.alternative_title,
                year = excluded.year,
                slogan = excluded.slogan,
                length_minutes = excluded.length_minutes,
                updated_at = excluded.updated_at",
            params![
                film.id.get(),
                film.title,
                film.alternative_title,
                film.year,
                film.slogan,
                film.length_minutes,
                now
            ],
        )?;

        // Links are rebuilt so a re-ingested film reflects only its latest page
        tx.execute(
            "DELETE FROM film_country WHERE film_id = ?1",
            params![film.id.get()],
        )?;
        tx.execute(
            "DELETE FROM film_person WHERE film_id = ?1",
            params![film.id.get()],
        )?;

        for country in &film.countries {
            tx.execute(
                "INSERT INTO country (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![country.id, country.name],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO film_country (film_id, country_id) VALUES (?1, ?2)",
                params![film.id.get(), country.id],
            )?;
        }

        for credit in &film.credits {
            tx.execute(
                "INSERT INTO person (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![credit.person_id, credit.name],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO film_person (film_id, person_id, role) VALUES (?1, ?2, ?3)",
                params![film.id.get(), credit.person_id, credit.role],
            )?;
        }

        tx.commit()?;
        tracing::debug!("Stored film {} ({})", film.id, film.title);
        Ok(())
    }

    // ===== Error Log =====

    fn log_error(&mut self, entry: &ErrorEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_errors (partition, item_id, message, worker, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.partition.as_ref().map(Partition::as_str),
                entry.item_id.get(),
                entry.message,
                entry.worker,
                entry.logged_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ===== Progress =====

    fn load_progress(&self, partition: &Partition) -> StorageResult<Option<CrawlProgress>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawl_progress WHERE partition = ?1",
                    PROGRESS_COLUMNS
                ),
                params![partition.as_str()],
                ProgressRow::from_row,
            )
            .optional()?;

        row.map(ProgressRow::into_progress).transpose()
    }

    fn save_progress(&mut self, progress: &CrawlProgress) -> StorageResult<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO crawl_progress ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                PROGRESS_COLUMNS
            ),
            params![
                progress.partition.as_str(),
                progress.page,
                progress.pages_total,
                to_i64(progress.items_total)?,
                to_i64(progress.items_done)?,
                progress.last_item_id.map(|id| id.get()),
                progress.worker,
                progress.status.to_db_string(),
                progress.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn list_progress(&self) -> StorageResult<Vec<CrawlProgress>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_progress ORDER BY partition",
            PROGRESS_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], ProgressRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ProgressRow::into_progress).collect()
    }
}
