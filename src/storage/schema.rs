//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the mdb-harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Films, one row per catalog item
CREATE TABLE IF NOT EXISTS film (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    alternative_title TEXT,
    year INTEGER,
    slogan TEXT,
    length_minutes INTEGER,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_film_year ON film(year);

CREATE TABLE IF NOT EXISTS country (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS film_country (
    film_id INTEGER NOT NULL REFERENCES film(id) ON DELETE CASCADE,
    country_id INTEGER NOT NULL REFERENCES country(id),
    PRIMARY KEY (film_id, country_id)
);

CREATE TABLE IF NOT EXISTS person (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

-- Who worked on a film, and as what
CREATE TABLE IF NOT EXISTS film_person (
    film_id INTEGER NOT NULL REFERENCES film(id) ON DELETE CASCADE,
    person_id INTEGER NOT NULL REFERENCES person(id),
    role TEXT NOT NULL,
    PRIMARY KEY (film_id, person_id, role)
);

CREATE INDEX IF NOT EXISTS idx_film_person_person ON film_person(person_id);

-- Cursor and counters per partition
CREATE TABLE IF NOT EXISTS crawl_progress (
    partition TEXT PRIMARY KEY,
    page INTEGER NOT NULL,
    pages_total INTEGER NOT NULL,
    items_total INTEGER NOT NULL,
    items_done INTEGER NOT NULL,
    last_item_id INTEGER,
    worker TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Items that could not be ingested
CREATE TABLE IF NOT EXISTS crawl_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition TEXT,
    item_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    worker TEXT NOT NULL,
    logged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_errors_item ON crawl_errors(item_id);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
