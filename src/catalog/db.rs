use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub created: NaiveDateTime,
    pub kind: String,
    pub catalog_name: String,
    pub parameters: String,
    pub crate_version: String,
    pub processed: i64,
    pub skipped: i64,
    pub records: i64,
}

#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub kind: &'a str,
    pub catalog_name: &'a str,
    pub parameters: String,
    pub processed: usize,
    pub skipped: usize,
    pub records: usize,
}

pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created TEXT NOT NULL,
                kind TEXT NOT NULL,
                catalog_name TEXT NOT NULL,
                parameters TEXT NOT NULL,
                crate_version TEXT NOT NULL,
                processed INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                records INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn record_run(&self, created: NaiveDateTime, run: &NewRun) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (created, kind, catalog_name, parameters, crate_version, processed, skipped, records)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                created.format("%Y-%m-%dT%H:%M:%S").to_string(),
                run.kind,
                run.catalog_name,
                run.parameters,
                env!("CARGO_PKG_VERSION"),
                run.processed as i64,
                run.skipped as i64,
                run.records as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created, kind, catalog_name, parameters, crate_version, processed, skipped, records
             FROM runs ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let created: String = row.get(1)?;
            let created = NaiveDateTime::parse_from_str(&created, "%Y-%m-%dT%H:%M:%S").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(RunRecord {
                id: row.get(0)?,
                created,
                kind: row.get(2)?,
                catalog_name: row.get(3)?,
                parameters: row.get(4)?,
                crate_version: row.get(5)?,
                processed: row.get(6)?,
                skipped: row.get(7)?,
                records: row.get(8)?,
            })
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }
}
