// 🔌 Source Readers - fetch a named raw table from one upstream system
// The pipeline only needs column names and null-ability preserved; transport is pluggable.

use crate::config::SourceLocation;
use crate::error::PipelineError;
use crate::table::{Row, Table, Value};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ============================================================================
// SOURCE TAG
// ============================================================================

/// The four upstream line-of-business systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    /// Loss-cost pricing database
    LossCost,
    /// Deal-sheet database
    DealSheet,
    /// SAP accounting extract
    Sap,
    /// AIR pricing-model database
    Air,
}

impl SourceTag {
    pub const ALL: [SourceTag; 4] = [
        SourceTag::LossCost,
        SourceTag::DealSheet,
        SourceTag::Sap,
        SourceTag::Air,
    ];

    /// Column suffix carried by every normalized column from this source
    pub fn suffix(&self) -> &'static str {
        match self {
            SourceTag::LossCost => "lc",
            SourceTag::DealSheet => "ds",
            SourceTag::Sap => "sap",
            SourceTag::Air => "air",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceTag::LossCost => "Loss Cost",
            SourceTag::DealSheet => "Deal Sheet",
            SourceTag::Sap => "SAP",
            SourceTag::Air => "AIR",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// READER TRAIT
// ============================================================================

/// SourceReader - fetch one raw table by name
pub trait SourceReader: Send + Sync {
    fn fetch(&self, table: &str) -> Result<Table>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

fn not_found(system: &str, table: &str) -> anyhow::Error {
    PipelineError::TableNotFound {
        system: system.to_string(),
        table: table.to_string(),
    }
    .into()
}

/// Build a reader for a configured location
pub fn open_source(location: &SourceLocation) -> Result<Box<dyn SourceReader>> {
    match location {
        SourceLocation::Csv { dir } => Ok(Box::new(CsvDirectorySource::new(dir))),
        SourceLocation::Sqlite { path } => Ok(Box::new(SqliteSource::open(path)?)),
    }
}

// ============================================================================
// CSV DIRECTORY
// ============================================================================

/// One `<table>.csv` file per table; empty cells read as Null
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        CsvDirectorySource {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl SourceReader for CsvDirectorySource {
    fn fetch(&self, table: &str) -> Result<Table> {
        let path = self.dir.join(format!("{}.csv", table));
        if !path.exists() {
            return Err(not_found(&self.describe(), table));
        }

        let mut rdr = csv::Reader::from_path(&path)
            .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut out = Table::new(headers.clone());
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Bad CSV record {} in {:?}", line + 2, path))?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, v)| !v.is_empty())
                .map(|(h, v)| (h.clone(), Value::text(v)))
                .collect();
            out.push_row(row);
        }

        tracing::debug!(table, rows = out.len(), dir = ?self.dir, "read CSV table");
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }
}

// ============================================================================
// SQLITE
// ============================================================================

/// Tables read with `SELECT *` from a SQLite database
pub struct SqliteSource {
    label: String,
    conn: Mutex<Connection>,
}

impl SqliteSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open source database: {:?}", path.as_ref()))?;
        Ok(SqliteSource {
            label: format!("sqlite:{}", path.as_ref().display()),
            conn: Mutex::new(conn),
        })
    }

    pub fn from_connection(label: &str, conn: Connection) -> Self {
        SqliteSource {
            label: label.to_string(),
            conn: Mutex::new(conn),
        }
    }
}

fn sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl SourceReader for SqliteSource {
    fn fetch(&self, table: &str) -> Result<Table> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("source connection poisoned: {}", self.label))?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(not_found(&self.label, table));
        }

        let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut out = Table::new(columns.clone());
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = sql_value(row.get_ref(i)?);
                if !value.is_missing() {
                    record.insert(name.clone(), value);
                }
            }
            out.push_row(record);
        }

        tracing::debug!(table, rows = out.len(), source = %self.label, "read SQLite table");
        Ok(out)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ============================================================================
// IN MEMORY
// ============================================================================

/// Tables held in memory, for tests and embedding
#[derive(Default)]
pub struct InMemorySource {
    label: String,
    tables: HashMap<String, Table>,
}

impl InMemorySource {
    pub fn new(label: &str) -> Self {
        InMemorySource {
            label: label.to_string(),
            tables: HashMap::new(),
        }
    }

    pub fn with_table(mut self, name: &str, table: Table) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }
}

impl SourceReader for InMemorySource {
    fn fetch(&self, table: &str) -> Result<Table> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| not_found(&self.label, table))
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }
}
