// 🗄️ Output Store - reconciled rows, run history and audit events in SQLite

use crate::report::RunReport;
use crate::table::{cell, Row, Table};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Event for the audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// One stored output row: the full record as JSON plus the columns we query by
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredRow {
    pub run_id: String,
    pub crm_id: String,
    pub layer_id: String,
    pub reserving_line: String,
    pub row_hash: String,
    pub data: serde_json::Value,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Runs Table (one row per pipeline run, report kept as JSON)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            run_timestamp TEXT NOT NULL,
            started_at TEXT NOT NULL,
            output_rows INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            report TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Contract Layers Table (one JSON document per output row)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contract_layers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            crm_id TEXT NOT NULL,
            layer_id TEXT NOT NULL,
            reserving_line TEXT NOT NULL,
            row_hash TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rows_run ON contract_layers(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rows_line ON contract_layers(run_id, reserving_line)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rows_crm ON contract_layers(run_id, crm_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Row as a JSON object keyed by the table's columns
fn row_document(columns: &[String], row: &Row) -> Result<serde_json::Value> {
    let mut doc = serde_json::Map::new();
    for column in columns {
        doc.insert(column.clone(), serde_json::to_value(cell(row, column))?);
    }
    Ok(serde_json::Value::Object(doc))
}

fn hash_document(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Store a finished run and all of its rows in one transaction.
/// Returns the number of rows written.
pub fn insert_run(conn: &Connection, report: &RunReport, table: &Table) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (run_id, run_timestamp, started_at, output_rows, fingerprint, report)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            report.run_id,
            report.run_timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            report.started_at.to_rfc3339(),
            report.output_rows as i64,
            report.fingerprint,
            serde_json::to_string(report)?,
        ],
    )
    .context("Failed to insert run")?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO contract_layers (run_id, crm_id, layer_id, reserving_line, row_hash, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in table.rows() {
            let json = serde_json::to_string(&row_document(table.columns(), row)?)?;
            stmt.execute(params![
                report.run_id,
                cell(row, "crm_id").to_string(),
                cell(row, "layer_id").to_string(),
                cell(row, "reserving_line").to_string(),
                hash_document(&json),
                json,
            ])?;
            inserted += 1;
        }
    }

    let event = Event::new(
        "run_completed",
        "run",
        &report.run_id,
        serde_json::json!({
            "output_rows": report.output_rows,
            "denied": report.total_denied(),
            "fingerprint": report.fingerprint,
        }),
        "pipeline",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;
    tracing::info!(run_id = %report.run_id, rows = inserted, "run stored");
    Ok(inserted)
}

fn parse_report(json: String) -> rusqlite::Result<RunReport> {
    serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// Most recently stored run, if any
pub fn latest_run(conn: &Connection) -> Result<Option<RunReport>> {
    let report = conn
        .query_row(
            "SELECT report FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |row| parse_report(row.get(0)?),
        )
        .optional()?;

    Ok(report)
}

/// All stored runs, newest first
pub fn list_runs(conn: &Connection) -> Result<Vec<RunReport>> {
    let mut stmt = conn.prepare("SELECT report FROM runs ORDER BY id DESC")?;

    let runs = stmt
        .query_map([], |row| parse_report(row.get(0)?))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

fn query_rows(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<StoredRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(args, |row| {
            let data_json: String = row.get(5)?;
            Ok(StoredRow {
                run_id: row.get(0)?,
                crm_id: row.get(1)?,
                layer_id: row.get(2)?,
                reserving_line: row.get(3)?,
                row_hash: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Rows of one run in output order
pub fn get_rows_for_run(conn: &Connection, run_id: &str) -> Result<Vec<StoredRow>> {
    query_rows(
        conn,
        "SELECT run_id, crm_id, layer_id, reserving_line, row_hash, data
         FROM contract_layers
         WHERE run_id = ?1
         ORDER BY id",
        &[&run_id],
    )
}

pub fn get_rows_by_reserving_line(conn: &Connection, run_id: &str, reserving_line: &str) -> Result<Vec<StoredRow>> {
    query_rows(
        conn,
        "SELECT run_id, crm_id, layer_id, reserving_line, row_hash, data
         FROM contract_layers
         WHERE run_id = ?1 AND reserving_line = ?2
         ORDER BY id",
        &[&run_id, &reserving_line],
    )
}

pub fn get_rows_for_contract(conn: &Connection, run_id: &str, crm_id: &str) -> Result<Vec<StoredRow>> {
    query_rows(
        conn,
        "SELECT run_id, crm_id, layer_id, reserving_line, row_hash, data
         FROM contract_layers
         WHERE run_id = ?1 AND crm_id = ?2
         ORDER BY id",
        &[&run_id, &crm_id],
    )
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Total stored output rows across all runs
pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM contract_layers", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Write the table as CSV with a header row. Missing values are empty cells.
pub fn export_csv(table: &Table, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(table.columns().iter().map(|c| cell(row, c).to_string()))?;
    }
    writer.flush()?;

    Ok(table.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{date, row};
    use crate::table::Value;

    fn sample_output() -> Table {
        Table::from_rows(
            ["crm_id", "layer_id", "eff_date", "reserving_line", "premium"],
            vec![
                row(&[
                    ("crm_id", Value::text("C-100")),
                    ("layer_id", Value::Int(1)),
                    ("eff_date", Value::Date(date("2023-01-01"))),
                    ("reserving_line", Value::text("cirt")),
                    ("premium", Value::Float(250.0)),
                ]),
                row(&[
                    ("crm_id", Value::text("C-100")),
                    ("layer_id", Value::Int(2)),
                    ("eff_date", Value::Date(date("2023-01-01"))),
                    ("reserving_line", Value::text("cirt")),
                    ("premium", Value::Null),
                ]),
                row(&[
                    ("crm_id", Value::text("P-7")),
                    ("layer_id", Value::Int(1)),
                    ("eff_date", Value::Date(date("2023-06-01"))),
                    ("reserving_line", Value::text("property_xol")),
                    ("premium", Value::Float(10.5)),
                ]),
            ],
        )
    }

    fn sample_report(table: &Table) -> RunReport {
        let mut report = RunReport::new(date("2024-01-01").and_hms_opt(9, 30, 0).unwrap());
        report.output_rows = table.len();
        report.fingerprint = table.fingerprint(&["timestamp"]);
        report.reserving_lines.insert("cirt".to_string(), 2);
        report
    }

    #[test]
    fn test_insert_run_and_read_back() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let table = sample_output();
        let report = sample_report(&table);

        let inserted = insert_run(&conn, &report, &table).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(verify_count(&conn).unwrap(), 3);

        let latest = latest_run(&conn).unwrap().unwrap();
        assert_eq!(latest.run_id, report.run_id);
        assert_eq!(latest.fingerprint, report.fingerprint);
        assert_eq!(latest.reserving_lines["cirt"], 2);

        let rows = get_rows_for_run(&conn, &report.run_id).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].layer_id, "1");
        assert_eq!(rows[1].data["premium"], serde_json::Value::Null);
        assert_eq!(rows[2].data["eff_date"], "2023-06-01");

        let cirt = get_rows_by_reserving_line(&conn, &report.run_id, "cirt").unwrap();
        assert_eq!(cirt.len(), 2);
        assert!(cirt.iter().all(|r| r.crm_id == "C-100"));

        let contract = get_rows_for_contract(&conn, &report.run_id, "P-7").unwrap();
        assert_eq!(contract.len(), 1);
        assert_eq!(contract[0].reserving_line, "property_xol");

        println!("✅ Run store test PASSED: {} rows round-tripped", rows.len());
    }

    #[test]
    fn test_latest_run_empty_and_ordering() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        assert!(latest_run(&conn).unwrap().is_none());

        let table = sample_output();
        let first = sample_report(&table);
        let second = sample_report(&table);
        insert_run(&conn, &first, &table).unwrap();
        insert_run(&conn, &second, &table).unwrap();

        assert_eq!(latest_run(&conn).unwrap().unwrap().run_id, second.run_id);
        assert_eq!(list_runs(&conn).unwrap().len(), 2);
        assert_eq!(verify_count(&conn).unwrap(), 6);

        // identical content hashes to the same row hash in both runs
        let a = get_rows_for_run(&conn, &first.run_id).unwrap();
        let b = get_rows_for_run(&conn, &second.run_id).unwrap();
        assert_eq!(a[0].row_hash, b[0].row_hash);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let table = sample_output();
        let report = sample_report(&table);
        insert_run(&conn, &report, &table).unwrap();

        let manual = Event::new(
            "rows_exported",
            "run",
            &report.run_id,
            serde_json::json!({"path": "out.csv"}),
            "cli",
        );
        insert_event(&conn, &manual).unwrap();

        let events = get_events_for_entity(&conn, "run", &report.run_id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.event_type == "run_completed" && e.data["output_rows"] == 3));
        assert!(events.iter().any(|e| e.actor == "cli"));

        println!("✅ Event log test PASSED");
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("contract_layers.csv");
        let table = sample_output();

        let written = export_csv(&table, &path).unwrap();
        assert_eq!(written, 3);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["crm_id", "layer_id", "eff_date", "reserving_line", "premium"]);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][4], "250");
        assert_eq!(&records[1][4], "");
        assert_eq!(&records[2][2], "2023-06-01");
    }
}
