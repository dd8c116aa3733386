// Treaty Reconcile - Core Library
// Exposes all modules for use in the CLI, API server and tests

pub mod error;
pub mod table;
pub mod config;
pub mod sources;
pub mod mapping;        // Static per-source column maps
pub mod normalize;
pub mod hierarchy;      // First-present-wins field resolution
pub mod rules;          // Override and deny rules
pub mod contracts;
pub mod layers;
pub mod classify;
pub mod pipeline;
pub mod report;
pub mod db;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use error::PipelineError;
pub use table::{JoinKind, Row, Table, Value};
pub use config::{OutputConfig, PipelineConfig, SourceLocation, SourceLocations};
pub use sources::{
    open_source, CsvDirectorySource, InMemorySource, SourceReader, SourceTag, SqliteSource,
};
pub use normalize::{NormalizeStats, SchemaCheck};
pub use rules::{DenyRule, Matcher, OverrideRule, OverrideTable, Stage};
pub use classify::ReservingLine;
pub use pipeline::{floor_timestamp, PipelineOutput, ReconciliationPipeline, SourceSet, OUTPUT_COLUMNS};
pub use report::RunReport;
pub use db::{
    Event, StoredRow,
    setup_database, insert_run, latest_run, list_runs,
    get_rows_for_run, get_rows_by_reserving_line, get_rows_for_contract,
    insert_event, get_events_for_entity, verify_count, export_csv,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
