// 🚨 Pipeline Errors - typed failures that abort a run
// Everything else in the pipeline is non-fatal and lands in the output as missing/sentinel.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A mapped raw column is not present in the fetched table
    #[error("schema drift in {system} table '{table}': expected column '{column}' is missing")]
    SchemaDrift {
        system: String,
        table: String,
        column: String,
    },

    /// A raw column that is neither mapped nor explicitly dropped, under strict columns
    #[error("unmapped column '{column}' in {system} table '{table}'")]
    UnmappedColumn {
        system: String,
        table: String,
        column: String,
    },

    #[error("table '{table}' not found in {system}")]
    TableNotFound { system: String, table: String },

    /// A raw value could not be read as its declared column kind
    #[error("invalid {kind} value '{value}' in {system} table '{table}', column '{column}' (row {row})")]
    InvalidValue {
        system: String,
        table: String,
        column: String,
        row: usize,
        value: String,
        kind: String,
    },

    #[error("column '{column}' not found")]
    MissingColumn { column: String },

    #[error("column '{column}' exists on both sides of a join")]
    ColumnCollision { column: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn missing_column(column: &str) -> Self {
        PipelineError::MissingColumn {
            column: column.to_string(),
        }
    }

    /// Fatal errors that mean the source mapping is out of sync with upstream
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaDrift { .. }
                | PipelineError::UnmappedColumn { .. }
                | PipelineError::TableNotFound { .. }
        )
    }
}
