// ⚙️ Pipeline Configuration - where the four sources live and how a run behaves
// Loaded from JSON; every field has a default so an empty object is a valid config.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Earliest effective date with usable data quality
pub const DEFAULT_MIN_EFFECTIVE_DATE: &str = "2020-01-01";

pub const DEFAULT_TIMESTAMP_GRANULARITY_MINUTES: u32 = 10;

// ============================================================================
// SOURCE LOCATIONS
// ============================================================================

/// Where one upstream system's tables are read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocation {
    /// Directory holding one `<table>.csv` export per table
    Csv { dir: PathBuf },
    /// SQLite database file holding the tables
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocations {
    pub loss_cost: SourceLocation,
    pub deal_sheet: SourceLocation,
    pub sap: SourceLocation,
    pub air: SourceLocation,
}

impl Default for SourceLocations {
    fn default() -> Self {
        let csv = |name: &str| SourceLocation::Csv {
            dir: PathBuf::from("data").join(name),
        };
        SourceLocations {
            loss_cost: csv("loss_cost"),
            deal_sheet: csv("deal_sheet"),
            sap: csv("sap"),
            air: csv("air"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Flat export of the final table
    pub csv_path: Option<PathBuf>,
    /// SQLite store for run history and rows
    pub database_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            csv_path: Some(PathBuf::from("contract_layers.csv")),
            database_path: Some(PathBuf::from("contract_layers.db")),
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows with an effective date before this are dropped at normalization
    pub min_effective_date: NaiveDate,

    /// Run timestamp is floored to this many minutes
    pub timestamp_granularity_minutes: u32,

    /// Normalize the four sources concurrently
    pub parallel_sources: bool,

    /// Treat raw columns missing from the column maps as schema drift
    pub strict_columns: bool,

    pub sources: SourceLocations,

    pub output: OutputConfig,

    /// Extra override/deny rules merged after the built-in table
    pub override_rules_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            min_effective_date: NaiveDate::parse_from_str(DEFAULT_MIN_EFFECTIVE_DATE, "%Y-%m-%d")
                .unwrap_or_default(),
            timestamp_granularity_minutes: DEFAULT_TIMESTAMP_GRANULARITY_MINUTES,
            parallel_sources: true,
            strict_columns: false,
            sources: SourceLocations::default(),
            output: OutputConfig::default(),
            override_rules_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config = Self::from_json(&content)?;

        // Relative source paths are taken relative to the config file
        let base = path.as_ref().parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config.resolve_paths(&base))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        if !(1..=1440).contains(&self.timestamp_granularity_minutes) {
            return Err(PipelineError::Config(format!(
                "timestamp_granularity_minutes must be between 1 and 1440, got {}",
                self.timestamp_granularity_minutes
            )));
        }
        Ok(())
    }

    fn resolve_paths(mut self, base: &Path) -> Self {
        let join = |p: &PathBuf| if p.is_relative() { base.join(p) } else { p.clone() };
        for location in [
            &mut self.sources.loss_cost,
            &mut self.sources.deal_sheet,
            &mut self.sources.sap,
            &mut self.sources.air,
        ] {
            let target = match location {
                SourceLocation::Csv { dir } => dir,
                SourceLocation::Sqlite { path } => path,
            };
            let resolved = join(&*target);
            *target = resolved;
        }
        self.override_rules_path = self.override_rules_path.as_ref().map(join);
        self
    }
}
