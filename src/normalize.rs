// 🧹 Per-Source Normalizers - raw upstream table → suffixed semantic columns
// One normalizer per system. Each renames through its static column map, reads
// typed values, drops rows before the effective-date cutoff and rows in
// excluded statuses, then attaches the related secondary table.

use crate::error::PipelineError;
use crate::mapping::{self, TableSpec};
use crate::sources::{SourceReader, SourceTag};
use crate::table::{cell, JoinKind, Row, Table, Value};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// OPTIONS & STATS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub min_effective_date: NaiveDate,
    /// Unmapped raw columns abort the run instead of being dropped
    pub strict_columns: bool,
}

/// Row accounting for one normalized table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub table: String,
    pub raw_rows: usize,
    pub dropped_by_date: usize,
    pub dropped_by_status: usize,
    /// Rows removed because they had no counterpart in the parent table
    pub dropped_unmatched: usize,
    pub output_rows: usize,
    /// Raw columns neither mapped nor explicitly dropped
    pub unknown_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: Table,
    pub stats: NormalizeStats,
}

impl Normalized {
    fn finish(mut self) -> Self {
        self.stats.output_rows = self.table.len();
        self
    }
}

// ============================================================================
// GENERIC NORMALIZATION
// ============================================================================

/// Raw columns the column map expects but the table lacks, and raw columns the
/// column map does not know about
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaCheck {
    pub table: String,
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

impl SchemaCheck {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn check_schema(raw: &Table, spec: &TableSpec) -> SchemaCheck {
    SchemaCheck {
        table: spec.table.to_string(),
        missing: spec
            .columns
            .iter()
            .filter(|c| !raw.has_column(c.raw))
            .map(|c| c.raw.to_string())
            .collect(),
        unknown: raw
            .columns()
            .iter()
            .filter(|c| !spec.is_known(c))
            .cloned()
            .collect(),
    }
}

/// Rename, type and filter one raw table through its column map.
/// `min_effective_date` only applies when the column map names an effective-date column.
pub fn normalize_table(raw: &Table, spec: &TableSpec, min_effective_date: Option<NaiveDate>) -> Result<Normalized> {
    let system = spec.source.name();
    let check = check_schema(raw, spec);

    if let Some(column) = check.missing.first() {
        return Err(PipelineError::SchemaDrift {
            system: system.to_string(),
            table: spec.table.to_string(),
            column: column.clone(),
        }
        .into());
    }
    for column in &check.unknown {
        tracing::warn!(source = system, table = spec.table, column = %column, "unmapped raw column dropped");
    }

    let mut table = Table::new(spec.output_columns());
    for (i, raw_row) in raw.rows().iter().enumerate() {
        let mut row = Row::new();
        for column in spec.columns {
            let value = cell(raw_row, column.raw);
            let typed = column.kind.coerce(value).ok_or_else(|| PipelineError::InvalidValue {
                system: system.to_string(),
                table: spec.table.to_string(),
                column: column.raw.to_string(),
                row: i + 1,
                value: value.to_string(),
                kind: column.kind.name().to_string(),
            })?;
            if typed.is_present() {
                row.insert(spec.output_name(column.name), typed);
            }
        }
        table.push_row(row);
    }

    let mut stats = NormalizeStats {
        table: spec.table.to_string(),
        raw_rows: raw.len(),
        unknown_columns: check.unknown,
        ..Default::default()
    };

    if let (Some(eff), Some(min)) = (spec.effective_date, min_effective_date) {
        let column = spec.output_name(eff);
        stats.dropped_by_date = table.retain(|r| cell(r, &column).as_date().map(|d| d >= min).unwrap_or(false));
    }

    if let Some(filter) = spec.status {
        let column = spec.output_name(filter.field);
        stats.dropped_by_status = table.retain(|r| !filter.excludes(cell(r, &column)));
    }

    tracing::debug!(
        source = system,
        table = spec.table,
        raw = stats.raw_rows,
        by_date = stats.dropped_by_date,
        by_status = stats.dropped_by_status,
        "normalized table"
    );

    Ok(Normalized { table, stats }.finish())
}

fn fetch_normalized(reader: &dyn SourceReader, spec: &TableSpec, min: Option<NaiveDate>) -> Result<Normalized> {
    let raw = reader.fetch(spec.table)?;
    normalize_table(&raw, spec, min)
}

// ============================================================================
// NORMALIZER TRAIT
// ============================================================================

/// SourceNormalizer - one implementation per upstream system
pub trait SourceNormalizer: Send + Sync {
    fn source(&self) -> SourceTag;

    /// Contract-level table, already joined with any contract-level detail
    fn contracts(&self, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<Normalized>;

    /// Layer-level table; `contracts` is this source's normalized contract table.
    /// Sources without layer detail return None.
    fn layers(&self, reader: &dyn SourceReader, contracts: &Table, opts: &NormalizeOptions) -> Result<Option<Normalized>>;

    /// Secondary lookup tables, if the source publishes any
    fn sap_lookup(&self, _reader: &dyn SourceReader) -> Result<Option<Normalized>> {
        Ok(None)
    }
}

pub fn get_normalizer(source: SourceTag) -> Box<dyn SourceNormalizer> {
    match source {
        SourceTag::LossCost => Box::new(LossCostNormalizer),
        SourceTag::DealSheet => Box::new(DealSheetNormalizer),
        SourceTag::Sap => Box::new(SapNormalizer),
        SourceTag::Air => Box::new(AirNormalizer),
    }
}

/// Everything one source contributes to a run
#[derive(Debug, Clone)]
pub struct SourceOutput {
    pub source: SourceTag,
    pub contracts: Normalized,
    pub layers: Option<Normalized>,
    pub sap_lookup: Option<Normalized>,
}

impl SourceOutput {
    pub fn stats(&self) -> Vec<NormalizeStats> {
        std::iter::once(&self.contracts)
            .chain(self.layers.as_ref())
            .chain(self.sap_lookup.as_ref())
            .map(|n| n.stats.clone())
            .collect()
    }
}

/// Run one normalizer end to end against its reader
pub fn normalize_source(normalizer: &dyn SourceNormalizer, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<SourceOutput> {
    let source = normalizer.source();
    tracing::info!(source = %source, location = %reader.describe(), "normalizing source");

    let contracts = normalizer.contracts(reader, opts)?;
    let layers = normalizer.layers(reader, &contracts.table, opts)?;
    let sap_lookup = normalizer.sap_lookup(reader)?;

    let output = SourceOutput {
        source,
        contracts,
        layers,
        sap_lookup,
    };
    if opts.strict_columns {
        let unmapped = output
            .stats()
            .into_iter()
            .find_map(|s| s.unknown_columns.first().cloned().map(|column| (s.table, column)));
        if let Some((table, column)) = unmapped {
            return Err(PipelineError::UnmappedColumn {
                system: source.name().to_string(),
                table,
                column,
            }
            .into());
        }
    }

    tracing::info!(
        source = %source,
        contracts = output.contracts.table.len(),
        layers = output.layers.as_ref().map(|l| l.table.len()).unwrap_or(0),
        "source normalized"
    );

    Ok(output)
}

/// Fetch every table of every source and report schema differences without merging
pub fn check_source(source: SourceTag, reader: &dyn SourceReader) -> Result<Vec<SchemaCheck>> {
    let mut checks = Vec::new();
    for spec in mapping::all_specs().into_iter().filter(|s| s.source == source) {
        let raw = reader.fetch(spec.table)?;
        checks.push(check_schema(&raw, spec));
    }
    Ok(checks)
}

// ============================================================================
// LOSS COST
// ============================================================================

pub struct LossCostNormalizer;

impl SourceNormalizer for LossCostNormalizer {
    fn source(&self) -> SourceTag {
        SourceTag::LossCost
    }

    fn contracts(&self, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<Normalized> {
        let mut n = fetch_normalized(reader, &mapping::loss_cost::CONTRACT, Some(opts.min_effective_date))?;

        // crm_id is the management-report-line letter followed by the group id
        n.table.with_column("crm_id_lc", |r| {
            let mrl = cell(r, "mrl_lc");
            let group = cell(r, "crm_gp_id_lc");
            match (mrl.to_string().chars().next(), group.is_present()) {
                (Some(letter), true) => Value::text(format!("{}{}", letter, group)),
                _ => Value::Null,
            }
        });

        Ok(n.finish())
    }

    fn layers(&self, reader: &dyn SourceReader, contracts: &Table, _opts: &NormalizeOptions) -> Result<Option<Normalized>> {
        let mut n = fetch_normalized(reader, &mapping::loss_cost::LAYER_TERMS, None)?;

        // Layer terms carry no dates; restrict to kept contracts and borrow theirs
        let known: std::collections::HashSet<_> = contracts
            .column_values("crm_id_lc")
            .filter_map(Value::key_part)
            .collect();
        n.stats.dropped_unmatched = n.table.retain(|r| {
            cell(r, "crm_id_lc")
                .key_part()
                .map(|k| known.contains(&k))
                .unwrap_or(false)
        });

        let dates = contracts
            .select(&["crm_gp_id_lc", "crm_id_lc", "eff_date_lc", "exp_date_lc"])?
            .distinct();
        n.table = n.table.join(
            &dates,
            &["crm_gp_id_lc", "crm_id_lc"],
            &["crm_gp_id_lc", "crm_id_lc"],
            JoinKind::Left,
        )?;

        Ok(Some(n.finish()))
    }
}

// ============================================================================
// DEAL SHEET
// ============================================================================

pub struct DealSheetNormalizer;

const DS_CONTRACT_KEY: [&str; 3] = ["crm_gp_id_ds", "eff_date_ds", "exp_date_ds"];

impl SourceNormalizer for DealSheetNormalizer {
    fn source(&self) -> SourceTag {
        SourceTag::DealSheet
    }

    fn contracts(&self, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<Normalized> {
        let min = Some(opts.min_effective_date);
        let mut n = fetch_normalized(reader, &mapping::deal_sheet::CONTRACT, min)?;
        let layers = fetch_normalized(reader, &mapping::deal_sheet::LAYER, min)?;

        // Contract-level terms that the deal sheet only records per layer
        let terms = layers
            .table
            .select(&[
                "crm_gp_id_ds",
                "eff_date_ds",
                "exp_date_ds",
                "trigger_ds",
                "contract_type_ds",
                "currency_ds",
                "terr_ds",
            ])?
            .distinct();
        n.table = n.table.join(&terms, &DS_CONTRACT_KEY, &DS_CONTRACT_KEY, JoinKind::Left)?;

        Ok(n.finish())
    }

    fn layers(&self, reader: &dyn SourceReader, contracts: &Table, opts: &NormalizeOptions) -> Result<Option<Normalized>> {
        let mut n = fetch_normalized(reader, &mapping::deal_sheet::LAYER, Some(opts.min_effective_date))?;

        let mut parent = contracts
            .select(&[
                "crm_gp_id_ds",
                "crm_id_ds",
                "eff_date_ds",
                "exp_date_ds",
                "expense_ratio_ds",
                "tech_uw_ratio_ds",
                "ult_cre_prem_ds",
            ])?
            .distinct();
        parent.rename_all(&[
            ("expense_ratio_ds", "expense_ratio_ds_contract"),
            ("tech_uw_ratio_ds", "tech_uw_ratio_ds_contract"),
            ("ult_cre_prem_ds", "ult_cre_prem_ds_contract"),
        ])?;

        n.table = n.table.join(&parent, &DS_CONTRACT_KEY, &DS_CONTRACT_KEY, JoinKind::Left)?;
        n.table.sort_by(&["crm_gp_id_ds", "layer_name_ds"]);

        Ok(Some(n.finish()))
    }

    fn sap_lookup(&self, reader: &dyn SourceReader) -> Result<Option<Normalized>> {
        let mut n = fetch_normalized(reader, &mapping::deal_sheet::SAP_LOOKUP, None)?;

        // Group id is the numeric tail of the crm id ("C12345" → 12345)
        n.table.with_column("crm_gp_id_crmidforsap", |r| {
            cell(r, "crm_id_crmidforsap")
                .as_str()
                .and_then(crm_id_number)
                .map(Value::Int)
                .unwrap_or(Value::Null)
        });

        Ok(Some(n.finish()))
    }
}

/// Numeric part of a crm id after its one-letter line prefix
pub fn crm_id_number(crm_id: &str) -> Option<i64> {
    let mut chars = crm_id.trim().chars();
    chars.next()?;
    chars.as_str().parse().ok()
}

// ============================================================================
// SAP
// ============================================================================

pub struct SapNormalizer;

impl SourceNormalizer for SapNormalizer {
    fn source(&self) -> SourceTag {
        SourceTag::Sap
    }

    fn contracts(&self, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<Normalized> {
        let mut n = fetch_normalized(reader, &mapping::sap::TREATY, Some(opts.min_effective_date))?;
        // One treaty row per section upstream; only contract attributes survive the map
        n.table = n.table.distinct();
        Ok(n.finish())
    }

    fn layers(&self, _reader: &dyn SourceReader, _contracts: &Table, _opts: &NormalizeOptions) -> Result<Option<Normalized>> {
        Ok(None)
    }
}

// ============================================================================
// AIR
// ============================================================================

pub struct AirNormalizer;

impl SourceNormalizer for AirNormalizer {
    fn source(&self) -> SourceTag {
        SourceTag::Air
    }

    fn contracts(&self, reader: &dyn SourceReader, opts: &NormalizeOptions) -> Result<Normalized> {
        fetch_normalized(reader, &mapping::air::CONTRACT, Some(opts.min_effective_date))
    }

    fn layers(&self, reader: &dyn SourceReader, contracts: &Table, opts: &NormalizeOptions) -> Result<Option<Normalized>> {
        let mut n = fetch_normalized(reader, &mapping::air::LAYER, Some(opts.min_effective_date))?;

        let keys = contracts
            .select(&["crm_id_air", "crm_gp_id_air", "eff_date_air"])?
            .distinct();
        n.table = n.table.join(
            &keys,
            &["crm_id_air", "eff_date_air"],
            &["crm_id_air", "eff_date_air"],
            JoinKind::Outer,
        )?;

        Ok(Some(n.finish()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
