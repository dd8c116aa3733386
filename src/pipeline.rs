// 🔄 Reconciliation Pipeline - sources → merged contract-layer table
// Normalize the four systems, merge contracts and layers, join them, attach the
// SAP lookup, classify, then shape the final sorted output.

use crate::classify::{apply_second_pass, classify_table};
use crate::config::{PipelineConfig, SourceLocations};
use crate::contracts::{merge_contracts, ContractInputs};
use crate::hierarchy::{resolve_all, Candidate::Column as Col, FieldPriority};
use crate::layers::{merge_layers, LayerInputs, CONTRACT_KEY};
use crate::normalize::{
    check_source, crm_id_number, get_normalizer, normalize_source, NormalizeOptions, SchemaCheck, SourceOutput,
};
use crate::report::{RunReport, SourceStats};
use crate::rules::OverrideTable;
use crate::sources::{open_source, SourceReader, SourceTag};
use crate::table::{cell, JoinKind, Table, Value};
use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};
use rayon::prelude::*;

// ============================================================================
// OUTPUT SHAPE
// ============================================================================

/// Final column order
pub const OUTPUT_COLUMNS: &[&str] = &[
    "timestamp",
    "reserving_line",
    "crm_id",
    "sap_treaty",
    "sap_section",
    "contract_layer_name",
    "contract_name",
    "eff_date",
    "treaty_year",
    "exp_date",
    "contract_term",
    "trigger",
    "descr_type",
    "expected_loss_ratio_layer",
    "expected_loss_ratio_contract_layer",
    "brokerage_layer",
    "comm_lc_layer",
    "expense_ratio_layer",
    "qs_on_deal",
    "ultimate_prem_layer",
    "ultimate_prem_contract",
    "reinsurance_rate",
    "cre_participation",
    "risk_limit_layer",
    "risk_retention_layer",
    "multi_layer",
    "reinstatement_string_layer",
    "agg_limit_layer",
    "agg_retention_layer",
    "crm_gp_id",
    "trigger_long",
    "status_lc",
    "status_ds",
    "status_air",
    "source_file_ds",
    "share_point_file_ds",
    "source_file_lc",
    "file_location_air",
    "last_updated",
    "last_updated_ds",
    "occ_limit_layer",
    "occ_retention_layer",
    "rol_layer",
    "placement_layer",
    "line",
    "subline_ds",
    "program",
    "client_name",
    "old_contract_name",
    "layer_name",
    "layer_id",
    "layer_name_ds_layer",
    "subject_prem_layer",
    "deposit_prem_layer",
    "tech_uw_ratio_ds_layer",
    "uw_profit_layer",
    "npv_uw_profit_layer",
    "cre_ao_ratio_layer",
    "profit_comm_lc_layer",
    "ulae_ratio_lc_layer",
    "clash_type_lc_layer",
    "clash_coverage_lc_layer",
    "cyber_limit_layer",
    "cyber_coverage_layer",
    "cyber_agg_limit_ds",
    "cyber_exposure_ds",
    "terror_coverage_lc_layer",
    "terror_sublimit_lc_layer",
    "cat_coverage_type_lc_layer",
    "cat_experience_load_lc_layer",
    "territory",
    "currency",
    "treaty_category",
    "broker",
    "executive_summary_air",
    "last_updated_lc",
    "last_updated_air",
    "user_id_lc",
    "user_name_air",
    "eco_x_pl_lc_layer",
    "dj_lc_layer",
    "trap_val_exp_lim_lc_layer",
    "tot_cas_agg_lim_lc_layer",
    "pricing_type_lc_layer",
    "gr_net_agg_ret_lc_layer",
    "gr_net_agg_lim_lc_layer",
    "maol_lc_layer",
    "authorized_share_layer",
    "pnoc_ds_layer",
    "franchise_air_layer",
    "ss_lr_min_lc_layer",
    "ss_slide1_lc_layer",
    "ss_lr_mid_lc_layer",
    "ss_slide2_lc_layer",
    "ss_lr_max_lc_layer",
    "loss_corr_start_lc_layer",
    "loss_corr_stop_lc_layer",
    "swing_min_rate_lc_layer",
    "swing_max_rate_lc_layer",
    "swing_load_lc_layer",
    "participation_air_layer",
    "rpp_ref_rol_air_layer",
    "pricing_registry_air_layer",
    "lc_applies_agg_air_layer",
    "lc_ratio_to_agg_air_layer",
    "layer_count",
    "alae_basis_lc",
    "roe_change_ds",
    "standalone_tvar_250_ds",
    "standalone_roc_250_ds",
    "diversified_tvar_250_ds",
    "diversified_roc_250_ds",
    "loss_cv_ds",
    "chg_rate_adequacy_ds",
    "rate_change_ds",
    "program_rate_change_ds",
    "dominant_type_ds",
    "xol_ind",
    "qs_ind",
    "cat_ind",
    "ppr_ind",
    "agg_xol_ind",
    "trans_ind",
    "clash_ind",
    "surplus_share_ind",
    "var_qs_ind",
    "broker_dollars_layer",
];

pub const SORT_KEY: &[&str] = &["eff_date", "reserving_line", "crm_id", "layer_id"];

/// Output names for columns that leave the merge under another name
const OUTPUT_RENAMES: &[(&str, &str)] = &[
    ("contract_name", "old_contract_name"),
    ("contract_name2", "contract_name"),
    ("ultimate_prem_contract_layer", "ultimate_prem_contract"),
    ("rate_layer", "reinsurance_rate"),
    ("signed_share_layer", "cre_participation"),
];

const SAP_LEFT_KEY: [&str; 5] = ["crm_id", "eff_date", "exp_date", "layer_id", "line"];
const SAP_RIGHT_KEY: [&str; 5] = [
    "crm_id_crmidforsap",
    "eff_date_crmidforsap",
    "exp_date_crmidforsap",
    "sap_section_crmidforsap",
    "line_crmidforsap",
];

const SAP_PRIORITIES: &[FieldPriority] = &[
    FieldPriority {
        field: "sap_treaty",
        candidates: &[Col("sap_treaty_ds_layer"), Col("sap_treaty_crmidforsap")],
    },
    FieldPriority {
        field: "sap_section",
        candidates: &[Col("layer_id"), Col("sap_section_crmidforsap")],
    },
];

// ============================================================================
// SOURCES
// ============================================================================

/// One reader per upstream system
pub struct SourceSet {
    pub loss_cost: Box<dyn SourceReader>,
    pub deal_sheet: Box<dyn SourceReader>,
    pub sap: Box<dyn SourceReader>,
    pub air: Box<dyn SourceReader>,
}

impl SourceSet {
    pub fn open(locations: &SourceLocations) -> Result<Self> {
        Ok(SourceSet {
            loss_cost: open_source(&locations.loss_cost)?,
            deal_sheet: open_source(&locations.deal_sheet)?,
            sap: open_source(&locations.sap)?,
            air: open_source(&locations.air)?,
        })
    }

    pub fn reader(&self, source: SourceTag) -> &dyn SourceReader {
        match source {
            SourceTag::LossCost => self.loss_cost.as_ref(),
            SourceTag::DealSheet => self.deal_sheet.as_ref(),
            SourceTag::Sap => self.sap.as_ref(),
            SourceTag::Air => self.air.as_ref(),
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: Table,
    pub report: RunReport,
}

pub struct ReconciliationPipeline {
    config: PipelineConfig,
    rules: OverrideTable,
}

/// Run time rounded down to the granularity, counted from midnight
pub fn floor_timestamp(now: NaiveDateTime, granularity_minutes: u32) -> NaiveDateTime {
    let step = i64::from(granularity_minutes.max(1)) * 60;
    let secs = i64::from(now.num_seconds_from_midnight());
    now.date().and_time(NaiveTime::default()) + Duration::seconds(secs - secs % step)
}

fn layer_table(output: &SourceOutput) -> Result<&Table> {
    output
        .layers
        .as_ref()
        .map(|n| &n.table)
        .ok_or_else(|| anyhow!("{} published no layer table", output.source))
}

impl ReconciliationPipeline {
    /// Built-in rules, extended by the configured rules file if any
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let rules = match &config.override_rules_path {
            Some(path) => OverrideTable::from_file(path)?,
            None => OverrideTable::builtin(),
        };
        Ok(Self::with_rules(config, rules))
    }

    pub fn with_rules(config: PipelineConfig, rules: OverrideTable) -> Self {
        ReconciliationPipeline { config, rules }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &OverrideTable {
        &self.rules
    }

    /// Open the configured sources and run at the current local time
    pub fn run(&self) -> Result<PipelineOutput> {
        let sources = SourceSet::open(&self.config.sources)?;
        self.run_with(&sources, Local::now().naive_local())
    }

    /// Schema check of every source table, no merging
    pub fn check(&self, sources: &SourceSet) -> Result<Vec<SchemaCheck>> {
        let mut checks = Vec::new();
        for source in SourceTag::ALL {
            checks.extend(check_source(source, sources.reader(source))?);
        }
        Ok(checks)
    }

    fn normalize_all(&self, sources: &SourceSet) -> Result<[SourceOutput; 4]> {
        let opts = NormalizeOptions {
            min_effective_date: self.config.min_effective_date,
            strict_columns: self.config.strict_columns,
        };
        let normalize = |source: &SourceTag| -> Result<SourceOutput> {
            let normalizer = get_normalizer(*source);
            normalize_source(normalizer.as_ref(), sources.reader(*source), &opts)
        };

        let outputs: Vec<SourceOutput> = if self.config.parallel_sources {
            SourceTag::ALL.par_iter().map(normalize).collect::<Result<Vec<_>>>()?
        } else {
            SourceTag::ALL.iter().map(normalize).collect::<Result<Vec<_>>>()?
        };

        outputs
            .try_into()
            .map_err(|_| anyhow!("expected one normalized output per source"))
    }

    pub fn run_with(&self, sources: &SourceSet, now: NaiveDateTime) -> Result<PipelineOutput> {
        let run_at = floor_timestamp(now, self.config.timestamp_granularity_minutes);
        let mut report = RunReport::new(run_at);
        tracing::info!(run_id = %report.run_id, run_at = %run_at, "pipeline run started");

        let outputs = self.normalize_all(sources)?;
        report.sources = outputs
            .iter()
            .map(|o| SourceStats {
                source: o.source.name().to_string(),
                tables: o.stats(),
            })
            .collect();
        let [lc, ds, sap, air] = &outputs;

        // Contract and layer merges
        let contracts = merge_contracts(
            &ContractInputs {
                loss_cost: &lc.contracts.table,
                deal_sheet: &ds.contracts.table,
                sap: &sap.contracts.table,
                air: &air.contracts.table,
            },
            &self.rules,
            run_at,
        )?;
        let layers = merge_layers(
            &LayerInputs {
                loss_cost: layer_table(lc)?,
                deal_sheet: layer_table(ds)?,
                air: layer_table(air)?,
            },
            &self.rules,
        )?;
        report.contract_rows = contracts.table.len();
        report.layer_rows = layers.table.len();
        report.add_denied(&contracts.denied);
        report.add_denied(&layers.denied);

        let mut out = layers.table.join(&contracts.table, CONTRACT_KEY, CONTRACT_KEY, JoinKind::Outer)?;
        fill_default_layer(&mut out);
        tracing::info!(rows = out.len(), "layers joined to contracts");

        let lookup = ds
            .sap_lookup
            .as_ref()
            .ok_or_else(|| anyhow!("{} published no SAP lookup", ds.source))?;
        out = attach_sap_lookup(&out, &lookup.table)?;

        classify_table(&mut out);
        attach_qs_on_deal(&mut out)?;
        report.relabelled = apply_second_pass(&mut out);

        finish_rows(&mut out)?;
        out.with_column("timestamp", |_| Value::Timestamp(run_at));

        let mut table = out.select(OUTPUT_COLUMNS)?;
        table.sort_by(SORT_KEY);

        report.output_rows = table.len();
        for line in table.column_values("reserving_line") {
            *report.reserving_lines.entry(line.to_string()).or_default() += 1;
        }
        report.fingerprint = table.fingerprint(&["timestamp"]);

        tracing::info!(
            run_id = %report.run_id,
            rows = report.output_rows,
            denied = report.total_denied(),
            relabelled = report.relabelled,
            "pipeline run finished"
        );

        Ok(PipelineOutput { table, report })
    }
}

// ============================================================================
// STAGES
// ============================================================================

/// Contracts with no layer from any source get a single layer 1
fn fill_default_layer(t: &mut Table) {
    for row in t.rows_mut() {
        if cell(row, "layer_count").is_present() {
            continue;
        }
        if cell(row, "layer_id").is_missing() {
            row.insert("layer_id".into(), Value::Int(1));
        }
        row.insert("layer_count".into(), Value::Int(1));
        row.insert("layer_name".into(), Value::text(""));
    }
}

fn attach_sap_lookup(out: &Table, lookup: &Table) -> Result<Table> {
    let mut lookup = lookup.clone();
    lookup.drop_columns(&["treaty_category_crmidforsap", "crm_gp_id_crmidforsap"]);
    let lookup = lookup.distinct();

    let mut joined = out.join(&lookup, &SAP_LEFT_KEY, &SAP_RIGHT_KEY, JoinKind::Left)?;
    resolve_all(&mut joined, SAP_PRIORITIES)?;
    Ok(joined)
}

/// "Yes" on every layer of a (crm_id, eff_date) deal when any of them is quota share
fn attach_qs_on_deal(t: &mut Table) -> Result<()> {
    let deals = t.group_sum(&["crm_id", "eff_date"], "qs_ind", "qs_on_deal_sum")?;
    *t = t.join(&deals, &["crm_id", "eff_date"], &["crm_id", "eff_date"], JoinKind::Left)?;
    t.with_column("qs_on_deal", |r| {
        let count = cell(r, "qs_on_deal_sum")
            .as_f64()
            .or_else(|| cell(r, "qs_ind").as_f64())
            .unwrap_or(0.0);
        Value::text(if count >= 1.0 { "Yes" } else { "No" })
    });
    t.drop_columns(&["qs_on_deal_sum"]);
    Ok(())
}

fn trimmed(v: &Value) -> Option<String> {
    v.is_present().then(|| v.to_string().trim().to_string())
}

/// Group id repair, derived labels and the output renames
fn finish_rows(t: &mut Table) -> Result<()> {
    t.with_column("crm_gp_id", |r| {
        let id = match cell(r, "crm_gp_id").as_i64() {
            Some(0) => cell(r, "crm_id").as_str().and_then(crm_id_number),
            other => other,
        };
        Value::Int(id.unwrap_or(0))
    });
    t.with_column("treaty_year", |r| {
        cell(r, "eff_date")
            .year()
            .map(|y| Value::Int(i64::from(y)))
            .unwrap_or(Value::Null)
    });
    t.with_column("multi_layer", |r| {
        let several = cell(r, "layer_count").as_i64().unwrap_or(1) > 1;
        Value::text(if several { "Yes" } else { "No" })
    });

    t.with_column("contract_layer_name", |r| {
        match (trimmed(cell(r, "client_name")), trimmed(cell(r, "contract_name"))) {
            (Some(client), Some(contract)) => Value::text(format!("{} - {}", client, contract)),
            _ => Value::Null,
        }
    });
    t.with_column("contract_name2", |r| {
        let Some(base) = trimmed(cell(r, "contract_layer_name")) else {
            return Value::Null;
        };
        match trimmed(cell(r, "layer_name")) {
            Some(layer) if !layer.is_empty() => Value::text(format!("{} - {}", base, layer)),
            _ => Value::text(base),
        }
    });

    t.rename_all(OUTPUT_RENAMES)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::fixtures::{date, raw_table, row, sap_lookup};
    use crate::mapping::{self, TableSpec};
    use crate::sources::InMemorySource;
    use crate::table::Row;

    fn empty(spec: &TableSpec) -> Table {
        raw_table(spec, &[])
    }

    fn ds_contract(gp: &str, crm: &str, client: &str, line: &str, name: Option<&str>) -> Vec<(&'static str, Value)> {
        let mut row = vec![
            ("CinReId", Value::text(gp)),
            ("CRMID", Value::text(crm)),
            ("ClientName", Value::text(client)),
            ("Line", Value::text(line)),
            ("Inception", Value::text("2022-01-01")),
            ("Expiration", Value::text("2022-12-31")),
        ];
        if let Some(name) = name {
            row.push(("ContractName", Value::text(name)));
        }
        row
    }

    fn ds_layer(id: &str, name: Option<&str>, premium: &str) -> Vec<(&'static str, Value)> {
        let mut row = vec![
            ("CinReId", Value::text("100")),
            ("LayerID", Value::text(id)),
            ("Inception", Value::text("2022-01-01")),
            ("Expiration", Value::text("2022-12-31")),
            ("ContractType", Value::text("Pro Rata/Quota Share")),
            ("Trigger", Value::text("Risks Attaching")),
            ("UltCinRePrem", Value::text(premium)),
        ];
        if let Some(name) = name {
            row.push(("LayerName", Value::text(name)));
        }
        row
    }

    /// Two deal-sheet contracts: C100 with two layers, P200 with none
    fn sources() -> SourceSet {
        let c100 = ds_contract("100", "C100", "Acme", "Casualty", Some("Casualty QS"));
        let p200 = ds_contract("200", "P200", "Beta", "Property", None);
        let l1 = ds_layer("1", Some("Primary"), "100");
        let l2 = ds_layer("2", None, "200");
        let sap_row: &[(&str, Value)] = &[
            ("CRMID", Value::text("C100")),
            ("Inception", Value::text("2022-01-01")),
            ("Expiration", Value::text("2022-12-31")),
            ("TreatyCategory", Value::text("Treaty")),
            ("SAPTreaty", Value::text("T-1")),
            ("SAPSection", Value::text("1")),
            ("Line", Value::text("Casualty")),
        ];

        SourceSet {
            loss_cost: Box::new(
                InMemorySource::new("lc")
                    .with_table("Contract", empty(&mapping::loss_cost::CONTRACT))
                    .with_table("LayerTerms", empty(&mapping::loss_cost::LAYER_TERMS)),
            ),
            deal_sheet: Box::new(
                InMemorySource::new("ds")
                    .with_table(
                        "Contract",
                        raw_table(&mapping::deal_sheet::CONTRACT, &[c100.as_slice(), p200.as_slice()]),
                    )
                    .with_table("Layer", raw_table(&mapping::deal_sheet::LAYER, &[l1.as_slice(), l2.as_slice()]))
                    .with_table("CRMIDforSAP", raw_table(&mapping::deal_sheet::SAP_LOOKUP, &[sap_row])),
            ),
            sap: Box::new(InMemorySource::new("sap").with_table("Treaty$", empty(&mapping::sap::TREATY))),
            air: Box::new(
                InMemorySource::new("air")
                    .with_table("Contract_New", empty(&mapping::air::CONTRACT))
                    .with_table("PricingLayerTermsv8-vw", empty(&mapping::air::LAYER)),
            ),
        }
    }

    fn pipeline(parallel: bool) -> ReconciliationPipeline {
        let config = PipelineConfig {
            parallel_sources: parallel,
            ..PipelineConfig::default()
        };
        ReconciliationPipeline::new(config).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        date("2024-05-06").and_hms_opt(h, m, s).unwrap()
    }

    fn text<'a>(row: &'a Row, column: &str) -> &'a str {
        cell(row, column).as_str().unwrap_or("")
    }

    #[test]
    fn test_floor_timestamp() {
        assert_eq!(floor_timestamp(at(10, 17, 42), 10), at(10, 10, 0));
        assert_eq!(floor_timestamp(at(10, 20, 0), 10), at(10, 20, 0));
        assert_eq!(floor_timestamp(at(23, 59, 59), 60), at(23, 0, 0));
        assert_eq!(floor_timestamp(at(13, 5, 0), 1440), at(0, 0, 0));
    }

    #[test]
    fn test_sap_lookup_attaches_once_per_layer() {
        let layer = |layer_id: i64, ds_treaty: Option<&str>| {
            let mut r = row(&[
                ("crm_id", Value::text("C100")),
                ("eff_date", Value::Date(date("2021-01-01"))),
                ("exp_date", Value::Date(date("2021-12-31"))),
                ("layer_id", Value::Int(layer_id)),
                ("line", Value::text("Casualty")),
            ]);
            if let Some(t) = ds_treaty {
                r.insert("sap_treaty_ds_layer".into(), Value::text(t));
            }
            r
        };
        let out = Table::from_rows(
            ["crm_id", "eff_date", "exp_date", "layer_id", "line", "sap_treaty_ds_layer"],
            vec![layer(1, None), layer(2, Some("DS-2")), layer(3, None)],
        );

        let entry = |section: f64, treaty: &str, category: &str| {
            row(&[
                ("crm_id_crmidforsap", Value::text("C100")),
                ("eff_date_crmidforsap", Value::Date(date("2021-01-01"))),
                ("exp_date_crmidforsap", Value::Date(date("2021-12-31"))),
                ("sap_section_crmidforsap", Value::Float(section)),
                ("line_crmidforsap", Value::text("Casualty")),
                ("sap_treaty_crmidforsap", Value::text(treaty)),
                ("treaty_category_crmidforsap", Value::text(category)),
                ("crm_gp_id_crmidforsap", Value::Int(100)),
            ])
        };
        // Two lookup rows for section 1 that differ only in dropped columns
        let lookup = sap_lookup(vec![
            entry(1.0, "LK-1", "Casualty Treaty"),
            entry(1.0, "LK-1", "Other"),
            entry(2.0, "LK-2", "Casualty Treaty"),
        ]);

        let joined = attach_sap_lookup(&out, &lookup).unwrap();
        assert_eq!(joined.len(), 3);

        let by_layer = |id: i64| {
            joined
                .rows()
                .iter()
                .find(|r| cell(r, "layer_id").as_i64() == Some(id))
                .unwrap()
        };
        assert_eq!(cell(by_layer(1), "sap_treaty"), &Value::text("LK-1"));
        assert_eq!(cell(by_layer(1), "sap_section"), &Value::Int(1));
        // Layer's own SAP treaty wins over the lookup
        assert_eq!(cell(by_layer(2), "sap_treaty"), &Value::text("DS-2"));
        assert!(cell(by_layer(3), "sap_treaty").is_missing());
        assert_eq!(cell(by_layer(3), "sap_section"), &Value::Int(3));
        assert!(!joined.has_column("treaty_category_crmidforsap"));

        println!("✅ SAP lookup attach test PASSED");
    }

    #[test]
    fn test_end_to_end_run() {
        let output = pipeline(true).run_with(&sources(), at(10, 17, 42)).unwrap();
        let table = &output.table;
        let rows = table.rows();

        assert_eq!(table.columns().len(), OUTPUT_COLUMNS.len());
        assert_eq!(rows.len(), 3);

        // Sorted by eff_date, reserving_line, crm_id, layer_id
        assert_eq!(text(&rows[0], "reserving_line"), "casualty_pr");
        assert_eq!(text(&rows[2], "reserving_line"), "other_property_noncat");
        assert_eq!(cell(&rows[0], "layer_id").as_i64(), Some(1));
        assert_eq!(cell(&rows[1], "layer_id").as_i64(), Some(2));

        // Contract-level premium sum on both layers
        assert_eq!(cell(&rows[0], "ultimate_prem_contract").as_f64(), Some(300.0));
        assert_eq!(cell(&rows[1], "ultimate_prem_contract").as_f64(), Some(300.0));

        // SAP lookup matched layer 1 only
        assert_eq!(text(&rows[0], "sap_treaty"), "T-1");
        assert!(cell(&rows[1], "sap_treaty").is_missing());
        assert_eq!(cell(&rows[1], "sap_section").as_i64(), Some(2));

        assert_eq!(text(&rows[0], "qs_on_deal"), "Yes");
        assert_eq!(text(&rows[1], "qs_on_deal"), "Yes");
        assert_eq!(text(&rows[2], "qs_on_deal"), "No");
        assert_eq!(text(&rows[0], "descr_type"), "Quota Share");

        assert_eq!(text(&rows[0], "multi_layer"), "Yes");
        assert_eq!(text(&rows[2], "multi_layer"), "No");

        // Names
        assert_eq!(text(&rows[0], "contract_layer_name"), "Acme - Casualty QS");
        assert_eq!(text(&rows[0], "contract_name"), "Acme - Casualty QS - Primary");
        assert_eq!(text(&rows[1], "contract_name"), "Acme - Casualty QS - Layer 2");
        assert_eq!(text(&rows[0], "old_contract_name"), "Casualty QS");

        // Contract with no layer becomes a single default layer
        let p200 = &rows[2];
        assert_eq!(text(p200, "crm_id"), "P200");
        assert_eq!(cell(p200, "layer_id").as_i64(), Some(1));
        assert_eq!(cell(p200, "layer_count").as_i64(), Some(1));
        assert!(text(p200, "contract_name").starts_with("Beta - "));
        assert!(!text(p200, "contract_name").ends_with(" - "));

        assert_eq!(cell(p200, "crm_gp_id"), &Value::Int(200));
        assert_eq!(cell(p200, "treaty_year"), &Value::Int(2022));
        for row in rows {
            assert_eq!(cell(row, "timestamp"), &Value::Timestamp(at(10, 10, 0)));
        }

        let report = &output.report;
        assert_eq!(report.output_rows, 3);
        assert_eq!(report.contract_rows, 2);
        assert_eq!(report.layer_rows, 2);
        assert_eq!(report.reserving_lines["casualty_pr"], 2);
        assert_eq!(report.reserving_lines["other_property_noncat"], 1);
        assert_eq!(report.sources.len(), 4);

        println!("✅ End-to-end pipeline test PASSED: {} rows", rows.len());
    }

    #[test]
    fn test_rerun_is_identical_except_timestamp() {
        let first = pipeline(true).run_with(&sources(), at(9, 0, 0)).unwrap();
        let second = pipeline(false).run_with(&sources(), at(15, 45, 0)).unwrap();

        assert_eq!(first.report.fingerprint, second.report.fingerprint);
        assert_ne!(first.report.run_id, second.report.run_id);
        assert_ne!(first.table.value(0, "timestamp"), second.table.value(0, "timestamp"));

        let mut a = first.table.clone();
        let mut b = second.table.clone();
        a.drop_columns(&["timestamp"]);
        b.drop_columns(&["timestamp"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_schema_drift_aborts_run() {
        let mut set = sources();
        set.sap = Box::new(InMemorySource::new("sap").with_table("Treaty$", Table::new(["CRM Submission ID"])));

        let err = pipeline(true).run_with(&set, at(9, 0, 0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaDrift { .. })
        ));
    }

    #[test]
    fn test_check_reports_every_table() {
        let mut set = sources();
        set.sap = Box::new(InMemorySource::new("sap").with_table("Treaty$", Table::new(["CRM Submission ID"])));

        let checks = pipeline(true).check(&set).unwrap();
        assert_eq!(checks.len(), mapping::all_specs().len());
        let treaty = checks.iter().find(|c| c.table == "Treaty$").unwrap();
        assert!(!treaty.is_ok());
        assert!(checks.iter().filter(|c| c.table != "Treaty$").all(|c| c.is_ok()));
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let mut set = sources();
        set.air = Box::new(InMemorySource::new("air"));
        let err = pipeline(false).run_with(&set, at(9, 0, 0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TableNotFound { .. })
        ));
    }
}
