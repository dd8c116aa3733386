// 🧱 Layer Merger - canonical limit/retention bands per contract
// LC ⟗ DS on (group id, layer, inception), then AIR on the deal sheet's loss-cost layer id.
// Resolved fields and derived ratios carry a `_layer` suffix; the business key does not.

use crate::error::Result;
use crate::hierarchy::{resolve_all, Candidate::Column as Col, FieldPriority};
use crate::rules::{DenyTally, OverrideTable, Stage};
use crate::table::{cell, JoinKind, Row, Table, Value};

// ============================================================================
// FIELD PRIORITIES
// ============================================================================

const fn field(field: &'static str, candidates: &'static [crate::hierarchy::Candidate]) -> FieldPriority {
    FieldPriority { field, candidates }
}

pub const LAYER_KEY_PRIORITIES: &[FieldPriority] = &[
    field("crm_gp_id", &[Col("crm_gp_id_ds"), Col("crm_gp_id_lc"), Col("crm_gp_id_air")]),
    field("crm_id", &[Col("crm_id_ds"), Col("crm_id_lc"), Col("crm_id_air")]),
    field("eff_date", &[Col("eff_date_ds"), Col("eff_date_lc"), Col("eff_date_air")]),
    field("exp_date", &[Col("exp_date_ds"), Col("exp_date_lc"), Col("exp_date_air")]),
    field(
        "layer_id",
        &[Col("layer_id_ds"), Col("cinre_lc_layer_id_ds"), Col("layer_lc"), Col("layer_id_air")],
    ),
];

pub const LAYER_PRIORITIES: &[FieldPriority] = &[
    field("occ_limit", &[Col("occ_limit_lc"), Col("occ_limit_air")]),
    field("occ_retention", &[Col("occ_ret_lc"), Col("occ_retention_air")]),
    field("risk_limit", &[Col("limit_ds"), Col("risk_limit_lc")]),
    field("agg_limit", &[Col("agg_limit_ds"), Col("agg_limit_lc"), Col("agg_limit_air")]),
    field("agg_retention", &[Col("agg_retention_ds"), Col("aad_lc"), Col("agg_retention_air")]),
    field("risk_retention", &[Col("retention_ds"), Col("risk_retention_lc")]),
    field("brokerage", &[Col("brokerage_ds"), Col("brokerage_lc"), Col("brokerage_air")]),
    field("rp_brokerage", &[Col("rp_brokerage_ds"), Col("rp_brokerage_lc"), Col("rp_brokerage_air")]),
    field(
        "reinstatement_string",
        &[Col("reinstatements_ds"), Col("reinstatement_string_lc"), Col("reinstatement_str_air")],
    ),
    field("subject_prem", &[Col("subject_prem_ds"), Col("subject_premium_lc")]),
    field("deposit_prem", &[Col("deposit_prem_ds"), Col("cre_deposit_prem_lc")]),
    field("ultimate_prem", &[Col("ult_cre_prem_ds"), Col("cre_ult_prem_lc")]),
    field("uw_profit", &[Col("uw_profit_ds"), Col("cre_uw_lc")]),
    field("npv_uw_profit", &[Col("npv_uw_profit_ds"), Col("cre_npv_uw_lc")]),
    field(
        "authorized_share",
        &[Col("authorized_line_ds"), Col("authorized_share_lc"), Col("shares_authorized_air")],
    ),
    field("signed_share", &[Col("signed_line_ds"), Col("signed_share_lc"), Col("shares_signed_air")]),
    field("rate", &[Col("rate_ds"), Col("rate_lc")]),
    field("rol", &[Col("rol_ds"), Col("rol_air")]),
    field("placement", &[Col("placement_ds"), Col("placement_lc")]),
    // calc_exp_loss is derived before this runs
    field("expected_loss", &[Col("expected_loss_ds"), Col("calc_exp_loss")]),
    field("cyber_limit", &[Col("cyber_agg_limit_ds"), Col("cyber_sublimit_lc")]),
    field("cyber_coverage", &[Col("cyber_exposure_ds"), Col("cyber_coverage_lc")]),
];

/// Columns that keep their name in the layer output
pub const LAYER_KEY: &[&str] = &["crm_gp_id", "crm_id", "layer_id", "eff_date", "exp_date"];

/// Contract key shared with the contract merge
pub const CONTRACT_KEY: &[&str] = &["crm_gp_id", "crm_id", "eff_date", "exp_date"];

pub const LAYER_COLUMNS: &[&str] = &[
    "crm_gp_id",
    "crm_id",
    "layer_id",
    "layer_name_ds",
    "eff_date",
    "exp_date",
    "sap_treaty_ds",
    "sap_section_ds",
    "risk_retention",
    "risk_limit",
    "occ_retention",
    "occ_limit",
    "agg_retention",
    "agg_limit",
    "rate",
    "rol",
    "reinstatement_string",
    "subject_prem",
    "deposit_prem",
    "ultimate_prem",
    "ultimate_prem_contract",
    "tech_uw_ratio_ds",
    "brokerage",
    "comm_lc",
    "cre_ao_ratio",
    "profit_comm_lc",
    "ulae_ratio_lc",
    "expense_ratio",
    "expected_loss_ratio",
    "expected_loss_ratio_contract",
    "uw_profit",
    "npv_uw_profit",
    "clash_type_lc",
    "clash_coverage_lc",
    "cyber_limit",
    "cyber_coverage",
    "terror_coverage_lc",
    "terror_sublimit_lc",
    "cat_coverage_type_lc",
    "cat_experience_load_lc",
    "placement",
    "eco_x_pl_lc",
    "dj_lc",
    "trap_val_exp_lim_lc",
    "tot_cas_agg_lim_lc",
    "pricing_type_lc",
    "gr_net_agg_ret_lc",
    "gr_net_agg_lim_lc",
    "maol_lc",
    "authorized_share",
    "signed_share",
    "pnoc_ds",
    "franchise_air",
    "ss_lr_min_lc",
    "ss_slide1_lc",
    "ss_lr_mid_lc",
    "ss_slide2_lc",
    "ss_lr_max_lc",
    "loss_corr_start_lc",
    "loss_corr_stop_lc",
    "swing_min_rate_lc",
    "swing_max_rate_lc",
    "swing_load_lc",
    "raw_non_cat_cv_lc",
    "non_cat_param_risk_lc",
    "non_cat_cv_lc",
    "raw_nmd_cat_cv_lc",
    "nmd_cat_param_risk_lc",
    "nmd_cat_cv_lc",
    "participation_air",
    "rpp_ref_rol_air",
    "pricing_registry_air",
    "lc_applies_agg_air",
    "lc_ratio_to_agg_air",
    "broker_dollars",
];

pub const LAYER_SUFFIX: &str = "layer";

// ============================================================================
// ARITHMETIC
// ============================================================================

/// n / d, undefined when either side is missing or d is zero
pub fn safe_ratio(numerator: &Value, denominator: &Value) -> Value {
    match (numerator.as_f64(), denominator.as_f64()) {
        (Some(n), Some(d)) if d != 0.0 => Value::Float(n / d),
        _ => Value::Null,
    }
}

/// Sum that is undefined as soon as one term is
fn sum_all(values: &[&Value]) -> Value {
    values
        .iter()
        .map(|v| v.as_f64())
        .sum::<Option<f64>>()
        .map(Value::Float)
        .unwrap_or(Value::Null)
}

fn product(a: &Value, b: &Value) -> Value {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => Value::Float(a * b),
        _ => Value::Null,
    }
}

/// Brokerage plus commission when that is known and non-zero, otherwise the
/// residual of premium after loss and profit, less profit commission
pub fn expense_ratio(row: &Row) -> Value {
    let commission = sum_all(&[cell(row, "brokerage"), cell(row, "comm_lc")]);
    if commission.as_f64().map(|c| c != 0.0).unwrap_or(false) {
        return commission;
    }

    let premium = cell(row, "ultimate_prem");
    let expense = match (premium.as_f64(), cell(row, "expected_loss").as_f64(), cell(row, "uw_profit").as_f64()) {
        (Some(p), Some(el), Some(uw)) => Value::Float(p - el - uw),
        _ => Value::Null,
    };
    match (safe_ratio(&expense, premium).as_f64(), cell(row, "profit_comm_lc").as_f64()) {
        (Some(ratio), Some(pc)) => Value::Float(ratio - pc),
        _ => Value::Null,
    }
}

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LayerInputs<'a> {
    pub loss_cost: &'a Table,
    pub deal_sheet: &'a Table,
    pub air: &'a Table,
}

#[derive(Debug, Clone)]
pub struct MergedLayers {
    pub table: Table,
    pub joined_rows: usize,
    pub denied: DenyTally,
}

pub fn join_layer_sources(inputs: &LayerInputs<'_>) -> Result<Table> {
    let joined = inputs.loss_cost.join(
        inputs.deal_sheet,
        &["crm_gp_id_lc", "layer_lc", "eff_date_lc"],
        &["crm_gp_id_ds", "layer_id_ds", "eff_date_ds"],
        JoinKind::Outer,
    )?;
    joined.join(
        inputs.air,
        &["crm_gp_id_ds", "cinre_lc_layer_id_ds", "eff_date_ds"],
        &["crm_gp_id_air", "layer_id_air", "eff_date_air"],
        JoinKind::Outer,
    )
}

/// Sum `value` per (crm_id, eff_date) and attach it to every row of the group
fn attach_contract_sum(t: &mut Table, value: &str, out: &str) -> Result<()> {
    let sums = t.group_sum(&["crm_id", "eff_date"], value, out)?;
    *t = t.join(&sums, &["crm_id", "eff_date"], &["crm_id", "eff_date"], JoinKind::Left)?;
    Ok(())
}

fn layer_column(name: &str) -> String {
    if LAYER_KEY.contains(&name) {
        name.to_string()
    } else {
        format!("{}_{}", name, LAYER_SUFFIX)
    }
}

pub fn merge_layers(inputs: &LayerInputs<'_>, rules: &OverrideTable) -> Result<MergedLayers> {
    let mut t = join_layer_sources(inputs)?;
    let joined_rows = t.len();

    resolve_all(&mut t, LAYER_KEY_PRIORITIES)?;
    t.with_column("calc_exp_loss", |r| {
        sum_all(&[
            cell(r, "non_cat_ave_loss_alae_lc"),
            cell(r, "mdl_cat_ave_loss_alae_lc"),
            cell(r, "nmd_cat_ave_loss_alae_lc"),
        ])
    });
    resolve_all(&mut t, LAYER_PRIORITIES)?;

    // A zero deal-sheet limit means "see the loss-cost terms"
    t.with_column("risk_limit", |r| {
        let limit = cell(r, "risk_limit");
        if limit.as_f64() == Some(0.0) {
            cell(r, "risk_limit_lc").clone()
        } else {
            limit.clone()
        }
    });

    attach_contract_sum(&mut t, "ultimate_prem", "ultimate_prem_contract")?;
    attach_contract_sum(&mut t, "expected_loss", "expected_loss_contract")?;

    t.with_column("expected_loss_ratio", |r| safe_ratio(cell(r, "expected_loss"), cell(r, "ultimate_prem")));
    t.with_column("expected_loss_ratio_contract", |r| {
        safe_ratio(cell(r, "expected_loss_contract"), cell(r, "ultimate_prem_contract"))
    });
    t.with_column("expense_ratio", expense_ratio);
    t.with_column("broker_dollars", |r| product(cell(r, "ultimate_prem"), cell(r, "brokerage")));
    t.with_column("cre_ao_ratio", |r| {
        let premium = cell(r, "ultimate_prem");
        if premium.as_f64() == Some(0.0) {
            Value::Float(0.0)
        } else {
            safe_ratio(cell(r, "cre_ao_exp_lc"), premium)
        }
    });

    let mut layers = t.select(LAYER_COLUMNS)?;
    let renames: Vec<(String, String)> = LAYER_COLUMNS
        .iter()
        .filter(|c| !LAYER_KEY.contains(*c))
        .map(|c| (c.to_string(), layer_column(c)))
        .collect();
    for (from, to) in &renames {
        layers.rename(from, to)?;
    }

    attach_layer_count(&mut layers)?;
    layers.with_column("layer_name", layer_name);

    for field in rules.fields() {
        if layers.has_column(field) {
            rules.apply(&mut layers, field);
        }
    }
    let denied = rules.retain_allowed(&mut layers, Stage::Layer);

    tracing::info!(
        joined = joined_rows,
        layers = layers.len(),
        denied = denied.values().sum::<usize>(),
        "layers merged"
    );

    Ok(MergedLayers {
        table: layers,
        joined_rows,
        denied,
    })
}

/// Distinct layer ids per contract key, never below one
fn attach_layer_count(t: &mut Table) -> Result<()> {
    let counts = t.group_count_distinct(CONTRACT_KEY, "layer_id", "layer_count")?;
    *t = t.join(&counts, CONTRACT_KEY, CONTRACT_KEY, JoinKind::Left)?;
    t.with_column("layer_count", |r| {
        Value::Int(cell(r, "layer_count").as_i64().unwrap_or(1).max(1))
    });
    Ok(())
}

/// Deal-sheet name, else "Layer N" when the contract has several layers
fn layer_name(row: &Row) -> Value {
    let named = cell(row, "layer_name_ds_layer");
    if named.is_present() {
        return named.clone();
    }
    if cell(row, "layer_count").as_i64().unwrap_or(1) > 1 {
        let id = cell(row, "layer_id");
        let n = if id.is_present() { id.to_string() } else { "1".to_string() };
        Value::text(format!("Layer {}", n))
    } else {
        Value::text("")
    }
}
