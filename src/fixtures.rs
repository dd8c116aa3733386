// Test fixtures shared by the module tests

use crate::mapping::{self, TableSpec};
use crate::table::{Row, Table, Value};
use chrono::NaiveDate;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Raw upstream table with every mapped column present; cells not given are null
pub fn raw_table(spec: &TableSpec, rows: &[&[(&str, Value)]]) -> Table {
    let mut table = Table::new(spec.columns.iter().map(|c| c.raw));
    for values in rows {
        let row: Row = values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        table.push_row(row);
    }
    table
}

/// Row from (column, value) pairs
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn normalized(spec: &TableSpec, extra: &[&str], rows: Vec<Row>) -> Table {
    let mut columns = spec.output_columns();
    columns.extend(extra.iter().map(|c| c.to_string()));
    Table::from_rows(columns, rows)
}

// Normalized tables with every column their normalizer produces

pub fn lc_contracts(rows: Vec<Row>) -> Table {
    normalized(&mapping::loss_cost::CONTRACT, &["crm_id_lc"], rows)
}

pub fn ds_contracts(rows: Vec<Row>) -> Table {
    normalized(
        &mapping::deal_sheet::CONTRACT,
        &["trigger_ds", "contract_type_ds", "currency_ds", "terr_ds"],
        rows,
    )
}

pub fn sap_contracts(rows: Vec<Row>) -> Table {
    normalized(&mapping::sap::TREATY, &[], rows)
}

pub fn air_contracts(rows: Vec<Row>) -> Table {
    normalized(&mapping::air::CONTRACT, &[], rows)
}

pub fn lc_layers(rows: Vec<Row>) -> Table {
    normalized(&mapping::loss_cost::LAYER_TERMS, &["eff_date_lc", "exp_date_lc"], rows)
}

pub fn ds_layers(rows: Vec<Row>) -> Table {
    normalized(
        &mapping::deal_sheet::LAYER,
        &[
            "crm_id_ds",
            "expense_ratio_ds_contract",
            "tech_uw_ratio_ds_contract",
            "ult_cre_prem_ds_contract",
        ],
        rows,
    )
}

pub fn air_layers(rows: Vec<Row>) -> Table {
    normalized(&mapping::air::LAYER, &["crm_gp_id_air"], rows)
}

pub fn sap_lookup(rows: Vec<Row>) -> Table {
    normalized(&mapping::deal_sheet::SAP_LOOKUP, &["crm_gp_id_crmidforsap"], rows)
}

pub fn ts(s: &str) -> Value {
    Value::Timestamp(chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap())
}
