// SAP accounting extract: `Treaty$`
// Only contract-level attributes are carried; layer terms and figures known to be unreliable are dropped.

use super::{ColumnSpec as C, TableSpec};
use crate::sources::SourceTag;

pub static TREATY: TableSpec = TableSpec {
    source: SourceTag::Sap,
    table: "Treaty$",
    suffix: "sap",
    version: 1,
    columns: &[
        C::text("Company Code", "company_code"),
        C::text("CRM Submission ID", "crm_id"),
        C::text("Underwriter for Treaty", "uw_for_treaty"),
        C::text("Nature of Treaty", "nature_of_treaty"),
        C::text("Accounting Freq# No#", "acct_freq_numb"),
        C::text("Account Level", "acct_level"),
        C::date("Cancel Date", "cancel_date"),
        C::text("End of Acctg Year", "end_of_acct_year"),
        C::text("Spec# Retro Allowed", "specific_numb_retro_allowed"),
        C::text("Specific Retro Treaty", "specific_retro_treaty"),
        C::date("Effective Date", "eff_date"),
        C::date("Expiration Date", "exp_date"),
        C::text("Exposure Territory", "exposure_terr"),
        C::text("Business Type Number", "business_type_numb"),
        C::text("Cancel Type", "cancel_type"),
        C::text("Peril", "peril"),
    ],
    dropped: &[
        "Deal Number",
        "Contract Number",
        "Treaty Text",
        "Cedent",
        "Cedent Name",
        "Treaty Category",
        "Contract Status",
        "Renewal",
        "Retro Treaty Number",
        "Retro Section Number",
        "Cession Percentage",
        "Reported Data Placement %",
        "CinciRe Share/participation",
        "Section",
        "Text for Section",
        "Contract Type",
        "Layer",
        "UW Area",
        "Contract Trigger",
        "Days Runoff",
        "XPL Limit",
        "ECO Limit",
        "COB(UOBG)",
        "CoB (UOBG) %",
        "Segment",
        "Subsegment",
        "Quota Share %",
        "Maximum Liability",
        "Retained Line",
        "No# of Lines",
        "Limit",
        "Retention",
        "Cat Occurrence Retention",
        "Cat Occurrence Limit",
        "Terror Occurrence Limit",
        "AAD",
        "AAL",
        "Loss Corridor Floor",
        "Loss Corridor Ceiling",
        "ALAE Treatment",
        "Protected Share",
        "Subject Premium",
        "Base Rate",
        "Min Rate for swing",
        "Max Rate for swing",
        "Deposit Premium",
        "Reinstatement Cover %",
        "Reinstatem# Time %",
        "Flat Commission%",
        "Provisional Commission%",
        "Overriding Commission%",
        "Brokerage%",
        "Provisional Loss Ratio",
        "Dev Pattern",
        "LR at Min Commission",
        "LR at Max Commission",
        "Commission at Min",
        "Commission at Max",
        "Profit Commission %",
        "Profit Commission Expense",
    ],
    effective_date: Some("eff_date"),
    status: None,
};
