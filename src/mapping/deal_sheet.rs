// Deal-sheet database: `Contract`, `Layer` and the `CRMIDforSAP` lookup

use super::{ColumnSpec as C, TableSpec};
use crate::sources::SourceTag;

pub static CONTRACT: TableSpec = TableSpec {
    source: SourceTag::DealSheet,
    table: "Contract",
    suffix: "ds",
    version: 1,
    columns: &[
        C::integer("CinReId", "crm_gp_id"),
        C::text("CRMID", "crm_id"),
        C::text("ClientName", "client_name"),
        C::text("Reassured", "reassured"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("ContractName", "contract_name"),
        C::text("DominantType", "dominant_type"),
        C::text("MGA", "mga"),
        C::text("Broker", "broker"),
        C::text("BrokerNum", "broker_numb"),
        C::text("TreatyCategory", "treaty_category"),
        C::text("Line", "line"),
        C::number("UltCinRePrem", "ult_cre_prem"),
        C::number("ExpectedLoss", "expected_loss"),
        C::number("ExpenseRatio", "expense_ratio"),
        C::number("TechUWRatio", "tech_uw_ratio"),
        C::number("UWProfit", "uw_profit"),
        C::number("NPVUWProfit", "npv_uw_profit"),
        C::number("ChgRateAdequacy", "chg_rate_adequacy"),
        C::number("ROEChange", "roe_change"),
        C::number("RateChange", "rate_change"),
        C::number("ProgramRateChange", "program_rate_change"),
        C::number("StandaloneTVaR250", "standalone_tvar_250"),
        C::number("StandaloneROC250", "standalone_roc_250"),
        C::number("DiversifiedTVaR250", "diversified_tvar_250"),
        C::number("DiversifiedROC250", "diversified_roc_250"),
        C::number("LossCV", "loss_cv"),
        C::text("Status", "status"),
        C::text("SourceFile", "source_file"),
        C::text("SharePointFile", "share_point_file"),
        C::text("Note", "note"),
        C::timestamp("LastUpdated", "last_updated"),
        C::text("CyberExposure", "cyber_exposure"),
        C::number("CyberAggLimit", "cyber_agg_limit"),
        C::text("Subline", "subline"),
        C::text("CompanyID", "company_id"),
        C::number("DepositPrem", "deposit_prem"),
        C::number("ModelExpectedLoss", "model_expected_loss"),
        C::text("AnnualValues", "annual_values"),
    ],
    dropped: &[],
    effective_date: Some("eff_date"),
    status: None,
};

pub static LAYER: TableSpec = TableSpec {
    source: SourceTag::DealSheet,
    table: "Layer",
    suffix: "ds",
    version: 1,
    columns: &[
        C::integer("CinReId", "crm_gp_id"),
        C::integer("LayerID", "layer_id"),
        C::text("LayerName", "layer_name"),
        C::text("NewRenew", "new_renew"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("SAPTreaty", "sap_treaty"),
        C::number("SAPSection", "sap_section"),
        C::text("ContractType", "contract_type"),
        C::text("DominantType", "dominant_type"),
        C::text("Territory", "terr"),
        C::text("UWArea", "uw_area"),
        C::number("Limit", "limit"),
        C::number("Retention", "retention"),
        C::text("Reinstatements", "reinstatements"),
        C::number("MaxPolicyLimit", "max_policy_limit"),
        C::number("AggLimit", "agg_limit"),
        C::number("AggRetention", "agg_retention"),
        C::text("Currency", "currency"),
        C::text("Trigger", "trigger"),
        C::text("ReportRemit", "report_remit"),
        C::text("ALAE", "alae"),
        C::number("Placement", "placement"),
        C::number("Rate", "rate"),
        C::number("ROL", "rol"),
        C::number("AuthorizedLine", "authorized_line"),
        C::number("SignedLine", "signed_line"),
        C::number("UltCinRePrem", "ult_cre_prem"),
        C::number("ExpectedLoss", "expected_loss"),
        C::number("TechUWRatio", "tech_uw_ratio"),
        C::number("UWProfit", "uw_profit"),
        C::number("NPVUWProfit", "npv_uw_profit"),
        C::number("TVaR250", "tvar_250"),
        C::number("ROE250", "roe_250"),
        C::number("RateChange", "rate_change"),
        C::number("DepositPrem", "deposit_prem"),
        C::text("CyberExposure", "cyber_exposure"),
        C::number("CyberAggLimit", "cyber_agg_limit"),
        C::text("CatDBLayerID", "cat_db_layer_id"),
        C::text("Note", "note"),
        C::number("MinimumPrem", "min_prem"),
        C::text("DepPremSchedule", "dep_prem_schedule"),
        C::number("LossCostDBLayerID", "cinre_lc_layer_id"),
        C::text("PNOC", "pnoc"),
        C::date("OrgInception", "org_eff_date"),
        C::date("OrgExpiration", "org_exp_date"),
        C::number("SubjectPrem", "subject_prem"),
        C::text("SubjectBase", "subject_base"),
        C::number("Brokerage", "brokerage"),
        C::number("RPBrokerage", "rp_brokerage"),
    ],
    dropped: &[],
    effective_date: Some("eff_date"),
    status: None,
};

/// Maps deal-sheet contracts and layer sections onto SAP treaty numbers
pub static SAP_LOOKUP: TableSpec = TableSpec {
    source: SourceTag::DealSheet,
    table: "CRMIDforSAP",
    suffix: "crmidforsap",
    version: 1,
    columns: &[
        C::text("CRMID", "crm_id"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("TreatyCategory", "treaty_category"),
        C::text("SAPTreaty", "sap_treaty"),
        C::number("SAPSection", "sap_section"),
        C::text("Line", "line"),
    ],
    dropped: &["CinReId"],
    effective_date: None,
    status: None,
};
