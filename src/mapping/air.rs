// AIR pricing-model database: `Contract_New` and the `PricingLayerTermsv8-vw` view

use super::{ColumnSpec as C, StatusFilter, TableSpec};
use crate::sources::SourceTag;

pub static CONTRACT: TableSpec = TableSpec {
    source: SourceTag::Air,
    table: "Contract_New",
    suffix: "air",
    version: 1,
    columns: &[
        C::text("ClientName", "client_name"),
        C::text("ClientIDNumber", "client_id_numb"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("Program", "program"),
        C::text("Status", "status"),
        C::text("Region", "region"),
        C::text("Note", "note"),
        C::timestamp("LastUpdated", "last_updated"),
        C::text("UserName", "user_name"),
        C::text("FileLocation", "file_location"),
        C::text("Broker", "broker"),
        C::text("ExecutiveSummary", "executive_summary"),
        C::text("Currency", "currency"),
        C::text("CRMID", "crm_id"),
        C::integer("CRMGroupID", "crm_gp_id"),
    ],
    dropped: &[
        "CRMGroupID2",
        "WPContract",
        "OccLimitContract",
        "AggLimitContract",
        "HasPC",
        "FXRateID",
        "TemplateAltered",
        "TemplateSource",
    ],
    effective_date: Some("eff_date"),
    status: Some(StatusFilter {
        field: "status",
        excluded: &["not bound", "reference", "declined", "wip", "ntu", "started"],
    }),
};

pub static LAYER: TableSpec = TableSpec {
    source: SourceTag::Air,
    table: "PricingLayerTermsv8-vw",
    suffix: "air",
    version: 1,
    columns: &[
        C::text("CRMID", "crm_id"),
        C::integer("CinReID", "cre_id"),
        C::text("Name", "name"),
        C::text("Program", "program"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("Status", "status"),
        C::text("Broker", "broker"),
        C::text("Region", "region"),
        C::text("Currency", "currency"),
        C::text("LayerType", "layer_type"),
        C::number("Rol", "rol"),
        C::number("OccLimit", "occ_limit"),
        C::number("OccRetention", "occ_retention"),
        C::number("Franchise", "franchise"),
        C::number("ReinstatementNumber", "reinstatement_numb"),
        C::number("ReinstatementRate", "reinstatement_rate"),
        C::text("ReinstatementStr", "reinstatement_str"),
        C::number("AggLimit", "agg_limit"),
        C::number("AggRetention", "agg_retention"),
        C::number("Participation", "participation"),
        C::text("Components", "components"),
        C::number("SharesPriced", "shares_priced"),
        C::number("SharesAuthorized", "shares_authorized"),
        C::number("SharesSigned", "shares_signed"),
        C::number("Brokerage", "brokerage"),
        C::number("RpBrokerage", "rp_brokerage"),
        C::number("LayerId", "layer_id"),
        C::number("RppRefRol", "rpp_ref_rol"),
        C::text("Comments", "comments"),
        C::text("PricingRegistry", "pricing_registry"),
        C::integer("CinReGroupID", "cre_gp_id"),
        C::text("Lc_AppliesAgg", "lc_applies_agg"),
        C::number("Lc_RatioToAgg", "lc_ratio_to_agg"),
    ],
    dropped: &[],
    effective_date: Some("eff_date"),
    status: None,
};
