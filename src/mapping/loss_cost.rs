// Loss-cost pricing database: `Contract` and `LayerTerms`

use super::{ColumnSpec as C, StatusFilter, TableSpec};
use crate::sources::SourceTag;

pub static CONTRACT: TableSpec = TableSpec {
    source: SourceTag::LossCost,
    table: "Contract",
    suffix: "lc",
    version: 1,
    columns: &[
        C::integer("CrmGroupID", "crm_gp_id"),
        C::text("Account", "account"),
        C::text("MgtRptLine", "mrl"),
        C::text("Description", "account_desc"),
        C::text("Program", "program"),
        C::date("Inception", "eff_date"),
        C::date("Expiration", "exp_date"),
        C::text("TreatyBasis", "treaty_basis"),
        C::text("AlaeBasis", "alae_basis"),
        C::date("LossEvalDate", "loss_eval_date"),
        C::text("Status", "status"),
        C::text("CatModelVersion", "cat_model_version"),
        C::text("Note", "note"),
        C::text("UserID", "user_id"),
        C::timestamp("LastUpdated", "last_updated"),
        C::text("Region", "region"),
        C::text("Currency", "currency"),
        C::text("SourceFile", "source_file"),
    ],
    dropped: &[],
    effective_date: Some("eff_date"),
    status: Some(StatusFilter {
        field: "status",
        excluded: &["declined", "decline", "wip", "ntu"],
    }),
};

pub static LAYER_TERMS: TableSpec = TableSpec {
    source: SourceTag::LossCost,
    table: "LayerTerms",
    suffix: "lc",
    version: 1,
    columns: &[
        C::integer("CrmGroupID", "crm_gp_id"),
        C::text("CrmID", "crm_id"),
        C::number("Layer", "layer"),
        C::number("SubjectPremium", "subject_premium"),
        C::number("RiskLimit", "risk_limit"),
        C::number("RiskRetention", "risk_retention"),
        C::number("OccLimit", "occ_limit"),
        C::text("ReinstStrg", "reinstatement_string"),
        C::number("Aad", "aad"),
        C::number("AggLimit", "agg_limit"),
        C::number("LossCorrStart", "loss_corr_start"),
        C::number("LossCorrStop", "loss_corr_stop"),
        C::number("Brokerage", "brokerage"),
        C::number("RpBrokerage", "rp_brokerage"),
        C::number("Rate", "rate"),
        C::number("SwingMinRate", "swing_min_rate"),
        C::number("SwingMaxRate", "swing_max_rate"),
        C::number("SwingLoad", "swing_load"),
        C::number("UlaeRatio", "ulae_ratio"),
        C::number("ProfitComm", "profit_comm"),
        C::number("MaxPc", "max_pc"),
        C::number("ReinsExpLoad", "reins_exp_load"),
        C::number("Comm", "comm"),
        C::number("SsLrMin", "ss_lr_min"),
        C::number("SsSlide1", "ss_slide1"),
        C::number("SsLrMid", "ss_lr_mid"),
        C::number("SsSlide2", "ss_slide2"),
        C::number("SsLrMax", "ss_lr_max"),
        C::number("ReinsPremium100", "reins_premium_100"),
        C::number("NonCatAvgLossAlae", "non_cat_ave_loss_alae"),
        C::number("MdlCatAvgLossAlae", "mdl_cat_ave_loss_alae"),
        C::number("MdlHuEqCatAvgLossAlae", "mdl_hu_eq_cat_ave_loss_alae"),
        C::number("MdlAOCatAvgLossAlae", "mdl_ao_cat_ave_loss_alae"),
        C::number("NmdCatAvgLossAlae", "nmd_cat_ave_loss_alae"),
        C::number("RawNonCatCV", "raw_non_cat_cv"),
        C::number("NonCatParmRisk", "non_cat_param_risk"),
        C::number("NonCatCV", "non_cat_cv"),
        C::number("RawNmdCatCV", "raw_nmd_cat_cv"),
        C::number("NmdCatParmRisk", "nmd_cat_param_risk"),
        C::number("NmdCatCV", "nmd_cat_cv"),
        C::number("InterestRate", "interest_rate"),
        C::text("Bound", "bound"),
        C::number("AuthorizedShare", "authorized_share"),
        C::number("FotRate", "fot_rate"),
        C::number("QuoteRate", "quote_rate"),
        C::number("SignedShare", "signed_share"),
        C::number("CreProPrem", "cre_pro_prem"),
        C::number("CreDepPrem", "cre_deposit_prem"),
        C::number("CreUltPrem", "cre_ult_prem"),
        C::number("CreCedComm", "cre_ceded_comm"),
        C::number("CreBrokExp", "cre_brok_exp"),
        C::number("CreAoExp", "cre_ao_exp"),
        C::number("CreUw", "cre_uw"),
        C::number("CreNpvUw", "cre_npv_uw"),
        C::text("ClashType", "clash_type"),
        C::text("ClashCoverage", "clash_coverage"),
        C::number("CyberSublimit", "cyber_sublimit"),
        C::text("TerrorCoverage", "terror_coverage"),
        C::number("TerrorSublimit", "terror_sublimit"),
        C::text("CatCoverageType", "cat_coverage_type"),
        C::number("CatExperienceLoad", "cat_experience_load"),
        C::text("CyberCoverage", "cyber_coverage"),
        C::number("Placement", "placement"),
        C::text("EcoXpl", "eco_x_pl"),
        C::text("DJ", "dj"),
        C::number("TrapValExpLim", "trap_val_exp_lim"),
        C::number("MarginalTvar50", "marginal_tvar_50"),
        C::number("MarginalTvar250", "marginal_tvar_250"),
        C::number("LayerMinCapital", "layer_min_capital"),
        C::text("CurrencyByLayer", "currency_by_layer"),
        C::number("TotCasAggLim", "tot_cas_agg_lim"),
        C::text("PricingType", "pricing_type"),
        C::number("OccRet", "occ_ret"),
        C::text("GrNetAggRet", "gr_net_agg_ret"),
        C::text("GrNetAggLim", "gr_net_agg_lim"),
        C::number("Maol", "maol"),
    ],
    dropped: &[],
    // Dates come from the contract table
    effective_date: None,
    status: None,
};
