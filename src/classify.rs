// 🏷️ Classification Engine - reserving line and treaty-type indicators per row
// Indicators are membership tests on fixed program lists. The reserving line is an
// ordered decision list: first matching rule wins, `other` when none does.

use crate::table::{cell, Row, Table, Value};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

// ============================================================================
// PROGRAM LISTS
// ============================================================================

pub const XOL_PROGRAMS: &[&str] = &[
    "Aggregate XOL",
    "Per Claim XOL",
    "Per Occurence XOL",
    "Per Occurrence Cat XOL",
    "Per Occurrence XOL",
    "Per Policy XOL",
    "Per Risk XOL",
    "Risk Aggregate XOL",
];

// Upstream carries both spellings, one with a trailing space
pub const QS_PROGRAMS: &[&str] = &["Cat Quota Share", "Pro Rata/Quota Share", "Pro-Rata/Quota Share "];

pub const VAR_QS_PROGRAMS: &[&str] = &["Variable Quota Share"];

pub const CAT_PROGRAMS: &[&str] = &[
    "Cat Quota Share",
    "Per Occurrence Cat XOL",
    "Aggregate CAT XOL - Occurrence Exposed",
    "Aggregate Cat XOL",
    "MY Per Occurrence Cat XOL",
    "Per Occurrence Cat XOL Multiyear",
    "Per Occurrence Cat XOL Annual",
];

pub const PER_RISK_PROGRAMS: &[&str] = &["Risk Aggregate XOL", "Per Risk XOL"];

pub const AGG_XOL_PROGRAMS: &[&str] = &[
    "Aggregate XOL",
    "Risk Aggregate XOL",
    "Aggregate CAT XOL - Occurrence Exposed",
    "Aggregate Cat XOL",
    "Aggregate XOL (Occurrence Exposed)",
];

pub const SURPLUS_PROGRAMS: &[&str] = &["Surplus Share"];

/// Program re-labelled from casualty_pr to wc_cat after the cascade
pub const WC_CAT_PROGRAM: &str = "Per Occurrence Cat XOL";

/// Specialty deals this long or longer are credit-risk transfer
pub const CIRT_MIN_TERM_MONTHS: i64 = 90;

// ============================================================================
// FACTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Casualty,
    Property,
    Specialty,
}

impl Line {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Casualty" => Some(Line::Casualty),
            "Property" => Some(Line::Property),
            "Specialty" => Some(Line::Specialty),
            _ => None,
        }
    }
}

/// Inclusive month count between two dates
pub fn contract_term(eff: NaiveDate, exp: NaiveDate) -> i64 {
    let months = |d: NaiveDate| d.year() as i64 * 12 + d.month() as i64;
    months(exp) - months(eff) + 1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Indicators {
    pub xol: bool,
    pub qs: bool,
    pub var_qs: bool,
    pub cat: bool,
    pub ppr: bool,
    pub agg_xol: bool,
    pub surplus_share: bool,
    pub trans: bool,
    pub clash: bool,
}

impl Indicators {
    /// `placement` below 100% marks a share of the deal, counted as quota share
    pub fn compute(line: Option<Line>, program: &str, contract_name: Option<&str>, placement: Option<f64>) -> Self {
        Indicators {
            xol: XOL_PROGRAMS.contains(&program),
            qs: QS_PROGRAMS.contains(&program) || placement.map(|p| p < 1.0).unwrap_or(false),
            var_qs: VAR_QS_PROGRAMS.contains(&program),
            cat: CAT_PROGRAMS.contains(&program),
            ppr: line == Some(Line::Property) && PER_RISK_PROGRAMS.contains(&program),
            agg_xol: AGG_XOL_PROGRAMS.contains(&program),
            surplus_share: SURPLUS_PROGRAMS.contains(&program),
            trans: contract_name
                .map(|n| n.to_lowercase().contains("transaction"))
                .unwrap_or(false),
            clash: line == Some(Line::Casualty) && program.to_lowercase() == "clash",
        }
    }

    /// Output column name and value, in output order
    pub fn columns(&self) -> [(&'static str, bool); 9] {
        [
            ("xol_ind", self.xol),
            ("qs_ind", self.qs),
            ("cat_ind", self.cat),
            ("ppr_ind", self.ppr),
            ("agg_xol_ind", self.agg_xol),
            ("trans_ind", self.trans),
            ("clash_ind", self.clash),
            ("surplus_share_ind", self.surplus_share),
            ("var_qs_ind", self.var_qs),
        ]
    }

    pub fn descr_type(&self) -> &'static str {
        DESCR_TYPES
            .iter()
            .find(|(applies, _)| applies(self))
            .map(|(_, label)| *label)
            .unwrap_or("other")
    }
}

type DescrRule = (fn(&Indicators) -> bool, &'static str);

const DESCR_TYPES: &[DescrRule] = &[
    (|i| i.xol, "XOL"),
    (|i| i.agg_xol, "AGG XOL"),
    (|i| i.surplus_share, "Surplus Share"),
    (|i| i.qs, "Quota Share"),
    (|i| i.var_qs, "Variable QS"),
];

/// Everything the cascade looks at for one row
#[derive(Debug, Clone, PartialEq)]
pub struct Facts {
    pub line: Option<Line>,
    pub program: String,
    pub has_contract_name: bool,
    pub term: Option<i64>,
    pub ind: Indicators,
}

impl Facts {
    pub fn from_row(row: &Row) -> Self {
        let line = cell(row, "line").as_str().and_then(Line::parse);
        let program = cell(row, "program").as_str().unwrap_or("").to_string();
        let name = cell(row, "contract_name");
        let term = match (cell(row, "eff_date").as_date(), cell(row, "exp_date").as_date()) {
            (Some(eff), Some(exp)) => Some(contract_term(eff, exp)),
            _ => None,
        };
        let ind = Indicators::compute(line, &program, name.as_str(), cell(row, "placement_layer").as_f64());

        Facts {
            line,
            program,
            has_contract_name: name.is_present(),
            term,
            ind,
        }
    }

    fn is(&self, line: Line) -> bool {
        self.line == Some(line)
    }
}

// ============================================================================
// CASCADE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservingLine {
    CasualtyNp,
    CasualtyPr,
    PropertyPerRisk,
    PropertyCat,
    Cirt,
    Specialty,
    Transactional,
    OtherPropertyCat,
    OtherPropertyNoncat,
    WcCat,
    Clash,
    Other,
}

impl ReservingLine {
    pub const ALL: [ReservingLine; 12] = [
        ReservingLine::CasualtyNp,
        ReservingLine::CasualtyPr,
        ReservingLine::PropertyPerRisk,
        ReservingLine::PropertyCat,
        ReservingLine::Cirt,
        ReservingLine::Specialty,
        ReservingLine::Transactional,
        ReservingLine::OtherPropertyCat,
        ReservingLine::OtherPropertyNoncat,
        ReservingLine::WcCat,
        ReservingLine::Clash,
        ReservingLine::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReservingLine::CasualtyNp => "casualty_np",
            ReservingLine::CasualtyPr => "casualty_pr",
            ReservingLine::PropertyPerRisk => "property_per_risk",
            ReservingLine::PropertyCat => "property_cat",
            ReservingLine::Cirt => "cirt",
            ReservingLine::Specialty => "specialty",
            ReservingLine::Transactional => "transactional",
            ReservingLine::OtherPropertyCat => "other_property_cat",
            ReservingLine::OtherPropertyNoncat => "other_property_noncat",
            ReservingLine::WcCat => "wc_cat",
            ReservingLine::Clash => "clash",
            ReservingLine::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ReservingLine::ALL.iter().copied().find(|l| l.label() == label)
    }
}

impl fmt::Display for ReservingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub struct Rule {
    pub label: ReservingLine,
    pub applies: fn(&Facts) -> bool,
}

/// Evaluated strictly in order
pub const CASCADE: &[Rule] = &[
    Rule {
        label: ReservingLine::CasualtyNp,
        applies: |f| f.is(Line::Casualty) && f.ind.xol && !f.ind.cat && !f.ind.qs && !f.ind.trans,
    },
    Rule {
        label: ReservingLine::CasualtyPr,
        applies: |f| f.is(Line::Casualty) && f.ind.qs && !f.ind.trans,
    },
    Rule {
        label: ReservingLine::PropertyPerRisk,
        applies: |f| f.is(Line::Property) && f.ind.ppr,
    },
    Rule {
        label: ReservingLine::PropertyCat,
        applies: |f| f.is(Line::Property) && f.ind.cat,
    },
    Rule {
        label: ReservingLine::Cirt,
        applies: |f| f.is(Line::Specialty) && f.term.map(|t| t >= CIRT_MIN_TERM_MONTHS).unwrap_or(false),
    },
    Rule {
        label: ReservingLine::Specialty,
        applies: |f| f.is(Line::Specialty) && f.term.map(|t| t < CIRT_MIN_TERM_MONTHS).unwrap_or(false),
    },
    Rule {
        label: ReservingLine::Transactional,
        applies: |f| f.is(Line::Casualty) && f.ind.trans && f.has_contract_name,
    },
    Rule {
        label: ReservingLine::OtherPropertyCat,
        applies: |f| f.is(Line::Property) && !f.ind.ppr && f.ind.cat,
    },
    Rule {
        label: ReservingLine::OtherPropertyNoncat,
        applies: |f| f.is(Line::Property) && !f.ind.ppr && !f.ind.cat,
    },
    Rule {
        label: ReservingLine::WcCat,
        applies: |f| f.is(Line::Casualty) && f.ind.cat,
    },
    Rule {
        label: ReservingLine::Clash,
        applies: |f| f.ind.clash,
    },
];

pub fn classify(facts: &Facts) -> ReservingLine {
    CASCADE
        .iter()
        .find(|rule| (rule.applies)(facts))
        .map(|rule| rule.label)
        .unwrap_or(ReservingLine::Other)
}

/// Applied after the cascade, on its result
pub fn second_pass(line: ReservingLine, facts: &Facts) -> ReservingLine {
    if line == ReservingLine::CasualtyPr && facts.is(Line::Casualty) && facts.program == WC_CAT_PROGRAM {
        ReservingLine::WcCat
    } else {
        line
    }
}

fn flag(b: bool) -> Value {
    Value::Int(b as i64)
}

/// Add contract_term, the indicator columns, reserving_line (cascade only) and descr_type
pub fn classify_table(t: &mut Table) {
    let facts: Vec<Facts> = t.rows().iter().map(Facts::from_row).collect();

    for column in ["contract_term", "reserving_line", "descr_type"] {
        t.ensure_column(column);
    }
    for (name, _) in Indicators::default().columns() {
        t.ensure_column(name);
    }

    for (row, facts) in t.rows_mut().iter_mut().zip(&facts) {
        row.insert("contract_term".into(), facts.term.map(Value::Int).unwrap_or(Value::Null));
        for (name, set) in facts.ind.columns() {
            row.insert(name.into(), flag(set));
        }
        row.insert("reserving_line".into(), Value::text(classify(facts).label()));
        row.insert("descr_type".into(), Value::text(facts.ind.descr_type()));
    }
}

/// Second pass over an already classified table; returns rows re-labelled
pub fn apply_second_pass(t: &mut Table) -> usize {
    let mut relabelled = 0;
    for row in t.rows_mut() {
        let current = cell(row, "reserving_line").as_str().and_then(ReservingLine::from_label);
        if let Some(current) = current {
            let updated = second_pass(current, &Facts::from_row(row));
            if updated != current {
                row.insert("reserving_line".into(), Value::text(updated.label()));
                relabelled += 1;
            }
        }
    }
    relabelled
}
