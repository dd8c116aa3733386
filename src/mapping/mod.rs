// 🗺️ Column Maps - static raw → semantic rename tables, one module per source
// A schema change upstream is a one-line edit here, testable without running a merge.

pub mod air;
pub mod deal_sheet;
pub mod loss_cost;
pub mod sap;

use crate::sources::SourceTag;
use crate::table::Value;
use chrono::{NaiveDate, NaiveDateTime};

// ============================================================================
// COLUMN KIND
// ============================================================================

/// How a raw cell is read before renaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Kept exactly as the source returned it
    Text,
    /// Floating point amount, ratio or share
    Number,
    /// Whole-number identifier
    Integer,
    /// Calendar date (time part discarded)
    Date,
    /// Date and time
    Timestamp,
}

/// Tokens that upstream exports use for "no value"
const NULL_TOKENS: &[&str] = &["", "NULL", "null", "NaN", "nan", "NA", "N/A", "None", "NaT"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', "").parse::<f64>().ok()
}

impl ColumnKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Number => "number",
            ColumnKind::Integer => "integer",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
        }
    }

    /// Read a raw value as this kind. `None` means the value is unreadable.
    pub fn coerce(&self, raw: &Value) -> Option<Value> {
        if raw.is_missing() {
            return Some(Value::Null);
        }
        if *self == ColumnKind::Text {
            return Some(raw.clone());
        }
        if let Value::Text(s) = raw {
            let t = s.trim();
            if NULL_TOKENS.contains(&t) {
                return Some(Value::Null);
            }
            return match self {
                ColumnKind::Text => Some(raw.clone()),
                ColumnKind::Number => parse_number(t).map(Value::Float),
                ColumnKind::Integer => t
                    .parse::<i64>()
                    .ok()
                    .or_else(|| parse_number(t).filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(Value::Int),
                ColumnKind::Date => parse_timestamp(t).map(|ts| Value::Date(ts.date())),
                ColumnKind::Timestamp => parse_timestamp(t).map(Value::Timestamp),
            };
        }

        match (self, raw) {
            (ColumnKind::Number, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (ColumnKind::Number, Value::Float(f)) => Some(Value::Float(*f)),
            (ColumnKind::Number, Value::Bool(b)) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
            (ColumnKind::Integer, Value::Int(i)) => Some(Value::Int(*i)),
            (ColumnKind::Integer, Value::Float(f)) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
            (ColumnKind::Integer, Value::Bool(b)) => Some(Value::Int(*b as i64)),
            (ColumnKind::Date, Value::Date(d)) => Some(Value::Date(*d)),
            (ColumnKind::Date, Value::Timestamp(ts)) => Some(Value::Date(ts.date())),
            (ColumnKind::Timestamp, Value::Timestamp(ts)) => Some(Value::Timestamp(*ts)),
            (ColumnKind::Timestamp, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::Timestamp),
            _ => None,
        }
    }
}

// ============================================================================
// COLUMN / TABLE SPECS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name in the upstream table
    pub raw: &'static str,
    /// Semantic name, before the source suffix is appended
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn text(raw: &'static str, name: &'static str) -> Self {
        ColumnSpec { raw, name, kind: ColumnKind::Text }
    }

    pub const fn number(raw: &'static str, name: &'static str) -> Self {
        ColumnSpec { raw, name, kind: ColumnKind::Number }
    }

    pub const fn integer(raw: &'static str, name: &'static str) -> Self {
        ColumnSpec { raw, name, kind: ColumnKind::Integer }
    }

    pub const fn date(raw: &'static str, name: &'static str) -> Self {
        ColumnSpec { raw, name, kind: ColumnKind::Date }
    }

    pub const fn timestamp(raw: &'static str, name: &'static str) -> Self {
        ColumnSpec { raw, name, kind: ColumnKind::Timestamp }
    }
}

/// Status values that remove a row, compared case-insensitively
#[derive(Debug, Clone, Copy)]
pub struct StatusFilter {
    /// Semantic name of the status column
    pub field: &'static str,
    pub excluded: &'static [&'static str],
}

impl StatusFilter {
    /// A missing status is never excluded
    pub fn excludes(&self, value: &Value) -> bool {
        value
            .as_str()
            .map(|s| self.excluded.iter().any(|x| s.trim().eq_ignore_ascii_case(x)))
            .unwrap_or(false)
    }
}

/// Full rename table for one upstream table
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub source: SourceTag,
    /// Raw table name as the reader knows it
    pub table: &'static str,
    pub suffix: &'static str,
    /// Bumped whenever the column list changes
    pub version: u32,
    pub columns: &'static [ColumnSpec],
    /// Raw columns that exist upstream but are deliberately not carried
    pub dropped: &'static [&'static str],
    /// Semantic name of the column the minimum-effective-date filter uses
    pub effective_date: Option<&'static str>,
    pub status: Option<StatusFilter>,
}

impl TableSpec {
    pub fn output_name(&self, name: &str) -> String {
        format!("{}_{}", name, self.suffix)
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| self.output_name(c.name)).collect()
    }

    pub fn by_raw(&self, raw: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.raw == raw)
    }

    pub fn is_known(&self, raw: &str) -> bool {
        self.by_raw(raw).is_some() || self.dropped.contains(&raw)
    }
}

/// Every table spec, for schema checks
pub fn all_specs() -> Vec<&'static TableSpec> {
    vec![
        &loss_cost::CONTRACT,
        &loss_cost::LAYER_TERMS,
        &deal_sheet::CONTRACT,
        &deal_sheet::LAYER,
        &deal_sheet::SAP_LOOKUP,
        &sap::TREATY,
        &air::CONTRACT,
        &air::LAYER,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_coerce_dates_in_several_formats() {
        let expected = Value::Date(NaiveDate::from_ymd_opt(2021, 3, 15).unwrap());
        assert_eq!(ColumnKind::Date.coerce(&Value::text("2021-03-15")), Some(expected.clone()));
        assert_eq!(ColumnKind::Date.coerce(&Value::text("03/15/2021")), Some(expected.clone()));
        assert_eq!(
            ColumnKind::Date.coerce(&Value::text("2021-03-15 00:00:00")),
            Some(expected)
        );
        assert_eq!(ColumnKind::Date.coerce(&Value::text("NaT")), Some(Value::Null));
        assert_eq!(ColumnKind::Date.coerce(&Value::text("soon")), None);
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(ColumnKind::Number.coerce(&Value::text("1,250,000")), Some(Value::Float(1_250_000.0)));
        assert_eq!(ColumnKind::Number.coerce(&Value::Int(3)), Some(Value::Float(3.0)));
        assert_eq!(ColumnKind::Integer.coerce(&Value::text("42.0")), Some(Value::Int(42)));
        assert_eq!(ColumnKind::Integer.coerce(&Value::Float(1.5)), None);
        assert_eq!(ColumnKind::Number.coerce(&Value::text("N/A")), Some(Value::Null));
    }

    #[test]
    fn test_text_kind_passes_values_through() {
        assert_eq!(ColumnKind::Text.coerce(&Value::Int(0)), Some(Value::Int(0)));
        assert_eq!(ColumnKind::Text.coerce(&Value::text(" ")), Some(Value::text(" ")));
    }

    #[test]
    fn test_status_filter_is_case_insensitive() {
        let filter = StatusFilter {
            field: "status",
            excluded: &["declined", "not bound"],
        };
        assert!(filter.excludes(&Value::text("DECLINED")));
        assert!(filter.excludes(&Value::text("Not Bound")));
        assert!(!filter.excludes(&Value::text("Bound")));
        assert!(!filter.excludes(&Value::Null));
    }

    #[test]
    fn test_specs_have_unique_names() {
        for spec in all_specs() {
            let raws: HashSet<&str> = spec.columns.iter().map(|c| c.raw).collect();
            assert_eq!(raws.len(), spec.columns.len(), "duplicate raw column in {}", spec.table);

            let names: HashSet<&str> = spec.columns.iter().map(|c| c.name).collect();
            assert_eq!(names.len(), spec.columns.len(), "duplicate semantic name in {}", spec.table);

            for dropped in spec.dropped {
                assert!(spec.by_raw(dropped).is_none(), "{} both mapped and dropped", dropped);
            }

            if let Some(eff) = spec.effective_date {
                assert!(names.contains(eff), "{} has no column {}", spec.table, eff);
            }
            if let Some(status) = spec.status {
                assert!(names.contains(status.field));
            }
        }
    }
}
