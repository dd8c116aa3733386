// 🪜 Hierarchy Resolver - first non-missing value wins, in a fixed per-field order
// Priority orders are data (FieldPriority constants), so each one can be audited
// and tested without running a merge.

use crate::error::{PipelineError, Result};
use crate::table::{cell, Row, Table, Value};
use chrono::NaiveDate;

/// Literal fallbacks used when no source supplies a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Group id 0
    ZeroGroupId,
    /// crm_id "M0", the "nothing matched" key; rows carrying it are dropped
    MissingCrmId,
    /// 2200-12-31
    FarFutureEffective,
    /// 2201-12-31
    FarFutureExpiration,
    /// 1990-01-01, so max() over last-updated stamps never sees a gap
    VeryOld,
}

pub const MISSING_CRM_ID: &str = "M0";

impl Sentinel {
    pub fn value(&self) -> Value {
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).map(Value::Date).unwrap_or(Value::Null);
        match self {
            Sentinel::ZeroGroupId => Value::Int(0),
            Sentinel::MissingCrmId => Value::text(MISSING_CRM_ID),
            Sentinel::FarFutureEffective => ymd(2200, 12, 31),
            Sentinel::FarFutureExpiration => ymd(2201, 12, 31),
            Sentinel::VeryOld => NaiveDate::from_ymd_opt(1990, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Column(&'static str),
    Default(Sentinel),
}

/// Ordered candidates for one canonical field
#[derive(Debug, Clone, Copy)]
pub struct FieldPriority {
    pub field: &'static str,
    pub candidates: &'static [Candidate],
}

impl FieldPriority {
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.candidates.iter().filter_map(|c| match c {
            Candidate::Column(name) => Some(*name),
            Candidate::Default(_) => None,
        })
    }

    /// Resolve this field for one row
    pub fn resolve_row(&self, row: &Row) -> Value {
        for candidate in self.candidates {
            match candidate {
                Candidate::Column(name) => {
                    let v = cell(row, name);
                    if v.is_present() {
                        return v.clone();
                    }
                }
                Candidate::Default(sentinel) => return sentinel.value(),
            }
        }
        Value::Null
    }
}

/// First present value among the candidates, in order; Null if none is present.
/// Empty strings and zero count as present.
pub fn resolve(candidates: &[&Value]) -> Value {
    candidates
        .iter()
        .find(|v| v.is_present())
        .map(|v| (*v).clone())
        .unwrap_or(Value::Null)
}

/// Write the resolved field as a new column. Every candidate column must exist.
pub fn resolve_into(table: &mut Table, priority: &FieldPriority) -> Result<()> {
    if let Some(missing) = priority.columns().find(|c| !table.has_column(c)) {
        return Err(PipelineError::missing_column(missing));
    }
    table.with_column(priority.field, |row| priority.resolve_row(row));
    Ok(())
}

pub fn resolve_all(table: &mut Table, priorities: &[FieldPriority]) -> Result<()> {
    for p in priorities {
        resolve_into(table, p)?;
    }
    Ok(())
}
