// 📊 Run Report - what a reconciliation run read, dropped and produced

use crate::normalize::NormalizeStats;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    pub tables: Vec<NormalizeStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,

    /// Run time after flooring; the value written to every output row
    pub run_timestamp: NaiveDateTime,

    pub started_at: DateTime<Utc>,

    pub sources: Vec<SourceStats>,

    pub contract_rows: usize,
    pub layer_rows: usize,
    pub output_rows: usize,

    /// Rows removed per deny rule id, contract and layer stages together
    pub denied: BTreeMap<String, usize>,

    pub reserving_lines: BTreeMap<String, usize>,

    /// Rows moved casualty_pr → wc_cat after the cascade
    pub relabelled: usize,

    /// Content hash of the output, timestamp column excluded
    pub fingerprint: String,
}

impl RunReport {
    pub fn new(run_timestamp: NaiveDateTime) -> Self {
        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_timestamp,
            started_at: Utc::now(),
            sources: Vec::new(),
            contract_rows: 0,
            layer_rows: 0,
            output_rows: 0,
            denied: BTreeMap::new(),
            reserving_lines: BTreeMap::new(),
            relabelled: 0,
            fingerprint: String::new(),
        }
    }

    pub fn add_denied(&mut self, tally: &BTreeMap<String, usize>) {
        for (rule, count) in tally {
            *self.denied.entry(rule.clone()).or_default() += count;
        }
    }

    pub fn total_denied(&self) -> usize {
        self.denied.values().sum()
    }

    /// Multi-line summary for the CLI
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "📊 Run {} @ {}", self.run_id, self.run_timestamp.format("%Y-%m-%d %H:%M"));

        for source in &self.sources {
            for t in &source.tables {
                let _ = writeln!(
                    out,
                    "   {:<10} {:<24} {:>6} raw → {:>6} kept (date -{}, status -{}, unmatched -{})",
                    source.source,
                    t.table,
                    t.raw_rows,
                    t.output_rows,
                    t.dropped_by_date,
                    t.dropped_by_status,
                    t.dropped_unmatched
                );
                if !t.unknown_columns.is_empty() {
                    let _ = writeln!(out, "   ⚠️  unmapped columns: {}", t.unknown_columns.join(", "));
                }
            }
        }

        let _ = writeln!(out, "✓ Contracts: {}", self.contract_rows);
        let _ = writeln!(out, "✓ Layers: {}", self.layer_rows);
        let _ = writeln!(out, "✓ Output rows: {}", self.output_rows);
        if !self.denied.is_empty() {
            let _ = writeln!(out, "🚫 Denied: {}", self.total_denied());
            for (rule, count) in &self.denied {
                let _ = writeln!(out, "   {:<24} {}", rule, count);
            }
        }
        let _ = writeln!(out, "🏷️  Reserving lines:");
        for (line, count) in &self.reserving_lines {
            let _ = writeln!(out, "   {:<24} {}", line, count);
        }
        let _ = write!(out, "🔑 Fingerprint: {}", self.fingerprint);
        out
    }
}
