// 🏷️ Override Rules - business exceptions as data
// Field overrides (pattern on one column → forced value in another) and exact-match
// denylists. New exceptions are added to the table, not to the merge code.

use crate::table::{cell, Row, Table, Value};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// MATCHING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Matcher {
    /// Whole value, case-sensitive
    Exact(String),
    /// Case-insensitive; `*` is a wildcard, no `*` means "contains"
    Pattern(String),
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(expected) => text == expected,
            Matcher::Pattern(pattern) => {
                let pattern = pattern.to_lowercase();
                let text = text.to_lowercase();
                if pattern.contains('*') {
                    wildcard_match(&pattern, &text)
                } else {
                    text.contains(&pattern)
                }
            }
        }
    }
}

/// Anchored glob with `*` only
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;

    if !text.starts_with(parts[0]) {
        return false;
    }
    let mut pos = parts[0].len();

    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last {
            return part.is_empty() || (text.len() - pos >= part.len() && text[pos..].ends_with(part));
        }
        match text[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    true
}

/// A value the merge treats as not filled in
pub fn is_blank(value: &Value) -> bool {
    value.is_missing() || value.is_placeholder()
}

// ============================================================================
// RULE DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Applies {
    Always,
    /// Only when the resolved value is missing, empty, blank or zero
    #[default]
    WhenBlank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    pub id: String,

    /// Canonical field the rule writes
    pub field: String,

    /// Column whose text the matcher inspects
    pub when_field: String,

    pub matcher: Matcher,

    pub value: String,

    #[serde(default)]
    pub applies: Applies,

    /// Higher = tried first
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub description: Option<String>,
}

impl OverrideRule {
    pub fn matches(&self, row: &Row) -> bool {
        cell(row, &self.when_field)
            .as_str()
            .map(|s| self.matcher.matches(s))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Contract,
    Layer,
}

/// Drop rows whose `field` equals `value` exactly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyRule {
    pub id: String,
    pub stage: Stage,
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DenyRule {
    pub fn denies(&self, row: &Row) -> bool {
        cell(row, &self.field).as_str() == Some(self.value.as_str())
    }
}

/// Rows removed per deny rule id
pub type DenyTally = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
    #[serde(default)]
    pub deny: Vec<DenyRule>,
}

// ============================================================================
// OVERRIDE TABLE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    overrides: Vec<OverrideRule>,
    deny: Vec<DenyRule>,
}

fn text_rule(id: &str, field: &str, when_field: &str, matcher: Matcher, value: &str, priority: i32) -> OverrideRule {
    OverrideRule {
        id: id.to_string(),
        field: field.to_string(),
        when_field: when_field.to_string(),
        matcher,
        value: value.to_string(),
        applies: Applies::WhenBlank,
        priority,
        description: None,
    }
}

fn deny_rule(id: &str, stage: Stage, field: &str, value: &str) -> DenyRule {
    DenyRule {
        id: id.to_string(),
        stage,
        field: field.to_string(),
        value: value.to_string(),
        description: None,
    }
}

impl OverrideTable {
    pub fn new() -> Self {
        OverrideTable::default()
    }

    /// The exceptions the business has signed off on
    pub fn builtin() -> Self {
        OverrideTable::from_rules(
            vec![
                text_rule(
                    "per-policy-xol",
                    "program",
                    "contract_name",
                    Matcher::Pattern("Per Policy XOL".into()),
                    "Per Policy XOL",
                    20,
                ),
                text_rule(
                    "wc-cat-xol",
                    "program",
                    "contract_name",
                    Matcher::Pattern("WC Catastrophe Excess of Loss".into()),
                    "Per Occurrence Cat XOL",
                    10,
                ),
                text_rule(
                    "freddie-mac-trigger",
                    "trigger_long",
                    "contract_name",
                    Matcher::Exact("Freddie Mac".into()),
                    "Risks Attaching",
                    0,
                ),
            ],
            vec![
                deny_rule("ceded-retrocession", Stage::Contract, "treaty_category_ds", "Ceded Retrocession"),
                deny_rule("missing-crm-id", Stage::Contract, "crm_id", "M0"),
                deny_rule("essent-layer", Stage::Layer, "layer_name_ds_layer", "Essent"),
            ],
        )
    }

    /// Built-in rules plus the ones in a JSON rule file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let file: RuleFile = serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        let mut table = OverrideTable::builtin();
        for rule in file.overrides {
            table.add_override(rule);
        }
        table.deny.extend(file.deny);
        Ok(table)
    }

    pub fn from_rules(mut overrides: Vec<OverrideRule>, deny: Vec<DenyRule>) -> Self {
        // Stable: equal priorities keep declaration order
        overrides.sort_by(|a, b| b.priority.cmp(&a.priority));
        OverrideTable { overrides, deny }
    }

    pub fn add_override(&mut self, rule: OverrideRule) {
        self.overrides.push(rule);
        self.overrides.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn add_deny(&mut self, rule: DenyRule) {
        self.deny.push(rule);
    }

    /// First rule for `field` whose condition holds on this row
    pub fn override_for(&self, field: &str, row: &Row) -> Option<&OverrideRule> {
        self.overrides.iter().find(|r| r.field == field && r.matches(row))
    }

    /// Apply the overrides for one field across a table; returns rows changed
    pub fn apply(&self, table: &mut Table, field: &str) -> usize {
        table.ensure_column(field);
        let mut changed = 0;
        for row in table.rows_mut() {
            let forced = match self.override_for(field, row) {
                Some(rule) if rule.applies == Applies::Always || is_blank(cell(row, field)) => {
                    Value::text(rule.value.clone())
                }
                _ => continue,
            };
            if cell(row, field) != &forced {
                row.insert(field.to_string(), forced);
                changed += 1;
            }
        }
        if changed > 0 {
            tracing::debug!(field, changed, "override rules applied");
        }
        changed
    }

    /// Remove denied rows for a stage, counting removals per rule
    pub fn retain_allowed(&self, table: &mut Table, stage: Stage) -> DenyTally {
        let mut tally = DenyTally::new();
        for rule in self.deny.iter().filter(|r| r.stage == stage) {
            let removed = table.retain(|row| !rule.denies(row));
            if removed > 0 {
                tracing::debug!(rule = %rule.id, removed, "deny rule applied");
            }
            *tally.entry(rule.id.clone()).or_default() += removed;
        }
        tally
    }

    /// Distinct fields the overrides write, in rule order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for rule in &self.overrides {
            if !fields.contains(&rule.field.as_str()) {
                fields.push(&rule.field);
            }
        }
        fields
    }

    pub fn rule_count(&self) -> usize {
        self.overrides.len() + self.deny.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::row;
    use std::fs;

    #[test]
    fn test_pattern_matching() {
        let contains = Matcher::Pattern("Per Policy XOL".into());
        assert!(contains.matches("Acme 2021 per policy xol"));
        assert!(!contains.matches("Acme Per Risk XOL"));

        let glob = Matcher::Pattern("acme*xol".into());
        assert!(glob.matches("ACME Per Risk XOL"));
        assert!(!glob.matches("Big ACME Per Risk XOL"));

        let tail = Matcher::Pattern("*quota share".into());
        assert!(tail.matches("Cat Quota Share"));
        assert!(!tail.matches("Quota Share 2"));

        let exact = Matcher::Exact("Freddie Mac".into());
        assert!(exact.matches("Freddie Mac"));
        assert!(!exact.matches("freddie mac"));
        assert!(!exact.matches("Freddie Mac II"));

        println!("✅ Override matcher test PASSED");
    }

    #[test]
    fn test_program_override_only_when_blank() {
        let rules = OverrideTable::builtin();
        let mut t = Table::new(["contract_name", "program"]);
        t.push_row(row(&[("contract_name", Value::text("Acme Per Policy XOL 2021"))]));
        t.push_row(row(&[
            ("contract_name", Value::text("Acme Per Policy XOL 2021")),
            ("program", Value::text("Per Risk XOL")),
        ]));
        t.push_row(row(&[
            ("contract_name", Value::text("State WC Catastrophe Excess of Loss")),
            ("program", Value::text("")),
        ]));
        t.push_row(row(&[("contract_name", Value::text("Something else"))]));

        let changed = rules.apply(&mut t, "program");

        assert_eq!(changed, 2);
        assert_eq!(t.value(0, "program"), &Value::text("Per Policy XOL"));
        assert_eq!(t.value(1, "program"), &Value::text("Per Risk XOL"));
        assert_eq!(t.value(2, "program"), &Value::text("Per Occurrence Cat XOL"));
        assert_eq!(t.value(3, "program"), &Value::Null);
    }

    #[test]
    fn test_higher_priority_rule_wins() {
        let rules = OverrideTable::builtin();
        let r = row(&[(
            "contract_name",
            Value::text("Per Policy XOL and WC Catastrophe Excess of Loss"),
        )]);
        let rule = rules.override_for("program", &r).unwrap();
        assert_eq!(rule.id, "per-policy-xol");
    }

    #[test]
    fn test_deny_rules_tally_per_stage() {
        let rules = OverrideTable::builtin();
        let mut contracts = Table::new(["crm_id", "treaty_category_ds"]);
        contracts.push_row(row(&[("crm_id", Value::text("C1"))]));
        contracts.push_row(row(&[("crm_id", Value::text("M0"))]));
        contracts.push_row(row(&[
            ("crm_id", Value::text("C2")),
            ("treaty_category_ds", Value::text("Ceded Retrocession")),
        ]));
        contracts.push_row(row(&[
            ("crm_id", Value::text("C3")),
            ("treaty_category_ds", Value::text("Assumed")),
        ]));

        let tally = rules.retain_allowed(&mut contracts, Stage::Contract);

        assert_eq!(contracts.len(), 2);
        assert_eq!(tally.get("missing-crm-id"), Some(&1));
        assert_eq!(tally.get("ceded-retrocession"), Some(&1));
        assert!(!tally.contains_key("essent-layer"));
    }

    #[test]
    fn test_rules_file_extends_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"{
                "overrides": [{
                    "id": "acme-broker",
                    "field": "broker",
                    "when_field": "client_name",
                    "matcher": {"kind": "pattern", "text": "acme*"},
                    "value": "Direct",
                    "applies": "always"
                }],
                "deny": [{"id": "test-deal", "stage": "layer", "field": "layer_name_ds_layer", "value": "TEST"}]
            }"#,
        )
        .unwrap();

        let rules = OverrideTable::from_file(&path).unwrap();
        assert_eq!(rules.rule_count(), OverrideTable::builtin().rule_count() + 2);

        let mut t = Table::new(["client_name", "broker"]);
        t.push_row(row(&[("client_name", Value::text("Acme Mutual")), ("broker", Value::text("Aon"))]));
        rules.apply(&mut t, "broker");
        assert_eq!(t.value(0, "broker"), &Value::text("Direct"));
    }

    #[test]
    fn test_bad_rules_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(OverrideTable::from_file(&path).is_err());
    }
}
