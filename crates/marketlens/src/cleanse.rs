// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::data_handler::{Column, ColumnData, Table};
use crate::error::{ConfigError, ConfigResult, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// Value canonicalisation and conditional rewrites, loaded from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleansingPlan {
    #[serde(default)]
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub rules: Vec<ConditionalRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column: String,
    #[serde(default = "enabled")]
    pub case_insensitive: bool,
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOp {
    #[default]
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    InList,
}

impl RuleOp {
    pub fn label(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Regex => "regex",
            Self::InList => "inlist",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub if_col: String,
    #[serde(default)]
    pub op: RuleOp,
    #[serde(default, deserialize_with = "text_value")]
    pub value: String,
    pub set_col: String,
    #[serde(default, deserialize_with = "text_value")]
    pub set_value: String,
    #[serde(default = "enabled")]
    pub case_insensitive: bool,
    #[serde(default = "enabled")]
    pub audit: bool,
}

impl ConditionalRule {
    pub fn description(&self) -> String {
        format!(
            "{}='{}' if {} {} '{}'",
            self.set_col,
            self.set_value,
            self.if_col,
            self.op.label(),
            self.value
        )
    }
}

fn enabled() -> bool {
    true
}

fn text_value<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .map_err(serde::de::Error::custom)?
            .trim()
            .to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub flag_column: Option<String>,
    pub description: String,
    pub matched_rows: usize,
}

#[derive(Debug, Clone)]
pub struct CleansingOutcome {
    pub table: Table,
    /// Cells rewritten per mapped column.
    pub mapped: Vec<(String, usize)>,
    pub rules: Vec<RuleOutcome>,
}

impl CleansingPlan {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFileError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply(&self, table: &Table) -> Result<CleansingOutcome> {
        let mut table = table.clone();
        let mut mapped = Vec::new();
        for mapping in &self.mappings {
            let Some(column) = find_column(&table, &mapping.column) else {
                debug!(column = %mapping.column, "Mapping column not present");
                continue;
            };
            let (rewritten, changed) = apply_mapping(table.require(&column)?, mapping);
            table = table.with_column(&column, rewritten)?;
            mapped.push((column, changed));
        }

        let mut rules = Vec::new();
        let mut rule_index = 1;
        for rule in &self.rules {
            let (Some(if_col), Some(set_col)) =
                (find_column(&table, &rule.if_col), find_column(&table, &rule.set_col))
            else {
                debug!(rule = %rule.description(), "Rule columns not present");
                continue;
            };
            let matcher = RowMatcher::new(rule);
            let condition = table.require(&if_col)?;
            let mask: Vec<bool> = (0..table.row_count())
                .map(|i| matcher.matches(&norm_text(condition.get_string(i).as_deref())))
                .collect();
            let matched_rows = mask.iter().filter(|m| **m).count();

            if rule.audit {
                let old_col = format!("{set_col}__old");
                if !table.schema().contains(&old_col) {
                    let previous = table.require(&set_col)?.clone();
                    table = table.with_column(&old_col, previous)?;
                }
            }

            let target = table.require(&set_col)?;
            let updated = Column::text(mask.iter().enumerate().map(|(i, &hit)| {
                if hit {
                    Some(rule.set_value.clone())
                } else {
                    target.get_string(i)
                }
            }));
            table = table.with_column(&set_col, updated)?;

            let mut flag_column = None;
            if rule.audit {
                let name = format!("__rule_{rule_index:02}");
                let description = rule.description();
                let existing = table.column(&name).cloned();
                let flags = Column::text(mask.iter().enumerate().map(|(i, &hit)| {
                    if hit {
                        Some(description.clone())
                    } else {
                        existing
                            .as_ref()
                            .map_or_else(|| Some(String::new()), |c| c.get_string(i))
                    }
                }));
                table = table.with_column(&name, flags)?;
                flag_column = Some(name);
            }

            info!(rule = %rule.description(), matched_rows, "Applied cleansing rule");
            rules.push(RuleOutcome {
                flag_column,
                description: rule.description(),
                matched_rows,
            });
            rule_index += 1;
        }

        Ok(CleansingOutcome {
            table,
            mapped,
            rules,
        })
    }
}

/// NFKC-normalised, trimmed text; null becomes empty.
pub fn norm_text(value: Option<&str>) -> String {
    value
        .map(|s| s.nfkc().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn find_column(table: &Table, wanted: &str) -> Option<String> {
    let wanted = wanted.to_lowercase();
    table
        .column_names()
        .iter()
        .find(|name| name.to_lowercase() == wanted)
        .cloned()
}

fn apply_mapping(column: &Column, mapping: &ColumnMapping) -> (Column, usize) {
    let canon = |s: &str| {
        let normalised = norm_text(Some(s));
        if mapping.case_insensitive {
            normalised.to_lowercase()
        } else {
            normalised
        }
    };
    let lookup: HashMap<String, &str> = mapping
        .values
        .iter()
        .map(|(from, to)| (canon(from), to.as_str()))
        .collect();
    let mut changed = 0;
    let values: Vec<Option<String>> = (0..column.len())
        .map(|i| {
            let cell = column.get_string(i);
            match cell.as_deref().map(&canon).and_then(|key| lookup.get(&key).copied()) {
                Some(target) => {
                    if cell.as_deref() != Some(target) {
                        changed += 1;
                    }
                    Some(target.to_string())
                }
                None => cell,
            }
        })
        .collect();
    (Column::text(values), changed)
}

struct RowMatcher {
    op: RuleOp,
    needle: String,
    items: Vec<String>,
    pattern: Option<Regex>,
    case_insensitive: bool,
}

impl RowMatcher {
    fn new(rule: &ConditionalRule) -> Self {
        let raw = norm_text(Some(&rule.value));
        let ci = rule.case_insensitive;
        let fold = |s: &str| if ci { s.to_lowercase() } else { s.to_string() };
        let pattern = if rule.op == RuleOp::Regex {
            RegexBuilder::new(&raw)
                .case_insensitive(ci)
                .build()
                .map_err(|e| warn!(pattern = %raw, error = %e, "Invalid rule regex never matches"))
                .ok()
        } else {
            None
        };
        let items = raw
            .split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(&fold)
            .collect();
        Self {
            op: rule.op,
            needle: fold(&raw),
            items,
            pattern,
            case_insensitive: ci,
        }
    }

    fn matches(&self, text: &str) -> bool {
        let subject = if self.case_insensitive {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        match self.op {
            RuleOp::Equals => subject == self.needle,
            RuleOp::Contains => subject.contains(&self.needle),
            RuleOp::StartsWith => subject.starts_with(&self.needle),
            RuleOp::EndsWith => subject.ends_with(&self.needle),
            RuleOp::Regex => self.pattern.as_ref().is_some_and(|p| p.is_match(text)),
            RuleOp::InList => self.items.contains(&subject),
        }
    }
}
