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

use crate::data_handler::common::parse_temporal;
use crate::data_handler::{Column, ColumnData, Result, Table, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "eq")]
    Equals,
    #[serde(rename = "in")]
    MemberOf,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "between")]
    Between,
}

impl FilterOperator {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "eq" => Some(Self::Equals),
            "in" => Some(Self::MemberOf),
            "contains" => Some(Self::Contains),
            "between" => Some(Self::Between),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Equals => "eq",
            Self::MemberOf => "in",
            Self::Contains => "contains",
            Self::Between => "between",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single JSON-like operand value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Text(n.to_string())),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether a cell holds this value. Numbers compare across integer and
    /// float, temporal cells match text that parses to the same instant,
    /// and a null cell matches nothing but a null operand.
    pub fn matches(&self, cell: &Value) -> bool {
        match (cell, self) {
            (Value::Null, Self::Null) => true,
            (Value::Null, _) | (_, Self::Null) => false,
            (Value::Int64(a), Self::Int(b)) => a == b,
            (Value::Int64(_) | Value::Float64(_), Self::Int(_) | Self::Float(_)) => {
                cell.as_f64() == self.as_number()
            }
            (Value::String(a), Self::Text(b)) => a.as_ref() == b,
            (Value::Boolean(a), Self::Boolean(b)) => a == b,
            (Value::Temporal(ts), Self::Text(b)) => parse_temporal(b).as_ref() == Some(ts),
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Boolean(true) => f.write_str("True"),
            Self::Boolean(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl Default for Operand {
    fn default() -> Self {
        Self::Scalar(Scalar::Null)
    }
}

impl Operand {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => Self::List(items.iter().map(Scalar::from_json).collect()),
            other => Self::Scalar(Scalar::from_json(other)),
        }
    }

    pub fn members(&self) -> Vec<Scalar> {
        match self {
            Self::List(items) => items.clone(),
            Self::Scalar(s) => vec![s.clone()],
        }
    }

    /// `[low, high]` when the operand is exactly two numbers.
    pub fn numeric_pair(&self) -> Option<(f64, f64)> {
        match self {
            Self::List(items) => match items.as_slice() {
                [low, high] => Some((low.as_number()?, high.as_number()?)),
                _ => None,
            },
            Self::Scalar(_) => None,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_string(),
            Self::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Scalar::Text(s) => format!("'{s}'"),
                        other => other.to_string(),
                    })
                    .collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    #[serde(rename = "op")]
    pub operator: FilterOperator,
    #[serde(rename = "value", default)]
    pub operand: Operand,
}

impl FilterPredicate {
    pub fn new(column: impl Into<String>, operator: FilterOperator, operand: Operand) -> Self {
        Self {
            column: column.into(),
            operator,
            operand,
        }
    }

    /// Multiselect-style slice: keep rows whose `column` is one of `values`.
    pub fn member_of<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Self::new(
            column,
            FilterOperator::MemberOf,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn between(column: impl Into<String>, low: f64, high: f64) -> Self {
        Self::new(
            column,
            FilterOperator::Between,
            Operand::List(vec![Scalar::Float(low), Scalar::Float(high)]),
        )
    }
}

#[derive(Debug)]
enum CompiledPredicate<'a> {
    Equals(&'a Column, Scalar),
    MemberOf(&'a Column, Vec<Scalar>),
    Contains(&'a Column, String),
    Between(&'a Column, f64, f64),
}

impl CompiledPredicate<'_> {
    fn evaluate(&self, index: usize) -> bool {
        match self {
            CompiledPredicate::Equals(column, target) => target.matches(&column.get_value(index)),
            CompiledPredicate::MemberOf(column, members) => {
                let cell = column.get_value(index);
                members.iter().any(|m| m.matches(&cell))
            }
            CompiledPredicate::Contains(column, needle) => column
                .get_string(index)
                .is_some_and(|text| text.to_lowercase().contains(needle.as_str())),
            CompiledPredicate::Between(column, low, high) => column
                .to_f64(index)
                .is_some_and(|v| *low <= v && v <= *high),
        }
    }
}

pub struct FilterEngine {
    parallel_threshold: usize,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self {
            parallel_threshold: 10000,
        }
    }
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Keeps the rows satisfying every applicable predicate. Predicates that
    /// cannot apply to this table are skipped rather than failing.
    pub fn apply(&self, table: &Table, predicates: &[FilterPredicate]) -> Result<Table> {
        let compiled: Vec<CompiledPredicate<'_>> = predicates
            .iter()
            .filter_map(|predicate| Self::compile(table, predicate))
            .collect();
        if compiled.is_empty() {
            return Ok(table.clone());
        }
        let keep = |i: usize| compiled.iter().all(|p| p.evaluate(i));
        if table.row_count() > self.parallel_threshold {
            table.filter(keep)
        } else {
            let indices: Vec<usize> = (0..table.row_count()).filter(|&i| keep(i)).collect();
            table.select_rows(&indices)
        }
    }

    fn compile<'a>(table: &'a Table, predicate: &FilterPredicate) -> Option<CompiledPredicate<'a>> {
        let Some(column) = table.column(&predicate.column) else {
            debug!(column = %predicate.column, "Skipping filter on unknown column");
            return None;
        };
        match (predicate.operator, &predicate.operand) {
            (FilterOperator::Equals, Operand::Scalar(target)) => {
                Some(CompiledPredicate::Equals(column, target.clone()))
            }
            (FilterOperator::Equals, Operand::List(_)) => {
                debug!(column = %predicate.column, "Skipping equality filter with a list operand");
                None
            }
            (FilterOperator::MemberOf, operand) => {
                Some(CompiledPredicate::MemberOf(column, operand.members()))
            }
            (FilterOperator::Contains, operand) => Some(CompiledPredicate::Contains(
                column,
                operand.text().to_lowercase(),
            )),
            (FilterOperator::Between, operand) => {
                if !column.data_type().is_numeric() {
                    debug!(column = %predicate.column, "Skipping range filter on non-numeric column");
                    return None;
                }
                match operand.numeric_pair() {
                    Some((low, high)) => Some(CompiledPredicate::Between(column, low, high)),
                    None => {
                        debug!(
                            column = %predicate.column,
                            operand = %operand.text(),
                            "Skipping range filter without a two-number operand"
                        );
                        None
                    }
                }
            }
        }
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market() -> Table {
        Table::from_rows(
            "market",
            &["Industry", "Manufacturer", "Age", "Date"],
            vec![
                vec!["Water".into(), "Hach".into(), Value::Int64(2), "2025-01-05".into()],
                vec!["Energy".into(), "YSI".into(), Value::Int64(4), "2025-02-01".into()],
                vec!["Water".into(), Value::Null, Value::Int64(6), Value::Null],
                vec!["Food".into(), "hach lange".into(), Value::Null, "2025-01-05".into()],
            ],
        )
        .and_then(|t| {
            let dates = t.require("Date")?.to_temporal_lossy();
            t.with_column("Date", dates)
        })
        .unwrap()
    }

    fn predicate(value: serde_json::Value) -> FilterPredicate {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn operands_deserialise_from_model_json() {
        let p = predicate(json!({"column": "Age", "op": "between", "value": [3, 5.5]}));
        assert_eq!(p.operator, FilterOperator::Between);
        assert_eq!(p.operand.numeric_pair(), Some((3.0, 5.5)));
        let p = predicate(json!({"column": "Industry", "op": "eq"}));
        assert_eq!(p.operand, Operand::Scalar(Scalar::Null));
    }

    #[test]
    fn equality_is_type_sensitive() {
        let engine = FilterEngine::new();
        let table = market();
        let by_text = engine
            .apply(&table, &[predicate(json!({"column": "Age", "op": "eq", "value": "4"}))])
            .unwrap();
        assert_eq!(by_text.row_count(), 0);
        let by_float = engine
            .apply(&table, &[predicate(json!({"column": "Age", "op": "eq", "value": 4.0}))])
            .unwrap();
        assert_eq!(by_float.row_count(), 1);
        let by_date = engine
            .apply(&table, &[predicate(json!({"column": "Date", "op": "eq", "value": "2025-01-05"}))])
            .unwrap();
        assert_eq!(by_date.row_count(), 2);
    }

    #[test]
    fn membership_accepts_scalars_and_null_members() {
        let engine = FilterEngine::new();
        let table = market();
        let single = engine
            .apply(&table, &[predicate(json!({"column": "Industry", "op": "in", "value": "Water"}))])
            .unwrap();
        assert_eq!(single.row_count(), 2);
        let with_null = engine
            .apply(
                &table,
                &[FilterPredicate::new(
                    "Manufacturer",
                    FilterOperator::MemberOf,
                    Operand::List(vec![Scalar::Null, "YSI".into()]),
                )],
            )
            .unwrap();
        assert_eq!(with_null.row_count(), 2);
    }

    #[test]
    fn contains_ignores_case_and_nulls() {
        let table = FilterEngine::new()
            .apply(&market(), &[predicate(json!({"column": "Manufacturer", "op": "contains", "value": "HACH"}))])
            .unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn malformed_ranges_are_skipped() {
        let engine = FilterEngine::new();
        let table = market();
        let skipped = engine
            .apply(&table, &[predicate(json!({"column": "Age", "op": "between", "value": [3]}))])
            .unwrap();
        assert_eq!(skipped.row_count(), 4);
        let text_column = engine
            .apply(&table, &[FilterPredicate::between("Industry", 0.0, 1.0)])
            .unwrap();
        assert_eq!(text_column.row_count(), 4);
        let ranged = engine
            .apply(&table, &[FilterPredicate::between("Age", 3.0, 6.0)])
            .unwrap();
        assert_eq!(ranged.row_count(), 2);
    }

    #[test]
    fn predicates_combine_with_and_in_parallel_too() {
        let engine = FilterEngine::new().with_parallel_threshold(0);
        let table = engine
            .apply(
                &market(),
                &[
                    FilterPredicate::member_of("Industry", ["Water"]),
                    FilterPredicate::between("Age", 0.0, 3.0),
                    FilterPredicate::member_of("Missing", ["x"]),
                ],
            )
            .unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.value("Manufacturer", 0), Some(Value::from("Hach")));
    }

    #[test]
    fn list_operands_render_as_text() {
        let operand = Operand::from_json(&json!(["a", 1, null]));
        assert_eq!(operand.text(), "['a', 1, None]");
    }
}
