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

use crate::data_handler::{
    Column, ColumnData, DataHandlerError, DataType, Result, Table, Value,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Name of the row-count column, and the sentinel `y` meaning "count rows".
pub const COUNT_COLUMN: &str = "Count";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueAxis {
    Count,
    Column(String),
}

impl ValueAxis {
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count)
    }
    pub fn name(&self) -> &str {
        match self {
            Self::Count => COUNT_COLUMN,
            Self::Column(name) => name,
        }
    }
}

impl From<String> for ValueAxis {
    fn from(value: String) -> Self {
        if value == COUNT_COLUMN {
            Self::Count
        } else {
            Self::Column(value)
        }
    }
}

impl From<&str> for ValueAxis {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ValueAxis> for String {
    fn from(value: ValueAxis) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for ValueAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl Reducer {
    /// Case-insensitive; anything unrecognised counts rows.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "max" => Self::Max,
            "min" => Self::Min,
            _ => Self::Count,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// Ordered tuple of grouping cells; nulls sort after every value.
#[derive(Debug, Clone)]
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for GroupKey {}
impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub table: Table,
    pub value_column: String,
}

pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Groups by `x` then `color` (either may be absent) and reduces the
    /// value axis per group. Null keys form their own group and groups come
    /// out in ascending key order.
    pub fn aggregate(
        &self,
        table: &Table,
        x: Option<&str>,
        color: Option<&str>,
        value: &ValueAxis,
        reducer: Reducer,
    ) -> Result<AggregateOutput> {
        let mut group_names: Vec<&str> = Vec::with_capacity(2);
        for name in [x, color].into_iter().flatten() {
            if !group_names.contains(&name) {
                group_names.push(name);
            }
        }
        let group_columns = group_names
            .iter()
            .map(|name| table.require(name))
            .collect::<Result<Vec<_>>>()?;

        let (measure, reducer) = match value {
            ValueAxis::Column(name) if reducer != Reducer::Count => {
                (Some((name.as_str(), table.require(name)?)), reducer)
            }
            _ => (None, Reducer::Count),
        };
        let value_column = value_column_name(
            measure.map_or(COUNT_COLUMN, |(name, _)| name),
            reducer,
            &group_names,
        );

        let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
        for row in 0..table.row_count() {
            let key = GroupKey(group_columns.iter().map(|c| c.get_value(row)).collect());
            groups.entry(key).or_default().push(row);
        }
        let groups: Vec<(GroupKey, Vec<usize>)> = groups.into_iter().collect();

        let reduced = groups
            .par_iter()
            .map(|(_, rows)| match measure {
                Some((name, column)) => reduce(name, column, rows, reducer),
                None => Ok(Value::Int64(rows.len() as i64)),
            })
            .collect::<Result<Vec<Value>>>()?;

        let mut output = Vec::with_capacity(group_names.len() + 1);
        for (position, (name, source)) in group_names.iter().zip(&group_columns).enumerate() {
            let keys: Vec<Value> = groups.iter().map(|(key, _)| key.0[position].clone()).collect();
            output.push((name.to_string(), Column::from_values(&keys, source.data_type())?));
        }
        let value_type = match measure {
            None => DataType::Int64,
            Some((_, column)) => result_type(column.data_type(), reducer),
        };
        output.push((value_column.clone(), Column::from_values(&reduced, value_type)?));

        let table = Table::from_columns(format!("{}_grouped", table.metadata.name), output)?;
        Ok(AggregateOutput {
            table,
            value_column,
        })
    }
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The measure's own name, or `<name>_<reducer>` (`Count_rows` for counts)
/// when that would collide with a grouping column.
fn value_column_name(base: &str, reducer: Reducer, group_names: &[&str]) -> String {
    if !group_names.contains(&base) {
        return base.to_string();
    }
    let suffix = match reducer {
        Reducer::Count => "rows",
        other => other.label(),
    };
    let mut candidate = format!("{base}_{suffix}");
    while group_names.contains(&candidate.as_str()) {
        candidate.push('_');
    }
    debug!(column = base, renamed = %candidate, "Value column clashes with a grouping column");
    candidate
}

fn result_type(source: DataType, reducer: Reducer) -> DataType {
    match reducer {
        Reducer::Count => DataType::Int64,
        Reducer::Avg => DataType::Float64,
        Reducer::Sum if matches!(source, DataType::Int64 | DataType::Boolean) => DataType::Int64,
        Reducer::Sum => DataType::Float64,
        Reducer::Max | Reducer::Min => source,
    }
}

fn reduce(name: &str, column: &Column, rows: &[usize], reducer: Reducer) -> Result<Value> {
    let data_type = column.data_type();
    let numeric_only = || {
        if matches!(data_type, DataType::String | DataType::Temporal) {
            Err(DataHandlerError::TypeMismatch(format!(
                "Cannot {} non-numeric column '{name}'",
                reducer.label()
            )))
        } else {
            Ok(())
        }
    };
    match reducer {
        Reducer::Count => Ok(Value::Int64(rows.len() as i64)),
        Reducer::Sum => {
            numeric_only()?;
            if data_type == DataType::Float64 {
                let cells: Vec<f64> = rows.iter().filter_map(|&r| column.to_f64(r)).collect();
                return Ok(if cells.is_empty() {
                    Value::Null
                } else {
                    Value::Float64(cells.iter().sum())
                });
            }
            let cells: Vec<i128> = rows
                .iter()
                .filter_map(|&r| match column.get_value(r) {
                    Value::Int64(v) => Some(i128::from(v)),
                    Value::Boolean(b) => Some(i128::from(b)),
                    _ => None,
                })
                .collect();
            if cells.is_empty() {
                return Ok(Value::Null);
            }
            let total: i128 = cells.iter().sum();
            i64::try_from(total).map(Value::Int64).map_err(|_| {
                DataHandlerError::InvalidOperation(format!("Sum of '{name}' overflows"))
            })
        }
        Reducer::Avg => {
            numeric_only()?;
            let cells: Vec<f64> = rows.iter().filter_map(|&r| column.to_f64(r)).collect();
            Ok(if cells.is_empty() {
                Value::Null
            } else {
                Value::Float64(cells.iter().sum::<f64>() / cells.len() as f64)
            })
        }
        Reducer::Max | Reducer::Min => {
            let cells = rows.iter().map(|&r| column.get_value(r)).filter(|v| !v.is_null());
            let picked = if reducer == Reducer::Max {
                cells.max_by(Value::total_cmp)
            } else {
                cells.min_by(Value::total_cmp)
            };
            Ok(picked.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::from_rows(
            "sales",
            &["Industry", "Age", "Units", "Price"],
            vec![
                vec!["Water".into(), "3-5".into(), Value::Int64(2), Value::Float64(1.5)],
                vec!["Water".into(), "5+".into(), Value::Int64(4), Value::Null],
                vec!["Energy".into(), "3-5".into(), Value::Null, Value::Float64(2.0)],
                vec![Value::Null, "3-5".into(), Value::Int64(1), Value::Float64(4.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn counts_rows_with_null_keys_last() {
        let out = AggregationEngine::new()
            .aggregate(&sales(), Some("Industry"), None, &ValueAxis::Count, Reducer::Count)
            .unwrap();
        assert_eq!(out.value_column, "Count");
        let t = out.table;
        assert_eq!(t.column_names(), ["Industry", "Count"]);
        assert_eq!(t.value("Industry", 0), Some(Value::from("Energy")));
        assert_eq!(t.value("Industry", 2), Some(Value::Null));
        assert_eq!(t.value("Count", 1), Some(Value::Int64(2)));
    }

    #[test]
    fn count_reducer_overrides_named_measure() {
        let out = AggregationEngine::new()
            .aggregate(&sales(), Some("Industry"), None, &"Units".into(), Reducer::Count)
            .unwrap();
        assert_eq!(out.value_column, "Count");
    }

    #[test]
    fn sum_keeps_integers_and_nulls_empty_groups() {
        let out = AggregationEngine::new()
            .aggregate(&sales(), Some("Industry"), None, &"Units".into(), Reducer::Sum)
            .unwrap();
        let t = out.table;
        assert_eq!(t.require("Units").unwrap().data_type(), DataType::Int64);
        assert_eq!(t.value("Units", 0), Some(Value::Null));
        assert_eq!(t.value("Units", 1), Some(Value::Int64(6)));
    }

    #[test]
    fn avg_max_min_over_measure() {
        let engine = AggregationEngine::new();
        let avg = engine
            .aggregate(&sales(), Some("Age"), None, &"Price".into(), Reducer::Avg)
            .unwrap()
            .table;
        assert_eq!(avg.value("Price", 0), Some(Value::Float64(2.5)));
        let max = engine
            .aggregate(&sales(), Some("Age"), None, &"Industry".into(), Reducer::Max)
            .unwrap()
            .table;
        assert_eq!(max.value("Industry", 0), Some(Value::from("Water")));
        let min = engine
            .aggregate(&sales(), None, None, &"Units".into(), Reducer::Min)
            .unwrap()
            .table;
        assert_eq!(min.row_count(), 1);
        assert_eq!(min.value("Units", 0), Some(Value::Int64(1)));
    }

    #[test]
    fn two_axes_and_duplicate_colour() {
        let engine = AggregationEngine::new();
        let both = engine
            .aggregate(&sales(), Some("Industry"), Some("Age"), &ValueAxis::Count, Reducer::Count)
            .unwrap()
            .table;
        assert_eq!(both.column_names(), ["Industry", "Age", "Count"]);
        assert_eq!(both.row_count(), 4);
        let same = engine
            .aggregate(&sales(), Some("Age"), Some("Age"), &ValueAxis::Count, Reducer::Count)
            .unwrap()
            .table;
        assert_eq!(same.column_names(), ["Age", "Count"]);
    }

    #[test]
    fn value_column_clashing_with_an_axis_is_renamed() {
        let engine = AggregationEngine::new();
        let out = engine
            .aggregate(&sales(), Some("Industry"), None, &"Industry".into(), Reducer::Max)
            .unwrap();
        assert_eq!(out.value_column, "Industry_max");
        assert_eq!(out.table.column_names(), ["Industry", "Industry_max"]);
        assert_eq!(out.table.value("Industry_max", 1), Some(Value::from("Water")));

        let tallies = Table::from_rows(
            "tallies",
            &["Count", "Industry"],
            vec![
                vec![Value::Int64(7), "Water".into()],
                vec![Value::Int64(7), "Food".into()],
                vec![Value::Int64(9), "Water".into()],
            ],
        )
        .unwrap();
        let out = engine
            .aggregate(&tallies, Some("Industry"), Some("Count"), &ValueAxis::Count, Reducer::Count)
            .unwrap();
        assert_eq!(out.value_column, "Count_rows");
        assert_eq!(out.table.column_names(), ["Industry", "Count", "Count_rows"]);
        assert_eq!(out.table.value("Count_rows", 1), Some(Value::Int64(1)));
    }

    #[test]
    fn text_measures_cannot_be_summed() {
        let result = AggregationEngine::new().aggregate(
            &sales(),
            Some("Age"),
            None,
            &"Industry".into(),
            Reducer::Avg,
        );
        assert!(matches!(result, Err(DataHandlerError::TypeMismatch(_))));
    }

    #[test]
    fn labels_default_to_count() {
        assert_eq!(Reducer::from_label("AVG"), Reducer::Avg);
        assert_eq!(Reducer::from_label("median"), Reducer::Count);
        assert_eq!(ValueAxis::from("Count"), ValueAxis::Count);
        assert_eq!(
            serde_json::to_string(&ValueAxis::Column("Units".into())).unwrap(),
            "\"Units\""
        );
    }
}
