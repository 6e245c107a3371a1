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

use crate::data_handler::{ColumnData, DataType, Schema, Table};
use crate::error::{ChartError, Result};
use crate::spec::chart::{ChartKind, ChartSpec};
use crate::spec::raw::{text_field, RawChartSpec};
use crate::transformation::{FilterOperator, FilterPredicate, Operand, Reducer, ValueAxis};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_TITLE: &str = "Chart";

/// Checks a raw request against a schema, repairing what it can. The only
/// rejection is a primary axis that names no column.
pub struct SpecResolver<'a> {
    schema: &'a Schema,
    table: Option<&'a Table>,
}

impl<'a> SpecResolver<'a> {
    /// Name-only checks; column types are unknown.
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            table: None,
        }
    }

    /// Also checks that summed or averaged columns are numeric.
    pub fn for_table(table: &'a Table) -> Self {
        Self {
            schema: table.schema(),
            table: Some(table),
        }
    }

    fn is_non_numeric(&self, column: &str) -> bool {
        self.table
            .and_then(|table| table.column(column))
            .is_some_and(|c| matches!(c.data_type(), DataType::String | DataType::Temporal))
    }

    pub fn resolve(&self, raw: &RawChartSpec) -> Result<ChartSpec> {
        let chart_type = text_field(raw.chart_type.as_ref())
            .map_or(ChartKind::Bar, |label| {
                let kind = ChartKind::from_label(&label);
                if kind.label() != label.trim().to_lowercase() {
                    debug!(requested = %label, "Unsupported chart type, using bar");
                }
                kind
            });

        let x = text_field(raw.x.as_ref());
        if let Some(column) = &x {
            if !self.schema.contains(column) {
                return Err(ChartError::UnknownColumn {
                    column: column.clone(),
                });
            }
        }

        let color = text_field(raw.color.as_ref()).filter(|column| {
            let present = self.schema.contains(column);
            if !present {
                debug!(column = %column, "Dropping unknown colour column");
            }
            present
        });

        let y = match text_field(raw.y.as_ref()).map(ValueAxis::from) {
            None | Some(ValueAxis::Count) => ValueAxis::Count,
            Some(ValueAxis::Column(column)) if self.schema.contains(&column) => {
                ValueAxis::Column(column)
            }
            Some(ValueAxis::Column(column)) => {
                debug!(column = %column, "Unknown value column, counting rows instead");
                ValueAxis::Count
            }
        };

        let agg = if y.is_count() {
            Reducer::Count
        } else {
            text_field(raw.agg.as_ref()).map_or(Reducer::Count, |label| Reducer::from_label(&label))
        };
        let non_numeric = matches!(agg, Reducer::Sum | Reducer::Avg)
            && matches!(&y, ValueAxis::Column(column) if self.is_non_numeric(column));
        let (y, agg) = if non_numeric {
            debug!(column = %y, agg = agg.label(), "Non-numeric value column, counting rows instead");
            (ValueAxis::Count, Reducer::Count)
        } else {
            (y, agg)
        };

        let top_n = raw.top_n.as_ref().and_then(|value| {
            let parsed = value
                .as_u64()
                .filter(|&n| n > 0)
                .and_then(|n| usize::try_from(n).ok());
            if parsed.is_none() && !value.is_null() {
                debug!(top_n = %value, "Ignoring top_n that is not a positive integer");
            }
            parsed
        });

        let filters = raw
            .filters
            .as_ref()
            .map(Self::resolve_filters)
            .unwrap_or_default();

        let title = text_field(raw.title.as_ref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        Ok(ChartSpec {
            chart_type,
            x,
            y,
            color,
            agg,
            top_n,
            filters,
            title,
        })
    }

    fn resolve_filters(value: &Value) -> Vec<FilterPredicate> {
        let Value::Array(entries) = value else {
            if !value.is_null() {
                debug!("Ignoring filters that are not a list");
            }
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let predicate = Self::resolve_filter(entry);
                if predicate.is_none() {
                    debug!(filter = %entry, "Dropping malformed filter");
                }
                predicate
            })
            .collect()
    }

    fn resolve_filter(entry: &Value) -> Option<FilterPredicate> {
        let object = entry.as_object()?;
        let column = object.get("column")?.as_str()?;
        let operator = FilterOperator::from_label(object.get("op")?.as_str()?)?;
        let operand = object
            .get("value")
            .map_or_else(Operand::default, Operand::from_json);
        Some(FilterPredicate::new(column, operator, operand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformation::Scalar;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(["Industry", "Age", "Manufacturer", "Units"]).unwrap()
    }

    fn resolve(value: Value) -> Result<ChartSpec> {
        SpecResolver::new(&schema()).resolve(&RawChartSpec::from_json(value)?)
    }

    #[test]
    fn empty_request_gets_defaults() {
        let spec = resolve(json!({})).unwrap();
        assert_eq!(spec.chart_type(), ChartKind::Bar);
        assert_eq!(spec.x(), None);
        assert!(spec.y().is_count());
        assert_eq!(spec.agg(), Reducer::Count);
        assert_eq!(spec.top_n(), None);
        assert!(spec.filters().is_empty());
        assert_eq!(spec.title(), "Chart");
    }

    #[test]
    fn unknown_primary_axis_is_rejected() {
        let err = resolve(json!({"x": "BogusColumn"})).unwrap_err();
        assert!(matches!(err, ChartError::UnknownColumn { column } if column == "BogusColumn"));
    }

    #[test]
    fn soft_fields_degrade() {
        let spec = resolve(json!({
            "chart_type": "Donut",
            "x": "Industry",
            "y": "Revenue",
            "color": "NoSuchColumn",
            "agg": "sum",
            "top_n": 2.5,
            "title": "  "
        }))
        .unwrap();
        assert_eq!(spec.chart_type(), ChartKind::Bar);
        assert_eq!(spec.color(), None);
        assert!(spec.y().is_count());
        assert_eq!(spec.agg(), Reducer::Count);
        assert_eq!(spec.top_n(), None);
        assert_eq!(spec.title(), "Chart");
    }

    #[test]
    fn valid_fields_survive() {
        let spec = resolve(json!({
            "chart_type": "PIE",
            "x": "Industry",
            "y": "Units",
            "color": "Age",
            "agg": "AVG",
            "top_n": 5,
            "title": "Units by industry"
        }))
        .unwrap();
        assert_eq!(spec.chart_type(), ChartKind::Pie);
        assert_eq!(spec.y(), &ValueAxis::Column("Units".into()));
        assert_eq!(spec.color(), Some("Age"));
        assert_eq!(spec.agg(), Reducer::Avg);
        assert_eq!(spec.top_n(), Some(5));
    }

    #[test]
    fn malformed_filters_are_dropped() {
        let spec = resolve(json!({
            "filters": [
                {"column": "Industry", "op": "eq", "value": "Water"},
                {"column": "Industry", "op": "startswith", "value": "W"},
                {"op": "in", "value": ["a"]},
                "Industry = Water",
                {"column": "Age", "op": "BETWEEN", "value": [3, 5]}
            ]
        }))
        .unwrap();
        assert_eq!(spec.filters().len(), 2);
        assert_eq!(
            spec.filters()[0].operand,
            Operand::Scalar(Scalar::Text("Water".into()))
        );
        assert_eq!(spec.filters()[1].operator, FilterOperator::Between);
        assert!(resolve(json!({"filters": "Industry"})).unwrap().filters().is_empty());
    }

    #[test]
    fn summing_text_counts_rows_instead() {
        let table = Table::from_rows(
            "market",
            &["Industry", "Manufacturer", "Units"],
            vec![vec!["Water".into(), "Hach".into(), crate::data_handler::Value::Int64(2)]],
        )
        .unwrap();
        let resolver = SpecResolver::for_table(&table);
        for agg in ["sum", "avg"] {
            let raw =
                RawChartSpec::from_json(json!({"x": "Industry", "y": "Manufacturer", "agg": agg}))
                    .unwrap();
            let spec = resolver.resolve(&raw).unwrap();
            assert!(spec.y().is_count());
            assert_eq!(spec.agg(), Reducer::Count);
        }
        let raw = RawChartSpec::from_json(json!({"x": "Industry", "y": "Manufacturer", "agg": "max"}))
            .unwrap();
        let spec = resolver.resolve(&raw).unwrap();
        assert_eq!(spec.y(), &ValueAxis::Column("Manufacturer".into()));
        assert_eq!(spec.agg(), Reducer::Max);
        let raw = RawChartSpec::from_json(json!({"x": "Industry", "y": "Units", "agg": "sum"})).unwrap();
        assert_eq!(resolver.resolve(&raw).unwrap().agg(), Reducer::Sum);
    }

    #[test]
    fn resolving_twice_changes_nothing() {
        let spec = resolve(json!({
            "chart_type": "line",
            "x": "Age",
            "y": "Units",
            "agg": "max",
            "top_n": 3,
            "filters": [{"column": "Units", "op": "between", "value": [1.5, 4]}],
            "title": "Peak"
        }))
        .unwrap();
        let again = SpecResolver::new(&schema())
            .resolve(&RawChartSpec::from(&spec))
            .unwrap();
        assert_eq!(again, spec);
    }
}
