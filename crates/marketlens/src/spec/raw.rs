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

use crate::error::{ChartError, Result};
use crate::spec::chart::ChartSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped chart request exactly as a model produced it. Nothing here has
/// been checked against a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawChartSpec {
    pub chart_type: Option<Value>,
    pub x: Option<Value>,
    pub y: Option<Value>,
    pub color: Option<Value>,
    pub agg: Option<Value>,
    pub top_n: Option<Value>,
    pub filters: Option<Value>,
    pub title: Option<Value>,
}

impl RawChartSpec {
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(ChartError::malformed(
                "expected a JSON object",
                other.to_string(),
            )),
        }
    }

    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ChartError::malformed(e.to_string(), payload))?;
        Self::from_json(value)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

impl From<&ChartSpec> for RawChartSpec {
    fn from(spec: &ChartSpec) -> Self {
        let filters = spec
            .filters()
            .iter()
            .map(|f| serde_json::to_value(f).unwrap_or(Value::Null))
            .collect();
        Self {
            chart_type: Some(Value::from(spec.chart_type().label())),
            x: spec.x().map(Value::from),
            y: Some(Value::from(spec.y().name())),
            color: spec.color().map(Value::from),
            agg: Some(Value::from(spec.agg().label())),
            top_n: spec.top_n().map(Value::from),
            filters: Some(Value::Array(filters)),
            title: Some(Value::from(spec.title())),
        }
    }
}

/// Reads a loosely typed text field. Null and empty strings are absent;
/// other JSON values are taken as their JSON text.
pub(crate) fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_objects_are_malformed() {
        assert!(matches!(
            RawChartSpec::from_json(json!([1, 2])),
            Err(ChartError::MalformedModelOutput { .. })
        ));
        assert!(RawChartSpec::parse("{not json").is_err());
    }

    #[test]
    fn unknown_keys_are_ignored_and_nulls_absent() {
        let raw = RawChartSpec::from_json(json!({"x": "Industry", "color": null, "extra": 1})).unwrap();
        assert_eq!(raw.x, Some(json!("Industry")));
        assert_eq!(raw.color, None);
    }

    #[test]
    fn text_fields_stringify_other_values() {
        assert_eq!(text_field(Some(&json!(""))), None);
        assert_eq!(text_field(Some(&json!(5))), Some("5".to_string()));
        assert_eq!(text_field(None), None);
    }
}
