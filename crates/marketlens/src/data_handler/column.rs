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

use crate::data_handler::common::{
    parse_boolean, parse_temporal, DataHandlerError, DataType, Result, Value,
};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::sync::Arc;

pub trait ColumnData: Send + Sync + std::fmt::Debug {
    fn len(&self) -> usize;
    fn data_type(&self) -> DataType;
    fn null_count(&self) -> usize;
    fn get_value(&self, index: usize) -> Value;
    fn get_string(&self, index: usize) -> Option<String>;
    fn to_f64(&self, index: usize) -> Option<f64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub enum Column {
    Int64(Arc<[Option<i64>]>),
    Float64(Arc<[Option<f64>]>),
    String(Arc<[Option<Arc<str>>]>),
    Boolean(Arc<[Option<bool>]>),
    Temporal(Arc<[Option<NaiveDateTime>]>),
}

impl ColumnData for Column {
    fn len(&self) -> usize {
        match self {
            Column::Int64(data) => data.len(),
            Column::Float64(data) => data.len(),
            Column::String(data) => data.len(),
            Column::Boolean(data) => data.len(),
            Column::Temporal(data) => data.len(),
        }
    }
    fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Boolean(_) => DataType::Boolean,
            Column::Temporal(_) => DataType::Temporal,
        }
    }
    fn null_count(&self) -> usize {
        match self {
            Column::Int64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Float64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::String(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Boolean(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Temporal(data) => data.par_iter().filter(|v| v.is_none()).count(),
        }
    }
    fn get_value(&self, index: usize) -> Value {
        let value = match self {
            Column::Int64(data) => data.get(index).copied().flatten().map(Value::Int64),
            Column::Float64(data) => data.get(index).copied().flatten().map(Value::Float64),
            Column::String(data) => data
                .get(index)
                .and_then(|cell| cell.clone())
                .map(Value::String),
            Column::Boolean(data) => data.get(index).copied().flatten().map(Value::Boolean),
            Column::Temporal(data) => data.get(index).copied().flatten().map(Value::Temporal),
        };
        value.unwrap_or(Value::Null)
    }
    fn get_string(&self, index: usize) -> Option<String> {
        self.get_value(index).text()
    }
    fn to_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::Int64(data) => data.get(index).and_then(|opt| opt.map(|v| v as f64)),
            Column::Float64(data) => data.get(index).copied()?,
            Column::String(data) => data
                .get(index)
                .and_then(|opt| opt.as_ref().and_then(|s| s.trim().parse::<f64>().ok())),
            Column::Boolean(data) => data
                .get(index)
                .and_then(|opt| opt.map(|v| if v { 1.0 } else { 0.0 })),
            Column::Temporal(_) => None,
        }
    }
}

impl Column {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let data: Vec<Option<Arc<str>>> = values
            .into_iter()
            .map(|opt| opt.map(|s| Arc::from(s.as_ref())))
            .collect();
        Column::String(data.into())
    }

    pub fn from_strings(values: &[Option<String>], data_type: DataType) -> Result<Self> {
        fn parse_all<T, F>(values: &[Option<String>], parse: F) -> Result<Vec<Option<T>>>
        where
            T: Send,
            F: Fn(&str) -> Option<T> + Sync,
        {
            values
                .par_iter()
                .map(|opt_str| match opt_str {
                    None => Ok(None),
                    Some(s) if s.trim().is_empty() => Ok(None),
                    Some(s) => parse(s.trim())
                        .map(Some)
                        .ok_or_else(|| DataHandlerError::Parse(format!("Cannot parse '{s}'"))),
                })
                .collect()
        }
        Ok(match data_type {
            DataType::Int64 => {
                Column::Int64(parse_all::<i64, _>(values, |s| s.parse().ok())?.into())
            }
            DataType::Float64 => {
                Column::Float64(parse_all::<f64, _>(values, |s| s.parse().ok())?.into())
            }
            DataType::Boolean => Column::Boolean(parse_all(values, parse_boolean)?.into()),
            DataType::Temporal => Column::Temporal(parse_all(values, parse_temporal)?.into()),
            DataType::String => Column::text(values.iter().map(|v| {
                v.as_deref().filter(|s| !s.trim().is_empty())
            })),
        })
    }

    /// Builds a typed column from cells. Integers widen into float columns;
    /// any other mismatch is an error.
    pub fn from_values(values: &[Value], data_type: DataType) -> Result<Self> {
        let mismatch = |value: &Value| {
            DataHandlerError::TypeMismatch(format!("Expected {data_type:?}, got {value:?}"))
        };
        Ok(match data_type {
            DataType::Int64 => Column::Int64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int64(i) => Ok(Some(*i)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::Float64 => Column::Float64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int64(i) => Ok(Some(*i as f64)),
                        Value::Float64(f) => Ok(Some(*f)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::String => Column::String(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::String(s) => Ok(Some(Arc::clone(s))),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::Boolean => Column::Boolean(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Boolean(b) => Ok(Some(*b)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            DataType::Temporal => Column::Temporal(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Temporal(t) => Ok(Some(*t)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
        })
    }

    /// Textual copy of the column, with nulls optionally replaced.
    pub fn to_text(&self, fill_null: Option<&str>) -> Column {
        Column::text(
            (0..self.len())
                .map(|i| self.get_string(i).or_else(|| fill_null.map(str::to_string))),
        )
    }

    /// Temporal copy of the column; cells that do not parse become null.
    pub fn to_temporal_lossy(&self) -> Column {
        if let Column::Temporal(_) = self {
            return self.clone();
        }
        let data: Vec<Option<NaiveDateTime>> = (0..self.len())
            .into_par_iter()
            .map(|i| self.get_string(i).and_then(|s| parse_temporal(&s)))
            .collect();
        Column::Temporal(data.into())
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Column> {
        fn pick<T: Clone + Send + Sync>(data: &[Option<T>], indices: &[usize]) -> Result<Vec<Option<T>>> {
            indices
                .par_iter()
                .map(|&i| {
                    data.get(i)
                        .cloned()
                        .ok_or(DataHandlerError::OutOfBounds(i))
                })
                .collect()
        }
        Ok(match self {
            Column::Int64(data) => Column::Int64(pick(data, indices)?.into()),
            Column::Float64(data) => Column::Float64(pick(data, indices)?.into()),
            Column::String(data) => Column::String(pick(data, indices)?.into()),
            Column::Boolean(data) => Column::Boolean(pick(data, indices)?.into()),
            Column::Temporal(data) => Column::Temporal(pick(data, indices)?.into()),
        })
    }
}

#[derive(Debug, Default)]
pub struct ColumnBuilder {
    values: Vec<Option<String>>,
}

impl ColumnBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }
    pub fn push(&mut self, value: Option<String>) {
        self.values.push(value.filter(|s| !s.trim().is_empty()));
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn build(self) -> Result<Column> {
        let data_type = self.infer_type();
        Column::from_strings(&self.values, data_type)
    }

    /// Picks the narrowest type every non-empty cell parses as.
    fn infer_type(&self) -> DataType {
        let mut present = self.values.iter().flatten().map(|s| s.trim()).peekable();
        if present.peek().is_none() {
            return DataType::String;
        }
        let (mut all_int, mut all_float, mut all_bool, mut all_temporal) = (true, true, true, true);
        for sample in present {
            all_int &= sample.parse::<i64>().is_ok();
            all_float &= sample.parse::<f64>().is_ok();
            all_bool &= parse_boolean(sample).is_some();
            all_temporal &= parse_temporal(sample).is_some();
            if !(all_int || all_float || all_bool || all_temporal) {
                break;
            }
        }
        if all_int {
            DataType::Int64
        } else if all_float {
            DataType::Float64
        } else if all_bool {
            DataType::Boolean
        } else if all_temporal {
            DataType::Temporal
        } else {
            DataType::String
        }
    }
}
