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

use crate::data_handler::column::{Column, ColumnData};
use crate::data_handler::common::{
    DataHandlerError, DataType, DatasetMetadata, Result, Value,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Ordered column names with a checked lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for name in names {
            schema.push(name.into())?;
        }
        Ok(schema)
    }

    fn push(&mut self, name: String) -> Result<()> {
        if self.index.contains_key(&name) {
            return Err(DataHandlerError::DuplicateColumn(name));
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Immutable, column-oriented table. Every operation returns a new table
/// sharing unchanged columns with its source.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    columns: Vec<Arc<Column>>,
    pub metadata: DatasetMetadata,
}

impl Table {
    pub fn from_columns(name: impl Into<String>, columns: Vec<(String, Column)>) -> Result<Self> {
        let mut metadata = DatasetMetadata::named(name);
        let row_count = columns.first().map_or(0, |(_, c)| c.len());
        let mut schema = Schema::default();
        let mut stored = Vec::with_capacity(columns.len());
        for (column_name, column) in columns {
            if column.len() != row_count {
                return Err(DataHandlerError::InvalidOperation(format!(
                    "Column length mismatch for '{column_name}': expected {row_count}, got {}",
                    column.len()
                )));
            }
            schema.push(column_name)?;
            stored.push(Arc::new(column));
        }
        metadata.row_count = row_count;
        metadata.column_count = schema.len();
        Ok(Self {
            schema,
            columns: stored,
            metadata,
        })
    }

    /// Builds a table from row-major cells. Each column takes the type of
    /// its first non-null cell; a column of nulls is textual.
    pub fn from_rows<S: AsRef<str>>(
        name: impl Into<String>,
        headers: &[S],
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let width = headers.len();
        let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); width];
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(DataHandlerError::InvalidOperation(format!(
                    "Row {row_index}: expected {width} cells, got {}",
                    row.len()
                )));
            }
            for (slot, value) in cells.iter_mut().zip(row) {
                slot.push(value);
            }
        }
        let columns = headers
            .iter()
            .zip(cells)
            .map(|(header, values)| {
                let data_type = infer_value_type(&values);
                Column::from_values(&values, data_type).map(|c| (header.as_ref().to_string(), c))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(name, columns)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
    pub fn column_names(&self) -> &[String] {
        self.schema.names()
    }
    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema
            .position(name)
            .and_then(|i| self.columns.get(i))
            .map(AsRef::as_ref)
    }

    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| DataHandlerError::ColumnNotFound(name.to_string()))
    }

    pub fn value(&self, column: &str, row: usize) -> Option<Value> {
        self.column(column).map(|c| c.get_value(row))
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Table> {
        let columns = self
            .columns
            .par_iter()
            .map(|column| column.select_rows(indices).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let mut metadata = DatasetMetadata::named(format!("{}_filtered", self.metadata.name));
        metadata.row_count = indices.len();
        metadata.column_count = self.schema.len();
        Ok(Table {
            schema: self.schema.clone(),
            columns,
            metadata,
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Result<Table>
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let indices: Vec<usize> = (0..self.row_count())
            .into_par_iter()
            .filter(|&i| predicate(i))
            .collect();
        self.select_rows(&indices)
    }

    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self.require(name)?;
            columns.push(((*name).to_string(), column.clone()));
        }
        let mut table = Table::from_columns(self.metadata.name.clone(), columns)?;
        table.metadata.row_count = self.row_count();
        Ok(table)
    }

    /// Returns a copy with `name` replaced, or appended when absent.
    pub fn with_column(&self, name: &str, column: Column) -> Result<Table> {
        if column.len() != self.row_count() && self.column_count() > 0 {
            return Err(DataHandlerError::InvalidOperation(format!(
                "Column length mismatch for '{name}': expected {}, got {}",
                self.row_count(),
                column.len()
            )));
        }
        let mut table = self.clone();
        let column = Arc::new(column);
        match table.schema.position(name) {
            Some(i) => table.columns[i] = column,
            None => {
                table.metadata.row_count = column.len();
                table.schema.push(name.to_string())?;
                table.columns.push(column);
            }
        }
        table.metadata.column_count = table.schema.len();
        Ok(table)
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<Table> {
        let position = self
            .schema
            .position(from)
            .ok_or_else(|| DataHandlerError::ColumnNotFound(from.to_string()))?;
        if from == to {
            return Ok(self.clone());
        }
        let mut names = self.schema.names().to_vec();
        names[position] = to.to_string();
        let mut table = self.clone();
        table.schema = Schema::new(names)?;
        Ok(table)
    }

    /// Pipe-separated preview of the first `limit` rows.
    pub fn render_sample(&self, limit: usize) -> String {
        let sample_size = limit.min(self.row_count());
        let header = self.column_names().join(" | ");
        let mut out = String::new();
        let _ = writeln!(out, "{header}");
        let _ = writeln!(out, "{}", "-".repeat(header.len()));
        for i in 0..sample_size {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|c| c.get_string(i).unwrap_or_else(|| "NULL".to_string()))
                .collect();
            let _ = writeln!(out, "{}", row.join(" | "));
        }
        if self.row_count() > sample_size {
            let _ = writeln!(out, "... ({} more rows)", self.row_count() - sample_size);
        }
        out
    }
}

fn infer_value_type(values: &[Value]) -> DataType {
    let mut seen = values.iter().filter_map(Value::data_type);
    match seen.next() {
        Some(DataType::Int64) if seen.any(|t| t == DataType::Float64) => DataType::Float64,
        Some(first) => first,
        None => DataType::String,
    }
}
