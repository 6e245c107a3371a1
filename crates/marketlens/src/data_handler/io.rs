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

use crate::data_handler::column::{ColumnBuilder, ColumnData};
use crate::data_handler::common::{DataHandlerError, Result};
use crate::data_handler::table::Table;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CsvReader {
    has_headers: bool,
    delimiter: u8,
}

impl CsvReader {
    pub fn new() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
        }
    }
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn read_file(&self, path: &Path, dataset_name: String) -> Result<Table> {
        let file = File::open(path)?;
        let mut table = self.read(BufReader::new(file), dataset_name)?;
        table.metadata.source_path = Some(path.to_path_buf());
        Ok(table)
    }

    pub fn read_str(&self, content: &str, dataset_name: String) -> Result<Table> {
        self.read(content.as_bytes(), dataset_name)
    }

    /// Reads every record, inferring one type per column from all of its
    /// cells. Records whose width differs from the header are rejected.
    pub fn read<R: Read>(&self, source: R, dataset_name: String) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(source);
        let mut headers: Vec<String> = if self.has_headers {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            Vec::new()
        };
        let mut builders: Vec<ColumnBuilder> =
            headers.iter().map(|_| ColumnBuilder::new()).collect();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if builders.is_empty() && !self.has_headers {
                headers = (0..record.len()).map(|i| format!("column_{i}")).collect();
                builders = headers.iter().map(|_| ColumnBuilder::new()).collect();
            }
            if record.len() != builders.len() {
                return Err(DataHandlerError::Parse(format!(
                    "Line {}: expected {} fields, got {}",
                    line + 1,
                    builders.len(),
                    record.len()
                )));
            }
            for (builder, field) in builders.iter_mut().zip(record.iter()) {
                builder.push(Some(field.to_string()));
            }
        }
        let columns = headers
            .into_iter()
            .zip(builders)
            .map(|(header, builder)| builder.build().map(|column| (header, column)))
            .collect::<Result<Vec<_>>>()?;
        let table = Table::from_columns(dataset_name, columns)?;
        debug!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Loaded CSV dataset"
        );
        Ok(table)
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CsvWriter {
    delimiter: u8,
    quote_all: bool,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            quote_all: false,
        }
    }
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
    pub fn with_quote_all(mut self, quote_all: bool) -> Self {
        self.quote_all = quote_all;
        self
    }

    pub fn write_file(&self, table: &Table, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write(table, file)
    }

    pub fn to_csv_string(&self, table: &Table) -> Result<String> {
        let mut buffer = Vec::new();
        self.write(table, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| DataHandlerError::Parse(e.to_string()))
    }

    pub fn write<W: Write>(&self, table: &Table, sink: W) -> Result<()> {
        let style = if self.quote_all {
            csv::QuoteStyle::Always
        } else {
            csv::QuoteStyle::Necessary
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(style)
            .from_writer(sink);
        writer.write_record(table.column_names())?;
        let columns: Vec<_> = table
            .column_names()
            .iter()
            .map(|name| table.require(name))
            .collect::<Result<_>>()?;
        for row in 0..table.row_count() {
            writer.write_record(
                columns
                    .iter()
                    .map(|column| column.get_string(row).unwrap_or_default()),
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handler::common::{DataType, Value};
    use std::io::Write as _;

    const SAMPLE: &str = "Industry,Manufacturer,Units\nWater,Hach,3\nEnergy,\"Yokogawa, Inc\",\nWater,Hach,5\n";

    #[test]
    fn reads_quoted_fields_and_infers_types() {
        let table = CsvReader::new().read_str(SAMPLE, "sample".into()).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(
            table.value("Manufacturer", 1),
            Some(Value::from("Yokogawa, Inc"))
        );
        assert_eq!(table.require("Units").unwrap().data_type(), DataType::Int64);
        assert_eq!(table.value("Units", 1), Some(Value::Null));
    }

    #[test]
    fn ragged_records_are_rejected() {
        let result = CsvReader::new().read_str("a,b\n1,2\n3\n", "bad".into());
        assert!(result.is_err());
    }

    #[test]
    fn round_trips_through_a_file() {
        let table = CsvReader::new().read_str(SAMPLE, "sample".into()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let rendered = CsvWriter::new().to_csv_string(&table).unwrap();
        file.write_all(rendered.as_bytes()).unwrap();
        let reloaded = CsvReader::new()
            .read_file(file.path(), "reloaded".into())
            .unwrap();
        assert_eq!(reloaded.column_names(), table.column_names());
        assert_eq!(reloaded.value("Units", 2), Some(Value::Int64(5)));
        assert_eq!(
            reloaded.metadata.source_path.as_deref(),
            Some(file.path())
        );
    }

    #[test]
    fn headerless_input_gets_positional_names() {
        let table = CsvReader::new()
            .with_headers(false)
            .read_str("x,1\ny,2\n", "raw".into())
            .unwrap();
        assert_eq!(table.column_names(), ["column_0", "column_1"]);
    }
}
