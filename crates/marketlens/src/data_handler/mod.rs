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

pub mod common;
pub mod column;
pub mod table;
pub mod io;
pub mod normalize;
pub use common::{DataHandlerError, DataType, DatasetId, DatasetMetadata, Result, Value};
pub use column::{Column, ColumnBuilder, ColumnData};
pub use table::{Schema, Table};
pub use io::{CsvReader, CsvWriter};
pub use normalize::{MarketColumns, MARKET_COLUMNS};
pub fn load_csv<P: AsRef<std::path::Path>>(path: P, name: String) -> Result<Table> {
    let reader = CsvReader::new();
    reader.read_file(path.as_ref(), name)
}
pub fn export_csv<P: AsRef<std::path::Path>>(table: &Table, path: P) -> Result<()> {
    let writer = CsvWriter::new();
    writer.write_file(table, path.as_ref())
}
/// Loads a CSV export and normalises it onto the market columns.
pub fn load_market_csv<P: AsRef<std::path::Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map_or_else(|| "dataset".to_string(), |s| s.to_string_lossy().into_owned());
    MarketColumns::normalize(&load_csv(path, name)?)
}
