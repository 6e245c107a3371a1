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

use crate::data_handler::common::Result;
use crate::data_handler::table::Table;
use tracing::debug;

pub const INDUSTRY: &str = "Industry";
pub const PARAMETER: &str = "Parameter/Method";
pub const INSTRUMENT_TYPE: &str = "Instrument Type";
pub const MANUFACTURER: &str = "Manufacturer";
pub const AGE: &str = "Age";
pub const DATE: &str = "Date";
pub const OFFICE: &str = "Hanna Office";
pub const REP: &str = "Hanna Rep";
pub const CUSTOMER: &str = "Customer Name";
pub const MODEL: &str = "Model";

/// Canonical column order of a market-share workbook.
pub const MARKET_COLUMNS: [&str; 10] = [
    INDUSTRY,
    PARAMETER,
    INSTRUMENT_TYPE,
    MANUFACTURER,
    AGE,
    DATE,
    OFFICE,
    REP,
    CUSTOMER,
    MODEL,
];

const RENAMES: [(&str, &str); 2] = [("Age of Product", AGE), ("Model #", MODEL)];
const CATEGORICAL: [&str; 5] = [INDUSTRY, PARAMETER, INSTRUMENT_TYPE, MANUFACTURER, AGE];
const UNKNOWN: &str = "Unknown";

pub struct MarketColumns;

impl MarketColumns {
    /// Projects a raw export onto the known market columns. Legacy headers
    /// are renamed, `Date` becomes temporal and categorical columns become
    /// text with nulls filled as `Unknown`.
    pub fn normalize(table: &Table) -> Result<Table> {
        let mut table = table.clone();
        for (legacy, canonical) in RENAMES {
            if table.schema().contains(legacy) && !table.schema().contains(canonical) {
                table = table.rename(legacy, canonical)?;
            }
        }
        let present: Vec<&str> = MARKET_COLUMNS
            .into_iter()
            .filter(|name| table.schema().contains(name))
            .collect();
        if present.is_empty() {
            debug!("No market columns found, leaving table unchanged");
            return Ok(table);
        }
        let mut table = table.select(&present)?;
        if let Some(date) = table.column(DATE) {
            let coerced = date.to_temporal_lossy();
            table = table.with_column(DATE, coerced)?;
        }
        for name in CATEGORICAL {
            if let Some(column) = table.column(name) {
                let text = column.to_text(Some(UNKNOWN));
                table = table.with_column(name, text)?;
            }
        }
        Ok(table)
    }
}
