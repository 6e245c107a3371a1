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

use crate::data_handler::{Schema, MARKET_COLUMNS};

/// Fixed instruction telling the model which JSON shape to answer with.
#[derive(Debug, Clone)]
pub struct SystemInstruction {
    column_hints: Vec<String>,
}

impl Default for SystemInstruction {
    fn default() -> Self {
        Self {
            column_hints: MARKET_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

impl SystemInstruction {
    /// Hints the loaded table's own columns instead of the market defaults.
    pub fn with_column_hints(schema: &Schema) -> Self {
        if schema.is_empty() {
            return Self::default();
        }
        Self {
            column_hints: schema.names().to_vec(),
        }
    }

    pub fn column_hints(&self) -> &[String] {
        &self.column_hints
    }

    pub fn render(&self) -> String {
        format!(
            r#"You turn chart requests written in natural language into a chart description.
Read the user's request and reply with exactly one JSON object of this shape (no explanation, JSON only):
{{
  "chart_type": "bar|column|pie|line",
  "x": "<column used for the x axis or category>",
  "y": "<numeric column or 'Count'>",
  "color": "<column used to split series, or null>",
  "agg": "count|sum|avg|max|min",
  "top_n": <integer or null>,
  "filters": [
    {{"column": "<column name>", "op": "eq|in|contains|between", "value": "<value or [a,b]>"}}
  ],
  "title": "<short chart title>"
}}
Conventions: if there is no numeric column, set y = "Count" and agg = "count".
If the user says "top 5", set "top_n": 5. If no limit is stated, leave it null.
Only use columns likely to exist in the data, such as: {}.
"#,
            self.column_hints.join(", ")
        )
    }
}
