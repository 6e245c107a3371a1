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

use crate::data_handler::{ColumnData, Table};
use crate::error::Result;
use crate::intent::IntentTranslator;
use crate::spec::{ChartKind, ChartSpec, RawChartSpec, SpecResolver};
use crate::transformation::{rank_top_n, AggregationEngine, FilterEngine};
use llm_contracts::LLMError;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

/// Everything a chart renderer needs: axes, title and the shaped table.
#[derive(Debug, Clone)]
pub struct ChartOutput {
    pub spec: ChartSpec,
    pub value_column: String,
    pub table: Table,
}

impl ChartOutput {
    pub fn kind(&self) -> ChartKind {
        self.spec.chart_type()
    }
    pub fn x(&self) -> Option<&str> {
        self.spec.x()
    }
    pub fn color(&self) -> Option<&str> {
        self.spec.color()
    }
    pub fn title(&self) -> &str {
        self.spec.title()
    }

    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        (0..self.table.row_count())
            .map(|row| {
                self.table
                    .column_names()
                    .iter()
                    .filter_map(|name| {
                        let cell = self.table.column(name)?.get_value(row);
                        Some((name.clone(), serde_json::to_value(cell).unwrap_or(JsonValue::Null)))
                    })
                    .collect()
            })
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "spec": self.spec,
            "value_column": self.value_column,
            "rows": self.to_records(),
        })
    }
}

/// resolve -> filter -> aggregate -> rank.
pub struct ChartPipeline {
    filter: FilterEngine,
    aggregation: AggregationEngine,
    translator: Option<IntentTranslator>,
}

impl ChartPipeline {
    pub fn new() -> Self {
        Self {
            filter: FilterEngine::new(),
            aggregation: AggregationEngine::new(),
            translator: None,
        }
    }

    pub fn with_filter_engine(mut self, filter: FilterEngine) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_translator(mut self, translator: IntentTranslator) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Shapes `table` for a raw candidate. The candidate is resolved before
    /// any row is touched, so an unknown primary axis rejects the request
    /// without filtering.
    pub fn run(&self, table: &Table, raw: &RawChartSpec) -> Result<ChartOutput> {
        let spec = SpecResolver::for_table(table).resolve(raw)?;
        debug!(spec = ?spec, "Resolved chart specification");
        self.execute(table, spec)
    }

    pub fn execute(&self, table: &Table, spec: ChartSpec) -> Result<ChartOutput> {
        let filtered = self.filter.apply(table, spec.filters())?;
        let grouped = self.aggregation.aggregate(
            &filtered,
            spec.x(),
            spec.color(),
            spec.y(),
            spec.agg(),
        )?;
        let ranked = rank_top_n(&grouped.table, &grouped.value_column, spec.top_n())?;
        info!(
            input_rows = table.row_count(),
            filtered_rows = filtered.row_count(),
            groups = grouped.table.row_count(),
            output_rows = ranked.row_count(),
            "Chart data prepared"
        );
        Ok(ChartOutput {
            spec,
            value_column: grouped.value_column,
            table: ranked,
        })
    }

    /// Natural-language entry point: translate, then [`run`](Self::run).
    pub async fn run_request(&self, table: &Table, request: &str, model: &str) -> Result<ChartOutput> {
        let translator = self.translator.as_ref().ok_or_else(|| {
            LLMError::Configuration("No language model is configured for chart requests".to_string())
        })?;
        let raw = translator.translate(request, model).await?;
        self.run(table, &raw)
    }
}

impl Default for ChartPipeline {
    fn default() -> Self {
        Self::new()
    }
}
