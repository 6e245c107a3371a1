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

use crate::data_handler::normalize::{
    AGE, DATE, INDUSTRY, INSTRUMENT_TYPE, MANUFACTURER, PARAMETER,
};
use crate::data_handler::{ColumnData, CsvWriter, Table};
use crate::error::Result;
use crate::llm::ApiClient;
use crate::transformation::{rank_top_n, AggregationEngine, Reducer, ValueAxis};
use llm_contracts::{Message, ProviderRequest};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_PREVIEW_ROWS: usize = 20;
pub const SUMMARY_ROW_LIMIT: usize = 50;
pub const EMPTY_REPLY: &str = "*(No response text returned by the model.)*";

const PREVIEW_COLUMNS: [&str; 6] = [INDUSTRY, PARAMETER, INSTRUMENT_TYPE, MANUFACTURER, AGE, DATE];
const KPI_COLUMNS: [&str; 3] = [INDUSTRY, INSTRUMENT_TYPE, MANUFACTURER];
const SUMMARIES: [(&str, &[&str]); 4] = [
    ("Industry Summary", &[INDUSTRY]),
    ("Instrument Type by Industry", &[INDUSTRY, INSTRUMENT_TYPE]),
    ("Manufacturer by Industry", &[INDUSTRY, MANUFACTURER]),
    ("Age by Industry", &[INDUSTRY, AGE]),
];

const ANALYST_INSTRUCTION: &str = "You are a senior market analyst. Produce clear, structured Markdown reports.
- Keep it concise, evidence-based, and action-oriented.
- Include: Executive Summary, Key Trends, Segment Breakdown, Opportunities/Risks, Recommendations.
- Reference figures with captions (e.g., 'Figure 1: Industry share').
- If the user's request mentions exporting, include a final 'Deliverables' checklist.
- Assume charts shown in the web app are available; don't invent numbers beyond provided aggregates.
- When useful, include short SQL-like or pandas-like pseudo-queries to explain calculations.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

/// Dataset digest handed to the model: a short preview plus grouped counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    sections: Vec<ReportSection>,
}

impl ReportContext {
    pub fn build(table: &Table) -> Result<Self> {
        Self::build_with_preview(table, DEFAULT_PREVIEW_ROWS)
    }

    pub fn build_with_preview(table: &Table, preview_rows: usize) -> Result<Self> {
        let mut sections = vec![ReportSection {
            title: "Data Preview".to_string(),
            body: preview(table, preview_rows)?,
        }];
        let engine = AggregationEngine::new();
        let writer = CsvWriter::new();
        for (title, wanted) in SUMMARIES {
            let present: Vec<&str> = wanted
                .iter()
                .copied()
                .filter(|c| table.schema().contains(c))
                .collect();
            let Some((&x, rest)) = present.split_first() else {
                continue;
            };
            let grouped = engine.aggregate(
                table,
                Some(x),
                rest.first().copied(),
                &ValueAxis::Count,
                Reducer::Count,
            )?;
            let ranked = rank_top_n(&grouped.table, &grouped.value_column, Some(SUMMARY_ROW_LIMIT))?;
            if ranked.is_empty() {
                continue;
            }
            sections.push(ReportSection {
                title: title.to_string(),
                body: format!("```\n{}\n```", writer.to_csv_string(&ranked)?),
            });
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[ReportSection] {
        &self.sections
    }
}

impl fmt::Display for ReportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "### {}\n{}", section.title, section.body)?;
        }
        Ok(())
    }
}

fn preview(table: &Table, rows: usize) -> Result<String> {
    if table.is_empty() {
        return Ok("_No data available_".to_string());
    }
    let head: Vec<usize> = (0..rows.min(table.row_count())).collect();
    let head = table.select_rows(&head)?;
    let keep: Vec<&str> = PREVIEW_COLUMNS
        .into_iter()
        .filter(|c| head.schema().contains(c))
        .collect();
    let head = if keep.is_empty() { head } else { head.select(&keep)? };
    Ok(format!("```\n{}```", CsvWriter::new().to_csv_string(&head)?))
}

/// Headline figures: record count and distinct values of the key dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub records: usize,
    pub distinct: Vec<(String, usize)>,
}

impl DatasetSummary {
    pub fn of(table: &Table) -> Self {
        let distinct = KPI_COLUMNS
            .into_iter()
            .filter_map(|name| {
                let column = table.column(name)?;
                let values: HashSet<String> =
                    (0..column.len()).filter_map(|i| column.get_string(i)).collect();
                Some((name.to_string(), values.len()))
            })
            .collect();
        Self {
            records: table.row_count(),
            distinct,
        }
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Records: {}", self.records)?;
        for (name, count) in &self.distinct {
            write!(f, "\n{name}: {count}")?;
        }
        Ok(())
    }
}

/// Writes a Markdown market report for a request, grounded in the context.
pub struct ReportWriter {
    client: Arc<dyn ApiClient>,
    preview_rows: usize,
}

impl ReportWriter {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    pub fn build_request(&self, table: &Table, request: &str, model: &str) -> Result<ProviderRequest> {
        let context = ReportContext::build_with_preview(table, self.preview_rows)?;
        let prompt = format!(
            "User request:\n{request}\n\nDataset context (summaries & preview):\n{context}\n\nNow write the report."
        );
        Ok(ProviderRequest::new(
            model,
            vec![Message::system(ANALYST_INSTRUCTION), Message::user(prompt)],
        ))
    }

    pub async fn generate(&self, table: &Table, request: &str, model: &str) -> Result<String> {
        let provider_request = self.build_request(table, request, model)?;
        info!(
            provider = self.client.provider_name(),
            model,
            rows = table.row_count(),
            "Generating market report"
        );
        let response = self.client.send_request(provider_request).await?;
        if response.content.trim().is_empty() {
            return Ok(EMPTY_REPLY.to_string());
        }
        Ok(response.content)
    }
}
