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

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "marketlens",
    version,
    about = "Natural-language charts and reports over market-share exports"
)]
pub struct Args {
    #[arg(long = "config", global = true, help = "Path to a TOML settings file")]
    pub config: Option<PathBuf>,
    #[arg(
        long = "api-key",
        global = true,
        help = "Model API key (overrides settings, secrets file and OPENAI_API_KEY)"
    )]
    pub api_key: Option<String>,
    #[arg(
        long = "debug",
        global = true,
        default_value_t = false,
        help = "Enable debug-level logging (tracing::Level::DEBUG)."
    )]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Turn a request into a chart spec and print the aggregated table
    Chart(ChartArgs),
    /// Run the pipeline offline from a chart spec JSON file
    Plan(PlanArgs),
    /// Write a Markdown market report
    Report(ReportArgs),
    /// Apply a YAML cleansing plan and write the cleaned CSV
    Cleanse(CleanseArgs),
    /// Print record and distinct counts
    Summary(DataArg),
}

#[derive(ClapArgs, Debug)]
pub struct DataArg {
    #[arg(long = "data", help = "CSV export of the market workbook")]
    pub data: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct ChartArgs {
    #[command(flatten)]
    pub source: DataArg,
    #[arg(long = "request", help = "What to chart, in plain language")]
    pub request: String,
    #[arg(long = "model", help = "Model name (defaults to the configured model)")]
    pub model: Option<String>,
    #[arg(
        long = "where",
        value_parser = parse_selection,
        help = "Pre-filter rows, e.g. --where \"Hanna Office=HCM,HN\" (repeatable)"
    )]
    pub selections: Vec<Selection>,
    #[arg(long = "output", help = "Write the aggregated table as CSV")]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: DataArg,
    #[arg(long = "spec", help = "Chart spec JSON file")]
    pub spec: PathBuf,
    #[arg(long = "output", help = "Write the aggregated table as CSV")]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: DataArg,
    #[arg(long = "request", help = "What the report should cover")]
    pub request: String,
    #[arg(long = "model")]
    pub model: Option<String>,
    #[arg(long = "output", help = "Write the Markdown report to this file")]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct CleanseArgs {
    #[command(flatten)]
    pub source: DataArg,
    #[arg(long = "plan", help = "YAML cleansing plan")]
    pub plan: PathBuf,
    #[arg(long = "output")]
    pub output: PathBuf,
}

/// One `--where COLUMN=V1,V2` selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub column: String,
    pub values: Vec<String>,
}

fn parse_selection(raw: &str) -> Result<Selection, String> {
    let (column, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=V1,V2 but got '{raw}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in '{raw}'"));
    }
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Selection {
        column: column.to_string(),
        values,
    })
}
