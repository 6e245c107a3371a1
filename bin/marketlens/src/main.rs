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

mod args;

use anyhow::{bail, Context, Result};
use args::{Args, ChartArgs, CleanseArgs, Command, PlanArgs, ReportArgs, Selection};
use clap::Parser;
use marketlens::data_handler::{export_csv, load_csv};
use marketlens::{
    load_market_csv, ApiClient, ChartError, ChartOutput, ChartPipeline, CleansingPlan,
    DatasetSummary, FilterEngine, FilterPredicate, IntentTranslator, RawChartSpec, ReportWriter,
    Settings, SystemInstruction, Table,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const SAMPLE_ROWS: usize = 25;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let max_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(max_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = Settings::load_or_default(args.config.as_deref())
        .context("Failed to load settings")?;
    let api_key = args.api_key.as_deref();

    match args.command {
        Command::Chart(chart) => run_chart(&settings, api_key, chart).await,
        Command::Plan(plan) => run_plan(plan),
        Command::Report(report) => run_report(&settings, api_key, report).await,
        Command::Cleanse(cleanse) => run_cleanse(cleanse),
        Command::Summary(source) => {
            let table = load(&source.data)?;
            println!("{}", DatasetSummary::of(&table));
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Table> {
    let table = load_market_csv(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!(rows = table.row_count(), columns = table.column_count(), "Loaded dataset");
    Ok(table)
}

fn model_client(settings: &Settings, api_key: Option<&str>) -> Result<Arc<dyn ApiClient>> {
    let key = settings.resolve_api_key(api_key)?;
    info!(source = %key.source, "Using API key");
    Ok(Arc::new(settings.openai_client(&key)?))
}

fn preselect(table: &Table, selections: &[Selection]) -> Result<Table> {
    let predicates: Vec<FilterPredicate> = selections
        .iter()
        .filter(|s| !s.values.is_empty())
        .map(|s| FilterPredicate::member_of(s.column.as_str(), s.values.iter().map(String::as_str)))
        .collect();
    if predicates.is_empty() {
        return Ok(table.clone());
    }
    let sliced = FilterEngine::new().apply(table, &predicates)?;
    info!(before = table.row_count(), after = sliced.row_count(), "Applied selections");
    Ok(sliced)
}

fn print_chart(output: &ChartOutput, destination: Option<&Path>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&output.spec)?);
    println!("\n{}", output.table.render_sample(SAMPLE_ROWS));
    if let Some(path) = destination {
        export_csv(&output.table, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote chart table");
    }
    Ok(())
}

async fn run_chart(settings: &Settings, api_key: Option<&str>, chart: ChartArgs) -> Result<()> {
    let table = preselect(&load(&chart.source.data)?, &chart.selections)?;
    let translator = IntentTranslator::new(model_client(settings, api_key)?)
        .with_instruction(SystemInstruction::with_column_hints(table.schema()));
    let model = chart.model.as_deref().unwrap_or(&settings.llm.model);
    let output = match ChartPipeline::new()
        .with_translator(translator)
        .run_request(&table, &chart.request, model)
        .await
    {
        Ok(output) => output,
        Err(err @ ChartError::MalformedModelOutput { .. }) => {
            bail!("The model reply could not be used as a chart: {err}")
        }
        Err(err) => return Err(err.into()),
    };
    print_chart(&output, chart.output.as_deref())
}

fn run_plan(plan: PlanArgs) -> Result<()> {
    let table = load(&plan.source.data)?;
    let content = std::fs::read_to_string(&plan.spec)
        .with_context(|| format!("Failed to read {}", plan.spec.display()))?;
    let raw = RawChartSpec::parse(&content)?;
    let output = ChartPipeline::new().run(&table, &raw)?;
    print_chart(&output, plan.output.as_deref())
}

async fn run_report(settings: &Settings, api_key: Option<&str>, report: ReportArgs) -> Result<()> {
    let table = load(&report.source.data)?;
    let writer = ReportWriter::new(model_client(settings, api_key)?)
        .with_preview_rows(settings.data.preview_rows);
    let model = report.model.as_deref().unwrap_or(&settings.llm.model);
    let markdown = writer.generate(&table, &report.request, model).await?;
    match report.output {
        Some(path) => {
            std::fs::write(&path, &markdown)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{markdown}"),
    }
    Ok(())
}

fn run_cleanse(cleanse: CleanseArgs) -> Result<()> {
    let path = &cleanse.source.data;
    let name = path
        .file_stem()
        .map_or_else(|| "dataset".to_string(), |s| s.to_string_lossy().into_owned());
    let table = load_csv(path, name).with_context(|| format!("Failed to load {}", path.display()))?;
    let plan = CleansingPlan::load(&cleanse.plan)?;
    let outcome = plan.apply(&table)?;
    for (column, changed) in &outcome.mapped {
        println!("mapped {column}: {changed} cell(s)");
    }
    for rule in &outcome.rules {
        println!("{}: {} row(s)", rule.description, rule.matched_rows);
    }
    export_csv(&outcome.table, &cleanse.output)
        .with_context(|| format!("Failed to write {}", cleanse.output.display()))?;
    info!(path = %cleanse.output.display(), "Wrote cleaned dataset");
    Ok(())
}
