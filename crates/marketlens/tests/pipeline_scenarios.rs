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

use async_trait::async_trait;
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse};
use marketlens::report::EMPTY_REPLY;
use marketlens::transformation::{FilterEngine, FilterPredicate};
use marketlens::{
    load_market_csv, ApiClient, ChartError, ChartKind, ChartPipeline, IntentTranslator,
    ReportWriter, SystemInstruction, Table, Value,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

const WORKBOOK: &str = "\
Industry,Parameter/Method,Instrument Type,Manufacturer,Age of Product,Date,Hanna Office,Model #,Notes
Water,pH,Portable,Hach,3,2025-01-05,HCM,HI98194,a
Water,pH,Benchtop,Hanna,5,2025-02-11,HN,HI5221,b
Energy,DO,Portable,YSI,4,02/03/2025,HCM,ProDSS,c
Water,Turbidity,Benchtop,Hach,8,,HN,TL2310,d
,pH,Portable,Hanna,2,2025-03-01,HCM,HI98128,e
Food,pH,Handheld,Hanna,,not a date,HN,HI99161,f
";

struct ScriptedClient {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| (*r).to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop().unwrap_or_default();
        Ok(ProviderResponse::text(model, reply))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn market() -> Table {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(WORKBOOK.as_bytes()).unwrap();
    load_market_csv(file.path()).unwrap()
}

#[test]
fn loading_normalises_the_workbook() {
    let table = market();
    assert_eq!(
        table.column_names(),
        [
            "Industry",
            "Parameter/Method",
            "Instrument Type",
            "Manufacturer",
            "Age",
            "Date",
            "Hanna Office",
            "Model"
        ]
    );
    assert_eq!(table.row_count(), 6);
    assert_eq!(table.value("Industry", 4), Some(Value::from("Unknown")));
    assert_eq!(table.value("Age", 5), Some(Value::from("Unknown")));
    assert_eq!(table.value("Date", 5), Some(Value::Null));
    assert_eq!(table.value("Date", 2).map(|v| v.to_string()), Some("2025-03-02".into()));
}

#[tokio::test]
async fn natural_language_request_end_to_end() {
    let client = ScriptedClient::new(&[
        "```json\n{\"chart_type\": \"Column\", \"x\": \"Manufacturer\", \"y\": \"Count\", \
         \"color\": null, \"agg\": \"count\", \"top_n\": 2, \
         \"filters\": [{\"column\": \"Parameter/Method\", \"op\": \"eq\", \"value\": \"pH\"}], \
         \"title\": \"pH instruments by maker\"}\n```",
    ]);
    let table = market();
    let translator = IntentTranslator::new(client.clone())
        .with_instruction(SystemInstruction::with_column_hints(table.schema()));
    let pipeline = ChartPipeline::new().with_translator(translator);

    let out = pipeline
        .run_request(&table, "top 2 pH makers", "gpt-4o-mini")
        .await
        .unwrap();

    assert_eq!(out.kind(), ChartKind::Column);
    assert_eq!(out.title(), "pH instruments by maker");
    assert_eq!(out.value_column, "Count");
    assert_eq!(out.table.row_count(), 2);
    assert_eq!(out.color(), None);
    assert_eq!(out.table.value("Manufacturer", 0), Some(Value::from("Hanna")));
    assert_eq!(out.table.value("Count", 0), Some(Value::Int64(3)));
    assert_eq!(out.table.value("Manufacturer", 1), Some(Value::from("Hach")));
    assert_eq!(out.table.value("Count", 1), Some(Value::Int64(1)));

    let requests = client.requests.lock().unwrap();
    assert!(requests[0].messages[0].content.contains("Hanna Office, Model"));
}

#[tokio::test]
async fn malformed_reply_is_rejected_before_any_shaping() {
    let client = ScriptedClient::new(&["Sorry, I can only draw pie charts."]);
    let pipeline = ChartPipeline::new().with_translator(IntentTranslator::new(client));
    let err = pipeline
        .run_request(&market(), "chart", "gpt-4o-mini")
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert!(matches!(err, ChartError::MalformedModelOutput { .. }));
}

#[test]
fn sidebar_selection_then_chart() {
    let table = market();
    let sliced = FilterEngine::new()
        .apply(&table, &[FilterPredicate::member_of("Hanna Office", ["HCM"])])
        .unwrap();
    let raw = marketlens::RawChartSpec::from_json(serde_json::json!({
        "chart_type": "pie",
        "x": "Industry",
        "y": "Age",
        "agg": "max"
    }))
    .unwrap();
    let out = ChartPipeline::new().run(&sliced, &raw).unwrap();
    assert_eq!(out.value_column, "Age");
    assert_eq!(out.table.column_names(), ["Industry", "Age"]);
    let industries: Vec<String> = (0..out.table.row_count())
        .filter_map(|i| out.table.value("Industry", i).and_then(|v| v.text()))
        .collect();
    assert_eq!(industries, ["Energy", "Unknown", "Water"]);
}

#[test]
fn range_filters_on_numeric_columns() {
    let table = Table::from_rows(
        "ages",
        &["Industry", "Age"],
        vec![
            vec!["Water".into(), Value::Int64(2)],
            vec!["Water".into(), Value::Int64(3)],
            vec!["Energy".into(), Value::Int64(5)],
            vec!["Energy".into(), Value::Int64(7)],
        ],
    )
    .unwrap();
    let pipeline = ChartPipeline::new();
    let ranged = marketlens::RawChartSpec::from_json(serde_json::json!({
        "x": "Industry",
        "filters": [{"column": "Age", "op": "between", "value": [3, 5]}]
    }))
    .unwrap();
    let out = pipeline.run(&table, &ranged).unwrap();
    assert_eq!(out.table.value("Count", 0), Some(Value::Int64(1)));
    assert_eq!(out.table.value("Count", 1), Some(Value::Int64(1)));

    let malformed = marketlens::RawChartSpec::from_json(serde_json::json!({
        "x": "Industry",
        "filters": [{"column": "Age", "op": "between", "value": [3]}]
    }))
    .unwrap();
    let out = pipeline.run(&table, &malformed).unwrap();
    assert_eq!(out.table.value("Count", 0), Some(Value::Int64(2)));
}

#[tokio::test]
async fn report_embeds_request_and_context() {
    let client = ScriptedClient::new(&["# Report\nWater leads.", "   "]);
    let writer = ReportWriter::new(client.clone());
    let table = market();

    let markdown = writer
        .generate(&table, "Summarise the pH market", "gpt-4o-mini")
        .await
        .unwrap();
    assert_eq!(markdown, "# Report\nWater leads.");

    let empty = writer.generate(&table, "again", "gpt-4o-mini").await.unwrap();
    assert_eq!(empty, EMPTY_REPLY);

    let requests = client.requests.lock().unwrap();
    let prompt = &requests[0].messages[1].content;
    assert!(prompt.starts_with("User request:\nSummarise the pH market\n\n"));
    assert!(prompt.contains("### Industry Summary\n```\nIndustry,Count\nWater,3\n"));
    assert!(prompt.contains("### Age by Industry"));
    assert!(prompt.ends_with("Now write the report."));
    assert!(requests[0].messages[0].content.starts_with("You are a senior market analyst."));
}
