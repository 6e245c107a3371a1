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

pub mod cleanse;
pub mod config;
pub mod data_handler;
pub mod error;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod spec;
pub mod transformation;

pub use cleanse::{CleansingOutcome, CleansingPlan};
pub use config::{ApiKey, ApiKeySource, Settings};
pub use data_handler::{load_market_csv, MarketColumns, Table, Value};
pub use error::{ChartError, ConfigError, Result};
pub use intent::{IntentTranslator, SystemInstruction};
pub use llm::{ApiClient, OpenAIClient};
pub use pipeline::{ChartOutput, ChartPipeline};
pub use report::{DatasetSummary, ReportContext, ReportWriter};
pub use spec::{ChartKind, ChartSpec, RawChartSpec, SpecResolver};
pub use transformation::{FilterEngine, FilterPredicate, Reducer, ValueAxis, COUNT_COLUMN};
