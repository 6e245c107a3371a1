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

use crate::data_handler::DataHandlerError;
use llm_contracts::LLMError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Model output could not be read as a chart specification: {reason}")]
    MalformedModelOutput { reason: String, payload: String },
    #[error("Column '{column}' does not exist in the dataset")]
    UnknownColumn { column: String },
    #[error("Language model error: {0}")]
    Llm(#[from] LLMError),
    #[error("Data error: {0}")]
    Data(#[from] DataHandlerError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl ChartError {
    pub fn malformed(reason: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::MalformedModelOutput {
            reason: reason.into(),
            payload: payload.into(),
        }
    }

    /// True for the two rejections a request can end in before any data is
    /// shaped, as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedModelOutput { .. } | Self::UnknownColumn { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {source}")]
    TomlParseError {
        #[from]
        source: toml::de::Error,
    },
    #[error("Failed to parse YAML configuration: {source}")]
    YamlParseError {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ChartError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
