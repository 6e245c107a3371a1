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

use crate::error::{ConfigError, ConfigResult};
use crate::llm::{OpenAIClient, DEFAULT_ENDPOINT};
use llm_contracts::{LLMError, LLMResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const API_KEY_VARIABLE: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
    pub secrets_path: Option<PathBuf>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_seconds: 30,
            api_key: None,
            secrets_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub preview_rows: usize,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { preview_rows: 20 }
    }
}

/// Where the API key came from, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Explicit,
    Settings,
    SecretsFile,
    Environment,
}

impl fmt::Display for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Explicit => "command line",
            Self::Settings => "settings file",
            Self::SecretsFile => "secrets file",
            Self::Environment => "environment",
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub value: String,
    pub source: ApiKeySource,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

impl Settings {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFileError {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn resolve_api_key(&self, explicit: Option<&str>) -> LLMResult<ApiKey> {
        self.resolve_api_key_from(explicit, std::env::var(API_KEY_VARIABLE).ok())
    }

    /// Explicit value, then settings, then the secrets file, then the
    /// environment. Blank values are skipped at every level.
    pub fn resolve_api_key_from(
        &self,
        explicit: Option<&str>,
        environment: Option<String>,
    ) -> LLMResult<ApiKey> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let candidates = [
            (ApiKeySource::Explicit, present(explicit.map(str::to_string))),
            (ApiKeySource::Settings, present(self.llm.api_key.clone())),
            (ApiKeySource::SecretsFile, present(self.secrets_file_key())),
            (ApiKeySource::Environment, present(environment)),
        ];
        candidates
            .into_iter()
            .find_map(|(source, value)| value.map(|value| ApiKey { value, source }))
            .ok_or_else(|| {
                LLMError::Authentication(format!(
                    "{API_KEY_VARIABLE} is not set. Pass --api-key, add it to the settings or secrets file, or export it"
                ))
            })
    }

    fn secrets_file_key(&self) -> Option<String> {
        let path = self.llm.secrets_path.as_ref()?;
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Secrets file not readable");
                return None;
            }
        };
        match toml::from_str::<HashMap<String, toml::Value>>(&content) {
            Ok(secrets) => secrets
                .get(API_KEY_VARIABLE)
                .and_then(toml::Value::as_str)
                .map(str::to_string),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Secrets file is not valid TOML");
                None
            }
        }
    }

    pub fn openai_client(&self, api_key: &ApiKey) -> LLMResult<OpenAIClient> {
        OpenAIClient::new(
            api_key.value.clone(),
            Some(self.llm.endpoint.clone()),
            Some(self.llm.timeout_seconds),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_take_defaults() {
        let settings = Settings::from_toml_str("[llm]\nmodel = \"gpt-4o\"\n").unwrap();
        assert_eq!(settings.llm.model, "gpt-4o");
        assert_eq!(settings.llm.timeout_seconds, 30);
        assert_eq!(settings.data.preview_rows, 20);
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Settings::from_toml_str("[llm]\ntimeout_seconds = 0\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Settings::from_toml_str("[llm\n"),
            Err(ConfigError::TomlParseError { .. })
        ));
        assert!(matches!(
            Settings::load(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::ConfigFileError { .. })
        ));
    }

    #[test]
    fn api_key_precedence() {
        let mut secrets = tempfile::NamedTempFile::new().unwrap();
        writeln!(secrets, "OPENAI_API_KEY = \"from-secrets\"").unwrap();
        let mut settings = Settings::default();
        settings.llm.secrets_path = Some(secrets.path().to_path_buf());
        let env = || Some("from-env".to_string());

        let key = settings.resolve_api_key_from(Some("flag"), env()).unwrap();
        assert_eq!((key.value.as_str(), key.source), ("flag", ApiKeySource::Explicit));

        let key = settings.resolve_api_key_from(Some("  "), env()).unwrap();
        assert_eq!(key.source, ApiKeySource::SecretsFile);

        settings.llm.api_key = Some("from-settings".into());
        let key = settings.resolve_api_key_from(None, env()).unwrap();
        assert_eq!(key.source, ApiKeySource::Settings);

        let bare = Settings::default();
        let key = bare.resolve_api_key_from(None, env()).unwrap();
        assert_eq!(key.source, ApiKeySource::Environment);
        assert!(matches!(
            bare.resolve_api_key_from(None, None),
            Err(LLMError::Authentication(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let key = ApiKey {
            value: "sk-secret".into(),
            source: ApiKeySource::Explicit,
        };
        assert!(!format!("{key:?}").contains("sk-secret"));
    }
}
