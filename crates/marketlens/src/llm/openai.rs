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
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse, Usage};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::ApiClient;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> LLMResult<Self> {
        if api_key.trim().is_empty() {
            return Err(LLMError::Authentication("API key is empty".to_string()));
        }
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
        })
    }

    fn parse_openai_response(&self, response_data: Value, model: String) -> LLMResult<ProviderResponse> {
        let content = response_text(&response_data).ok_or_else(|| {
            LLMError::Provider("Failed to extract content from OpenAI response".to_string())
        })?;

        let usage = response_data.get("usage").map_or_else(Usage::default, |usage_data| {
            let tokens = |key: &str| {
                usage_data[key]
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0)
            };
            Usage {
                prompt_tokens: tokens("prompt_tokens"),
                completion_tokens: tokens("completion_tokens"),
                total_tokens: tokens("total_tokens"),
            }
        });

        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(str::to_string);

        Ok(ProviderResponse {
            content,
            model,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }

    /// One attempt, bounded by the configured timeout.
    async fn execute_request(&self, request: &ProviderRequest) -> LLMResult<Value> {
        let sent = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(request)
                .send(),
        )
        .await
        .map_err(|_| LLMError::Timeout)?;
        let response = sent.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::Network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LLMError::Serialisation(format!("Failed to parse response: {e}")));
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        debug!(status = %status, body = %body, "OpenAI request rejected");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                LLMError::Authentication(format!("OpenAI API error {status}"))
            }
            StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
            _ => LLMError::Provider(format!("OpenAI API error {status}: {body}")),
        })
    }
}

#[async_trait]
impl ApiClient for OpenAIClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        info!(model = %request.model, endpoint = %self.endpoint, "Sending model request");
        let response_data = self.execute_request(&request).await?;
        self.parse_openai_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Text of a reply in either the chat-completions or the responses layout.
pub fn response_text(data: &Value) -> Option<String> {
    if let Some(content) = data["choices"][0]["message"]["content"].as_str() {
        return Some(content.to_string());
    }
    if let Some(text) = data["output_text"].as_str() {
        return Some(text.to_string());
    }
    let part = &data["output"][0]["content"][0]["text"];
    part.as_str()
        .or_else(|| part["value"].as_str())
        .map(str::to_string)
}
