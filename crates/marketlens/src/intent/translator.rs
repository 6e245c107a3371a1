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

use crate::error::Result;
use crate::intent::payload::extract_payload;
use crate::intent::prompt::SystemInstruction;
use crate::llm::ApiClient;
use crate::spec::RawChartSpec;
use llm_contracts::{Message, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a free-text chart request into an unvalidated chart candidate.
#[derive(Clone)]
pub struct IntentTranslator {
    client: Arc<dyn ApiClient>,
    instruction: SystemInstruction,
}

impl IntentTranslator {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            instruction: SystemInstruction::default(),
        }
    }

    pub fn with_instruction(mut self, instruction: SystemInstruction) -> Self {
        self.instruction = instruction;
        self
    }

    pub fn instruction(&self) -> &SystemInstruction {
        &self.instruction
    }

    pub fn build_request(&self, request: &str, model: &str) -> ProviderRequest {
        ProviderRequest::new(
            model,
            vec![
                Message::system(self.instruction.render()),
                Message::user(request),
            ],
        )
    }

    pub async fn translate(&self, request: &str, model: &str) -> Result<RawChartSpec> {
        info!(
            provider = self.client.provider_name(),
            model, "Translating chart request"
        );
        let response = self
            .client
            .send_request(self.build_request(request, model))
            .await?;
        debug!(reply = %response.content, "Model reply");
        RawChartSpec::from_json(extract_payload(&response.content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChartError;
    use async_trait::async_trait;
    use llm_contracts::{LLMError, LLMResult, ProviderResponse, Role};
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedClient {
        reply: Option<String>,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl ApiClient for CannedClient {
        async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
            let model = request.model.clone();
            self.seen.lock().unwrap().push(request);
            self.reply
                .clone()
                .map(|text| ProviderResponse::text(model, text))
                .ok_or(LLMError::Timeout)
        }

        fn provider_name(&self) -> &'static str {
            "canned"
        }
    }

    fn translator(reply: Option<&str>) -> (IntentTranslator, Arc<CannedClient>) {
        let client = Arc::new(CannedClient {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        });
        (IntentTranslator::new(client.clone()), client)
    }

    #[tokio::test]
    async fn sends_system_then_user_message() {
        let (translator, client) = translator(Some("```json\n{\"x\": \"Industry\"}\n```"));
        let raw = translator
            .translate("top 5 industries", "gpt-4o-mini")
            .await
            .unwrap();
        assert_eq!(raw.x, Some(json!("Industry")));
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].model, "gpt-4o-mini");
        let roles: Vec<Role> = seen[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User]);
        assert_eq!(seen[0].messages[1].content, "top 5 industries");
    }

    #[tokio::test]
    async fn non_object_reply_is_malformed() {
        let (translator, _) = translator(Some("[\"Industry\"]"));
        let err = translator.translate("chart", "m").await.unwrap_err();
        assert!(matches!(err, ChartError::MalformedModelOutput { .. }));
    }

    #[tokio::test]
    async fn service_failures_surface_without_retry() {
        let (translator, client) = translator(None);
        let err = translator.translate("chart", "m").await.unwrap_err();
        assert!(matches!(err, ChartError::Llm(LLMError::Timeout)));
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }
}
