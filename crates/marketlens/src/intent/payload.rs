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

use crate::error::{ChartError, Result};
use serde_json::Value;

/// Pulls the JSON value out of a model reply. Fences and a leading `json`
/// tag are stripped first; failing that, the first balanced `{...}` block
/// is tried.
pub fn extract_payload(reply: &str) -> Result<Value> {
    let cleaned = strip_fence(reply);
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }
    if let Some(block) = first_object_block(reply) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Ok(value);
        }
    }
    let reason = match serde_json::from_str::<Value>(cleaned) {
        Err(e) => e.to_string(),
        Ok(_) => "no JSON object found".to_string(),
    };
    Err(ChartError::malformed(reason, reply))
}

fn strip_fence(reply: &str) -> &str {
    let text = reply.trim().trim_matches('`').trim();
    match text.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => text[4..].trim(),
        _ => text,
    }
}

fn first_object_block(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, ch) in content[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_payload_parses() {
        let reply = "```json\n{\"x\": \"Industry\", \"top_n\": 3}\n```";
        assert_eq!(
            extract_payload(reply).unwrap(),
            json!({"x": "Industry", "top_n": 3})
        );
    }

    #[test]
    fn bare_and_prose_wrapped_payloads_parse() {
        assert_eq!(extract_payload(" {\"y\": \"Count\"} ").unwrap(), json!({"y": "Count"}));
        let chatty = "Sure! Here is the chart: {\"title\": \"a } b\", \"x\": \"Age\"} Enjoy.";
        assert_eq!(
            extract_payload(chatty).unwrap(),
            json!({"title": "a } b", "x": "Age"})
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = extract_payload("I cannot help with that").unwrap_err();
        assert!(matches!(
            err,
            ChartError::MalformedModelOutput { payload, .. } if payload == "I cannot help with that"
        ));
        assert!(extract_payload("{\"x\": ").is_err());
    }
}
