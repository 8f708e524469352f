//! OpenAI-compatible chat completions client for JSON extraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extraction::ExtractionClient;
use super::http::{check_status, read_json, send_error};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{ExtractedRecord, ExtractionSchema, IntermediateText};

const SERVICE: &str = "openai";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client constrained to JSON object output
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            retry,
        }
    }

    fn system_prompt(schema: &ExtractionSchema) -> String {
        let pretty = serde_json::to_string_pretty(schema.as_json())
            .unwrap_or_else(|_| schema.to_json_string());
        format!(
            "You extract structured data from documents. \
             Return only valid JSON matching the following schema:\n{}",
            pretty
        )
    }

    async fn complete_once(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let chat: ChatResponse = read_json(SERVICE, response).await?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::schema_violation("completion carried no message content"))
    }
}

#[async_trait]
impl ExtractionClient for OpenAiClient {
    async fn extract(
        &self,
        text: &IntermediateText,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedRecord> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Self::system_prompt(schema),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Extract the record from the following document:\n\n{}",
                        text.content
                    ),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.0,
        };

        let content = self
            .retry
            .run("openai extract", || self.complete_once(&request))
            .await?;

        let payload: Value = serde_json::from_str(&content).map_err(|e| {
            Error::schema_violation(format!("completion is not valid JSON: {}", e))
        })?;
        schema.conform(payload)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::serve;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use std::time::Duration;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::from_value(json!({
            "type": "object",
            "properties": {"patient_name": {"type": "string"}, "test_date": {"type": "string"}},
            "required": ["patient_name"]
        }))
        .unwrap()
    }

    async fn client_answering(content: &'static str) -> OpenAiClient {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "gpt-4o-mini");
                assert_eq!(body["temperature"], 0.0);
                assert_eq!(body["response_format"]["type"], "json_object");
                assert!(body["messages"][0]["content"]
                    .as_str()
                    .unwrap()
                    .contains("patient_name"));
                Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
            }),
        );
        OpenAiClient::new(
            reqwest::Client::new(),
            serve(app).await,
            "sk-test",
            "gpt-4o-mini",
            RetryPolicy::new(3, Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_extract_json_completion() {
        let client = client_answering(r#"{"patient_name": "Jane Doe"}"#).await;
        let record = client
            .extract(&IntermediateText::plain("Patient: Jane Doe"), &schema())
            .await
            .unwrap();

        assert_eq!(record.get_str("patient_name"), Some("Jane Doe"));
        assert_eq!(record.get_str("test_date"), Some(""));
    }

    #[tokio::test]
    async fn test_invalid_json_is_schema_violation() {
        let client = client_answering("Jane Doe, negative").await;
        let err = client
            .extract(&IntermediateText::plain("Patient: Jane Doe"), &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_schema_violation() {
        let client = client_answering(r#"{"test_date": "2024-03-01"}"#).await;
        let err = client
            .extract(&IntermediateText::plain("no name here"), &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
    }
}
