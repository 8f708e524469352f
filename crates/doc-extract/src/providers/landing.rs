//! LandingAI document parse and extract client

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;

use super::extraction::{DocumentParser, ExtractionClient};
use super::http::{check_status, read_json, send_error};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{
    ContentKind, DocumentReference, ExtractedRecord, ExtractionSchema, FetchedContent,
    IntermediateText, TextFormat,
};

const SERVICE: &str = "landing";

#[derive(Deserialize)]
struct ParseResponse {
    #[serde(default)]
    markdown: Option<String>,
}

/// LandingAI client for both document parsing and structured extraction
pub struct LandingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    parse_model: String,
    retry: RetryPolicy,
}

impl LandingClient {
    /// Create a new LandingAI client
    ///
    /// # Arguments
    /// * `http` - HTTP client carrying the request timeout
    /// * `base_url` - API base, e.g. `https://api.va.landing.ai`
    /// * `api_key` - value sent as `Authorization: Basic <key>`
    /// * `parse_model` - parse model name (e.g. "dpt-2")
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        parse_model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            parse_model: parse_model.into(),
            retry,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/ade/{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("Basic {}", self.api_key)
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response).await
    }

    async fn parse_once(&self, name: &str, content: &FetchedContent) -> Result<String> {
        let document = Part::bytes(content.data.clone())
            .file_name(name.to_string())
            .mime_str(content.kind.mime_type())
            .map_err(|e| Error::internal(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new()
            .part("document", document)
            .text("model", self.parse_model.clone());

        let response = self.post_form("parse", form).await?;
        let parsed: ParseResponse = read_json(SERVICE, response).await?;
        parsed
            .markdown
            .ok_or_else(|| Error::conversion(name, "parse response carried no markdown"))
    }

    async fn extract_once(&self, text: &IntermediateText, schema: &str) -> Result<Value> {
        let markdown = Part::text(text.content.clone())
            .file_name(text.upload_name())
            .mime_str(match text.format {
                TextFormat::Markdown => "text/markdown",
                TextFormat::Plain => "text/plain",
            })
            .map_err(|e| Error::internal(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new()
            .part("markdown", markdown)
            .text("schema", schema.to_string());

        let response = self.post_form("extract", form).await?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl DocumentParser for LandingClient {
    async fn parse(
        &self,
        reference: &DocumentReference,
        content: &FetchedContent,
    ) -> Result<IntermediateText> {
        match content.kind {
            ContentKind::Text => {
                return Ok(IntermediateText::plain(String::from_utf8_lossy(
                    &content.data,
                )))
            }
            ContentKind::Markdown => {
                return Ok(IntermediateText::markdown(String::from_utf8_lossy(
                    &content.data,
                )))
            }
            ContentKind::Unknown => {
                return Err(Error::conversion(
                    &reference.name,
                    "unsupported content type",
                ))
            }
            ContentKind::Pdf | ContentKind::Docx | ContentKind::Html => {}
        }

        tracing::debug!(
            "[{}] Parsing {} with {}",
            reference.name,
            content.kind.display_name(),
            self.parse_model
        );
        let markdown = self
            .retry
            .run("landing parse", || self.parse_once(&reference.name, content))
            .await?;
        Ok(IntermediateText::markdown(markdown))
    }

    fn name(&self) -> &str {
        "landing"
    }
}

#[async_trait]
impl ExtractionClient for LandingClient {
    async fn extract(
        &self,
        text: &IntermediateText,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedRecord> {
        let schema_json = schema.to_json_string();
        let body = self
            .retry
            .run("landing extract", || self.extract_once(text, &schema_json))
            .await?;

        let payload = match body {
            Value::Object(mut map) if map.contains_key("extraction") => map
                .remove("extraction")
                .unwrap_or(Value::Null),
            other => other,
        };
        schema.conform(payload)
    }

    fn name(&self) -> &str {
        "landing"
    }

    fn model(&self) -> &str {
        &self.parse_model
    }
}
