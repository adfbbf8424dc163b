use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::{CapabilityError, SecretValue};

/// JSON schema the model output must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Result<Self, CapabilityError> {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|err| CapabilityError::Configuration(format!("schema export: {err}")))?;
        Ok(Self {
            name: name.into(),
            schema,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub response_schema: Option<ResponseSchema>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            response_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// A text-generation backend. Free text when no schema is attached, JSON otherwise.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError>;
}

/// Request output shaped like `T` and parse it. Schema violations surface as
/// [`CapabilityError::MalformedOutput`].
pub async fn generate_structured<T>(
    model: &dyn LanguageModel,
    schema_name: &str,
    system: impl Into<String>,
    user: impl Into<String>,
) -> Result<T, CapabilityError>
where
    T: JsonSchema + DeserializeOwned,
{
    let request =
        GenerationRequest::new(system, user).with_schema(ResponseSchema::for_type::<T>(schema_name)?);
    let raw = model.generate(request).await?;
    serde_json::from_str(strip_code_fence(&raw)).map_err(|err| {
        CapabilityError::MalformedOutput(format!("{schema_name} from {}: {err}", model.model_name()))
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_end();
    let body = rest.strip_suffix("```").unwrap_or(rest);
    match body.split_once('\n') {
        Some((info, content)) if !info.trim_start().starts_with(['{', '[']) => content.trim(),
        // Single-line fence, possibly with a language tag: ```json {"a":1}```
        _ => body.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim(),
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretValue,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: SecretValue,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CapabilityError::Configuration(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(name = "llm.generate", skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError> {
        let mut body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if let Some(schema) = request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": false,
                },
            });
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| CapabilityError::MalformedOutput(err.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CapabilityError::MalformedOutput("completion had no content".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Verdict {
        approved: bool,
    }

    struct Canned(&'static str);

    #[async_trait]
    impl LanguageModel for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, CapabilityError> {
            assert!(request.response_schema.is_some());
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn strips_single_line_fences() {
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn schema_lists_struct_fields() {
        let schema = ResponseSchema::for_type::<Verdict>("verdict").expect("schema");
        assert_eq!(schema.schema["properties"]["approved"]["type"], "boolean");
    }

    #[tokio::test]
    async fn structured_output_parses_or_reports_malformed() {
        let ok: Verdict = generate_structured(&Canned("{\"approved\": true}"), "verdict", "s", "u")
            .await
            .expect("valid json");
        assert!(ok.approved);

        let err = generate_structured::<Verdict>(&Canned("sure, approved"), "verdict", "s", "u")
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedOutput(_)));
    }
}
