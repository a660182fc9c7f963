//! Backend remoto: API de chat de OpenAI a través de Rig.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use tracing::{debug, error, instrument};

use crate::config::LlmBackend;
use crate::error::GenerationError;
use crate::json_extract;
use crate::llm::{ChatModel, ChatRequest, QueryGenerator};
use crate::models::GenerationResult;

const SYSTEM_PROMPT: &str =
    "You are a MongoDB query generation assistant. Always respond with valid JSON only.";

const SAMPLE_SCHEMA: &str = r#"{
  "_id": ObjectId,
  "title": String,
  "description": String,
  "status": String (e.g., "open", "in_progress", "closed"),
  "priority": String (e.g., "low", "medium", "high"),
  "assignee": String,
  "createdAt": Date,
  "updatedAt": Date,
  "tags": Array of Strings
}"#;

const GENERATION_TEMPERATURE: f64 = 0.1;
const GENERATION_MAX_TOKENS: u64 = 1000;

/// Modelo de chat de OpenAI (cliente de Rig).
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    model: String,
    api_key_present: bool,
}

impl OpenAiChat {
    pub fn new(model: String, api_key_present: bool) -> Self {
        Self {
            model,
            api_key_present,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::client::ProviderClient as _;
        use rig::providers::openai;

        // `from_env` entra en pánico sin clave: se comprueba antes.
        if !self.api_key_present {
            return Err(anyhow!("OPENAI_API_KEY is not configured"));
        }

        let client = openai::Client::from_env();
        let agent = client
            .agent(&self.model)
            .preamble(request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build();

        let answer = agent.prompt(request.prompt).await?;
        Ok(answer.trim().to_string())
    }
}

/// Generador remoto: pide al modelo `{ "query", "explanation" }`.
pub struct RemoteQueryGenerator {
    chat: Arc<dyn ChatModel>,
}

impl RemoteQueryGenerator {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl QueryGenerator for RemoteQueryGenerator {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Remote
    }

    async fn generate(
        &self,
        question: &str,
        collection: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let prompt = build_prompt(question, collection);

        let content = self
            .chat
            .chat(ChatRequest {
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: GENERATION_TEMPERATURE,
                max_tokens: GENERATION_MAX_TOKENS,
            })
            .await
            .map_err(|e| {
                error!("Error generando la consulta con el LLM remoto: {e:#}");
                GenerationError::Backend(format!("{e:#}"))
            })?;

        debug!("Respuesta del LLM remoto: {content}");
        json_extract::parse_remote_output(&content)
    }
}

fn build_prompt(question: &str, collection: &str) -> String {
    format!(
        r#"You are a MongoDB query expert. Convert the following natural language question into a MongoDB query.

Collection: {collection}

Sample Schema:
{SAMPLE_SCHEMA}

Question: {question}

Return ONLY a valid JSON object with two fields:
1. "query": The MongoDB query object (using proper MongoDB query syntax)
2. "explanation": A brief explanation of what the query does

Example format:
{{
  "query": {{ "status": "open", "priority": "high" }},
  "explanation": "This query finds all documents where status is 'open' and priority is 'high'"
}}

Important:
- Use proper MongoDB operators like $gt, $lt, $gte, $lte, $in, $regex, etc.
- For date ranges, use Extended JSON dates like {{ "$date": "2024-01-01T00:00:00Z" }}
- Return ONLY the JSON, no additional text"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedChat;
    use serde_json::{json, Value};

    #[test]
    fn prompt_names_collection_and_question() {
        let prompt = build_prompt("show open tickets", "incidents");
        assert!(prompt.contains("Collection: incidents"));
        assert!(prompt.contains("Question: show open tickets"));
        assert!(prompt.contains("\"explanation\""));
    }

    #[tokio::test]
    async fn parses_answer_wrapped_in_prose() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "Here you go:\n```json\n{\"query\":{\"status\":\"open\"},\"explanation\":\"Open tickets\"}\n```"
                .to_string(),
        )]));
        let generator = RemoteQueryGenerator::new(chat.clone());

        let result = generator.generate("open tickets", "tickets").await.unwrap();
        assert_eq!(Value::Object(result.query), json!({"status": "open"}));
        assert_eq!(result.explanation, "Open tickets");

        let calls = chat.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, SYSTEM_PROMPT);
        assert_eq!(calls[0].temperature, GENERATION_TEMPERATURE);
        assert_eq!(calls[0].max_tokens, GENERATION_MAX_TOKENS);
    }

    #[tokio::test]
    async fn api_failures_become_generation_errors() {
        let chat = Arc::new(ScriptedChat::new(vec![Err("rate limited".to_string())]));
        let generator = RemoteQueryGenerator::new(chat);

        let err = generator.generate("anything", "tickets").await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(ref msg) if msg.contains("rate limited")));
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error_not_a_panic() {
        let chat = OpenAiChat::new("gpt-4".to_string(), false);
        let err = chat
            .chat(ChatRequest {
                system: "s",
                prompt: "p",
                temperature: 0.1,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
