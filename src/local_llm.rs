//! Backend local: servidor de inferencia compatible con la API de Ollama.
//!
//! - `POST {base}/api/generate` — generación síncrona (`stream=false`), timeout 30s
//! - `GET  {base}/api/tags`     — listado de modelos para el health check, timeout 5s

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::config::LlmBackend;
use crate::error::GenerationError;
use crate::json_extract;
use crate::llm::{HealthReport, QueryGenerator};
use crate::models::GenerationResult;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Generador que llama a un modelo ajustado servido en local.
pub struct LocalQueryGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    url_generate: String,
    url_tags: String,
}

impl LocalQueryGenerator {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let base = base_url.trim().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            url_generate: format!("{base}/api/generate"),
            url_tags: format!("{base}/api/tags"),
            base_url: base,
            model: model.to_string(),
        })
    }

    async fn fetch_tags(&self) -> reqwest::Result<TagsResponse> {
        self.client
            .get(&self.url_tags)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<TagsResponse>()
            .await
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_connect() {
            error!("El servidor LLM local no responde en {}", self.base_url);
            GenerationError::LocalServerNotRunning {
                url: self.base_url.clone(),
            }
        } else if err.is_timeout() {
            error!("Timeout esperando al servidor LLM local ({GENERATE_TIMEOUT:?})");
            GenerationError::Timeout(GENERATE_TIMEOUT)
        } else {
            error!("Error de transporte con el servidor LLM local: {err}");
            GenerationError::Backend(err.to_string())
        }
    }
}

#[async_trait]
impl QueryGenerator for LocalQueryGenerator {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Local
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        question: &str,
        collection: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let prompt = build_prompt(question, collection);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.1,
                top_p: 0.9,
                max_tokens: 500,
            },
        };

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "HTTP {status} from {}: {}",
                self.url_generate,
                json_extract::snippet(&text)
            )));
        }

        let out: GenerateResponse = resp.json().await.map_err(|e| {
            GenerationError::Backend(format!(
                "could not decode local LLM response: {e}; expected `{{ response: string }}`"
            ))
        })?;

        debug!("Respuesta del LLM local: {}", out.response);
        json_extract::parse_local_output(out.response.trim(), question)
    }

    async fn check_health(&self) -> Option<HealthReport> {
        Some(match self.fetch_tags().await {
            Ok(tags) => HealthReport::healthy(tags.models),
            Err(e) => {
                warn!("Health check del LLM local fallido: {e}");
                HealthReport::unhealthy(e.to_string())
            }
        })
    }
}

fn build_prompt(question: &str, collection: &str) -> String {
    format!(
        "<|begin_of_text|><|start_header_id|>system<|end_header_id|>

You are a MongoDB query expert. Convert natural language questions to MongoDB queries. Return ONLY a valid JSON object with the MongoDB query, no additional text.<|eot_id|><|start_header_id|>user<|end_header_id|>

Convert the following question to a MongoDB query for the \"{collection}\" collection.

Question: {question}

Return ONLY the MongoDB query as a JSON object.<|eot_id|><|start_header_id|>assistant<|end_header_id|>

"
    )
}

/* ==========================
HTTP payloads & options
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<Value>,
}
