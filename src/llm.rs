//! Abstracción sobre los backends de LLM.
//!
//! - [`ChatModel`]: completado de texto con mensajes system/user (Rig + OpenAI).
//! - [`QueryGenerator`]: pregunta → consulta MongoDB. Dos implementaciones,
//!   remota ([`RemoteQueryGenerator`]) y local ([`LocalQueryGenerator`]); se elige
//!   una al arrancar según la configuración y no cambia durante la vida del proceso.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::{AppConfig, LlmBackend};
use crate::error::GenerationError;
use crate::local_llm::LocalQueryGenerator;
use crate::models::GenerationResult;
use crate::remote_llm::{OpenAiChat, RemoteQueryGenerator};

/// Parámetros de una llamada de chat.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Modelo de chat capaz de responder a un prompt con un único mensaje.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String>;
}

/// Traduce una pregunta en lenguaje natural a una consulta estructurada.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    fn backend(&self) -> LlmBackend;

    async fn generate(
        &self,
        question: &str,
        collection: &str,
    ) -> Result<GenerationResult, GenerationError>;

    /// Estado del servidor del modelo, si el backend sabe comprobarlo.
    /// Nunca falla: los problemas se devuelven como datos.
    async fn check_health(&self) -> Option<HealthReport> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Resultado de un health check del backend local.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: String,
}

impl HealthReport {
    pub fn healthy(models: Vec<Value>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            models: Some(models),
            error: None,
            checked_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            models: None,
            error: Some(error.into()),
            checked_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Gestor de LLMs: el generador de consultas elegido y el modelo de chat
/// usado para explicar resultados.
#[derive(Clone)]
pub struct LlmManager {
    pub generator: Arc<dyn QueryGenerator>,
    pub chat: Arc<dyn ChatModel>,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(
            cfg.openai_model.clone(),
            cfg.openai_api_key_present,
        ));

        let generator: Arc<dyn QueryGenerator> = match cfg.llm_backend {
            LlmBackend::Remote => Arc::new(RemoteQueryGenerator::new(chat.clone())),
            LlmBackend::Local => Arc::new(LocalQueryGenerator::new(
                &cfg.local_llm_url,
                &cfg.local_model_name,
            )?),
        };

        Ok(Self { generator, chat })
    }
}
