//! Carga y gestión de configuración de la aplicación (MongoDB + LLM).

use std::env;
use anyhow::{anyhow, Result};
use url::Url;

use crate::schema::DEFAULT_SAMPLE_SIZE;

/// Backend de LLM usado para generar las consultas. Se elige una sola vez al arrancar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    /// API de chat alojada (OpenAI).
    Remote,
    /// Servidor de inferencia local (Ollama / llama.cpp).
    Local,
}

impl LlmBackend {
    /// Interpreta el valor de `USE_LOCAL_LLM`: sólo `true` activa el backend local.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(|s| s.trim().to_lowercase()) {
            Some(v) if v == "true" => Self::Local,
            _ => Self::Remote,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub mongodb_db_name: String,
    pub server_addr: String,

    pub llm_backend: LlmBackend,
    pub openai_model: String,
    pub openai_api_key_present: bool,
    pub local_llm_url: String,
    pub local_model_name: String,

    pub default_collection: String,
    pub schema_sample_size: i64,
    pub operator_check: bool,
    pub app_env: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria (útil en tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mongodb_uri = var("MONGODB_URI")
            .ok_or_else(|| anyhow!("Falta MONGODB_URI en el entorno"))?;
        let mongodb_db_name = var("MONGODB_DB_NAME")
            .ok_or_else(|| anyhow!("Falta MONGODB_DB_NAME en el entorno"))?;

        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let llm_backend = LlmBackend::from_flag(var("USE_LOCAL_LLM").as_deref());
        let openai_model = var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".to_string());
        let openai_api_key_present = var("OPENAI_API_KEY").is_some();

        let local_llm_url =
            var("LOCAL_LLM_URL").unwrap_or_else(|| "http://localhost:11434".to_string());
        let parsed = Url::parse(&local_llm_url)
            .map_err(|e| anyhow!("LOCAL_LLM_URL inválida ({local_llm_url}): {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "LOCAL_LLM_URL debe empezar por http:// o https:// ({local_llm_url})"
            ));
        }
        let local_model_name =
            var("LOCAL_MODEL_NAME").unwrap_or_else(|| "llama3-mongodb".to_string());

        let default_collection =
            var("DEFAULT_COLLECTION").unwrap_or_else(|| "tickets".to_string());

        let schema_sample_size = match var("SCHEMA_SAMPLE_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| anyhow!("SCHEMA_SAMPLE_SIZE debe ser un entero >= 1 ({raw})"))?,
            None => DEFAULT_SAMPLE_SIZE,
        };

        let operator_check = var("QUERY_OPERATOR_CHECK")
            .map(|v| v.trim().to_lowercase() != "false")
            .unwrap_or(true);

        let app_env = var("APP_ENV").unwrap_or_else(|| "production".to_string());

        Ok(Self {
            mongodb_uri,
            mongodb_db_name,
            server_addr,
            llm_backend,
            openai_model,
            openai_api_key_present,
            local_llm_url,
            local_model_name,
            default_collection,
            schema_sample_size,
            operator_check,
            app_env,
        })
    }

    /// En desarrollo se devuelve el detalle de los errores al cliente.
    pub fn expose_error_details(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}
