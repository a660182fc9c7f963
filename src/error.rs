//! Taxonomía de errores del pipeline pregunta → consulta → resultados.
//!
//! Sólo la generación y la ejecución pueden abortar una petición; la explicación
//! de resultados nunca produce error (ver `explain`).

use std::time::Duration;
use thiserror::Error;

/// No se pudo obtener una consulta estructurada válida del modelo.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Fallo de la API o de red del backend.
    #[error("Failed to generate query: {0}")]
    Backend(String),

    #[error("Failed to generate query: the model did not answer within {0:?}")]
    Timeout(Duration),

    /// El servidor de inferencia local no acepta conexiones.
    #[error("Local LLM server is not running at {url}. Please start Ollama or llama.cpp server.")]
    LocalServerNotRunning { url: String },

    #[error("Failed to extract JSON query from model response: {raw}")]
    NoJsonFound { raw: String },

    #[error("Failed to generate query: invalid JSON ({reason}) in model response: {raw}")]
    InvalidJson { reason: String, raw: String },

    /// El JSON es válido pero no tiene la forma esperada.
    #[error("Failed to generate query: {0}")]
    InvalidShape(String),

    #[error("Failed to generate query: operator `{0}` is not allowed")]
    DisallowedOperator(String),
}

/// Fallo del driver al ejecutar la consulta.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// El JSON generado no se puede convertir a un documento BSON.
    #[error("Failed to execute query: invalid filter ({0})")]
    InvalidFilter(String),

    #[error("Failed to execute query: {0}")]
    Driver(String),
}

/// Error que aborta una petición completa.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Fallo al listar colecciones o muestrear documentos.
    #[error("Failed to fetch schema: {0}")]
    Introspection(String),
}
