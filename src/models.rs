//! Modelos de dominio (consultas generadas) y payloads de la API HTTP.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::SchemaMap;

/// Filtro MongoDB tal y como lo produce el modelo: campo → condición.
/// Se ejecuta literalmente, sin interpretarlo más allá de su validez sintáctica.
pub type StructuredQuery = Map<String, Value>;

/// Resultado de la generación: la consulta y qué hace.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub query: StructuredQuery,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub question: Option<String>,
    pub collection: Option<String>,
}

/// Respuesta completa de `POST /api/query`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub question: String,
    pub query: StructuredQuery,
    pub query_explanation: String,
    pub result_count: usize,
    pub results: Vec<Value>,
    pub explanation: String,
}

/// Respuesta de `GET /api/query/schema`.
#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub collections: Vec<String>,
    pub schemas: IndexMap<String, Option<SchemaMap>>,
}

/// Cuerpo de error común a todos los endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
