//! Ejecución de la consulta generada como filtro `find` sobre una colección.

use std::sync::Arc;

use mongodb::bson::{Bson, Document};
use serde_json::Value;
use tracing::{error, info};

use crate::error::ExecutionError;
use crate::models::StructuredQuery;
use crate::mongo_client::DocumentStore;

#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn DocumentStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Ejecuta `query` sobre `collection` y devuelve todos los documentos que
    /// coinciden (sin paginación). Una colección inexistente no es un error:
    /// simplemente no devuelve nada.
    pub async fn execute(
        &self,
        collection: &str,
        query: &StructuredQuery,
    ) -> Result<Vec<Document>, ExecutionError> {
        let filter = to_filter(query)?;

        let results = self
            .store
            .find(collection, filter, None)
            .await
            .map_err(|e| {
                error!("Error ejecutando la consulta en '{collection}': {e:#}");
                ExecutionError::Driver(format!("{e:#}"))
            })?;

        info!("La consulta devolvió {} resultados", results.len());
        Ok(results)
    }
}

/// JSON del modelo → documento BSON, interpretando Extended JSON
/// (`{"$date": ...}`, `{"$oid": ...}`).
pub fn to_filter(query: &StructuredQuery) -> Result<Document, ExecutionError> {
    Document::try_from(query.clone()).map_err(|e| ExecutionError::InvalidFilter(e.to_string()))
}

/// Documentos BSON → JSON (Extended JSON relajado) para la respuesta y los prompts.
pub fn to_relaxed_json(documents: &[Document]) -> Vec<Value> {
    documents
        .iter()
        .map(|d| Bson::Document(d.clone()).into_relaxed_extjson())
        .collect()
}
