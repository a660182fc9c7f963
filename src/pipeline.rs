//! Orquestación de una consulta en lenguaje natural.
//!
//! Flujo:
//!   1. El LLM traduce la pregunta a un filtro MongoDB (fallo = fin de la petición).
//!   2. Se valida el filtro (operadores permitidos) y se ejecuta (fallo = fin).
//!   3. El LLM explica los resultados (fallo = texto de respaldo, nunca error).
//!
//! Las etapas se ejecutan en secuencia; no se devuelven resultados parciales.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::executor::{self, QueryExecutor};
use crate::explain::ResultExplainer;
use crate::json_extract;
use crate::llm::QueryGenerator;
use crate::models::{QueryResponse, SchemaResponse};
use crate::schema::SchemaIntrospector;

#[derive(Clone)]
pub struct QueryPipeline {
    pub generator: Arc<dyn QueryGenerator>,
    pub executor: QueryExecutor,
    pub explainer: ResultExplainer,
    pub introspector: SchemaIntrospector,
    pub default_collection: String,
    pub operator_check: bool,
}

impl QueryPipeline {
    /// Pregunta → consulta → resultados → explicación.
    pub async fn run(
        &self,
        question: Option<&str>,
        collection: Option<&str>,
    ) -> Result<QueryResponse, PipelineError> {
        // Se valida sobre el texto recortado; la respuesta devuelve el original.
        let raw_question = question.unwrap_or_default();
        let question = raw_question.trim();
        if question.is_empty() {
            return Err(PipelineError::Validation("Question is required".to_string()));
        }

        let collection = collection
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.default_collection.as_str());

        let span = info_span!("nl_query", request_id = %Uuid::new_v4(), collection);
        self.run_stages(raw_question, question, collection)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        raw_question: &str,
        question: &str,
        collection: &str,
    ) -> Result<QueryResponse, PipelineError> {
        info!("Pregunta recibida: {question}");

        // 1) Generar la consulta
        let generated = self.generator.generate(question, collection).await?;
        if self.operator_check {
            json_extract::check_operators(&generated.query)?;
        }
        info!(
            "Consulta generada: {}",
            serde_json::Value::Object(generated.query.clone())
        );

        // 2) Ejecutarla
        let documents = self.executor.execute(collection, &generated.query).await?;
        let results = executor::to_relaxed_json(&documents);

        // 3) Explicar los resultados
        let explanation = self
            .explainer
            .explain(question, &generated.query, &results)
            .await;

        Ok(QueryResponse {
            success: true,
            question: raw_question.to_string(),
            query: generated.query,
            query_explanation: generated.explanation,
            result_count: results.len(),
            results,
            explanation,
        })
    }

    /// Colecciones de la base de datos con el esquema inferido de cada una.
    pub async fn schema_overview(&self) -> Result<SchemaResponse, PipelineError> {
        let collections = self
            .introspector
            .list_collections()
            .await
            .map_err(|e| PipelineError::Introspection(format!("{e:#}")))?;

        let mut schemas = IndexMap::new();
        for name in &collections {
            let schema = self
                .introspector
                .infer_schema(name)
                .await
                .map_err(|e| PipelineError::Introspection(format!("{e:#}")))?;
            schemas.insert(name.clone(), schema);
        }

        Ok(SchemaResponse {
            success: true,
            collections,
            schemas,
        })
    }
}
