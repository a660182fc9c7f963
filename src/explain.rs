//! Explicación en lenguaje natural de los resultados de una consulta.
//!
//! Es la única etapa que degrada en vez de fallar: si el LLM no responde se
//! devuelve una frase fija calculada sólo a partir del número de resultados.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::warn;

use crate::llm::{ChatModel, ChatRequest};
use crate::models::StructuredQuery;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that explains database results in clear, simple language.";

/// Documentos que se incluyen en el prompt como máximo.
const MAX_RESULTS_IN_PROMPT: usize = 10;

const EXPLAIN_TEMPERATURE: f64 = 0.7;
const EXPLAIN_MAX_TOKENS: u64 = 500;

#[derive(Clone)]
pub struct ResultExplainer {
    chat: Arc<dyn ChatModel>,
}

impl ResultExplainer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Resume `results` respondiendo a `question`. Nunca falla.
    pub async fn explain(
        &self,
        question: &str,
        query: &StructuredQuery,
        results: &[Value],
    ) -> String {
        match self.ask_model(question, query, results).await {
            Ok(text) => text,
            Err(e) => {
                warn!("No se pudo explicar el resultado con el LLM, se usa el texto de respaldo: {e:#}");
                fallback_explanation(results.len())
            }
        }
    }

    async fn ask_model(
        &self,
        question: &str,
        query: &StructuredQuery,
        results: &[Value],
    ) -> Result<String> {
        let prompt = build_prompt(question, query, results)?;
        let text = self
            .chat
            .chat(ChatRequest {
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: EXPLAIN_TEMPERATURE,
                max_tokens: EXPLAIN_MAX_TOKENS,
            })
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("empty explanation from model"));
        }
        Ok(text.to_string())
    }
}

/// Texto determinista usado cuando el modelo no está disponible.
pub fn fallback_explanation(result_count: usize) -> String {
    let detail = if result_count > 0 {
        "The query successfully retrieved the requested data from the database."
    } else {
        "No matching records were found for your query."
    };
    format!("Found {result_count} results matching your query. {detail}")
}

fn build_prompt(question: &str, query: &StructuredQuery, results: &[Value]) -> Result<String> {
    let query_json = serde_json::to_string_pretty(query)?;
    let shown = &results[..results.len().min(MAX_RESULTS_IN_PROMPT)];
    let results_json = serde_json::to_string_pretty(shown)?;

    Ok(format!(
        r#"You are a helpful assistant explaining database query results to users.

User's Question: {question}

MongoDB Query Executed: {query_json}

Number of Results: {count}

Results (showing first {MAX_RESULTS_IN_PROMPT}):
{results_json}

Provide a clear, concise explanation to the user about:
1. What data was found
2. Key insights from the results
3. Answer to their original question

Keep the explanation conversational and user-friendly. Focus on the most relevant information."#,
        count = results.len(),
    ))
}
