//! Extracción y validación del JSON devuelto por el LLM.
//!
//! Los modelos no siempre obedecen "devuelve SÓLO JSON": añaden texto antes o
//! después, o envuelven la respuesta en un bloque ```json. Aquí se localiza el
//! objeto en dos fases (bloque de código primero, luego el primer `{...}` de
//! nivel superior), se parsea y se comprueba su forma antes de dejar que llegue
//! a MongoDB. Nunca se devuelve una consulta vacía o parcial: cualquier fallo es
//! un `GenerationError`.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::GenerationError;
use crate::models::{GenerationResult, StructuredQuery};

const FENCE: &str = "```";

/// Longitud máxima del texto del modelo que se adjunta a un error.
const RAW_SNIPPET_CHARS: usize = 240;

/// Operadores de filtro de sólo lectura permitidos en las consultas generadas,
/// más los envoltorios de Extended JSON.
const ALLOWED_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin",
    "$and", "$or", "$nor", "$not",
    "$exists", "$type",
    "$regex", "$options",
    "$elemMatch", "$size", "$all", "$mod",
    "$text", "$search", "$language", "$caseSensitive", "$diacriticSensitive",
    "$comment",
    "$date", "$oid", "$numberLong", "$numberInt", "$numberDouble", "$numberDecimal",
    "$regularExpression",
];

/// Localiza el objeto JSON dentro de la respuesta libre del modelo.
pub fn extract_json_span(text: &str) -> Result<&str, GenerationError> {
    if let Some(fenced) = find_fenced_object(text) {
        return Ok(fenced);
    }
    find_brace_span(text).ok_or_else(|| GenerationError::NoJsonFound {
        raw: snippet(text),
    })
}

/// Primer bloque ``` (con o sin etiqueta `json`) cuyo contenido es un objeto.
fn find_fenced_object(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let close = after_open.find(FENCE)?;
        let body = strip_json_tag(&after_open[..close]).trim();
        if body.starts_with('{') && body.ends_with('}') {
            return Some(body);
        }
        rest = &after_open[close + FENCE.len()..];
    }
    None
}

fn strip_json_tag(body: &str) -> &str {
    match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &body[4..],
        _ => body,
    }
}

/// Primer `{...}` de nivel superior, respetando cadenas y escapes.
/// Si las llaves no llegan a cerrarse se toma hasta la última `}` y el parseo
/// posterior decidirá.
fn find_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parsea el fragmento extraído y exige que sea un objeto JSON.
pub fn parse_object(span: &str) -> Result<Map<String, Value>, GenerationError> {
    let value: Value = serde_json::from_str(span).map_err(|e| GenerationError::InvalidJson {
        reason: e.to_string(),
        raw: snippet(span),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(GenerationError::InvalidShape(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Salida del backend remoto: `{ "query": {...}, "explanation": "..." }`.
pub fn parse_remote_output(raw: &str) -> Result<GenerationResult, GenerationError> {
    let mut object = parse_object(extract_json_span(raw)?)?;

    let query = match object.remove("query") {
        Some(Value::Object(query)) => query,
        Some(other) => {
            return Err(GenerationError::InvalidShape(format!(
                "field `query` must be an object, got {}",
                json_kind(&other)
            )))
        }
        None => {
            return Err(GenerationError::InvalidShape(
                "model response has no `query` field".to_string(),
            ))
        }
    };

    let explanation = match object.remove("explanation") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => {
            warn!("El modelo no devolvió `explanation`; se usa una descripción genérica.");
            "Generated MongoDB query for the requested data.".to_string()
        }
    };

    Ok(GenerationResult { query, explanation })
}

/// Salida del backend local: el objeto completo ES la consulta.
///
/// Si el modelo imitó el formato remoto (`query` + `explanation` y nada más)
/// se desenvuelve la consulta interior.
pub fn parse_local_output(raw: &str, question: &str) -> Result<GenerationResult, GenerationError> {
    let mut object = parse_object(extract_json_span(raw)?)?;

    // Heurística: sólo se desenvuelve con exactamente esas dos claves; un campo
    // real llamado `query` junto a otros se deja intacto.
    let wrapped = object.len() == 2
        && matches!(object.get("query"), Some(Value::Object(_)))
        && matches!(object.get("explanation"), Some(Value::String(_)));

    if wrapped {
        if let Some(Value::Object(inner)) = object.remove("query") {
            object = inner;
        }
    }

    Ok(GenerationResult {
        query: object,
        explanation: format!("Generated query to find documents matching: {question}"),
    })
}

/// Rechaza cualquier clave `$...` fuera de la lista permitida (recursivo).
pub fn check_operators(query: &StructuredQuery) -> Result<(), GenerationError> {
    for (key, value) in query {
        check_key(key)?;
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &Value) -> Result<(), GenerationError> {
    match value {
        Value::Object(map) => check_operators(map),
        Value::Array(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

fn check_key(key: &str) -> Result<(), GenerationError> {
    if key.starts_with('$') && !ALLOWED_OPERATORS.contains(&key) {
        return Err(GenerationError::DisallowedOperator(key.to_string()));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= RAW_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(RAW_SNIPPET_CHARS).collect();
    out.push('…');
    out
}
