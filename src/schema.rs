//! Inferencia de esquema por muestreo de documentos.
//!
//! Para cada campo se guarda el tipo de la PRIMERA vez que aparece en la
//! muestra; apariciones posteriores con otro tipo se ignoran. Los campos
//! conservan el orden en que se vieron por primera vez.

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use mongodb::bson::{Bson, Document};
use serde::Serialize;

use crate::mongo_client::DocumentStore;

pub const DEFAULT_SAMPLE_SIZE: i64 = 5;

/// Tipo primitivo observado para un campo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    ObjectId,
    Date,
    Null,
    Binary,
    Other,
}

impl From<&Bson> for FieldType {
    fn from(value: &Bson) -> Self {
        match value {
            Bson::String(_) | Bson::Symbol(_) => Self::String,
            Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => {
                Self::Number
            }
            Bson::Boolean(_) => Self::Boolean,
            Bson::Document(_) => Self::Object,
            Bson::Array(_) => Self::Array,
            Bson::ObjectId(_) => Self::ObjectId,
            Bson::DateTime(_) | Bson::Timestamp(_) => Self::Date,
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Binary(_) => Self::Binary,
            _ => Self::Other,
        }
    }
}

/// Campo → tipo inferido, en orden de aparición.
pub type SchemaMap = IndexMap<String, FieldType>;

/// Une las observaciones de cada documento (el primero que ve un campo gana).
/// `None` si no hay documentos.
pub fn infer_schema(samples: &[Document]) -> Option<SchemaMap> {
    if samples.is_empty() {
        return None;
    }

    let mut schema = SchemaMap::new();
    for doc in samples {
        for (key, value) in doc {
            schema
                .entry(key.clone())
                .or_insert_with(|| FieldType::from(value));
        }
    }
    Some(schema)
}

#[derive(Clone)]
pub struct SchemaIntrospector {
    store: Arc<dyn DocumentStore>,
    sample_size: i64,
}

impl SchemaIntrospector {
    pub fn new(store: Arc<dyn DocumentStore>, sample_size: i64) -> Self {
        Self {
            store,
            sample_size: sample_size.max(1),
        }
    }

    /// Esquema de `collection` a partir de hasta `sample_size` documentos
    /// cualesquiera (sin orden explícito).
    pub async fn infer_schema(&self, collection: &str) -> Result<Option<SchemaMap>> {
        let samples = self
            .store
            .find(collection, Document::new(), Some(self.sample_size))
            .await?;
        Ok(infer_schema(&samples))
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.store.list_collection_names().await
    }
}
