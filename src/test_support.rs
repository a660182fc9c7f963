//! Dobles de prueba para el LLM y para MongoDB.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mongodb::bson::Document;

use crate::llm::{ChatModel, ChatRequest};
use crate::mongo_client::DocumentStore;

#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub system: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Modelo de chat que devuelve respuestas preparadas, en orden.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedChat>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedChat> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedChat {
            system: request.system.to_string(),
            prompt: request.prompt.to_string(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        });
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

/// Almacén en memoria: ignora el filtro, aplica `limit` y registra las llamadas.
#[derive(Default)]
pub struct FakeStore {
    any_collection: Vec<Document>,
    collections: BTreeMap<String, Vec<Document>>,
    failure: Option<String>,
    finds: Mutex<Vec<(String, Document, Option<i64>)>>,
}

impl FakeStore {
    /// Los mismos documentos para cualquier colección.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            any_collection: documents,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.insert(name.to_string(), documents);
        self
    }

    pub fn last_find(&self) -> Option<(String, Document, Option<i64>)> {
        self.finds.lock().unwrap().last().cloned()
    }

    pub fn find_count(&self) -> usize {
        self.finds.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        self.finds
            .lock()
            .unwrap()
            .push((collection.to_string(), filter, limit));

        if let Some(msg) = &self.failure {
            return Err(anyhow!(msg.clone()));
        }

        let docs = self
            .collections
            .get(collection)
            .unwrap_or(&self.any_collection);
        let take = limit.map(|n| n.max(0) as usize).unwrap_or(docs.len());
        Ok(docs.iter().take(take).cloned().collect())
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        if let Some(msg) = &self.failure {
            return Err(anyhow!(msg.clone()));
        }
        Ok(self.collections.keys().cloned().collect())
    }
}
