//! Conexión a MongoDB y acceso de sólo lectura a colecciones.
//!
//! `MongoStore` es el contexto de conexión: se abre una vez al arrancar, se
//! comparte entre peticiones (el driver gestiona su propio pool) y se cierra
//! explícitamente al apagar el servidor.

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};
use tracing::info;

/// Operaciones de lectura que necesitan el ejecutor y el introspector.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documentos de `collection` que cumplen `filter`, en el orden que
    /// devuelva el servidor. `limit` acota el número de documentos.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>>;

    async fn list_collection_names(&self) -> Result<Vec<String>>;
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Conectando a MongoDB (base de datos '{db_name}')...");
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await?;
        info!("Conexión a MongoDB OK");
        Ok(Self { client, db })
    }

    pub async fn close(self) {
        self.client.shutdown().await;
        info!("Conexión a MongoDB cerrada");
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let coll = self.db.collection::<Document>(collection);
        let cursor = match limit {
            Some(n) => coll.find(filter).limit(n).await?,
            None => coll.find(filter).await?,
        };
        Ok(cursor.try_collect().await?)
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }
}
