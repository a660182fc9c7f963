// Módulos de la aplicación
mod api;
mod app_state;
mod config;
mod error;
mod executor;
mod explain;
mod json_extract;
mod llm;
mod local_llm;
mod models;
mod mongo_client;
mod pipeline;
mod remote_llm;
mod schema;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::app_state::AppState;
use crate::executor::QueryExecutor;
use crate::explain::ResultExplainer;
use crate::mongo_client::MongoStore;
use crate::pipeline::QueryPipeline;
use crate::schema::SchemaIntrospector;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env()?;

    // 3. Conectar a MongoDB (una conexión compartida por todo el proceso)
    let store = MongoStore::connect(&cfg.mongodb_uri, &cfg.mongodb_db_name).await?;
    let shared_store = Arc::new(store.clone());

    // 4. Inicializar gestor de LLMs (backend fijo durante toda la vida del proceso)
    let llm_manager = llm::LlmManager::from_config(&cfg)?;
    info!("Backend LLM para generar consultas: {}", cfg.llm_backend.as_str());
    if !cfg.openai_api_key_present {
        warn!("OPENAI_API_KEY no está definida: las explicaciones usarán el texto de respaldo.");
    }

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        pipeline: QueryPipeline {
            generator: llm_manager.generator.clone(),
            executor: QueryExecutor::new(shared_store.clone()),
            explainer: ResultExplainer::new(llm_manager.chat.clone()),
            introspector: SchemaIntrospector::new(shared_store, cfg.schema_sample_size),
            default_collection: cfg.default_collection.clone(),
            operator_check: cfg.operator_check,
        },
        config: cfg.clone(),
    };

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr).await?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    // 8. Cerrar la conexión a MongoDB
    store.close().await;
    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
