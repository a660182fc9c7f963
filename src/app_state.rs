use crate::{config::AppConfig, pipeline::QueryPipeline};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: QueryPipeline,
}
