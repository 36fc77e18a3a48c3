pub mod api;
pub mod automation;
pub mod billing;
pub mod db;
pub mod docs;
pub mod models;
pub mod queue;
pub mod reconcile;
pub mod subscription;
pub mod ws;

use actix::Addr;
use sqlx::PgPool;

use crate::api::evolution::EvolutionConfig;
use crate::ws::WsHub;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub evolution: EvolutionConfig,
    pub webhook_base_url: String,
    pub webhook_secret: String,
    pub ws_hub: Addr<WsHub>,
}
