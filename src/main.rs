// src/main.rs
use actix::Actor;
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use barberflow::api::evolution::EvolutionConfig;
use barberflow::{AppState, api, docs, queue, ws};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let evolution = EvolutionConfig {
        base_url: env::var("EVOLUTION_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        api_key: env::var("EVOLUTION_API_KEY").expect("EVOLUTION_API_KEY required"),
    };

    let webhook_base_url =
        env::var("WEBHOOK_BASE_URL").unwrap_or_else(|_| "https://your-domain.com".to_string());
    let webhook_secret = env::var("WEBHOOK_SECRET").expect("WEBHOOK_SECRET required");

    let ws_hub = ws::WsHub::new().start();

    queue::start_reconcile_queue(
        pool.clone(),
        evolution.clone(),
        webhook_base_url.clone(),
        ws_hub.clone(),
    )
    .await;

    let state = web::Data::new(AppState {
        pool,
        evolution,
        webhook_base_url,
        webhook_secret,
        ws_hub,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Dashboard push channel (token in query string)
            .route("/ws/instances", web::get().to(ws::instances_ws))
            // Gateway callbacks (public, secret-checked)
            .service(api::webhooks::whatsapp_webhook)
            // Tenant-scoped API
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::billing::billing_summary)
                    .service(api::subscriptions::list_subscriptions)
                    .service(api::subscriptions::create_subscription)
                    .service(api::subscriptions::cancel_subscription)
                    .service(api::subscriptions::renew_subscription)
                    .service(api::subscriptions::use_subscription_service)
                    .service(api::subscriptions::validate_service_usage)
                    .service(api::subscriptions::list_plans)
                    .service(api::subscriptions::create_plan)
                    .service(api::automation::list_rules)
                    .service(api::automation::create_rule)
                    .service(api::automation::run_automation)
                    .service(api::instances::instance_status)
                    .service(api::instances::connect_instance)
                    .service(api::instances::reconcile_instance)
                    .service(api::instances::restart_instance)
                    .service(api::instances::disconnect_instance),
            )
    })
    .bind(("0.0.0.0", 8065))?
    .run()
    .await
}
