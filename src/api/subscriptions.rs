// src/api/subscriptions.rs

use actix_web::{HttpResponse, Responder, get, post, web};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;

use crate::subscription::{self, SubscriptionError};
use crate::{AppState, db};

fn error_response(e: SubscriptionError) -> HttpResponse {
    match e {
        SubscriptionError::Db(e) => {
            log::error!("subscription db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
        SubscriptionError::NotFound | SubscriptionError::PlanNotFound => {
            HttpResponse::NotFound().json(json!({ "error": e.to_string() }))
        }
        other => HttpResponse::BadRequest().json(json!({ "error": other.to_string() })),
    }
}

#[get("/subscriptions")]
pub async fn list_subscriptions(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    match db::list_subscriptions(&state.pool, *barbershop_id).await {
        Ok(subs) => HttpResponse::Ok().json(subs),
        Err(e) => {
            log::error!("list_subscriptions db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    pub client_id: i32,
    pub plan_id: i32,
}

/// Creates an active subscription for the plan's provider. Rejected when the
/// client already has an active subscription with that provider.
#[utoipa::path(
    post,
    path = "/api/subscriptions",
    tag = "subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription created", body = crate::models::ClientSubscription),
        (status = 400, description = "Business rule violation"),
        (status = 404, description = "Plan not found")
    )
)]
#[post("/subscriptions")]
pub async fn create_subscription(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    payload: web::Json<CreateSubscriptionRequest>,
) -> impl Responder {
    match subscription::create_subscription(
        &state.pool,
        *barbershop_id,
        payload.client_id,
        payload.plan_id,
    )
    .await
    {
        Ok(sub) => HttpResponse::Ok().json(sub),
        Err(e) => error_response(e),
    }
}

#[post("/subscriptions/{id}/cancel")]
pub async fn cancel_subscription(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    match subscription::cancel_subscription(&state.pool, *barbershop_id, path.into_inner()).await {
        Ok(sub) => HttpResponse::Ok().json(sub),
        Err(e) => error_response(e),
    }
}

#[post("/subscriptions/{id}/renew")]
pub async fn renew_subscription(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    match subscription::renew_subscription(&state.pool, *barbershop_id, path.into_inner()).await {
        Ok(sub) => HttpResponse::Ok().json(sub),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UseServiceRequest {
    pub service_id: Option<i32>,
    pub appointment_id: Option<i32>,
}

#[post("/subscriptions/{id}/use")]
pub async fn use_subscription_service(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<UseServiceRequest>,
) -> impl Responder {
    match subscription::use_subscription_service(
        &state.pool,
        *barbershop_id,
        path.into_inner(),
        payload.service_id,
        payload.appointment_id,
    )
    .await
    {
        Ok(usage) => HttpResponse::Ok().json(usage),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateUsageRequest {
    pub client_id: i32,
    pub service_id: i32,
}

/// Zero-price checkout gate.
#[utoipa::path(
    post,
    path = "/api/subscriptions/validate",
    tag = "subscriptions",
    request_body = ValidateUsageRequest,
    responses(
        (status = 200, description = "Validation outcome", body = subscription::UsageValidation)
    )
)]
#[post("/subscriptions/validate")]
pub async fn validate_service_usage(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    payload: web::Json<ValidateUsageRequest>,
) -> impl Responder {
    match subscription::validate_service_usage(
        &state.pool,
        *barbershop_id,
        payload.client_id,
        payload.service_id,
    )
    .await
    {
        Ok(validation) => HttpResponse::Ok().json(validation),
        Err(e) => {
            log::error!("validate_service_usage db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// ---------- plans ----------

#[get("/subscription-plans")]
pub async fn list_plans(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    match db::list_plans(&state.pool, *barbershop_id).await {
        Ok(plans) => HttpResponse::Ok().json(plans),
        Err(e) => {
            log::error!("list_plans db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePlanRequest {
    pub provider_id: i32,
    pub name: String,
    pub monthly_price: Decimal,
    pub included_services_count: i32,
    pub commission_percentage: Decimal,
    /// Accepts a JSON array or a JSON-encoded string of one; normalized to a
    /// typed array before it ever reaches the database.
    pub enabled_service_ids: Option<serde_json::Value>,
}

#[post("/subscription-plans")]
pub async fn create_plan(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    payload: web::Json<CreatePlanRequest>,
) -> impl Responder {
    let barbershop_id = *barbershop_id;
    let payload = payload.into_inner();

    if payload.name.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "plan name is required" }));
    }
    if payload.included_services_count < 0 {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "included_services_count must not be negative" }));
    }

    // the provider must belong to this barbershop
    let provider = match sqlx::query("SELECT id FROM providers WHERE id = $1 AND barbershop_id = $2")
        .bind(payload.provider_id)
        .bind(barbershop_id)
        .fetch_optional(&state.pool)
        .await
    {
        Ok(row) => row,
        Err(e) => {
            log::error!("create_plan provider lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if provider.is_none() {
        return HttpResponse::BadRequest().json(json!({ "error": "invalid provider" }));
    }

    let enabled_ids = payload
        .enabled_service_ids
        .as_ref()
        .map(subscription::normalize_service_ids)
        .unwrap_or_default();

    let row = match sqlx::query(
        r#"INSERT INTO subscription_plans
               (barbershop_id, provider_id, name, monthly_price, included_services_count,
                commission_percentage, enabled_service_ids)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING id"#,
    )
    .bind(barbershop_id)
    .bind(payload.provider_id)
    .bind(payload.name.trim())
    .bind(payload.monthly_price)
    .bind(payload.included_services_count)
    .bind(payload.commission_percentage)
    .bind(&enabled_ids)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("create_plan insert error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let plan_id: i32 = row.get("id");

    match db::get_plan(&state.pool, barbershop_id, plan_id).await {
        Ok(Some(plan)) => HttpResponse::Ok().json(plan),
        Ok(None) => HttpResponse::InternalServerError().finish(),
        Err(e) => {
            log::error!("create_plan reload error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
