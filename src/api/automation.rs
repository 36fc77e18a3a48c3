// src/api/automation.rs

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;

use crate::automation::{self, RuleType};
use crate::models::AutomationRule;
use crate::AppState;

#[get("/automation/rules")]
pub async fn list_rules(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let rows = match sqlx::query(
        r#"SELECT id, barbershop_id, rule_type, name, message_template,
                  send_whatsapp, notify_staff, is_active, created_at
           FROM automation_rules
           WHERE barbershop_id = $1
           ORDER BY id ASC"#,
    )
    .bind(*barbershop_id)
    .fetch_all(&state.pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            log::error!("list_rules db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let rules: Vec<AutomationRule> = rows
        .into_iter()
        .map(|r| AutomationRule {
            id: r.get("id"),
            barbershop_id: r.get("barbershop_id"),
            rule_type: r.get("rule_type"),
            name: r.get("name"),
            message_template: r.get("message_template"),
            send_whatsapp: r.get("send_whatsapp"),
            notify_staff: r.get("notify_staff"),
            is_active: r.get("is_active"),
            created_at: r.get("created_at"),
        })
        .collect();

    HttpResponse::Ok().json(rules)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRuleRequest {
    pub rule_type: String,
    pub name: String,
    pub message_template: String,
    #[serde(default = "default_true")]
    pub send_whatsapp: bool,
    #[serde(default)]
    pub notify_staff: bool,
}

fn default_true() -> bool {
    true
}

#[post("/automation/rules")]
pub async fn create_rule(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    payload: web::Json<CreateRuleRequest>,
) -> impl Responder {
    let payload = payload.into_inner();

    if RuleType::parse(&payload.rule_type).is_none() {
        return HttpResponse::BadRequest().json(json!({
            "error": "rule_type must be one of reminder, follow_up, churn_alert, promotion"
        }));
    }
    if payload.message_template.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "message_template is required" }));
    }

    let row = match sqlx::query(
        r#"INSERT INTO automation_rules
               (barbershop_id, rule_type, name, message_template, send_whatsapp, notify_staff)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING id, barbershop_id, rule_type, name, message_template,
                     send_whatsapp, notify_staff, is_active, created_at"#,
    )
    .bind(*barbershop_id)
    .bind(&payload.rule_type)
    .bind(&payload.name)
    .bind(&payload.message_template)
    .bind(payload.send_whatsapp)
    .bind(payload.notify_staff)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("create_rule insert error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let rule = AutomationRule {
        id: row.get("id"),
        barbershop_id: row.get("barbershop_id"),
        rule_type: row.get("rule_type"),
        name: row.get("name"),
        message_template: row.get("message_template"),
        send_whatsapp: row.get("send_whatsapp"),
        notify_staff: row.get("notify_staff"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    };

    HttpResponse::Ok().json(rule)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RunAutomationRequest {
    /// Restrict the run to a single rule type.
    pub trigger_type: Option<String>,
}

/// Evaluates active rules and dispatches messages per candidate.
#[utoipa::path(
    post,
    path = "/api/automation/run",
    tag = "automation",
    request_body = RunAutomationRequest,
    responses(
        (status = 200, description = "Dispatch report", body = automation::DispatchReport),
        (status = 400, description = "Unknown trigger type")
    )
)]
#[post("/automation/run")]
pub async fn run_automation(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    payload: web::Json<RunAutomationRequest>,
) -> impl Responder {
    let trigger = match payload.trigger_type.as_deref() {
        Some(raw) => match RuleType::parse(raw) {
            Some(t) => Some(t),
            None => {
                return HttpResponse::BadRequest()
                    .json(json!({ "error": format!("unknown trigger_type '{raw}'") }));
            }
        },
        None => None,
    };

    match automation::run_automation(&state.pool, &state.evolution, *barbershop_id, trigger).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            log::error!("run_automation error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
