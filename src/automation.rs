// src/automation.rs
//
// Rule-based messaging automation. Candidates are selected by date-window
// predicates per rule type, messages are rendered by literal placeholder
// substitution and dispatched through the WhatsApp gateway. Every dispatch
// is logged as an execution row (pending -> sent | failed); one candidate
// failing never aborts the rest.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::api::evolution::{self, EvolutionConfig};
use crate::db;
use crate::models::AutomationRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    Reminder,
    FollowUp,
    ChurnAlert,
    Promotion,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Reminder => "reminder",
            RuleType::FollowUp => "follow_up",
            RuleType::ChurnAlert => "churn_alert",
            RuleType::Promotion => "promotion",
        }
    }

    pub fn parse(value: &str) -> Option<RuleType> {
        match value {
            "reminder" => Some(RuleType::Reminder),
            "follow_up" => Some(RuleType::FollowUp),
            "churn_alert" => Some(RuleType::ChurnAlert),
            "promotion" => Some(RuleType::Promotion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub client_id: i32,
    pub client_name: String,
    pub phone: Option<String>,
    pub appointment_id: Option<i32>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub service_name: Option<String>,
}

/// Literal `{{placeholder}}` substitution. Unknown placeholders are left
/// untouched; there is no escaping.
pub fn render_template(template: &str, vars: &HashMap<&'static str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

pub fn candidate_vars(candidate: &Candidate, barbershop_name: &str) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("client_name", candidate.client_name.clone());
    vars.insert("barbershop_name", barbershop_name.to_string());
    if let Some(at) = candidate.appointment_at {
        vars.insert("appointment_date", at.format("%d/%m/%Y").to_string());
        vars.insert("appointment_time", at.format("%H:%M").to_string());
    }
    if let Some(service) = &candidate.service_name {
        vars.insert("service_name", service.clone());
    }
    vars
}

/// [start, end) of the UTC day `offset_days` away from now.
fn day_window(offset_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = (Utc::now() + Duration::days(offset_days)).date_naive();
    let start = day.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc();
    (start, start + Duration::days(1))
}

async fn appointment_candidates(
    pool: &PgPool,
    barbershop_id: i32,
    status: &str,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<Vec<Candidate>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT a.id AS appointment_id, a.starts_at, c.id AS client_id,
                  c.name AS client_name, c.phone, s.name AS service_name
           FROM appointments a
           JOIN clients c ON c.id = a.client_id
           LEFT JOIN services s ON s.id = a.service_id
           WHERE a.barbershop_id = $1
             AND a.status = $2
             AND a.starts_at >= $3
             AND a.starts_at < $4
           ORDER BY a.starts_at ASC"#,
    )
    .bind(barbershop_id)
    .bind(status)
    .bind(window.0)
    .bind(window.1)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Candidate {
            client_id: r.get("client_id"),
            client_name: r.get("client_name"),
            phone: r.get("phone"),
            appointment_id: Some(r.get("appointment_id")),
            appointment_at: Some(r.get("starts_at")),
            service_name: r.get("service_name"),
        })
        .collect())
}

/// Clients whose last completed visit is older than 30 days. Clients already
/// contacted by this rule in the last 30 days are suppressed via the
/// execution log.
async fn churn_candidates(
    pool: &PgPool,
    barbershop_id: i32,
    rule_id: i32,
) -> Result<Vec<Candidate>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT c.id AS client_id, c.name AS client_name, c.phone
           FROM clients c
           JOIN appointments a ON a.client_id = c.id AND a.status = 'completed'
           WHERE c.barbershop_id = $1
             AND c.is_active = true
             AND NOT EXISTS (
                 SELECT 1 FROM automation_executions e
                 WHERE e.rule_id = $2
                   AND e.client_id = c.id
                   AND e.created_at > NOW() - INTERVAL '30 days'
             )
           GROUP BY c.id, c.name, c.phone
           HAVING MAX(a.starts_at) < NOW() - INTERVAL '30 days'"#,
    )
    .bind(barbershop_id)
    .bind(rule_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Candidate {
            client_id: r.get("client_id"),
            client_name: r.get("client_name"),
            phone: r.get("phone"),
            appointment_id: None,
            appointment_at: None,
            service_name: None,
        })
        .collect())
}

async fn promotion_candidates(
    pool: &PgPool,
    barbershop_id: i32,
) -> Result<Vec<Candidate>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id AS client_id, name AS client_name, phone
           FROM clients
           WHERE barbershop_id = $1 AND is_active = true AND phone IS NOT NULL"#,
    )
    .bind(barbershop_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Candidate {
            client_id: r.get("client_id"),
            client_name: r.get("client_name"),
            phone: r.get("phone"),
            appointment_id: None,
            appointment_at: None,
            service_name: None,
        })
        .collect())
}

async fn candidates_for_rule(
    pool: &PgPool,
    rule: &AutomationRule,
    rule_type: RuleType,
) -> Result<Vec<Candidate>, sqlx::Error> {
    match rule_type {
        RuleType::Reminder => {
            appointment_candidates(pool, rule.barbershop_id, "scheduled", day_window(1)).await
        }
        RuleType::FollowUp => {
            appointment_candidates(pool, rule.barbershop_id, "completed", day_window(-3)).await
        }
        RuleType::ChurnAlert => churn_candidates(pool, rule.barbershop_id, rule.id).await,
        RuleType::Promotion => promotion_candidates(pool, rule.barbershop_id).await,
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DispatchReport {
    pub rules_evaluated: usize,
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
}

async fn insert_execution(
    pool: &PgPool,
    rule: &AutomationRule,
    candidate: &Candidate,
    message: &str,
) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO automation_executions
               (rule_id, barbershop_id, client_id, appointment_id, status, message)
           VALUES ($1, $2, $3, $4, 'pending', $5)
           RETURNING id"#,
    )
    .bind(rule.id)
    .bind(rule.barbershop_id)
    .bind(candidate.client_id)
    .bind(candidate.appointment_id)
    .bind(message)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}

async fn finish_execution(pool: &PgPool, execution_id: i32, status: &str, error: Option<&str>) {
    let result = sqlx::query(
        r#"UPDATE automation_executions
           SET status = $1, error_message = $2, executed_at = NOW()
           WHERE id = $3"#,
    )
    .bind(status)
    .bind(error)
    .bind(execution_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        log::error!("finish_execution id={execution_id} error: {e}");
    }
}

async fn dispatch_candidate(
    pool: &PgPool,
    evolution: &EvolutionConfig,
    rule: &AutomationRule,
    candidate: &Candidate,
    barbershop_name: &str,
    instance_name: Option<&str>,
) -> Result<(), String> {
    let vars = candidate_vars(candidate, barbershop_name);
    let message = render_template(&rule.message_template, &vars);

    let execution_id = insert_execution(pool, rule, candidate, &message)
        .await
        .map_err(|e| e.to_string())?;

    if rule.notify_staff {
        let result = sqlx::query(
            r#"INSERT INTO staff_notifications (barbershop_id, rule_id, client_id, message)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(rule.barbershop_id)
        .bind(rule.id)
        .bind(candidate.client_id)
        .bind(&message)
        .execute(pool)
        .await;

        if let Err(e) = result {
            log::error!("staff notification insert error: {e}");
        }
    }

    if rule.send_whatsapp {
        let Some(instance_name) = instance_name else {
            finish_execution(pool, execution_id, "failed", Some("whatsapp instance not connected")).await;
            return Err("whatsapp instance not connected".to_string());
        };
        let Some(phone) = candidate.phone.as_deref() else {
            finish_execution(pool, execution_id, "failed", Some("client has no phone number")).await;
            return Err("client has no phone number".to_string());
        };

        if let Err(e) = evolution::send_text(evolution, instance_name, phone, &message).await {
            finish_execution(pool, execution_id, "failed", Some(&e.to_string())).await;
            return Err(e.to_string());
        }
    }

    finish_execution(pool, execution_id, "sent", None).await;
    Ok(())
}

async fn barbershop_name(pool: &PgPool, barbershop_id: i32) -> Result<String, sqlx::Error> {
    let row = sqlx::query("SELECT name FROM barbershops WHERE id = $1")
        .bind(barbershop_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("name")).unwrap_or_default())
}

/// Evaluates the barbershop's active rules (optionally a single type) and
/// dispatches per candidate.
pub async fn run_automation(
    pool: &PgPool,
    evolution: &EvolutionConfig,
    barbershop_id: i32,
    trigger: Option<RuleType>,
) -> Result<DispatchReport, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, barbershop_id, rule_type, name, message_template,
                  send_whatsapp, notify_staff, is_active, created_at
           FROM automation_rules
           WHERE barbershop_id = $1
             AND is_active = true
             AND ($2::text IS NULL OR rule_type = $2)
           ORDER BY id ASC"#,
    )
    .bind(barbershop_id)
    .bind(trigger.map(|t| t.as_str()))
    .fetch_all(pool)
    .await?;

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

    let shop_name = barbershop_name(pool, barbershop_id).await?;

    let instance = db::get_instance_by_barbershop(pool, barbershop_id).await?;
    let connected_instance = instance
        .as_ref()
        .filter(|i| i.status == "connected")
        .map(|i| i.instance_name.clone());

    let mut report = DispatchReport::default();

    for rule in &rules {
        let Some(rule_type) = RuleType::parse(&rule.rule_type) else {
            log::warn!("unknown rule_type '{}' for rule id={}", rule.rule_type, rule.id);
            continue;
        };

        report.rules_evaluated += 1;

        let candidates = candidates_for_rule(pool, rule, rule_type).await?;
        report.candidates += candidates.len();

        for candidate in &candidates {
            match dispatch_candidate(
                pool,
                evolution,
                rule,
                candidate,
                &shop_name,
                connected_instance.as_deref(),
            )
            .await
            {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    log::warn!(
                        "automation dispatch failed rule={} client={}: {e}",
                        rule.id,
                        candidate.client_id
                    );
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}
