// src/subscription.rs
//
// Client subscription engine: create/cancel/renew, service redemption and
// the zero-price checkout validation. State machine per subscription:
// active -> cancelled (terminal), active -> expired (by date), and
// active -> active on renewal (+1 calendar month, one new financial record).

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::fmt;
use utoipa::ToSchema;

use crate::db;
use crate::models::ClientSubscription;

#[derive(Debug)]
pub enum SubscriptionError {
    AlreadyActive,
    NotFound,
    PlanNotFound,
    PlanInactive,
    NotActive(String),
    NoRemainingServices,
    Db(sqlx::Error),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::AlreadyActive => {
                write!(f, "client already has an active subscription with this provider")
            }
            SubscriptionError::NotFound => write!(f, "subscription not found"),
            SubscriptionError::PlanNotFound => write!(f, "subscription plan not found"),
            SubscriptionError::PlanInactive => write!(f, "subscription plan is not active"),
            SubscriptionError::NotActive(status) => {
                write!(f, "subscription is not active (status: {status})")
            }
            SubscriptionError::NoRemainingServices => {
                write!(f, "no remaining services in the current period")
            }
            SubscriptionError::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl From<sqlx::Error> for SubscriptionError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

fn map_subscription(r: &PgRow) -> ClientSubscription {
    ClientSubscription {
        id: r.get("id"),
        barbershop_id: r.get("barbershop_id"),
        client_id: r.get("client_id"),
        provider_id: r.get("provider_id"),
        plan_id: r.get("plan_id"),
        status: r.get("status"),
        remaining_services: r.get("remaining_services"),
        start_date: r.get("start_date"),
        end_date: r.get("end_date"),
        cancelled_at: r.get("cancelled_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

/// One calendar month forward. Clamps to the last day of the target month
/// (Jan 31 + 1 month = Feb 28/29), which is what chrono's `Months` does.
pub fn add_one_month(date: DateTime<Utc>) -> DateTime<Utc> {
    date.checked_add_months(Months::new(1)).unwrap_or(date)
}

/// Billing amounts for one period, computed from the plan at record-creation
/// time: commission is a percentage of the monthly price, net is the rest.
pub fn period_charge(monthly_price: Decimal, commission_percentage: Decimal) -> (Decimal, Decimal, Decimal) {
    let commission = (monthly_price * commission_percentage / Decimal::from(100)).round_dp(2);
    let net = monthly_price - commission;
    (monthly_price, commission, net)
}

#[derive(Debug, PartialEq, Eq)]
pub enum UsageCheck {
    Allowed,
    NoRemainingServices,
    ServiceNotCovered,
}

/// Balance is checked before coverage: an exhausted subscription can never
/// redeem, even for a covered service.
pub fn evaluate_usage(remaining_services: i32, enabled_service_ids: &[i32], service_id: i32) -> UsageCheck {
    if remaining_services <= 0 {
        return UsageCheck::NoRemainingServices;
    }
    if !enabled_service_ids.contains(&service_id) {
        return UsageCheck::ServiceNotCovered;
    }
    UsageCheck::Allowed
}

/// Plans historically stored their covered services either as a JSON array
/// or as a JSON-encoded string of one. Normalized exactly once here, at the
/// API boundary; the column itself is a typed integer[].
pub fn normalize_service_ids(value: &serde_json::Value) -> Vec<i32> {
    match value {
        serde_json::Value::Array(entries) => entries
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::Number(n) => n.as_i64().map(|n| n as i32),
                serde_json::Value::String(s) => s.trim().parse::<i32>().ok(),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(parsed @ serde_json::Value::Array(_)) => normalize_service_ids(&parsed),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

async fn insert_financial_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subscription_id: i32,
    monthly_price: Decimal,
    commission_percentage: Decimal,
    due_date: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let (amount, commission, net) = period_charge(monthly_price, commission_percentage);

    sqlx::query(
        r#"INSERT INTO subscription_financial_records
               (subscription_id, amount, commission_amount, net_amount, status, due_date)
           VALUES ($1, $2, $3, $4, 'pending', $5)"#,
    )
    .bind(subscription_id)
    .bind(amount)
    .bind(commission)
    .bind(net)
    .bind(due_date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false)
}

/// Creates an active subscription plus its first financial record. Rejects
/// before any insert when the client already has an active subscription with
/// the plan's provider; the partial unique index catches the concurrent case.
pub async fn create_subscription(
    pool: &PgPool,
    barbershop_id: i32,
    client_id: i32,
    plan_id: i32,
) -> Result<ClientSubscription, SubscriptionError> {
    let plan = db::get_plan(pool, barbershop_id, plan_id)
        .await?
        .ok_or(SubscriptionError::PlanNotFound)?;

    if !plan.is_active {
        return Err(SubscriptionError::PlanInactive);
    }

    if db::get_active_subscription(pool, client_id, plan.provider_id)
        .await?
        .is_some()
    {
        return Err(SubscriptionError::AlreadyActive);
    }

    let start_date = Utc::now();
    let end_date = add_one_month(start_date);

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"INSERT INTO client_subscriptions
               (barbershop_id, client_id, provider_id, plan_id, status,
                remaining_services, start_date, end_date)
           VALUES ($1, $2, $3, $4, 'active', $5, $6, $7)
           RETURNING id, barbershop_id, client_id, provider_id, plan_id, status,
                     remaining_services, start_date, end_date, cancelled_at,
                     created_at, updated_at"#,
    )
    .bind(barbershop_id)
    .bind(client_id)
    .bind(plan.provider_id)
    .bind(plan.id)
    .bind(plan.included_services_count)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            SubscriptionError::AlreadyActive
        } else {
            SubscriptionError::Db(e)
        }
    })?;

    let subscription = map_subscription(&row);

    insert_financial_record(
        &mut tx,
        subscription.id,
        plan.monthly_price,
        plan.commission_percentage,
        start_date,
    )
    .await?;

    tx.commit().await?;

    Ok(subscription)
}

/// active -> cancelled, terminal.
pub async fn cancel_subscription(
    pool: &PgPool,
    barbershop_id: i32,
    subscription_id: i32,
) -> Result<ClientSubscription, SubscriptionError> {
    let row = sqlx::query(
        r#"UPDATE client_subscriptions
           SET status = 'cancelled', cancelled_at = NOW(), updated_at = NOW()
           WHERE id = $1 AND barbershop_id = $2 AND status = 'active'
           RETURNING id, barbershop_id, client_id, provider_id, plan_id, status,
                     remaining_services, start_date, end_date, cancelled_at,
                     created_at, updated_at"#,
    )
    .bind(subscription_id)
    .bind(barbershop_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(map_subscription(&r)),
        None => {
            let existing = db::get_subscription(pool, barbershop_id, subscription_id).await?;
            match existing {
                Some(sub) => Err(SubscriptionError::NotActive(sub.status)),
                None => Err(SubscriptionError::NotFound),
            }
        }
    }
}

/// Renewal: extends end_date by exactly one calendar month from its prior
/// value, resets the service balance from the plan, and creates exactly one
/// new financial record due at the start of the renewed period.
pub async fn renew_subscription(
    pool: &PgPool,
    barbershop_id: i32,
    subscription_id: i32,
) -> Result<ClientSubscription, SubscriptionError> {
    let sub = db::get_subscription(pool, barbershop_id, subscription_id)
        .await?
        .ok_or(SubscriptionError::NotFound)?;

    if sub.status != "active" {
        return Err(SubscriptionError::NotActive(sub.status));
    }

    let plan = db::get_plan(pool, barbershop_id, sub.plan_id)
        .await?
        .ok_or(SubscriptionError::PlanNotFound)?;

    let new_end = add_one_month(sub.end_date);

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"UPDATE client_subscriptions
           SET end_date = $1, remaining_services = $2, updated_at = NOW()
           WHERE id = $3 AND status = 'active'
           RETURNING id, barbershop_id, client_id, provider_id, plan_id, status,
                     remaining_services, start_date, end_date, cancelled_at,
                     created_at, updated_at"#,
    )
    .bind(new_end)
    .bind(plan.included_services_count)
    .bind(subscription_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| SubscriptionError::NotActive("cancelled".to_string()))?;

    let renewed = map_subscription(&row);

    insert_financial_record(
        &mut tx,
        renewed.id,
        plan.monthly_price,
        plan.commission_percentage,
        sub.end_date,
    )
    .await?;

    tx.commit().await?;

    Ok(renewed)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceUsage {
    pub subscription_id: i32,
    pub remaining_services: i32,
}

/// Redeems one covered service. The guarded decrement and the usage-history
/// insert commit together, so the balance can never go below zero and never
/// drifts from the ledger.
pub async fn use_subscription_service(
    pool: &PgPool,
    barbershop_id: i32,
    subscription_id: i32,
    service_id: Option<i32>,
    appointment_id: Option<i32>,
) -> Result<ServiceUsage, SubscriptionError> {
    let sub = db::get_subscription(pool, barbershop_id, subscription_id)
        .await?
        .ok_or(SubscriptionError::NotFound)?;

    if sub.status != "active" {
        return Err(SubscriptionError::NotActive(sub.status));
    }
    if sub.remaining_services <= 0 {
        return Err(SubscriptionError::NoRemainingServices);
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"UPDATE client_subscriptions
           SET remaining_services = remaining_services - 1, updated_at = NOW()
           WHERE id = $1 AND status = 'active' AND remaining_services > 0
           RETURNING remaining_services"#,
    )
    .bind(subscription_id)
    .fetch_optional(&mut *tx)
    .await?;

    // A concurrent redemption may have taken the last slot between the read
    // and the guarded update.
    let Some(row) = row else {
        return Err(SubscriptionError::NoRemainingServices);
    };

    let remaining: i32 = row.get("remaining_services");

    sqlx::query(
        r#"INSERT INTO subscription_usage (subscription_id, service_id, appointment_id)
           VALUES ($1, $2, $3)"#,
    )
    .bind(subscription_id)
    .bind(service_id)
    .bind(appointment_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ServiceUsage {
        subscription_id,
        remaining_services: remaining,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageValidation {
    pub can_use_service: bool,
    pub subscription_id: Option<i32>,
    pub reason: Option<String>,
}

/// Zero-price checkout gate: does any of the client's active subscriptions
/// cover this service with balance left?
pub async fn validate_service_usage(
    pool: &PgPool,
    barbershop_id: i32,
    client_id: i32,
    service_id: i32,
) -> Result<UsageValidation, sqlx::Error> {
    let subscriptions =
        db::list_active_subscriptions_for_client(pool, barbershop_id, client_id).await?;

    if subscriptions.is_empty() {
        return Ok(UsageValidation {
            can_use_service: false,
            subscription_id: None,
            reason: Some("client has no active subscription".to_string()),
        });
    }

    let mut reason: Option<String> = None;

    for (sub, plan) in &subscriptions {
        match evaluate_usage(sub.remaining_services, &plan.enabled_service_ids, service_id) {
            UsageCheck::Allowed => {
                return Ok(UsageValidation {
                    can_use_service: true,
                    subscription_id: Some(sub.id),
                    reason: None,
                });
            }
            UsageCheck::NoRemainingServices => {
                reason.get_or_insert_with(|| {
                    "no remaining services in the current period".to_string()
                });
            }
            UsageCheck::ServiceNotCovered => {
                reason.get_or_insert_with(|| "service is not covered by the plan".to_string());
            }
        }
    }

    Ok(UsageValidation {
        can_use_service: false,
        subscription_id: None,
        reason,
    })
}
