// src/db.rs

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{ClientSubscription, Command, CommandItem, SubscriptionPlan, WhatsAppInstance};

// Line items are fetched in fixed chunks so a big date range never turns
// into one unbounded array parameter.
const ITEM_FETCH_CHUNK: usize = 200;

fn map_instance(r: &PgRow) -> WhatsAppInstance {
    WhatsAppInstance {
        id: r.get("id"),
        barbershop_id: r.get("barbershop_id"),
        instance_name: r.get("instance_name"),
        status: r.get("status"),
        phone_number: r.get("phone_number"),
        qr_code: r.get("qr_code"),
        last_sync_at: r.get("last_sync_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn map_plan(r: &PgRow) -> SubscriptionPlan {
    SubscriptionPlan {
        id: r.get("id"),
        barbershop_id: r.get("barbershop_id"),
        provider_id: r.get("provider_id"),
        name: r.get("name"),
        monthly_price: r.get("monthly_price"),
        included_services_count: r.get("included_services_count"),
        commission_percentage: r.get("commission_percentage"),
        enabled_service_ids: r.get("enabled_service_ids"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
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

// ---------- whatsapp instances ----------

pub async fn get_instance_by_barbershop(
    pool: &PgPool,
    barbershop_id: i32,
) -> Result<Option<WhatsAppInstance>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, instance_name, status, phone_number, qr_code,
                  last_sync_at, created_at, updated_at
           FROM whatsapp_instances
           WHERE barbershop_id = $1"#,
    )
    .bind(barbershop_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_instance(&r)))
}

pub async fn get_instance_by_name(
    pool: &PgPool,
    instance_name: &str,
) -> Result<Option<WhatsAppInstance>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, instance_name, status, phone_number, qr_code,
                  last_sync_at, created_at, updated_at
           FROM whatsapp_instances
           WHERE instance_name = $1"#,
    )
    .bind(instance_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_instance(&r)))
}

pub async fn upsert_instance(
    pool: &PgPool,
    barbershop_id: i32,
    instance_name: &str,
) -> Result<WhatsAppInstance, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO whatsapp_instances (barbershop_id, instance_name, status)
           VALUES ($1, $2, 'connecting')
           ON CONFLICT (barbershop_id)
           DO UPDATE SET status = 'connecting', updated_at = NOW()
           RETURNING id, barbershop_id, instance_name, status, phone_number, qr_code,
                     last_sync_at, created_at, updated_at"#,
    )
    .bind(barbershop_id)
    .bind(instance_name)
    .fetch_one(pool)
    .await?;

    Ok(map_instance(&row))
}

/// Writes the reconciled connection state. A connected instance has no
/// pending QR code, so the QR is cleared in the same statement.
pub async fn set_instance_state(
    pool: &PgPool,
    instance_name: &str,
    status: &str,
    phone_number: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE whatsapp_instances
           SET status = $1,
               phone_number = COALESCE($2, phone_number),
               qr_code = CASE WHEN $1 = 'connected' THEN NULL ELSE qr_code END,
               last_sync_at = NOW(),
               updated_at = NOW()
           WHERE instance_name = $3"#,
    )
    .bind(status)
    .bind(phone_number)
    .bind(instance_name)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_instance_qr(
    pool: &PgPool,
    instance_name: &str,
    qr_code: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE whatsapp_instances
           SET qr_code = $1, status = 'connecting', last_sync_at = NOW(), updated_at = NOW()
           WHERE instance_name = $2"#,
    )
    .bind(qr_code)
    .bind(instance_name)
    .execute(pool)
    .await?;

    Ok(())
}

/// Instance names whose last sync is older than `stale_secs` (or that never
/// synced, or are stuck in 'connecting'). Feed for the sweep queue.
pub async fn list_stale_instance_names(
    pool: &PgPool,
    stale_secs: i64,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT instance_name
           FROM whatsapp_instances
           WHERE last_sync_at IS NULL
              OR last_sync_at < NOW() - make_interval(secs => $1)
              OR status = 'connecting'
           ORDER BY last_sync_at ASC NULLS FIRST
           LIMIT $2"#,
    )
    .bind(stale_secs as f64)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get("instance_name")).collect())
}

// ---------- commands ----------

pub async fn fetch_closed_commands(
    pool: &PgPool,
    barbershop_id: i32,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    provider_id: Option<i32>,
) -> Result<Vec<Command>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, barbershop_id, client_id, provider_id, status, total_amount,
                  closed_at, created_at
           FROM commands
           WHERE barbershop_id = $1
             AND status = 'closed'
             AND ($2::timestamptz IS NULL OR closed_at >= $2)
             AND ($3::timestamptz IS NULL OR closed_at <= $3)
             AND ($4::integer IS NULL OR provider_id = $4)
           ORDER BY closed_at ASC"#,
    )
    .bind(barbershop_id)
    .bind(date_from)
    .bind(date_to)
    .bind(provider_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Command {
            id: r.get("id"),
            barbershop_id: r.get("barbershop_id"),
            client_id: r.get("client_id"),
            provider_id: r.get("provider_id"),
            status: r.get("status"),
            total_amount: r.get("total_amount"),
            closed_at: r.get("closed_at"),
            created_at: r.get("created_at"),
        })
        .collect())
}

pub async fn fetch_items_for_commands(
    pool: &PgPool,
    command_ids: &[i32],
) -> Result<Vec<CommandItem>, sqlx::Error> {
    let mut items = Vec::new();

    for chunk in command_ids.chunks(ITEM_FETCH_CHUNK) {
        let rows = sqlx::query(
            r#"SELECT id, command_id, provider_id, service_id, description, quantity,
                      unit_price, total_price, commission_amount, created_at
               FROM command_items
               WHERE command_id = ANY($1)"#,
        )
        .bind(chunk.to_vec())
        .fetch_all(pool)
        .await?;

        items.extend(rows.into_iter().map(|r| CommandItem {
            id: r.get("id"),
            command_id: r.get("command_id"),
            provider_id: r.get("provider_id"),
            service_id: r.get("service_id"),
            description: r.get("description"),
            quantity: r.get("quantity"),
            unit_price: r.get("unit_price"),
            total_price: r.get("total_price"),
            commission_amount: r.get("commission_amount"),
            created_at: r.get("created_at"),
        }));
    }

    Ok(items)
}

// ---------- plans & subscriptions ----------

pub async fn get_plan(
    pool: &PgPool,
    barbershop_id: i32,
    plan_id: i32,
) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, provider_id, name, monthly_price,
                  included_services_count, commission_percentage, enabled_service_ids,
                  is_active, created_at
           FROM subscription_plans
           WHERE id = $1 AND barbershop_id = $2"#,
    )
    .bind(plan_id)
    .bind(barbershop_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_plan(&r)))
}

pub async fn list_plans(
    pool: &PgPool,
    barbershop_id: i32,
) -> Result<Vec<SubscriptionPlan>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, barbershop_id, provider_id, name, monthly_price,
                  included_services_count, commission_percentage, enabled_service_ids,
                  is_active, created_at
           FROM subscription_plans
           WHERE barbershop_id = $1 AND is_active = true
           ORDER BY monthly_price ASC"#,
    )
    .bind(barbershop_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_plan).collect())
}

pub async fn get_subscription(
    pool: &PgPool,
    barbershop_id: i32,
    subscription_id: i32,
) -> Result<Option<ClientSubscription>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, client_id, provider_id, plan_id, status,
                  remaining_services, start_date, end_date, cancelled_at,
                  created_at, updated_at
           FROM client_subscriptions
           WHERE id = $1 AND barbershop_id = $2"#,
    )
    .bind(subscription_id)
    .bind(barbershop_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_subscription(&r)))
}

pub async fn list_subscriptions(
    pool: &PgPool,
    barbershop_id: i32,
) -> Result<Vec<ClientSubscription>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, barbershop_id, client_id, provider_id, plan_id, status,
                  remaining_services, start_date, end_date, cancelled_at,
                  created_at, updated_at
           FROM client_subscriptions
           WHERE barbershop_id = $1
           ORDER BY created_at DESC"#,
    )
    .bind(barbershop_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_subscription).collect())
}

pub async fn get_active_subscription(
    pool: &PgPool,
    client_id: i32,
    provider_id: i32,
) -> Result<Option<ClientSubscription>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, client_id, provider_id, plan_id, status,
                  remaining_services, start_date, end_date, cancelled_at,
                  created_at, updated_at
           FROM client_subscriptions
           WHERE client_id = $1 AND provider_id = $2 AND status = 'active'"#,
    )
    .bind(client_id)
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_subscription(&r)))
}

/// Active subscriptions of a client joined with their plans. Used by the
/// zero-price checkout validation.
pub async fn list_active_subscriptions_for_client(
    pool: &PgPool,
    barbershop_id: i32,
    client_id: i32,
) -> Result<Vec<(ClientSubscription, SubscriptionPlan)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT s.id, s.barbershop_id, s.client_id, s.provider_id, s.plan_id,
                  s.status, s.remaining_services, s.start_date, s.end_date,
                  s.cancelled_at, s.created_at, s.updated_at,
                  p.id AS p_id, p.barbershop_id AS p_barbershop_id,
                  p.provider_id AS p_provider_id, p.name AS p_name,
                  p.monthly_price AS p_monthly_price,
                  p.included_services_count AS p_included_services_count,
                  p.commission_percentage AS p_commission_percentage,
                  p.enabled_service_ids AS p_enabled_service_ids,
                  p.is_active AS p_is_active, p.created_at AS p_created_at
           FROM client_subscriptions s
           JOIN subscription_plans p ON p.id = s.plan_id
           WHERE s.barbershop_id = $1 AND s.client_id = $2 AND s.status = 'active'
           ORDER BY s.created_at DESC"#,
    )
    .bind(barbershop_id)
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let sub = map_subscription(&r);
            let plan = SubscriptionPlan {
                id: r.get("p_id"),
                barbershop_id: r.get("p_barbershop_id"),
                provider_id: r.get("p_provider_id"),
                name: r.get("p_name"),
                monthly_price: r.get("p_monthly_price"),
                included_services_count: r.get("p_included_services_count"),
                commission_percentage: r.get("p_commission_percentage"),
                enabled_service_ids: r.get("p_enabled_service_ids"),
                is_active: r.get("p_is_active"),
                created_at: r.get("p_created_at"),
            };
            (sub, plan)
        })
        .collect())
}
