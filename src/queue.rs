use actix::Addr;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;

use crate::api::evolution::EvolutionConfig;
use crate::db;
use crate::reconcile;
use crate::ws::{self, WsHub};

#[derive(Debug, Serialize, Deserialize)]
struct SweepMessage {
    instance_name: String,
}

const QUEUE_NAME: &str = "whatsapp.reconcile.sweep";

/// Periodic fallback for webhook-driven convergence: instances whose last
/// sync is stale get enqueued, a consumer runs a reconciliation pass per
/// message. Skips cleanly when RabbitMQ is not configured.
pub async fn start_reconcile_queue(
    pool: PgPool,
    evolution: EvolutionConfig,
    webhook_base_url: String,
    ws_hub: Addr<WsHub>,
) {
    let rabbit_url = match std::env::var("RABBITMQ_URL") {
        Ok(url) => url,
        Err(_) => {
            log::warn!("RABBITMQ_URL not set, skipping reconcile sweep queue");
            return;
        }
    };

    let conn = match Connection::connect(&rabbit_url, ConnectionProperties::default()).await {
        Ok(c) => c,
        Err(e) => {
            log::error!("rabbitmq connect error: {e}");
            return;
        }
    };

    let channel = match conn.create_channel().await {
        Ok(c) => c,
        Err(e) => {
            log::error!("rabbitmq channel error: {e}");
            return;
        }
    };

    if let Err(e) = channel
        .queue_declare(QUEUE_NAME, QueueDeclareOptions::default(), FieldTable::default())
        .await
    {
        log::error!("rabbitmq declare queue error: {e}");
        return;
    }

    let sweep_interval = std::env::var("RECONCILE_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(300);
    let stale_secs = std::env::var("RECONCILE_STALE_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(600);
    let batch_size = std::env::var("RECONCILE_SWEEP_BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(50);

    let producer_pool = pool.clone();
    let producer_channel = channel.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) =
                enqueue_stale_instances(&producer_pool, &producer_channel, stale_secs, batch_size)
                    .await
            {
                log::error!("sweep enqueue error: {e}");
            }
            tokio::time::sleep(Duration::from_secs(sweep_interval)).await;
        }
    });

    let consumer_pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) =
            consume_sweep(&consumer_pool, &channel, &evolution, &webhook_base_url, &ws_hub).await
        {
            log::error!("sweep consume error: {e}");
        }
    });
}

async fn enqueue_stale_instances(
    pool: &PgPool,
    channel: &Channel,
    stale_secs: i64,
    batch_size: i64,
) -> Result<(), String> {
    let names = db::list_stale_instance_names(pool, stale_secs, batch_size)
        .await
        .map_err(|e| e.to_string())?;

    for instance_name in names {
        let payload =
            serde_json::to_vec(&SweepMessage { instance_name }).map_err(|e| e.to_string())?;
        channel
            .basic_publish(
                "",
                QUEUE_NAME,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| e.to_string())?
            .await
            .map_err(|e| e.to_string())?;
    }

    Ok(())
}

async fn consume_sweep(
    pool: &PgPool,
    channel: &Channel,
    evolution: &EvolutionConfig,
    webhook_base_url: &str,
    ws_hub: &Addr<WsHub>,
) -> Result<(), String> {
    let mut consumer = channel
        .basic_consume(
            QUEUE_NAME,
            "reconcile-sweep-consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| e.to_string())?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                log::error!("rabbitmq delivery error: {e}");
                continue;
            }
        };

        if let Err(e) =
            handle_sweep_message(pool, &delivery.data, evolution, webhook_base_url, ws_hub).await
        {
            log::error!("handle sweep message error: {e}");
        }

        let _ = delivery.ack(BasicAckOptions::default()).await;
    }

    Ok(())
}

async fn handle_sweep_message(
    pool: &PgPool,
    data: &[u8],
    evolution: &EvolutionConfig,
    webhook_base_url: &str,
    ws_hub: &Addr<WsHub>,
) -> Result<(), String> {
    let msg: SweepMessage = serde_json::from_slice(data).map_err(|e| e.to_string())?;

    let instance = db::get_instance_by_name(pool, &msg.instance_name)
        .await
        .map_err(|e| e.to_string())?;

    let Some(instance) = instance else {
        // Row deleted between enqueue and consume.
        return Ok(());
    };

    let outcome =
        reconcile::reconcile_instance(pool, evolution, webhook_base_url, &instance).await?;

    if !outcome.actions.is_empty() {
        log::info!(
            "sweep reconciled instance={} remote_state={:?} actions={}",
            outcome.instance_name,
            outcome.remote_state,
            outcome.actions.len()
        );
        ws::notify_instance(pool, ws_hub, &msg.instance_name).await;
    }

    Ok(())
}
