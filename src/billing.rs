// src/billing.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

use crate::db;
use crate::models::{Command, CommandItem};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderRank {
    pub provider_id: i32,
    pub commission_total: Decimal,
    pub item_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillingSummary {
    pub total_revenue: Decimal,
    pub total_commissions: Decimal,
    pub sale_count: i64,
    pub average_ticket: Decimal,
    pub ranking: Vec<ProviderRank>,
}

/// Aggregates closed commands and their line items. Revenue and sale count
/// accumulate once per unique command id; commissions once per item. A
/// command with zero items still counts toward sales and revenue.
pub fn summarize(commands: &[Command], items: &[CommandItem]) -> BillingSummary {
    let mut seen_commands: HashSet<i32> = HashSet::new();
    let mut total_revenue = Decimal::ZERO;
    let mut sale_count: i64 = 0;

    for command in commands {
        if !seen_commands.insert(command.id) {
            continue;
        }
        total_revenue += command.total_amount;
        sale_count += 1;
    }

    let mut total_commissions = Decimal::ZERO;
    let mut per_provider: HashMap<i32, (Decimal, i64)> = HashMap::new();

    for item in items {
        total_commissions += item.commission_amount;
        if let Some(provider_id) = item.provider_id {
            let entry = per_provider.entry(provider_id).or_insert((Decimal::ZERO, 0));
            entry.0 += item.commission_amount;
            entry.1 += 1;
        }
    }

    let average_ticket = if sale_count > 0 {
        (total_revenue / Decimal::from(sale_count)).round_dp(2)
    } else {
        Decimal::ZERO
    };

    let mut ranking: Vec<ProviderRank> = per_provider
        .into_iter()
        .map(|(provider_id, (commission_total, item_count))| ProviderRank {
            provider_id,
            commission_total,
            item_count,
        })
        .collect();
    // descending by commission, provider id as a stable tie-break
    ranking.sort_by(|a, b| {
        b.commission_total
            .cmp(&a.commission_total)
            .then(a.provider_id.cmp(&b.provider_id))
    });

    BillingSummary {
        total_revenue,
        total_commissions,
        sale_count,
        average_ticket,
        ranking,
    }
}

/// Full refresh for one barbershop. Any query failure aborts the whole
/// aggregation; nothing is written, so callers never observe partial totals.
pub async fn commission_summary(
    pool: &PgPool,
    barbershop_id: i32,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    provider_id: Option<i32>,
) -> Result<BillingSummary, sqlx::Error> {
    let commands =
        db::fetch_closed_commands(pool, barbershop_id, date_from, date_to, provider_id).await?;

    let command_ids: Vec<i32> = commands.iter().map(|c| c.id).collect();
    let items = db::fetch_items_for_commands(pool, &command_ids).await?;

    Ok(summarize(&commands, &items))
}
