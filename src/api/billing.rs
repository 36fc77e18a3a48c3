// src/api/billing.rs

use actix_web::{HttpResponse, Responder, get, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{AppState, billing};

#[derive(Debug, Deserialize, IntoParams)]
pub struct BillingSummaryQuery {
    /// Inclusive lower bound on closed_at.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on closed_at.
    pub date_to: Option<DateTime<Utc>>,
    /// Restrict to commands of a single provider.
    pub provider_id: Option<i32>,
}

/// Revenue, commissions and per-provider ranking over closed commands.
#[utoipa::path(
    get,
    path = "/api/billing/summary",
    tag = "billing",
    params(BillingSummaryQuery),
    responses(
        (status = 200, description = "Aggregated totals and ranking", body = billing::BillingSummary),
        (status = 500, description = "Aggregation aborted, no partial result")
    )
)]
#[get("/billing/summary")]
pub async fn billing_summary(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
    query: web::Query<BillingSummaryQuery>,
) -> impl Responder {
    let barbershop_id = *barbershop_id;
    let query = query.into_inner();

    match billing::commission_summary(
        &state.pool,
        barbershop_id,
        query.date_from,
        query.date_to,
        query.provider_id,
    )
    .await
    {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            log::error!("billing summary error barbershop_id={barbershop_id}: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
