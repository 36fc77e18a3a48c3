// src/api/instances.rs
//
// Operator-facing endpoints for the tenant's WhatsApp gateway instance:
// status diagnostics, QR pairing, manual reconciliation, disconnect.

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::evolution;
use crate::models::WhatsAppInstance;
use crate::{AppState, db, reconcile, ws};

fn webhook_url(state: &AppState) -> String {
    format!(
        "{}/webhook/whatsapp",
        state.webhook_base_url.trim_end_matches('/')
    )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstanceStatusResponse {
    pub instance: Option<WhatsAppInstance>,
    pub gateway_state: Option<String>,
    pub gateway_error: Option<String>,
}

/// Local row plus the gateway's live connection state.
#[utoipa::path(
    get,
    path = "/api/whatsapp/status",
    tag = "whatsapp",
    responses((status = 200, description = "Stored and live state", body = InstanceStatusResponse))
)]
#[get("/whatsapp/status")]
pub async fn instance_status(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let instance = match db::get_instance_by_barbershop(&state.pool, *barbershop_id).await {
        Ok(i) => i,
        Err(e) => {
            log::error!("instance_status db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let Some(instance) = instance else {
        return HttpResponse::Ok().json(InstanceStatusResponse {
            instance: None,
            gateway_state: None,
            gateway_error: None,
        });
    };

    let (gateway_state, gateway_error) =
        match evolution::connection_state(&state.evolution, &instance.instance_name).await {
            Ok(remote) => (remote.state, None),
            Err(e) => (None, Some(e.to_string())),
        };

    HttpResponse::Ok().json(InstanceStatusResponse {
        instance: Some(instance),
        gateway_state,
        gateway_error,
    })
}

/// Creates (or re-pairs) the tenant's gateway instance and returns the QR
/// code to scan. The webhook subscription is registered in the same step.
#[post("/whatsapp/connect")]
pub async fn connect_instance(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let barbershop_id = *barbershop_id;

    let existing = match db::get_instance_by_barbershop(&state.pool, barbershop_id).await {
        Ok(i) => i,
        Err(e) => {
            log::error!("connect_instance db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let instance_name = existing
        .map(|i| i.instance_name)
        .unwrap_or_else(|| format!("shop_{barbershop_id}_{}", Uuid::new_v4().simple()));

    if let Err(e) = db::upsert_instance(&state.pool, barbershop_id, &instance_name).await {
        log::error!("connect_instance upsert error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    let hook = webhook_url(&state);

    let qr = match evolution::create_instance(&state.evolution, &instance_name, &hook).await {
        Ok(qr) => qr,
        // Instance may survive on the gateway from an earlier pairing; ask
        // for a fresh QR instead.
        Err(evolution::EvolutionError::Api { body, .. })
            if body.contains("already") || body.contains("exists") =>
        {
            if let Err(e) = evolution::set_webhook(&state.evolution, &instance_name, &hook).await {
                log::warn!("webhook register failed for {instance_name}: {e}");
            }
            match evolution::connect_qr(&state.evolution, &instance_name).await {
                Ok(qr) => qr,
                Err(e) => {
                    log::error!("connect_qr error for {instance_name}: {e}");
                    return HttpResponse::BadGateway()
                        .json(json!({ "error": "gateway refused to issue a QR code" }));
                }
            }
        }
        Err(e) => {
            log::error!("create_instance error for {instance_name}: {e}");
            return HttpResponse::BadGateway()
                .json(json!({ "error": "gateway instance create failed" }));
        }
    };

    if let Err(e) = db::set_instance_qr(&state.pool, &instance_name, qr.as_deref()).await {
        log::error!("store qr error for {instance_name}: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    ws::notify_instance(&state.pool, &state.ws_hub, &instance_name).await;

    HttpResponse::Ok().json(json!({
        "instance_name": instance_name,
        "qr_code": qr,
    }))
}

/// Manual reconciliation pass against the gateway's live state.
#[utoipa::path(
    post,
    path = "/api/whatsapp/reconcile",
    tag = "whatsapp",
    responses(
        (status = 200, description = "Actions applied", body = reconcile::ReconcileOutcome),
        (status = 404, description = "No instance for this barbershop")
    )
)]
#[post("/whatsapp/reconcile")]
pub async fn reconcile_instance(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let instance = match db::get_instance_by_barbershop(&state.pool, *barbershop_id).await {
        Ok(Some(i)) => i,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(json!({ "error": "no whatsapp instance for this barbershop" }));
        }
        Err(e) => {
            log::error!("reconcile db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match reconcile::reconcile_instance(
        &state.pool,
        &state.evolution,
        &state.webhook_base_url,
        &instance,
    )
    .await
    {
        Ok(outcome) => {
            ws::notify_instance(&state.pool, &state.ws_hub, &instance.instance_name).await;
            HttpResponse::Ok().json(outcome)
        }
        Err(e) => {
            log::error!("reconcile error for {}: {e}", instance.instance_name);
            HttpResponse::BadGateway().json(json!({ "error": e }))
        }
    }
}

/// Restarts the gateway session without dropping the pairing. Diagnostic
/// step before a full disconnect.
#[post("/whatsapp/restart")]
pub async fn restart_instance(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let instance = match db::get_instance_by_barbershop(&state.pool, *barbershop_id).await {
        Ok(Some(i)) => i,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(json!({ "error": "no whatsapp instance for this barbershop" }));
        }
        Err(e) => {
            log::error!("restart db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = evolution::restart_instance(&state.evolution, &instance.instance_name).await {
        log::error!("restart failed for {}: {e}", instance.instance_name);
        return HttpResponse::BadGateway().json(json!({ "error": "gateway restart failed" }));
    }

    if let Err(e) =
        db::set_instance_state(&state.pool, &instance.instance_name, "connecting", None).await
    {
        log::error!("restart state update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    ws::notify_instance(&state.pool, &state.ws_hub, &instance.instance_name).await;

    HttpResponse::Ok().json(json!({ "ok": true }))
}

/// Logs out and removes the gateway instance, marking the row disconnected.
#[post("/whatsapp/disconnect")]
pub async fn disconnect_instance(
    state: web::Data<AppState>,
    barbershop_id: web::ReqData<i32>,
) -> impl Responder {
    let instance = match db::get_instance_by_barbershop(&state.pool, *barbershop_id).await {
        Ok(Some(i)) => i,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(json!({ "error": "no whatsapp instance for this barbershop" }));
        }
        Err(e) => {
            log::error!("disconnect db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = evolution::logout_instance(&state.evolution, &instance.instance_name).await {
        log::warn!("logout failed for {}: {e}", instance.instance_name);
    }
    if let Err(e) = evolution::delete_instance(&state.evolution, &instance.instance_name).await {
        log::warn!("delete failed for {}: {e}", instance.instance_name);
    }

    if let Err(e) =
        db::set_instance_state(&state.pool, &instance.instance_name, "disconnected", None).await
    {
        log::error!("disconnect state update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    ws::notify_instance(&state.pool, &state.ws_hub, &instance.instance_name).await;

    HttpResponse::Ok().json(json!({ "ok": true }))
}
