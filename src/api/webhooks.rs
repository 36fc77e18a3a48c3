// src/api/webhooks.rs
//
// Gateway event intake: the Evolution API posts connection and QR events
// here, which keeps whatsapp_instances convergent without polling. Unknown
// instances are acknowledged with 200 so the gateway does not retry forever.

use actix_web::{HttpRequest, HttpResponse, post, web};
use serde_json::json;

use crate::api::signing;
use crate::{AppState, db, ws};

/// Evolution spells events both ways depending on version and transport:
/// "CONNECTION_UPDATE" and "connection.update" are the same event.
pub fn normalize_event(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('_', ".")
}

/// Gateway session state -> local instance status.
pub fn map_connection_state(state: &str) -> &'static str {
    match state {
        "open" | "connected" => "connected",
        "connecting" => "connecting",
        _ => "disconnected",
    }
}

pub fn extract_api_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("apikey")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_signature(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("X-Webhook-Signature")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

#[utoipa::path(
    post,
    path = "/webhook/whatsapp",
    tag = "webhooks",
    request_body(content = String, content_type = "application/json", description = "Raw gateway webhook payload"),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Bad secret/signature")
    )
)]
#[post("/webhook/whatsapp")]
pub async fn whatsapp_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    if !signing::verify_webhook(
        &state.webhook_secret,
        &body,
        extract_api_key(&req).as_deref(),
        extract_signature(&req).as_deref(),
    ) {
        return HttpResponse::Unauthorized().json(json!({ "error": "invalid webhook secret" }));
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("whatsapp webhook parse error: {e}");
            return HttpResponse::BadRequest().json(json!({ "error": "invalid json" }));
        }
    };

    let Some(event) = payload["event"].as_str() else {
        return HttpResponse::BadRequest().json(json!({ "error": "missing event" }));
    };
    let Some(instance_name) = payload["instance"].as_str() else {
        return HttpResponse::BadRequest().json(json!({ "error": "missing instance" }));
    };

    // Unknown instance: ack and ignore.
    let known = match db::get_instance_by_name(&state.pool, instance_name).await {
        Ok(row) => row.is_some(),
        Err(e) => {
            log::error!("whatsapp webhook instance lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    if !known {
        return HttpResponse::Ok().json(json!({ "ok": true, "ignored": true }));
    }

    let data = &payload["data"];

    match normalize_event(event).as_str() {
        "connection.update" => {
            let remote_state = data["state"].as_str().unwrap_or("close");
            let status = map_connection_state(remote_state);
            let phone = data["wuid"]
                .as_str()
                .map(crate::api::evolution::phone_from_jid);

            if let Err(e) =
                db::set_instance_state(&state.pool, instance_name, status, phone.as_deref()).await
            {
                log::error!("whatsapp webhook state update error: {e}");
                return HttpResponse::InternalServerError().finish();
            }

            log::info!("webhook connection.update instance={instance_name} status={status}");
        }
        "qrcode.updated" => {
            let qr = data["qrcode"]["base64"]
                .as_str()
                .or_else(|| data["qrcode"].as_str());

            if let Err(e) = db::set_instance_qr(&state.pool, instance_name, qr).await {
                log::error!("whatsapp webhook qr update error: {e}");
                return HttpResponse::InternalServerError().finish();
            }

            log::info!("webhook qrcode.updated instance={instance_name}");
        }
        other => {
            log::debug!("whatsapp webhook ignored event={other} instance={instance_name}");
            return HttpResponse::Ok().json(json!({ "ok": true, "ignored": true }));
        }
    }

    ws::notify_instance(&state.pool, &state.ws_hub, instance_name).await;

    HttpResponse::Ok().json(json!({ "ok": true }))
}
