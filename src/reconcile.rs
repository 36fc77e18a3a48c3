// src/reconcile.rs
//
// Convergence between the stored whatsapp_instances row and the gateway's
// live session. Planning is pure; application talks to the gateway and the
// database. Normally driven by webhooks, with the queue sweep as fallback
// and POST /api/whatsapp/reconcile as the manual operator pass.

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::api::evolution::{self, phone_from_jid, EvolutionConfig, InstanceState};
use crate::db;
use crate::models::WhatsAppInstance;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "action", content = "detail")]
pub enum ReconcileAction {
    MarkConnected { phone_number: String },
    MarkDisconnected,
    ForceLogout,
    RegenerateQr,
    RegisterWebhook,
    RecreateInstance,
}

/// Decides what has to happen for a local row to converge with the remote
/// session state. Order matters: a ghost session ("open" with no owner jid)
/// is logged out before a new QR code is generated.
pub fn plan_reconciliation(
    local_status: &str,
    local_phone: Option<&str>,
    remote: Option<&InstanceState>,
) -> Vec<ReconcileAction> {
    let Some(remote) = remote else {
        // The gateway has no such instance at all.
        return vec![
            ReconcileAction::MarkDisconnected,
            ReconcileAction::RecreateInstance,
        ];
    };

    let remote_state = remote.state.as_deref().unwrap_or("close");

    match (remote_state, remote.owner.as_deref()) {
        ("open", Some(jid)) => {
            let phone_number = phone_from_jid(jid);
            if local_status != "connected" || local_phone != Some(phone_number.as_str()) {
                vec![ReconcileAction::MarkConnected { phone_number }]
            } else {
                Vec::new()
            }
        }
        // Ghost connection: session claims open but no device is linked.
        ("open", None) => vec![
            ReconcileAction::MarkDisconnected,
            ReconcileAction::ForceLogout,
            ReconcileAction::RegenerateQr,
            ReconcileAction::RegisterWebhook,
        ],
        _ => {
            if local_status == "connected" {
                vec![
                    ReconcileAction::MarkDisconnected,
                    ReconcileAction::RegenerateQr,
                    ReconcileAction::RegisterWebhook,
                ]
            } else {
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileOutcome {
    pub instance_name: String,
    pub remote_state: Option<String>,
    pub actions: Vec<ReconcileAction>,
}

/// Live state for one instance: connection-state endpoint for the state,
/// instance list for the owner jid. A 404 from either means the instance is
/// unknown to the gateway.
async fn fetch_remote_state(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<Option<InstanceState>, String> {
    let state = match evolution::connection_state(config, instance_name).await {
        Ok(state) => Some(state),
        Err(evolution::EvolutionError::Api { status: 404, .. }) => None,
        Err(e) => return Err(e.to_string()),
    };

    let Some(mut state) = state else {
        return Ok(None);
    };

    if state.owner.is_none() {
        let instances = evolution::fetch_instances(config)
            .await
            .map_err(|e| e.to_string())?;
        if let Some(listed) = instances
            .into_iter()
            .find(|i| i.instance_name == instance_name)
        {
            state.owner = listed.owner;
            if state.state.is_none() {
                state.state = listed.state;
            }
        }
    }

    Ok(Some(state))
}

/// One full reconciliation pass for an instance. Applies the planned actions
/// in order; gateway call failures during cleanup are logged and do not stop
/// the remaining actions.
pub async fn reconcile_instance(
    pool: &PgPool,
    config: &EvolutionConfig,
    webhook_base_url: &str,
    instance: &WhatsAppInstance,
) -> Result<ReconcileOutcome, String> {
    let remote = fetch_remote_state(config, &instance.instance_name).await?;
    let actions = plan_reconciliation(
        &instance.status,
        instance.phone_number.as_deref(),
        remote.as_ref(),
    );

    let webhook_url = format!(
        "{}/webhook/whatsapp",
        webhook_base_url.trim_end_matches('/')
    );

    for action in &actions {
        match action {
            ReconcileAction::MarkConnected { phone_number } => {
                db::set_instance_state(pool, &instance.instance_name, "connected", Some(phone_number))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            ReconcileAction::MarkDisconnected => {
                db::set_instance_state(pool, &instance.instance_name, "disconnected", None)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            ReconcileAction::ForceLogout => {
                if let Err(e) = evolution::logout_instance(config, &instance.instance_name).await {
                    log::warn!("forced logout failed for {}: {e}", instance.instance_name);
                }
            }
            ReconcileAction::RegenerateQr => {
                match evolution::connect_qr(config, &instance.instance_name).await {
                    Ok(qr) => {
                        db::set_instance_qr(pool, &instance.instance_name, qr.as_deref())
                            .await
                            .map_err(|e| e.to_string())?;
                    }
                    Err(e) => log::warn!("qr refresh failed for {}: {e}", instance.instance_name),
                }
            }
            ReconcileAction::RegisterWebhook => {
                if let Err(e) =
                    evolution::set_webhook(config, &instance.instance_name, &webhook_url).await
                {
                    log::warn!("webhook re-register failed for {}: {e}", instance.instance_name);
                }
            }
            ReconcileAction::RecreateInstance => {
                match evolution::create_instance(config, &instance.instance_name, &webhook_url).await
                {
                    Ok(qr) => {
                        db::set_instance_qr(pool, &instance.instance_name, qr.as_deref())
                            .await
                            .map_err(|e| e.to_string())?;
                    }
                    Err(e) => log::warn!("recreate failed for {}: {e}", instance.instance_name),
                }
            }
        }
    }

    // Even a no-op pass counts as a successful sync.
    if actions.is_empty() {
        db::set_instance_state(pool, &instance.instance_name, &instance.status, None)
            .await
            .map_err(|e| e.to_string())?;
    }

    Ok(ReconcileOutcome {
        instance_name: instance.instance_name.clone(),
        remote_state: remote.and_then(|r| r.state),
        actions,
    })
}
