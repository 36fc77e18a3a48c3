// src/api/evolution.rs
//
// Minimal client for the Evolution API WhatsApp gateway.
// Auth: `apikey` header on every request.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Events the webhook subscription is always registered with.
pub const WEBHOOK_EVENTS: [&str; 2] = ["QRCODE_UPDATED", "CONNECTION_UPDATE"];

#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug)]
pub enum EvolutionError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for EvolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvolutionError::Http(e) => write!(f, "http error: {e}"),
            EvolutionError::Api { status, body } => {
                write!(f, "evolution api error status={status} body={body}")
            }
            EvolutionError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for EvolutionError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Live session state as the gateway reports it. `owner` is the WhatsApp
/// jid of the linked device; a session that says "open" without one is a
/// ghost connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(rename = "instanceName", default)]
    pub instance_name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "wuid")]
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceStateEnvelope {
    instance: InstanceState,
}

/// "5511999999999@s.whatsapp.net" -> "5511999999999"
pub fn phone_from_jid(jid: &str) -> String {
    jid.split('@').next().unwrap_or(jid).to_string()
}

fn webhook_body(webhook_url: &str) -> serde_json::Value {
    json!({
        "enabled": true,
        "url": webhook_url,
        "byEvents": true,
        "events": WEBHOOK_EVENTS,
    })
}

/// QR payloads show up in a few shapes depending on the endpoint and
/// gateway version.
fn extract_qr(value: &serde_json::Value) -> Option<String> {
    value["qrcode"]["base64"]
        .as_str()
        .or_else(|| value["base64"].as_str())
        .or_else(|| value["qrcode"].as_str())
        .map(|s| s.to_string())
}

async fn read_body(resp: reqwest::Response) -> Result<String, EvolutionError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(EvolutionError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

pub async fn connection_state(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<InstanceState, EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{}/instance/connectionState/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    let body = read_body(resp).await?;

    serde_json::from_str::<InstanceStateEnvelope>(&body)
        .map(|envelope| envelope.instance)
        .map_err(|e| EvolutionError::InvalidResponse(format!("{e}; body={body}")))
}

pub async fn fetch_instances(
    config: &EvolutionConfig,
) -> Result<Vec<InstanceState>, EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/instance/fetchInstances", config.base_url))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    let body = read_body(resp).await?;

    serde_json::from_str::<Vec<InstanceStateEnvelope>>(&body)
        .map(|list| list.into_iter().map(|envelope| envelope.instance).collect())
        .map_err(|e| EvolutionError::InvalidResponse(format!("{e}; body={body}")))
}

/// Creates the instance with QR pairing and the webhook subscription in one
/// call. Returns the QR code when the gateway sends one back.
pub async fn create_instance(
    config: &EvolutionConfig,
    instance_name: &str,
    webhook_url: &str,
) -> Result<Option<String>, EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/instance/create", config.base_url))
        .header("apikey", &config.api_key)
        .json(&json!({
            "instanceName": instance_name,
            "integration": "WHATSAPP-BAILEYS",
            "qrcode": true,
            "webhook": webhook_body(webhook_url),
        }))
        .send()
        .await?;

    let body = read_body(resp).await?;

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| EvolutionError::InvalidResponse(format!("{e}; body={body}")))?;

    Ok(extract_qr(&value))
}

/// Requests a fresh QR code for an existing instance.
pub async fn connect_qr(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<Option<String>, EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{}/instance/connect/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    let body = read_body(resp).await?;

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| EvolutionError::InvalidResponse(format!("{e}; body={body}")))?;

    Ok(extract_qr(&value))
}

/// (Re-)registers the webhook subscription with the fixed event list.
pub async fn set_webhook(
    config: &EvolutionConfig,
    instance_name: &str,
    webhook_url: &str,
) -> Result<(), EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/webhook/set/{}", config.base_url, instance_name))
        .header("apikey", &config.api_key)
        .json(&json!({ "webhook": webhook_body(webhook_url) }))
        .send()
        .await?;

    read_body(resp).await?;
    Ok(())
}

pub async fn logout_instance(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<(), EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .delete(format!(
            "{}/instance/logout/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    read_body(resp).await?;
    Ok(())
}

pub async fn delete_instance(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<(), EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .delete(format!(
            "{}/instance/delete/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    read_body(resp).await?;
    Ok(())
}

pub async fn restart_instance(
    config: &EvolutionConfig,
    instance_name: &str,
) -> Result<(), EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .put(format!(
            "{}/instance/restart/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .send()
        .await?;

    read_body(resp).await?;
    Ok(())
}

pub async fn send_text(
    config: &EvolutionConfig,
    instance_name: &str,
    number: &str,
    text: &str,
) -> Result<(), EvolutionError> {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!(
            "{}/message/sendText/{}",
            config.base_url, instance_name
        ))
        .header("apikey", &config.api_key)
        .json(&json!({ "number": number, "text": text }))
        .send()
        .await?;

    read_body(resp).await?;
    Ok(())
}
