use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Recipient};
use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::AppState;

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Message)]
#[rtype(result = "()")]
struct WsMessage(pub String);

#[derive(Message)]
#[rtype(result = "()")]
struct Connect {
    barbershop_id: i32,
    session_id: usize,
    addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Disconnect {
    barbershop_id: i32,
    session_id: usize,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct NotifyInstance {
    pub barbershop_id: i32,
    pub event: InstanceEvent,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceEvent {
    pub event: &'static str,
    pub data: InstanceEventData,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceEventData {
    pub id: i32,
    pub instance_name: String,
    pub status: String,
    pub phone_number: Option<String>,
    pub qr_code: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Fan-out hub: dashboard sessions register per barbershop and receive
/// instance status updates, replacing client-side status polling.
pub struct WsHub {
    sessions: HashMap<i32, HashMap<usize, Recipient<WsMessage>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for WsHub {
    type Context = actix::Context<Self>;
}

impl Handler<Connect> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) -> Self::Result {
        self.sessions
            .entry(msg.barbershop_id)
            .or_default()
            .insert(msg.session_id, msg.addr);
    }
}

impl Handler<Disconnect> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) -> Self::Result {
        if let Some(shop_sessions) = self.sessions.get_mut(&msg.barbershop_id) {
            shop_sessions.remove(&msg.session_id);
            if shop_sessions.is_empty() {
                self.sessions.remove(&msg.barbershop_id);
            }
        }
    }
}

impl Handler<NotifyInstance> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: NotifyInstance, _: &mut Self::Context) -> Self::Result {
        if let Some(shop_sessions) = self.sessions.get(&msg.barbershop_id) {
            if let Ok(payload) = serde_json::to_string(&msg.event) {
                for addr in shop_sessions.values() {
                    let _ = addr.do_send(WsMessage(payload.clone()));
                }
            }
        }
    }
}

struct WsSession {
    barbershop_id: i32,
    session_id: usize,
    hub: actix::Addr<WsHub>,
}

impl WsSession {
    fn new(barbershop_id: i32, hub: actix::Addr<WsHub>) -> Self {
        Self {
            barbershop_id,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            hub,
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Connect {
            barbershop_id: self.barbershop_id,
            session_id: self.session_id,
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            barbershop_id: self.barbershop_id,
            session_id: self.session_id,
        });
    }
}

impl Handler<WsMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.0);
    }
}

impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Text(_)) => {}
            Ok(ws::Message::Binary(_)) => {}
            Ok(ws::Message::Continuation(_)) => {}
            Ok(ws::Message::Nop) => {}
            Err(_) => ctx.stop(),
        }
    }
}

#[derive(Deserialize)]
struct WsQuery {
    token: String,
}

#[derive(Deserialize)]
struct Claims {
    sub: i32,
    exp: usize,
}

pub async fn instances_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = serde_urlencoded::from_str::<WsQuery>(req.query_string())
        .ok()
        .map(|q| q.token)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return Err(actix_web::error::ErrorUnauthorized("Missing token"));
    };

    let barbershop_id = decode_barbershop_id(&token)?;
    ws::start(
        WsSession::new(barbershop_id, state.ws_hub.clone()),
        &req,
        stream,
    )
}

fn decode_barbershop_id(token: &str) -> Result<i32, Error> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| actix_web::error::ErrorInternalServerError("JWT secret not set"))?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|_| actix_web::error::ErrorUnauthorized("Invalid token"))
}

pub async fn notify_instance(
    pool: &sqlx::PgPool,
    hub: &actix::Addr<WsHub>,
    instance_name: &str,
) {
    let row = sqlx::query(
        r#"SELECT id, barbershop_id, instance_name, status, phone_number, qr_code, last_sync_at
           FROM whatsapp_instances
           WHERE instance_name = $1"#,
    )
    .bind(instance_name)
    .fetch_optional(pool)
    .await;

    let Ok(Some(row)) = row else {
        return;
    };

    let barbershop_id: i32 = row.get("barbershop_id");
    let event = InstanceEvent {
        event: "instance.updated",
        data: InstanceEventData {
            id: row.get("id"),
            instance_name: row.get("instance_name"),
            status: row.get("status"),
            phone_number: row.get("phone_number"),
            qr_code: row.get("qr_code"),
            last_sync_at: row.get("last_sync_at"),
        },
    };

    hub.do_send(NotifyInstance {
        barbershop_id,
        event,
    });
}
