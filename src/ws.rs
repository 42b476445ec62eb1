use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::warn;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth;
use crate::error::ApiError;
use crate::hub::{Connect, Disconnect, Hub, WsEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// One websocket connection for one authenticated user. Registers with
/// the hub on start and deregisters on stop, so no event is ever sent to
/// a torn-down session.
pub struct WsSession {
    user_id: String,
    hb: Instant,
    hub: Addr<Hub>,
}

impl WsSession {
    pub fn new(user_id: String, hub: Addr<Hub>) -> Self {
        WsSession {
            user_id,
            hb: Instant::now(),
            hub,
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.hub.do_send(Connect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            // Sends go through the HTTP API; inbound text is only a
            // liveness signal.
            Ok(ws::Message::Text(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<WsEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, event: WsEvent, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.text(event.0);
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = auth::verify_jwt(&query.token, &data.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized)?;
    ws::start(
        WsSession::new(user_id, data.hub.clone()),
        &req,
        stream,
    )
}
