use std::collections::HashMap;

use actix::prelude::*;
use log::{info, warn};
use serde::Serialize;

use crate::models::Message as ChatMessage;

/// Events pushed to connected clients. REST polling remains available as
/// the fallback; clients de-duplicate by message id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    Message {
        conversation_id: String,
        message: ChatMessage,
    },
    ConversationUpdated {
        conversation_id: String,
    },
    ConversationRemoved {
        conversation_id: String,
    },
}

/// Serialized event as delivered to one websocket session.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct WsEvent(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub user_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub user_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub user_ids: Vec<String>,
    pub event: PushEvent,
}

/// Central fan-out actor: keeps every open session per user and relays
/// store-side events to them. All persistence happens in the HTTP
/// handlers before anything is published here.
pub struct Hub {
    sessions: HashMap<String, Vec<Recipient<WsEvent>>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            sessions: HashMap::new(),
        }
    }
}

impl Actor for Hub {
    type Context = Context<Self>;
}

impl Handler<Connect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        info!("User {} connected (WS)", msg.user_id);
        self.sessions
            .entry(msg.user_id)
            .or_default()
            .push(msg.addr);
    }
}

impl Handler<Disconnect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.user_id);
        if let Some(addrs) = self.sessions.get_mut(&msg.user_id) {
            // Drop only the session that went away; the user may have
            // other tabs open.
            addrs.retain(|a| a != &msg.addr);
            if addrs.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<Publish> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        let payload = match serde_json::to_string(&msg.event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize push event: {}", e);
                return;
            }
        };
        for user_id in &msg.user_ids {
            if let Some(addrs) = self.sessions.get(user_id) {
                for addr in addrs {
                    addr.do_send(WsEvent(payload.clone()));
                }
            }
        }
    }
}
