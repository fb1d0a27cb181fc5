//! Browser `fetch` transport for the game REST API

use std::rc::Rc;

use glam::Vec2;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortSignal, Request, RequestInit, RequestMode, Response};

use super::wire::*;
use super::{
    CollisionAck, ConsumeAck, ConsumedKind, JoinedSession, NetError, NetFuture, NetResult,
    RemoteApi,
};
use crate::config::{EngineConfig, GameMode};
use crate::sim::{EntityId, WorldSnapshot};

struct Endpoint {
    base: String,
    timeout_ms: u32,
}

/// [`RemoteApi`] over HTTP/JSON using `window.fetch`
#[derive(Clone)]
pub struct HttpApi {
    endpoint: Rc<Endpoint>,
}

impl HttpApi {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            endpoint: Rc::new(Endpoint {
                base: config.api_base(),
                timeout_ms: config.request_timeout_ms,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.base, path)
    }
}

fn js_err(context: &str, e: JsValue) -> NetError {
    NetError::Transport(format!("{}: {:?}", context, e))
}

/// Issue one request and return the raw response body
async fn send(method: &str, url: String, body: Option<String>, timeout_ms: u32) -> NetResult<String> {
    let opts = RequestInit::new();
    opts.set_method(method);
    opts.set_mode(RequestMode::Cors);
    opts.set_signal(Some(&AbortSignal::timeout_with_u32(timeout_ms)));
    if let Some(body) = body.as_deref() {
        opts.set_body(&JsValue::from_str(body));
    }

    let request = Request::new_with_str_and_init(&url, &opts).map_err(|e| js_err("request", e))?;
    if body.is_some() {
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(|e| js_err("headers", e))?;
    }

    let window = web_sys::window().ok_or_else(|| NetError::Transport("no window".to_string()))?;
    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| js_err("fetch", e))?;
    let response: Response = response
        .dyn_into()
        .map_err(|_| NetError::Protocol("fetch did not return a Response".to_string()))?;

    match response.status() {
        404 => return Err(NetError::InvalidSession(url)),
        s if !(200..300).contains(&s) => {
            return Err(NetError::Transport(format!("{} returned {}", url, s)));
        }
        _ => {}
    }

    let text = JsFuture::from(response.text().map_err(|e| js_err("body", e))?)
        .await
        .map_err(|e| js_err("body", e))?;
    text.as_string()
        .ok_or_else(|| NetError::Protocol("response body is not text".to_string()))
}

async fn get_json<T: DeserializeOwned>(url: String, timeout_ms: u32) -> NetResult<T> {
    let text = send("GET", url, None, timeout_ms).await?;
    Ok(serde_json::from_str(&text)?)
}

async fn post_json<B: Serialize, T: DeserializeOwned>(
    url: String,
    body: &B,
    timeout_ms: u32,
) -> NetResult<T> {
    let body = serde_json::to_string(body)?;
    let text = send("POST", url, Some(body), timeout_ms).await?;
    Ok(serde_json::from_str(&text)?)
}

impl RemoteApi for HttpApi {
    fn create_or_join(&self, mode: GameMode, player_id: &str) -> NetFuture<JoinedSession> {
        let url = self.url("games/create");
        let timeout = self.endpoint.timeout_ms;
        let body = GameCreateDto {
            game_mode: mode.as_str().to_string(),
            player_id: player_id.to_string(),
        };
        Box::pin(async move {
            let game: GameDto = post_json(url, &body, timeout).await?;
            Ok(game.into())
        })
    }

    fn pull_snapshot(&self, session_id: &str) -> NetFuture<WorldSnapshot> {
        let url = self.url(&format!("games/{}/state", session_id));
        let timeout = self.endpoint.timeout_ms;
        Box::pin(async move {
            let state: GameStateDto = get_json(url, timeout).await?;
            Ok(state.into())
        })
    }

    fn push_position(
        &self,
        session_id: &str,
        player_id: &str,
        pos: Vec2,
        mass: u64,
    ) -> NetFuture<()> {
        let url = self.url(&format!("games/{}/update-position", session_id));
        let timeout = self.endpoint.timeout_ms;
        let body = PositionUpdateDto {
            player_id: player_id.to_string(),
            x: pos.x,
            y: pos.y,
            money: mass,
        };
        Box::pin(async move {
            let _: serde_json::Value = post_json(url, &body, timeout).await?;
            Ok(())
        })
    }

    fn notify_consumed(
        &self,
        session_id: &str,
        player_id: &str,
        kind: ConsumedKind,
        ids: Vec<EntityId>,
    ) -> NetFuture<ConsumeAck> {
        let timeout = self.endpoint.timeout_ms;
        let player_id = player_id.to_string();
        match kind {
            ConsumedKind::Food => {
                let url = self.url(&format!("games/{}/consume-food", session_id));
                let body = FoodConsumptionDto {
                    food_ids: ids,
                    player_id,
                };
                Box::pin(async move {
                    let reply: FoodConsumptionReplyDto = post_json(url, &body, timeout).await?;
                    Ok(reply.into())
                })
            }
            ConsumedKind::PowerUp => {
                let url = self.url(&format!("games/{}/consume-powerup", session_id));
                let body = PowerUpConsumptionDto {
                    power_up_ids: ids,
                    player_id,
                };
                Box::pin(async move {
                    let reply: PowerUpConsumptionReplyDto = post_json(url, &body, timeout).await?;
                    Ok(reply.into())
                })
            }
        }
    }

    fn notify_collision(
        &self,
        session_id: &str,
        player_id: &str,
        other_id: &str,
    ) -> NetFuture<CollisionAck> {
        let url = self.url(&format!("games/{}/check-collisions", session_id));
        let timeout = self.endpoint.timeout_ms;
        let body = CollisionCheckDto {
            player_id: player_id.to_string(),
            other_id: other_id.to_string(),
        };
        Box::pin(async move {
            let reply: CollisionReplyDto = post_json(url, &body, timeout).await?;
            Ok(reply.into())
        })
    }

    fn leave(&self, session_id: &str, player_id: &str) -> NetFuture<()> {
        let url = self.url(&format!(
            "games/{}/leave?player_id={}",
            session_id,
            String::from(js_sys::encode_uri_component(player_id))
        ));
        let timeout = self.endpoint.timeout_ms;
        Box::pin(async move {
            send("DELETE", url, None, timeout).await?;
            Ok(())
        })
    }
}
