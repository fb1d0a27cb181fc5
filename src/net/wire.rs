//! JSON wire format of the game REST API
//!
//! Field names follow the server: camelCase for room state, snake_case for
//! the consumption and collision endpoints.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{CollisionAck, ConsumeAck, JoinedSession};
use crate::sim::{
    Food, GameStats, LocalPlayer, PowerUp, PowerUpKind, RemotePlayer, WorldSnapshot,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayerDto {
    pub player_id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub money: u64,
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub kills: u32,
    #[serde(default = "default_alive")]
    pub is_alive: bool,
    #[serde(default)]
    pub color: String,
}

fn default_alive() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodDto {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub color: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUpDto {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
    #[serde(default)]
    pub color: String,
    /// Pickup radius
    pub size: f32,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsDto {
    #[serde(default)]
    pub players_online: u32,
    #[serde(default)]
    pub food_items: u32,
    #[serde(default)]
    pub power_ups: u32,
    #[serde(default)]
    pub game_mode: Option<String>,
}

/// `GET games/{id}/state`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    #[serde(default)]
    pub players: Vec<GamePlayerDto>,
    #[serde(default)]
    pub food: Vec<FoodDto>,
    #[serde(default)]
    pub power_ups: Vec<PowerUpDto>,
    #[serde(default)]
    pub game_stats: GameStatsDto,
}

/// `POST games/create` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreateDto {
    pub game_mode: String,
    pub player_id: String,
}

/// `POST games/create` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDto {
    pub id: String,
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub players: Vec<GamePlayerDto>,
    #[serde(default)]
    pub food: Vec<FoodDto>,
    #[serde(default)]
    pub power_ups: Vec<PowerUpDto>,
    #[serde(default)]
    pub max_players: u32,
}

/// `POST games/{id}/update-position`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdateDto {
    pub player_id: String,
    pub x: f32,
    pub y: f32,
    pub money: u64,
}

/// `POST games/{id}/consume-food`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodConsumptionDto {
    pub food_ids: Vec<String>,
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodConsumptionReplyDto {
    #[serde(default)]
    pub points_earned: u64,
}

/// `POST games/{id}/consume-powerup`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUpConsumptionDto {
    pub power_up_ids: Vec<String>,
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpConsumptionReplyDto {
    #[serde(default)]
    pub consumed_power_ups: Vec<PowerUpDto>,
}

/// `POST games/{id}/check-collisions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionCheckDto {
    pub player_id: String,
    pub other_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionReplyDto {
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub money_gained: u64,
    #[serde(default = "default_alive")]
    pub is_alive: bool,
}

impl From<GamePlayerDto> for RemotePlayer {
    fn from(p: GamePlayerDto) -> Self {
        Self {
            id: p.player_id,
            name: p.name,
            pos: Vec2::new(p.x, p.y),
            mass: p.money,
            score: p.score,
            kills: p.kills,
            is_alive: p.is_alive,
            color: p.color,
        }
    }
}

impl From<&RemotePlayer> for GamePlayerDto {
    fn from(p: &RemotePlayer) -> Self {
        Self {
            player_id: p.id.clone(),
            name: p.name.clone(),
            x: p.pos.x,
            y: p.pos.y,
            money: p.mass,
            score: p.score,
            kills: p.kills,
            is_alive: p.is_alive,
            color: p.color.clone(),
        }
    }
}

impl From<&LocalPlayer> for GamePlayerDto {
    fn from(p: &LocalPlayer) -> Self {
        Self {
            player_id: p.id.clone(),
            name: p.name.clone(),
            x: p.pos.x,
            y: p.pos.y,
            money: p.mass,
            score: p.score,
            kills: p.kills,
            is_alive: p.alive,
            color: p.color.clone(),
        }
    }
}

impl From<FoodDto> for Food {
    fn from(f: FoodDto) -> Self {
        Self {
            id: f.id,
            pos: Vec2::new(f.x, f.y),
            color: f.color,
            value: f.value,
        }
    }
}

impl From<&Food> for FoodDto {
    fn from(f: &Food) -> Self {
        Self {
            id: f.id.clone(),
            x: f.pos.x,
            y: f.pos.y,
            color: f.color.clone(),
            value: f.value,
        }
    }
}

impl From<PowerUpDto> for PowerUp {
    fn from(p: PowerUpDto) -> Self {
        Self {
            id: p.id,
            pos: Vec2::new(p.x, p.y),
            kind: p.kind,
            radius: p.size,
            value: p.value,
            color: p.color,
            duration_secs: p.duration,
        }
    }
}

impl From<&PowerUp> for PowerUpDto {
    fn from(p: &PowerUp) -> Self {
        Self {
            id: p.id.clone(),
            x: p.pos.x,
            y: p.pos.y,
            kind: p.kind,
            color: p.color.clone(),
            size: p.radius,
            value: p.value,
            duration: p.duration_secs,
        }
    }
}

impl From<GameStatsDto> for GameStats {
    fn from(s: GameStatsDto) -> Self {
        Self {
            players_online: s.players_online,
            food_items: s.food_items,
            power_ups: s.power_ups,
            game_mode: s.game_mode,
        }
    }
}

impl From<GameStateDto> for WorldSnapshot {
    fn from(s: GameStateDto) -> Self {
        Self {
            players: s.players.into_iter().map(Into::into).collect(),
            food: s.food.into_iter().map(Into::into).collect(),
            power_ups: s.power_ups.into_iter().map(Into::into).collect(),
            stats: s.game_stats.into(),
        }
    }
}

impl From<GameDto> for JoinedSession {
    fn from(g: GameDto) -> Self {
        let stats = GameStats {
            players_online: g.players.len() as u32,
            food_items: g.food.len() as u32,
            power_ups: g.power_ups.len() as u32,
            game_mode: Some(g.game_mode),
        };
        Self {
            session_id: g.id,
            snapshot: WorldSnapshot {
                players: g.players.into_iter().map(Into::into).collect(),
                food: g.food.into_iter().map(Into::into).collect(),
                power_ups: g.power_ups.into_iter().map(Into::into).collect(),
                stats,
            },
        }
    }
}

impl From<CollisionReplyDto> for CollisionAck {
    fn from(r: CollisionReplyDto) -> Self {
        Self {
            kills: r.kills,
            deaths: r.deaths,
            mass_gained: r.money_gained,
            is_alive: r.is_alive,
        }
    }
}

impl From<FoodConsumptionReplyDto> for ConsumeAck {
    fn from(r: FoodConsumptionReplyDto) -> Self {
        Self {
            points_earned: Some(r.points_earned),
            applied_effects: Vec::new(),
        }
    }
}

impl From<PowerUpConsumptionReplyDto> for ConsumeAck {
    fn from(r: PowerUpConsumptionReplyDto) -> Self {
        Self {
            points_earned: None,
            applied_effects: r.consumed_power_ups.into_iter().map(Into::into).collect(),
        }
    }
}
