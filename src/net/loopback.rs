//! In-process game server
//!
//! Behaves like the real room server closely enough to play offline and to
//! drive the engine in tests: seeded pellet generation, per-mode food
//! replacement, wandering bots, and the same 1.2× arbitration rule for
//! player contact. Failures can be injected per call type.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::{
    CollisionAck, ConsumeAck, ConsumedKind, JoinedSession, NetError, NetFuture, NetResult,
    RemoteApi, SessionId,
};
use crate::config::GameMode;
use crate::consts::*;
use crate::sim::collision::{Contest, contest, mass_gained_from, overlaps};
use crate::sim::{EntityId, Food, GameStats, PowerUp, PowerUpKind, RemotePlayer, WorldSnapshot};

const FOOD_COLORS: [&str; 10] = [
    "#ff6b6b", "#4ecdc4", "#45b7d1", "#f9ca24", "#f0932b", "#eb4d4b", "#6c5ce7", "#a29bfe",
    "#fd79a8", "#e84393",
];
const PLAYER_COLORS: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#e67e22", "#34495e",
];
const BOT_NAMES: [&str; 10] = [
    "BotDestroyer", "CashGrabber", "MoneyHunter", "AgarKing", "BlobMaster", "CoinCollector",
    "PowerPlayer", "FastFeeder", "MegaBeast", "ProfitSeeker",
];
/// Bot step per pull
const BOT_STEP: f32 = 12.0;

/// Kinds with their (color, radius, value), as the server generates them
const POWER_UP_TABLE: [(PowerUpKind, &str, f32, u64); 5] = [
    (PowerUpKind::SpeedBoost, "#ff9f43", 8.0, 20),
    (PowerUpKind::SizeBoost, "#10ac84", 10.0, 50),
    (PowerUpKind::MoneyMultiplier, "#feca57", 12.0, 30),
    (PowerUpKind::Shield, "#5f27cd", 9.0, 40),
    (PowerUpKind::Magnet, "#00d2d3", 7.0, 25),
];

#[derive(Debug)]
struct Room {
    mode: GameMode,
    players: BTreeMap<EntityId, RemotePlayer>,
    food: BTreeMap<EntityId, Food>,
    power_ups: BTreeMap<EntityId, PowerUp>,
    /// Bot id -> heading
    bots: BTreeMap<EntityId, Vec2>,
}

impl Room {
    fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self.players.values().cloned().collect(),
            food: self.food.values().cloned().collect(),
            power_ups: self.power_ups.values().cloned().collect(),
            stats: GameStats {
                players_online: self.players.len() as u32,
                food_items: self.food.len() as u32,
                power_ups: self.power_ups.len() as u32,
                game_mode: Some(self.mode.as_str().to_string()),
            },
        }
    }
}

/// Call counters and injected failures
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallStats {
    pub joins: u32,
    pub pulls: u32,
    pub pushes: u32,
    pub consumed: u32,
    pub collisions: u32,
    pub leaves: u32,
}

#[derive(Debug)]
struct ServerState {
    rng: Pcg32,
    next_id: u64,
    rooms: BTreeMap<SessionId, Room>,
    bots_enabled: bool,
    fail_pulls: u32,
    fail_joins: u32,
    offline: bool,
    calls: CallStats,
}

impl ServerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn random_pos(&mut self, margin: f32) -> Vec2 {
        Vec2::new(
            self.rng.random_range(margin..ARENA_WIDTH - margin),
            self.rng.random_range(margin..ARENA_HEIGHT - margin),
        )
    }

    fn generate_food(&mut self, count: usize) -> Vec<Food> {
        (0..count)
            .map(|_| Food {
                id: self.next_id("food"),
                pos: self.random_pos(10.0),
                color: FOOD_COLORS[self.rng.random_range(0..FOOD_COLORS.len())].to_string(),
                value: self.rng.random_range(1..=5),
            })
            .collect()
    }

    fn generate_power_ups(&mut self, count: usize) -> Vec<PowerUp> {
        (0..count)
            .map(|_| {
                let (kind, color, radius, value) =
                    POWER_UP_TABLE[self.rng.random_range(0..POWER_UP_TABLE.len())];
                PowerUp {
                    id: self.next_id("powerup"),
                    pos: self.random_pos(20.0),
                    kind,
                    radius,
                    value,
                    color: color.to_string(),
                    duration_secs: None,
                }
            })
            .collect()
    }

    fn new_player(&mut self, id: &str, name: &str) -> RemotePlayer {
        RemotePlayer {
            id: id.to_string(),
            name: name.to_string(),
            pos: self.random_pos(50.0),
            mass: STARTING_MASS,
            score: 0,
            kills: 0,
            is_alive: true,
            color: PLAYER_COLORS[self.rng.random_range(0..PLAYER_COLORS.len())].to_string(),
        }
    }

    fn create_room(&mut self, mode: GameMode) -> SessionId {
        let id = self.next_id("game");
        let (food_count, power_up_count) = mode.initial_population();
        let mut room = Room {
            mode,
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            power_ups: BTreeMap::new(),
            bots: BTreeMap::new(),
        };
        room.food = self
            .generate_food(food_count)
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        room.power_ups = self
            .generate_power_ups(power_up_count)
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        if self.bots_enabled {
            for i in 0..mode.bot_count() {
                let bot_id = format!("bot_{}_{}", id, i);
                let name = format!(
                    "{}{}",
                    BOT_NAMES[self.rng.random_range(0..BOT_NAMES.len())],
                    self.rng.random_range(1..1000)
                );
                let bot = self.new_player(&bot_id, &name);
                let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
                room.bots.insert(bot_id.clone(), Vec2::from_angle(angle));
                room.players.insert(bot_id, bot);
            }
        }
        self.rooms.insert(id.clone(), room);
        id
    }

    fn room(&mut self, session_id: &str) -> NetResult<&mut Room> {
        self.rooms
            .get_mut(session_id)
            .ok_or_else(|| NetError::InvalidSession(session_id.to_string()))
    }

    fn step_bots(&mut self, session_id: &str) {
        let turn: f32 = self.rng.random_range(-0.5..0.5);
        let Some(room) = self.rooms.get_mut(session_id) else {
            return;
        };
        for (id, heading) in room.bots.iter_mut() {
            let Some(bot) = room.players.get_mut(id) else {
                continue;
            };
            *heading = Vec2::from_angle(turn).rotate(*heading);
            let r = bot.radius();
            let next = bot.pos + *heading * BOT_STEP;
            if next.x < r || next.x > ARENA_WIDTH - r {
                heading.x = -heading.x;
            }
            if next.y < r || next.y > ARENA_HEIGHT - r {
                heading.y = -heading.y;
            }
            bot.pos = (bot.pos + *heading * BOT_STEP).clamp(
                Vec2::splat(r),
                Vec2::new(ARENA_WIDTH - r, ARENA_HEIGHT - r),
            );
        }
    }
}

/// In-memory [`RemoteApi`] implementation
#[derive(Clone)]
pub struct LoopbackArena {
    state: Rc<RefCell<ServerState>>,
}

impl LoopbackArena {
    /// Empty server with bots disabled
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(ServerState {
                rng: Pcg32::seed_from_u64(seed),
                next_id: 0,
                rooms: BTreeMap::new(),
                bots_enabled: false,
                fail_pulls: 0,
                fail_joins: 0,
                offline: false,
                calls: CallStats::default(),
            })),
        }
    }

    /// Server that fills new rooms with wandering bots
    pub fn with_bots(seed: u64) -> Self {
        let arena = Self::new(seed);
        arena.state.borrow_mut().bots_enabled = true;
        arena
    }

    /// Make the next `n` snapshot pulls fail with a transport error
    pub fn fail_next_pulls(&self, n: u32) {
        self.state.borrow_mut().fail_pulls = n;
    }

    /// Make the next `n` joins fail with a transport error
    pub fn fail_next_joins(&self, n: u32) {
        self.state.borrow_mut().fail_joins = n;
    }

    /// While offline every call fails
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn calls(&self) -> CallStats {
        self.state.borrow().calls
    }

    /// Current room state, as a pull would return it
    pub fn snapshot(&self, session_id: &str) -> Option<WorldSnapshot> {
        self.state.borrow().rooms.get(session_id).map(Room::snapshot)
    }

    pub fn player(&self, session_id: &str, player_id: &str) -> Option<RemotePlayer> {
        let state = self.state.borrow();
        state.rooms.get(session_id)?.players.get(player_id).cloned()
    }

    /// Put a food pellet into a room
    pub fn insert_food(&self, session_id: &str, food: Food) {
        if let Some(room) = self.state.borrow_mut().rooms.get_mut(session_id) {
            room.food.insert(food.id.clone(), food);
        }
    }

    /// Put a power-up into a room
    pub fn insert_power_up(&self, session_id: &str, power_up: PowerUp) {
        if let Some(room) = self.state.borrow_mut().rooms.get_mut(session_id) {
            room.power_ups.insert(power_up.id.clone(), power_up);
        }
    }

    /// Put (or replace) a player in a room
    pub fn insert_player(&self, session_id: &str, player: RemotePlayer) {
        if let Some(room) = self.state.borrow_mut().rooms.get_mut(session_id) {
            room.players.insert(player.id.clone(), player);
        }
    }

    /// Remove every pellet from a room
    pub fn clear_pellets(&self, session_id: &str) {
        if let Some(room) = self.state.borrow_mut().rooms.get_mut(session_id) {
            room.food.clear();
            room.power_ups.clear();
        }
    }

    /// Shared failure gate; returns an error while offline
    fn gate(state: &ServerState) -> NetResult<()> {
        if state.offline {
            Err(NetError::Transport("loopback offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteApi for LoopbackArena {
    fn create_or_join(&self, mode: GameMode, player_id: &str) -> NetFuture<JoinedSession> {
        let state = self.state.clone();
        let player_id = player_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.joins += 1;
            Self::gate(&s)?;
            if s.fail_joins > 0 {
                s.fail_joins -= 1;
                return Err(NetError::Transport("injected join failure".to_string()));
            }

            let open = s
                .rooms
                .iter()
                .find(|(_, r)| r.mode == mode && r.players.len() < mode.max_players())
                .map(|(id, _)| id.clone());
            let session_id = match open {
                Some(id) => id,
                None => s.create_room(mode),
            };

            let player = s.new_player(&player_id, &player_id);
            let room = s.room(&session_id)?;
            room.players.entry(player_id).or_insert(player);
            let snapshot = room.snapshot();
            log::info!("Loopback: joined room {}", session_id);
            Ok(JoinedSession {
                session_id,
                snapshot,
            })
        })
    }

    fn pull_snapshot(&self, session_id: &str) -> NetFuture<WorldSnapshot> {
        let state = self.state.clone();
        let session_id = session_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.pulls += 1;
            Self::gate(&s)?;
            if s.fail_pulls > 0 {
                s.fail_pulls -= 1;
                return Err(NetError::Transport("injected pull failure".to_string()));
            }
            if s.bots_enabled {
                s.step_bots(&session_id);
            }
            Ok(s.room(&session_id)?.snapshot())
        })
    }

    fn push_position(
        &self,
        session_id: &str,
        player_id: &str,
        pos: Vec2,
        mass: u64,
    ) -> NetFuture<()> {
        let state = self.state.clone();
        let session_id = session_id.to_string();
        let player_id = player_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.pushes += 1;
            Self::gate(&s)?;
            let player = s
                .room(&session_id)?
                .players
                .get_mut(&player_id)
                .ok_or_else(|| NetError::InvalidSession(player_id.clone()))?;
            player.pos = pos;
            player.mass = mass;
            Ok(())
        })
    }

    fn notify_consumed(
        &self,
        session_id: &str,
        _player_id: &str,
        kind: ConsumedKind,
        ids: Vec<EntityId>,
    ) -> NetFuture<ConsumeAck> {
        let state = self.state.clone();
        let session_id = session_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.consumed += 1;
            Self::gate(&s)?;
            let room = s.room(&session_id)?;
            let mode = room.mode;
            match kind {
                ConsumedKind::Food => {
                    let points = ids
                        .iter()
                        .filter_map(|id| room.food.remove(id))
                        .map(|f| f.value)
                        .sum();
                    let replace = (ids.len() as f32 * mode.food_replacement_rate()) as usize;
                    let fresh = s.generate_food(replace);
                    let room = s.room(&session_id)?;
                    room.food.extend(fresh.into_iter().map(|f| (f.id.clone(), f)));
                    Ok(ConsumeAck {
                        points_earned: Some(points),
                        applied_effects: Vec::new(),
                    })
                }
                ConsumedKind::PowerUp => {
                    let consumed: Vec<PowerUp> = ids
                        .iter()
                        .filter_map(|id| room.power_ups.remove(id))
                        .collect();
                    if !consumed.is_empty() && s.rng.random_bool(0.3) {
                        let fresh = s.generate_power_ups(1);
                        let room = s.room(&session_id)?;
                        room.power_ups
                            .extend(fresh.into_iter().map(|p| (p.id.clone(), p)));
                    }
                    Ok(ConsumeAck {
                        points_earned: None,
                        applied_effects: consumed,
                    })
                }
            }
        })
    }

    fn notify_collision(
        &self,
        session_id: &str,
        player_id: &str,
        other_id: &str,
    ) -> NetFuture<CollisionAck> {
        let state = self.state.clone();
        let session_id = session_id.to_string();
        let player_id = player_id.to_string();
        let other_id = other_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.collisions += 1;
            Self::gate(&s)?;
            let room = s.room(&session_id)?;
            let (Some(me), Some(other)) = (
                room.players.get(&player_id).cloned(),
                room.players.get(&other_id).cloned(),
            ) else {
                return Err(NetError::InvalidSession(player_id));
            };

            let mut ack = CollisionAck {
                is_alive: me.is_alive,
                ..Default::default()
            };
            if !me.is_alive
                || !other.is_alive
                || !overlaps(me.pos, me.radius(), other.pos, other.radius())
            {
                return Ok(ack);
            }

            match contest(me.radius(), other.radius()) {
                Contest::Eat => {
                    let gained = mass_gained_from(other.mass);
                    room.players.remove(&other_id);
                    room.bots.remove(&other_id);
                    if let Some(me) = room.players.get_mut(&player_id) {
                        me.mass += gained;
                        me.score += gained;
                        me.kills += 1;
                    }
                    ack.kills = 1;
                    ack.mass_gained = gained;
                }
                Contest::Eaten => {
                    if let Some(me) = room.players.get_mut(&player_id) {
                        me.is_alive = false;
                    }
                    ack.deaths = 1;
                    ack.is_alive = false;
                }
                Contest::Standoff => {}
            }
            Ok(ack)
        })
    }

    fn leave(&self, session_id: &str, player_id: &str) -> NetFuture<()> {
        let state = self.state.clone();
        let session_id = session_id.to_string();
        let player_id = player_id.to_string();
        Box::pin(async move {
            let mut s = state.borrow_mut();
            s.calls.leaves += 1;
            Self::gate(&s)?;
            let room = s.room(&session_id)?;
            room.players.remove(&player_id);
            if room.players.keys().all(|id| room.bots.contains_key(id)) {
                s.rooms.remove(&session_id);
                log::info!("Loopback: closed empty room {}", session_id);
            }
            Ok(())
        })
    }
}
