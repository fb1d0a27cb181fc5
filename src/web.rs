//! Browser bindings
//!
//! The host page owns rendering and the animation frame; it drives an
//! [`ArenaClient`] once per frame and draws from `frame_json()`.

use futures::future::LocalFutureObj;
use futures::task::{LocalSpawn, SpawnError};
use glam::Vec2;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineEvent, TickInput};
use crate::net::HttpApi;
use crate::net::wire::{FoodDto, GamePlayerDto, PowerUpDto};
use crate::session::SessionState;
use crate::sim::{ActiveEffects, Arena, GameStats};

/// Spawns network tasks on the browser microtask queue
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// Install the panic hook and console logger (safe to call twice)
pub fn init_logging() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Everything a renderer needs for one frame
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameView<'a> {
    session: SessionState,
    local: GamePlayerDto,
    players: Vec<GamePlayerDto>,
    food: Vec<FoodDto>,
    power_ups: Vec<PowerUpDto>,
    effects: &'a ActiveEffects,
    stats: &'a GameStats,
    arena: &'a Arena,
    remaining_secs: Option<f64>,
}

/// Engine handle exported to JavaScript
#[wasm_bindgen]
pub struct ArenaClient {
    engine: Engine<HttpApi, BrowserSpawner>,
}

#[wasm_bindgen]
impl ArenaClient {
    /// Create a client with the stored configuration
    #[wasm_bindgen(constructor)]
    pub fn new(name: &str) -> ArenaClient {
        Self::with_config(EngineConfig::load(), name)
    }

    /// Advance one frame; pointer coordinates are in arena space
    pub fn tick(&mut self, now_ms: f64, pointer_x: Option<f32>, pointer_y: Option<f32>) {
        let pointer = pointer_x.zip(pointer_y).map(|(x, y)| Vec2::new(x, y));
        self.engine.tick(
            now_ms,
            &TickInput {
                pointer,
                leave: false,
            },
        );
    }

    pub fn leave(&mut self) {
        self.engine.leave();
    }

    /// Persist the current configuration to LocalStorage
    #[wasm_bindgen(js_name = saveConfig)]
    pub fn save_config(&self) {
        self.engine.config().save();
    }

    #[wasm_bindgen(js_name = sessionState)]
    pub fn session_state(&self) -> String {
        format!("{:?}", self.engine.session_state())
    }

    #[wasm_bindgen(js_name = remainingMatchSecs)]
    pub fn remaining_match_secs(&self) -> Option<f64> {
        self.engine.remaining_match_secs()
    }

    /// World view as JSON
    #[wasm_bindgen(js_name = frameJson)]
    pub fn frame_json(&self) -> String {
        let world = self.engine.world();
        let view = FrameView {
            session: self.engine.session_state(),
            local: GamePlayerDto::from(&world.local),
            players: world.remote_players.values().map(Into::into).collect(),
            food: world.food.values().map(Into::into).collect(),
            power_ups: world.power_ups.values().map(Into::into).collect(),
            effects: self.engine.effects(),
            stats: &world.stats,
            arena: &world.arena,
            remaining_secs: self.engine.remaining_match_secs(),
        };
        serde_json::to_string(&view).unwrap_or_else(|e| {
            log::error!("Failed to serialize frame: {}", e);
            "{}".to_string()
        })
    }

    /// Events since the last call, as a JSON array
    #[wasm_bindgen(js_name = takeEventsJson)]
    pub fn take_events_json(&mut self) -> String {
        let events = self.engine.take_events();
        serde_json::to_string(&events).unwrap_or_else(|_| "[]".to_string())
    }
}

impl ArenaClient {
    pub fn with_config(config: EngineConfig, name: &str) -> Self {
        let player_id = format!("player_{:08x}", rand::random::<u32>());
        log::info!(
            "Blob Arena client {} ({} mode, server {})",
            player_id,
            config.game_mode.as_str(),
            config.server_url
        );
        let api = HttpApi::new(&config);
        Self {
            engine: Engine::new(config, api, BrowserSpawner, player_id, name),
        }
    }

    pub fn engine(&self) -> &Engine<HttpApi, BrowserSpawner> {
        &self.engine
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        self.engine.take_events()
    }

    /// Tick with a full input (used by the bundled page driver)
    pub fn tick_with(&mut self, now_ms: f64, input: &TickInput) {
        self.engine.tick(now_ms, input);
    }
}
