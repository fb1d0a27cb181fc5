//! Engine configuration and game modes
//!
//! Persisted in LocalStorage on the web; read from a JSON file on native.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Game mode selected in the lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Classic,
    Tournament,
    Blitz,
    Royale,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Tournament => "tournament",
            GameMode::Blitz => "blitz",
            GameMode::Royale => "royale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" => Some(GameMode::Classic),
            "tournament" => Some(GameMode::Tournament),
            "blitz" => Some(GameMode::Blitz),
            "royale" | "battle royale" => Some(GameMode::Royale),
            _ => None,
        }
    }

    /// Room capacity
    pub fn max_players(&self) -> usize {
        match self {
            GameMode::Classic => 20,
            GameMode::Tournament => 16,
            GameMode::Blitz => 12,
            GameMode::Royale => 50,
        }
    }

    /// Match length in seconds (None = unlimited)
    pub fn match_duration_secs(&self) -> Option<f64> {
        match self {
            GameMode::Classic => None,
            GameMode::Tournament => Some(900.0),
            GameMode::Blitz => Some(300.0),
            GameMode::Royale => Some(1200.0),
        }
    }

    /// Movement speed multiplier
    pub fn speed_multiplier(&self) -> f32 {
        match self {
            GameMode::Blitz => 1.5,
            _ => 1.0,
        }
    }

    /// Score multiplier (mass is never multiplied)
    pub fn score_multiplier(&self) -> u64 {
        match self {
            GameMode::Blitz => 2,
            _ => 1,
        }
    }

    /// Share of eaten food the server replaces
    pub fn food_replacement_rate(&self) -> f32 {
        match self {
            GameMode::Classic => 0.1,
            GameMode::Tournament => 0.15,
            GameMode::Blitz => 0.3,
            GameMode::Royale => 0.05,
        }
    }

    /// Initial food and power-up population for a fresh room
    pub fn initial_population(&self) -> (usize, usize) {
        match self {
            GameMode::Classic => (100, 5),
            GameMode::Tournament => (80, 8),
            GameMode::Blitz => (120, 12),
            GameMode::Royale => (150, 15),
        }
    }

    /// Bots added to a fresh room
    pub fn bot_count(&self) -> usize {
        match self {
            GameMode::Classic => 8,
            GameMode::Tournament => 10,
            GameMode::Blitz => 15,
            GameMode::Royale => 25,
        }
    }

    /// Inset applied to every arena edge after `elapsed_secs` of play.
    ///
    /// Only royale shrinks: 10 px/s per side once five minutes have passed,
    /// stopping when either axis would fall below `MIN_ARENA_SIZE`.
    pub fn arena_inset(&self, elapsed_secs: f64, width: f32, height: f32) -> f32 {
        const SHRINK_START_SECS: f64 = 300.0;
        const SHRINK_RATE: f64 = 10.0;

        if *self != GameMode::Royale || elapsed_secs <= SHRINK_START_SECS {
            return 0.0;
        }
        let inset = ((elapsed_secs - SHRINK_START_SECS) * SHRINK_RATE) as f32;
        let max_inset = ((width.min(height) - MIN_ARENA_SIZE) / 2.0).max(0.0);
        inset.min(max_inset)
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the game API (without the `/api` suffix)
    pub server_url: String,
    /// Mode requested when joining
    pub game_mode: GameMode,

    // === Reconciliation cadence ===
    /// Position push interval
    pub push_interval_ms: f64,
    /// Full snapshot pull interval
    pub pull_interval_ms: f64,
    /// Consecutive pull failures before the session reports Disconnected
    pub max_pull_failures: u32,
    /// Per-request timeout for the fetch transport
    pub request_timeout_ms: u32,

    // === Arena ===
    pub arena_width: f32,
    pub arena_height: f32,
    /// Fraction of the offending direction component kept on a wall bounce
    pub bounce_damping: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8001".to_string(),
            game_mode: GameMode::Classic,

            push_interval_ms: 50.0,
            pull_interval_ms: 1000.0,
            max_pull_failures: 5,
            request_timeout_ms: 5000,

            arena_width: ARENA_WIDTH,
            arena_height: ARENA_HEIGHT,
            bounce_damping: 0.5,
        }
    }
}

impl EngineConfig {
    /// Create a config for the given mode with all other values defaulted
    pub fn for_mode(mode: GameMode) -> Self {
        let mut config = Self::default();
        config.game_mode = mode;
        config
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Bounce damping clamped to [0, 1]
    pub fn effective_bounce_damping(&self) -> f32 {
        self.bounce_damping.clamp(0.0, 1.0)
    }

    /// API root used by the fetch transport
    pub fn api_base(&self) -> String {
        format!("{}/api", self.server_url.trim_end_matches('/'))
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "blob_arena_config";

    /// Environment variable naming a JSON config file (native only)
    pub const CONFIG_ENV_VAR: &'static str = "BLOB_ARENA_CONFIG";

    /// Load config from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(config) => {
                        log::info!("Loaded engine config from LocalStorage");
                        return config;
                    }
                    Err(e) => log::warn!("Ignoring stored engine config: {}", e),
                }
            }
        }

        log::info!("Using default engine config");
        Self::default()
    }

    /// Save config to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Engine config saved");
            }
        }
    }

    /// Load config from the file named by `BLOB_ARENA_CONFIG`, if any
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var(Self::CONFIG_ENV_VAR) else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded engine config from {}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Invalid config in {}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Cannot read config {}: {}", path, e);
                Self::default()
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"game_mode":"blitz","pull_interval_ms":500}"#)
            .expect("valid config");
        assert_eq!(config.game_mode, GameMode::Blitz);
        assert_eq!(config.pull_interval_ms, 500.0);
        assert_eq!(config.push_interval_ms, 50.0);
        assert_eq!(config.max_pull_failures, 5);
    }

    #[test]
    fn test_api_base_strips_trailing_slash() {
        let mut config = EngineConfig::default();
        config.server_url = "https://arena.example/".to_string();
        assert_eq!(config.api_base(), "https://arena.example/api");
    }

    #[test]
    fn test_mode_names_round_trip() {
        for mode in [
            GameMode::Classic,
            GameMode::Tournament,
            GameMode::Blitz,
            GameMode::Royale,
        ] {
            assert_eq!(GameMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(GameMode::from_str("Battle Royale"), Some(GameMode::Royale));
        assert_eq!(GameMode::from_str("deathmatch"), None);
    }

    #[test]
    fn test_royale_shrink() {
        let mode = GameMode::Royale;
        assert_eq!(mode.arena_inset(200.0, 800.0, 600.0), 0.0);
        assert_eq!(mode.arena_inset(310.0, 800.0, 600.0), 100.0);
        // Capped so the short axis keeps MIN_ARENA_SIZE
        assert_eq!(mode.arena_inset(10_000.0, 800.0, 600.0), 200.0);
        assert_eq!(GameMode::Classic.arena_inset(10_000.0, 800.0, 600.0), 0.0);
    }

    #[test]
    fn test_bounce_damping_clamped() {
        let mut config = EngineConfig::default();
        config.bounce_damping = 3.0;
        assert_eq!(config.effective_bounce_damping(), 1.0);
        config.bounce_damping = -1.0;
        assert_eq!(config.effective_bounce_damping(), 0.0);
    }
}
