//! Blob Arena entry point
//!
//! On the web this drives an [`ArenaClient`] from `requestAnimationFrame`
//! against the configured server. Natively it plays a headless session
//! against the in-process loopback arena and logs what happens.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec2;
    use wasm_bindgen::prelude::*;
    use web_sys::{HtmlCanvasElement, KeyboardEvent, MouseEvent};

    use blob_arena::engine::TickInput;
    use blob_arena::web::{ArenaClient, init_logging};
    use blob_arena::{EngineEvent, SessionState};

    /// Page driver state
    struct Game {
        client: ArenaClient,
        input: TickInput,
        /// Arena units per CSS pixel
        scale: Vec2,
    }

    pub fn run() {
        init_logging();
        log::info!("Blob Arena starting...");

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document");
            return;
        };

        let client = ArenaClient::new("Player");
        let arena = client.engine().world().arena;
        let canvas: Option<HtmlCanvasElement> = document
            .get_element_by_id("canvas")
            .and_then(|el| el.dyn_into().ok());
        let scale = canvas
            .as_ref()
            .filter(|c| c.client_width() > 0 && c.client_height() > 0)
            .map(|c| {
                Vec2::new(
                    arena.width / c.client_width() as f32,
                    arena.height / c.client_height() as f32,
                )
            })
            .unwrap_or(Vec2::ONE);

        let game = Rc::new(RefCell::new(Game {
            client,
            input: TickInput::default(),
            scale,
        }));

        if let Some(canvas) = canvas {
            setup_input_handlers(&canvas, game.clone());
        }
        request_animation_frame(game);
        log::info!("Blob Arena running!");
    }

    fn setup_input_handlers(canvas: &HtmlCanvasElement, game: Rc<RefCell<Game>>) {
        // Pointer steers the blob
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                let mut g = game.borrow_mut();
                let scale = g.scale;
                let pos = Vec2::new(event.offset_x() as f32, event.offset_y() as f32);
                g.input.pointer = Some(pos * scale);
            });
            let _ = canvas
                .add_event_listener_with_callback("mousemove", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Escape leaves the room
        if let Some(window) = web_sys::window() {
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                if event.key() == "Escape" {
                    game.borrow_mut().input.leave = true;
                }
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        {
            let mut g = game.borrow_mut();
            let input = std::mem::take(&mut g.input);
            g.input.pointer = input.pointer;
            g.client.tick_with(time, &input);

            for event in g.client.take_events() {
                log_event(&event);
            }
            update_hud(&g.client);

            if g.client.engine().session_state() == SessionState::Ended {
                log::info!("Session ended");
                return;
            }
        }

        request_animation_frame(game);
    }

    fn log_event(event: &EngineEvent) {
        match event {
            EngineEvent::Died { .. } => log::info!("You were eaten! Press Escape to leave."),
            EngineEvent::Disconnected => log::warn!("Connection lost, retrying..."),
            other => log::debug!("{:?}", other),
        }
    }

    fn update_hud(client: &ArenaClient) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let local = client.engine().local();
        if let Some(el) = document.get_element_by_id("money") {
            el.set_text_content(Some(&format!("${}", local.currency())));
        }
        if let Some(el) = document.get_element_by_id("score") {
            el.set_text_content(Some(&local.score.to_string()));
        }
        if let Some(el) = document.get_element_by_id("status") {
            el.set_text_content(Some(&client.session_state()));
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_game::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use blob_arena::consts::FRAME_MS;
    use blob_arena::net::LoopbackArena;
    use blob_arena::{Engine, EngineConfig, EngineEvent, TickInput, now_ms};
    use futures::executor::LocalPool;

    const SESSION_SECS: f64 = 60.0;
    const REPORT_EVERY_MS: f64 = 5000.0;

    env_logger::init();
    log::info!("Blob Arena (native) starting...");
    log::info!("Playing a headless session against the loopback arena");

    let config = EngineConfig::load();
    let started = now_ms();
    let server = LoopbackArena::with_bots(started as u64);
    let mut pool = LocalPool::new();
    let mut engine = Engine::new(config, server, pool.spawner(), "player_local", "Headless");

    // Simulated 60 Hz clock
    let mut now = 0.0;
    let mut next_report = REPORT_EVERY_MS;
    while now < SESSION_SECS * 1000.0 {
        // Chase the nearest pellet
        let local = engine.local();
        let pointer = engine
            .world()
            .food
            .values()
            .map(|f| f.pos)
            .min_by(|a, b| {
                a.distance_squared(local.pos)
                    .total_cmp(&b.distance_squared(local.pos))
            });
        let input = TickInput {
            pointer,
            leave: !local.alive,
        };

        engine.tick(now, &input);
        pool.run_until_stalled();

        for event in engine.take_events() {
            match event {
                EngineEvent::FoodEaten { .. } | EngineEvent::PowerUpCollected { .. } => {
                    log::debug!("{:?}", event)
                }
                other => log::info!("{:?}", other),
            }
        }
        if engine.session_state() == blob_arena::SessionState::Ended {
            break;
        }

        if now >= next_report {
            let local = engine.local();
            log::info!(
                "t={:>3.0}s money={} score={} kills={} players={} pending={}",
                now / 1000.0,
                local.currency(),
                local.score,
                local.kills,
                engine.world().remote_players.len(),
                engine.pending().len()
            );
            next_report += REPORT_EVERY_MS;
        }
        now += FRAME_MS;
    }

    engine.leave();
    pool.run_until_stalled();

    let local = engine.local();
    println!(
        "Session over: money {} score {} kills {} ({:.0} ms wall time)",
        local.currency(),
        local.score,
        local.kills,
        now_ms() - started
    );
}
