//! Per-frame engine
//!
//! Owns the world and drives everything from one `tick()` per animation
//! frame. Network calls are spawned as local tasks that report back through
//! a results queue; the next tick drains the queue before touching the world,
//! so a tick never waits on the network.
//!
//! Tick order:
//! 1. Drain network results
//! 2. Decay timed effects, update the arena shrink
//! 3. Integrate the local player
//! 4. Resolve collisions, record optimistic changes and notify the server
//! 5. Push position (if due)
//! 6. Pull a snapshot, or retry the join (if due)

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::task::{LocalSpawn, LocalSpawnExt};
use glam::Vec2;
use serde::Serialize;

use crate::config::{EngineConfig, GameMode};
use crate::consts::*;
use crate::direction_toward;
use crate::net::{
    CollisionAck, ConsumeAck, ConsumedKind, JoinedSession, NetError, NetFuture, NetResult,
    RemoteApi,
};
use crate::session::{Session, SessionState, Transition};
use crate::sim::collision;
use crate::sim::{
    ActiveEffects, Arena, Change, EntityId, LocalPlayer, Modifiers, Motion, Pending, PowerUpKind,
    ReconcileLog, Target, UNDECIDED, World, WorldSnapshot, integrate, resolve,
};

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Pointer position in world coordinates; steers the local player
    pub pointer: Option<Vec2>,
    /// Leave the room (normally after death)
    pub leave: bool,
}

/// Something the host may want to react to (sounds, particles, UI)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    FoodEaten { id: EntityId, value: u64 },
    PowerUpCollected { id: EntityId, kind: PowerUpKind },
    /// Server confirmed a power-up and its effect started
    EffectActivated { kind: PowerUpKind, secs: f32 },
    PlayerEaten { id: EntityId, mass: u64 },
    /// Local player was eaten (`by` is unknown when the snapshot said so)
    Died { by: Option<EntityId> },
    /// An optimistic consumption was contradicted and its award taken back
    Restored { id: EntityId, mass: u64 },
    Revived,
    Connected { session_id: String },
    Disconnected,
    Reconnected,
    Ended,
}

/// Completed network call waiting in the results queue
enum Outcome {
    Joined {
        seq: u64,
        result: NetResult<JoinedSession>,
    },
    Snapshot {
        seq: u64,
        result: NetResult<WorldSnapshot>,
    },
    Pushed(NetResult<()>),
    Consumed {
        kind: ConsumedKind,
        tags: Vec<u64>,
        result: NetResult<ConsumeAck>,
    },
    Collision {
        other: EntityId,
        tag: u64,
        result: NetResult<CollisionAck>,
    },
    Left(NetResult<()>),
}

/// Client-side prediction and reconciliation engine
pub struct Engine<A: RemoteApi, S: LocalSpawn> {
    api: A,
    spawner: S,
    config: EngineConfig,
    world: World,
    effects: ActiveEffects,
    log: ReconcileLog,
    session: Session,
    results_tx: UnboundedSender<Outcome>,
    results_rx: UnboundedReceiver<Outcome>,
    events: Vec<EngineEvent>,
    last_tick_ms: Option<f64>,
    now_ms: f64,
    /// Left before the join answered; leave that room once it does
    leave_on_join: bool,
}

impl<A: RemoteApi, S: LocalSpawn> Engine<A, S> {
    pub fn new(
        config: EngineConfig,
        api: A,
        spawner: S,
        player_id: impl Into<EntityId>,
        name: impl Into<String>,
    ) -> Self {
        let arena = Arena::new(config.arena_width, config.arena_height);
        let mut local = LocalPlayer::new(player_id, name);
        local.pos = arena.center();
        let (results_tx, results_rx) = unbounded();

        Self {
            api,
            spawner,
            session: Session::new(&config),
            config,
            world: World::new(local, arena),
            effects: ActiveEffects::default(),
            log: ReconcileLog::new(),
            results_tx,
            results_rx,
            events: Vec::new(),
            last_tick_ms: None,
            now_ms: 0.0,
            leave_on_join: false,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local(&self) -> &LocalPlayer {
        &self.world.local
    }

    pub fn effects(&self) -> &ActiveEffects {
        &self.effects
    }

    /// Unconfirmed optimistic changes
    pub fn pending(&self) -> &ReconcileLog {
        &self.log
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> GameMode {
        self.config.game_mode
    }

    /// Seconds left in a timed match; `None` for unlimited modes
    pub fn remaining_match_secs(&self) -> Option<f64> {
        let elapsed = self.session.elapsed_secs(self.now_ms);
        self.mode()
            .match_duration_secs()
            .map(|total| (total - elapsed).max(0.0))
    }

    /// Events raised since the last call
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advance one frame
    pub fn tick(&mut self, now_ms: f64, input: &TickInput) {
        let tick_scale = match self.last_tick_ms {
            Some(prev) => (((now_ms - prev) / FRAME_MS) as f32).clamp(0.0, MAX_TICK_SCALE),
            None => 1.0,
        };
        self.last_tick_ms = Some(now_ms);
        self.now_ms = now_ms;

        self.drain_results();

        if input.leave {
            self.leave();
        }
        if self.session.is_ended() {
            return;
        }

        self.effects.decay(tick_scale * FRAME_MS as f32 / 1000.0);
        let arena = &mut self.world.arena;
        arena.inset = self.config.game_mode.arena_inset(
            self.session.elapsed_secs(now_ms),
            arena.width,
            arena.height,
        );

        if self.world.local.alive {
            self.steer_and_move(input.pointer, tick_scale);
            self.resolve_collisions();
        }

        if self.session.push_due(now_ms) {
            self.push(now_ms);
        }
        if self.session.join_due(now_ms) {
            self.join(now_ms);
        } else if self.session.pull_due(now_ms) {
            self.pull(now_ms);
        }
    }

    /// Leave the room. A single best-effort leave call goes out; nothing
    /// else is sent afterwards.
    pub fn leave(&mut self) {
        let joining = self.session.join_in_flight();
        let (transition, session_id) = self.session.end();
        if transition.is_some() && session_id.is_none() && joining {
            self.leave_on_join = true;
        }
        if let Some(t) = transition {
            self.on_transition(t);
        }
        if let Some(session_id) = session_id {
            log::info!("Leaving room {}", session_id);
            let call = self.api.leave(&session_id, &self.world.local.id);
            self.spawn(call, Outcome::Left);
        }
    }

    fn steer_and_move(&mut self, pointer: Option<Vec2>, tick_scale: f32) {
        let local = &mut self.world.local;
        if let Some(target) = pointer {
            local.direction = direction_toward(local.pos, target);
        }
        let motion = Motion {
            tick_scale,
            speed_multiplier: self.config.game_mode.speed_multiplier()
                * self.effects.speed_multiplier(),
            bounce_damping: self.config.effective_bounce_damping(),
        };
        let step = integrate(
            local.pos,
            local.direction,
            local.mass,
            &self.world.arena,
            &motion,
        );
        local.pos = step.pos;
        local.direction = step.direction;
    }

    fn resolve_collisions(&mut self) {
        let modifiers = Modifiers {
            value_multiplier: self.effects.value_multiplier(),
            food_reach: self.effects.food_reach(),
            shielded: self.effects.shielded(),
        };
        let resolution = resolve(&self.world, &modifiers);
        if resolution.is_empty() {
            return;
        }

        let score_multiplier = self.config.game_mode.score_multiplier();
        collision::apply(&mut self.world.local, &resolution, score_multiplier);

        // Reported changes wait for their answer before any pull may settle
        // them; unreported ones are up to the next pull
        let reporting = self.session.can_send();
        let decided_by = if reporting {
            UNDECIDED
        } else {
            log::debug!("Not connected; consumption left to the next snapshot");
            self.session.next_seq()
        };
        let score = |mass: u64| mass.saturating_mul(score_multiplier);

        let mut food_tags = Vec::with_capacity(resolution.food.len());
        for hit in &resolution.food {
            self.world.food.remove(&hit.id);
            food_tags.push(self.log.record(
                hit.id.clone(),
                Change::Food,
                hit.mass,
                score(hit.mass),
                decided_by,
            ));
            self.events.push(EngineEvent::FoodEaten {
                id: hit.id.clone(),
                value: hit.mass,
            });
        }

        let mut power_up_tags = Vec::with_capacity(resolution.power_ups.len());
        for hit in &resolution.power_ups {
            let (kind, duration_secs) = self
                .world
                .power_ups
                .remove(&hit.id)
                .map_or((PowerUpKind::Unknown, None), |p| (p.kind, p.duration_secs));
            power_up_tags.push(self.log.record(
                hit.id.clone(),
                Change::PowerUp {
                    kind,
                    duration_secs,
                    awaiting_effect: true,
                },
                hit.mass,
                score(hit.mass),
                decided_by,
            ));
            self.events.push(EngineEvent::PowerUpCollected {
                id: hit.id.clone(),
                kind,
            });
        }

        let mut contests = Vec::new();
        for hit in &resolution.players {
            self.world.remote_players.remove(&hit.id);
            let tag = self.log.record(
                hit.id.clone(),
                Change::Kill,
                hit.mass,
                score(hit.mass),
                decided_by,
            );
            contests.push((hit.id.clone(), tag));
            log::info!("Ate player {} (+{})", hit.id, hit.mass);
            self.events.push(EngineEvent::PlayerEaten {
                id: hit.id.clone(),
                mass: hit.mass,
            });
        }
        if let Some(by) = &resolution.eaten_by {
            let tag = self.log.record(by.clone(), Change::Death, 0, 0, decided_by);
            contests.push((by.clone(), tag));
            log::info!("Eaten by {}", by);
            self.events.push(EngineEvent::Died {
                by: Some(by.clone()),
            });
        }

        if !reporting {
            return;
        }
        for (kind, hits, tags) in [
            (ConsumedKind::Food, &resolution.food, food_tags),
            (ConsumedKind::PowerUp, &resolution.power_ups, power_up_tags),
        ] {
            if !hits.is_empty() {
                let ids = hits.iter().map(|h| h.id.clone()).collect();
                self.notify_consumed(kind, ids, tags);
            }
        }
        for (other, tag) in contests {
            self.notify_collision(other, tag);
        }
    }

    fn notify_consumed(&mut self, kind: ConsumedKind, ids: Vec<EntityId>, tags: Vec<u64>) {
        let Some(session_id) = self.session.id() else {
            return;
        };
        let call = self
            .api
            .notify_consumed(session_id, &self.world.local.id, kind, ids);
        self.spawn(call, move |result| Outcome::Consumed { kind, tags, result });
    }

    fn notify_collision(&mut self, other: EntityId, tag: u64) {
        let Some(session_id) = self.session.id() else {
            return;
        };
        let call = self
            .api
            .notify_collision(session_id, &self.world.local.id, &other);
        self.spawn(call, move |result| Outcome::Collision { other, tag, result });
    }

    fn push(&mut self, now_ms: f64) {
        let Some(session_id) = self.session.id() else {
            return;
        };
        let local = &self.world.local;
        let call = self
            .api
            .push_position(session_id, &local.id, local.pos, local.mass);
        self.session.begin_push(now_ms);
        self.spawn(call, Outcome::Pushed);
    }

    fn pull(&mut self, now_ms: f64) {
        let Some(session_id) = self.session.id() else {
            return;
        };
        let call = self.api.pull_snapshot(session_id);
        let seq = self.session.begin_pull(now_ms);
        self.spawn(call, move |result| Outcome::Snapshot { seq, result });
    }

    fn join(&mut self, now_ms: f64) {
        log::info!("Joining a {} room", self.config.game_mode.as_str());
        let call = self
            .api
            .create_or_join(self.config.game_mode, &self.world.local.id);
        let seq = self.session.begin_join(now_ms);
        self.spawn(call, move |result| Outcome::Joined { seq, result });
    }

    fn spawn<T: 'static>(
        &self,
        call: NetFuture<T>,
        wrap: impl FnOnce(NetResult<T>) -> Outcome + 'static,
    ) {
        if let Err(e) = self.spawner.status_local() {
            log::error!("Cannot spawn network task: {}", e);
            let failed = wrap(Err(NetError::Transport(e.to_string())));
            let _ = self.results_tx.unbounded_send(failed);
            return;
        }
        let results = self.results_tx.clone();
        let task = async move {
            // Receiver only goes away with the engine
            let _ = results.unbounded_send(wrap(call.await));
        };
        if let Err(e) = self.spawner.spawn_local(task) {
            log::error!("Failed to spawn network task: {}", e);
        }
    }

    fn drain_results(&mut self) {
        while let Ok(Some(outcome)) = self.results_rx.try_next() {
            if self.session.is_ended() {
                self.discard(outcome);
                continue;
            }
            self.handle(outcome);
        }
    }

    /// Results arriving after the session ended; only a join that slipped
    /// past the leave still needs a leave call
    fn discard(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Joined {
                result: Ok(joined), ..
            } if self.leave_on_join => {
                self.leave_on_join = false;
                log::info!("Leaving room {} joined after leave", joined.session_id);
                let call = self.api.leave(&joined.session_id, &self.world.local.id);
                self.spawn(call, Outcome::Left);
            }
            Outcome::Joined { result: Err(_), .. } => self.leave_on_join = false,
            Outcome::Left(Err(e)) => log::warn!("Leave failed: {}", e),
            _ => {}
        }
    }

    fn handle(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Joined { seq, result } => match result {
                Ok(joined) => self.on_joined(joined, seq),
                Err(e) => {
                    log::warn!("Join failed: {}", e);
                    if let Some(t) = self.session.join_failed() {
                        self.on_transition(t);
                    }
                }
            },
            Outcome::Snapshot { seq, result } => match result {
                Ok(snapshot) => {
                    let transition = self.session.pull_succeeded();
                    if self.session.accepts(seq) {
                        self.merge(snapshot, seq);
                        self.session.applied(seq);
                    } else {
                        log::debug!("Dropping stale snapshot #{}", seq);
                    }
                    if let Some(t) = transition {
                        self.on_transition(t);
                    }
                }
                Err(e) => {
                    log::warn!("Snapshot pull failed: {}", e);
                    if let Some(t) = self.session.pull_failed() {
                        self.on_transition(t);
                    }
                }
            },
            Outcome::Pushed(result) => {
                self.session.push_done();
                if let Err(e) = result {
                    log::debug!("Position push failed: {}", e);
                }
            }
            Outcome::Consumed { kind, tags, result } => {
                // Answered or lost, the next pull decides
                self.log.decide(&tags, self.session.next_seq());
                match result {
                    Ok(ack) => {
                        self.log.effects_answered(&tags);
                        self.on_consume_ack(ack);
                    }
                    Err(e) => log::warn!("{:?} consumption not acknowledged: {}", kind, e),
                }
            }
            Outcome::Collision { other, tag, result } => {
                self.log.decide(&[tag], self.session.next_seq());
                match result {
                    Ok(ack) => self.on_collision_ack(ack, other),
                    Err(e) => log::warn!("Collision with {} not arbitrated: {}", other, e),
                }
            }
            Outcome::Left(result) => {
                if let Err(e) = result {
                    log::warn!("Leave failed: {}", e);
                }
            }
        }
    }

    fn on_joined(&mut self, joined: JoinedSession, seq: u64) {
        let JoinedSession {
            session_id,
            snapshot,
        } = joined;
        log::info!("Joined room {}", session_id);
        self.session.joined(session_id, self.now_ms);

        // Spawn where the server put us
        let local = &mut self.world.local;
        if let Some(me) = snapshot.players.iter().find(|p| p.id == local.id) {
            local.pos = me.pos;
            local.mass = me.mass;
            local.color = me.color.clone();
        }
        if self.session.accepts(seq) {
            self.merge(snapshot, seq);
            self.session.applied(seq);
        }
    }

    fn on_consume_ack(&mut self, ack: ConsumeAck) {
        if let Some(points) = ack.points_earned {
            log::debug!("Server credited {} for food", points);
        }
        for power_up in ack.applied_effects {
            self.start_effect(power_up.kind, power_up.duration_secs);
        }
    }

    fn start_effect(&mut self, kind: PowerUpKind, duration_secs: Option<f32>) {
        if self.effects.activate(kind, duration_secs) {
            let secs = duration_secs.unwrap_or(DEFAULT_EFFECT_SECS);
            log::info!("{:?} active for {}s", kind, secs);
            self.events
                .push(EngineEvent::EffectActivated { kind, secs });
        }
    }

    fn on_collision_ack(&mut self, ack: CollisionAck, other: EntityId) {
        if ack.is_alive {
            return;
        }
        self.log.confirm_death();
        if self.world.local.alive {
            log::info!("Server says {} ate us", other);
            self.world.local.alive = false;
            self.events.push(EngineEvent::Died { by: Some(other) });
        }
    }

    /// Replace remote sets with `snapshot`, keeping entities consumed after
    /// the pull was issued out of view, and settle whatever it can decide.
    fn merge(&mut self, snapshot: WorldSnapshot, seq: u64) {
        let local_id = self.world.local.id.clone();
        let settlement = self.log.settle(&snapshot, seq, &local_id);
        if !settlement.confirmed.is_empty() {
            log::debug!(
                "Snapshot #{} confirmed {} change(s)",
                seq,
                settlement.confirmed.len()
            );
        }
        // Pickups whose answer was lost start their effect here
        for entry in &settlement.confirmed {
            if let Change::PowerUp {
                kind,
                duration_secs,
                awaiting_effect: true,
            } = entry.change
            {
                self.start_effect(kind, duration_secs);
            }
        }
        for entry in settlement.reverted {
            self.revert(entry);
        }

        let log = &self.log;
        self.world.remote_players = snapshot
            .players
            .iter()
            .filter(|p| p.id != local_id && !log.hides(Target::Player, &p.id, seq))
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        self.world.food = snapshot
            .food
            .into_iter()
            .filter(|f| !log.hides(Target::Food, &f.id, seq))
            .map(|f| (f.id.clone(), f))
            .collect();
        self.world.power_ups = snapshot
            .power_ups
            .into_iter()
            .filter(|p| !log.hides(Target::PowerUp, &p.id, seq))
            .map(|p| (p.id.clone(), p))
            .collect();
        self.world.stats = snapshot.stats;

        // Server is authoritative on life and death unless our own death
        // report is still in flight
        if self.log.has_pending_death() {
            return;
        }
        if let Some(me) = snapshot.players.iter().find(|p| p.id == local_id) {
            let local = &mut self.world.local;
            if me.is_alive != local.alive {
                local.alive = me.is_alive;
                self.events.push(if me.is_alive {
                    EngineEvent::Revived
                } else {
                    EngineEvent::Died { by: None }
                });
            }
        }
    }

    fn revert(&mut self, entry: Pending) {
        let local = &mut self.world.local;
        local.mass = local.mass.saturating_sub(entry.mass);
        local.score = local.score.saturating_sub(entry.score);
        match entry.change {
            Change::Death => {
                log::info!("Death by {} overturned", entry.id);
                local.alive = true;
                self.events.push(EngineEvent::Revived);
                return;
            }
            Change::Kill => local.kills = local.kills.saturating_sub(1),
            Change::Food | Change::PowerUp { .. } => {}
        }
        log::debug!("Restoring {} (-{})", entry.id, entry.mass);
        self.events.push(EngineEvent::Restored {
            id: entry.id,
            mass: entry.mass,
        });
    }

    fn on_transition(&mut self, t: Transition) {
        let event = match (t.from, t.to) {
            (SessionState::Disconnected, SessionState::Active) => {
                log::info!("Reconnected");
                EngineEvent::Reconnected
            }
            (_, SessionState::Active) => {
                let session_id = self.session.id().unwrap_or_default().to_string();
                log::info!("Connected to room {}", session_id);
                EngineEvent::Connected { session_id }
            }
            (_, SessionState::Disconnected) => {
                log::warn!(
                    "Disconnected after {} failed attempts",
                    self.session.failures()
                );
                EngineEvent::Disconnected
            }
            (_, SessionState::Ended) => EngineEvent::Ended,
            (_, SessionState::Connecting) => return,
        };
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::LoopbackArena;
    use crate::sim::sizing::mass_for_radius;
    use crate::sim::{Food, PowerUp, RemotePlayer};
    use futures::executor::{LocalPool, LocalSpawner};
    use futures::future::LocalFutureObj;
    use futures::task::SpawnError;

    type TestEngine = Engine<LoopbackArena, LocalSpawner>;

    struct Harness {
        pool: LocalPool,
        server: LoopbackArena,
        engine: TestEngine,
        now: f64,
    }

    impl Harness {
        fn new() -> Self {
            let pool = LocalPool::new();
            let server = LoopbackArena::new(42);
            let engine = Engine::new(
                EngineConfig::default(),
                server.clone(),
                pool.spawner(),
                "me",
                "Me",
            );
            Self {
                pool,
                server,
                engine,
                now: 0.0,
            }
        }

        /// Tick once, then let every spawned call finish
        fn step(&mut self, ms: f64) {
            self.now += ms;
            self.engine.tick(self.now, &TickInput::default());
            self.pool.run_until_stalled();
        }

        fn run_for(&mut self, ms: f64) {
            let end = self.now + ms;
            while self.now < end {
                self.step(FRAME_MS);
            }
        }

        /// Step frames until `done` holds
        fn step_until(&mut self, done: impl Fn(&Self) -> bool) {
            for _ in 0..10_000 {
                if done(self) {
                    return;
                }
                self.step(FRAME_MS);
            }
            panic!("condition never reached");
        }

        /// Join, clear the room, and get to Active
        fn connected() -> Self {
            let mut h = Self::new();
            h.step(0.0);
            h.step(FRAME_MS);
            let sid = h.sid();
            h.server.clear_pellets(&sid);
            h.engine.world.food.clear();
            h.engine.world.power_ups.clear();
            h.run_for(1100.0);
            assert_eq!(h.engine.session_state(), SessionState::Active);
            h.engine.take_events();
            h
        }

        fn sid(&self) -> String {
            self.engine.session_id().expect("joined").to_string()
        }

        /// Place the local player on both sides
        fn place_local(&mut self, pos: Vec2, mass: u64) {
            let local = &mut self.engine.world.local;
            local.pos = pos;
            local.mass = mass;
            local.direction = Vec2::ZERO;
            let sid = self.sid();
            let mut me = self.server.player(&sid, "me").expect("on server");
            me.pos = pos;
            me.mass = mass;
            self.server.insert_player(&sid, me);
        }

        fn add_food(&mut self, id: &str, pos: Vec2, value: u64) {
            let food = Food {
                id: id.to_string(),
                pos,
                color: "#fff".to_string(),
                value,
            };
            self.server.insert_food(&self.sid(), food.clone());
            self.engine.world.food.insert(food.id.clone(), food);
        }

        fn add_power_up(&mut self, power_up: PowerUp) {
            self.server.insert_power_up(&self.sid(), power_up.clone());
            self.engine
                .world
                .power_ups
                .insert(power_up.id.clone(), power_up);
        }

        fn add_player(&mut self, id: &str, pos: Vec2, mass: u64) {
            let player = RemotePlayer {
                id: id.to_string(),
                name: id.to_string(),
                pos,
                mass,
                score: 0,
                kills: 0,
                is_alive: true,
                color: "#000".to_string(),
            };
            self.server.insert_player(&self.sid(), player.clone());
            self.engine
                .world
                .remote_players
                .insert(player.id.clone(), player);
        }
    }

    const CENTER: Vec2 = Vec2::new(400.0, 300.0);

    fn shield(pos: Vec2, secs: f32) -> PowerUp {
        PowerUp {
            id: "shield".to_string(),
            pos,
            kind: PowerUpKind::Shield,
            radius: 9.0,
            value: 40,
            color: "#5f27cd".to_string(),
            duration_secs: Some(secs),
        }
    }

    fn effects_started(events: &[EngineEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::EffectActivated { .. }))
            .count()
    }

    /// Spawner whose executor has shut down
    struct StoppedSpawner;

    impl LocalSpawn for StoppedSpawner {
        fn spawn_local_obj(&self, _: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
            Err(SpawnError::shutdown())
        }

        fn status_local(&self) -> Result<(), SpawnError> {
            Err(SpawnError::shutdown())
        }
    }

    #[test]
    fn test_join_then_activate_on_first_pull() {
        let mut h = Harness::new();
        h.step(0.0);
        assert_eq!(h.engine.session_state(), SessionState::Connecting);
        assert_eq!(h.server.calls().joins, 1);

        h.step(FRAME_MS);
        assert!(h.engine.session_id().is_some());
        assert!(!h.engine.world().food.is_empty());
        assert_eq!(h.engine.session_state(), SessionState::Connecting);

        h.run_for(1100.0);
        assert_eq!(h.engine.session_state(), SessionState::Active);
        let connected = h
            .engine
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Connected { .. }))
            .count();
        assert_eq!(connected, 1);
        assert!(!h.engine.world().remote_players.contains_key("me"));
    }

    #[test]
    fn test_food_eaten_and_confirmed() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.add_food("f1", CENTER + Vec2::new(5.0, 0.0), 5);

        h.step(FRAME_MS);
        assert_eq!(h.engine.local().mass, 15);
        assert!(!h.engine.world().food.contains_key("f1"));
        assert_eq!(h.engine.pending().len(), 1);
        assert_eq!(
            h.engine.take_events(),
            vec![EngineEvent::FoodEaten {
                id: "f1".to_string(),
                value: 5
            }]
        );

        h.run_for(1100.0);
        assert!(h.engine.pending().is_empty());
        assert_eq!(h.engine.local().mass, 15);
        assert!(h.engine.take_events().is_empty());
    }

    #[test]
    fn test_eat_smaller_player() {
        let mut h = Harness::connected();
        h.place_local(CENTER, mass_for_radius(20.0));
        let before = h.engine.local().mass;
        h.add_player("small", CENTER + Vec2::new(10.0, 0.0), mass_for_radius(15.0));

        h.step(FRAME_MS);
        assert_eq!(h.engine.local().mass, before + 200);
        assert_eq!(h.engine.local().kills, 1);
        assert!(!h.engine.world().remote_players.contains_key("small"));
        assert_eq!(h.server.calls().collisions, 1);

        h.run_for(1100.0);
        assert_eq!(h.engine.local().kills, 1);
        assert!(h.engine.pending().is_empty());
    }

    #[test]
    fn test_similar_sizes_do_nothing() {
        let mut h = Harness::connected();
        h.place_local(CENTER, mass_for_radius(20.0));
        h.add_player("peer", CENTER + Vec2::new(10.0, 0.0), mass_for_radius(18.0));
        let before = h.engine.local().clone();

        h.step(FRAME_MS);
        assert_eq!(h.engine.local().mass, before.mass);
        assert_eq!(h.engine.local().kills, 0);
        assert!(h.engine.local().alive);
        assert!(h.engine.world().remote_players.contains_key("peer"));
        assert_eq!(h.server.calls().collisions, 0);
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let mut h = Harness::connected();
        h.server.fail_next_pulls(10);
        let first = h.server.calls().pulls;
        let pulled = move |n: u32| move |h: &Harness| h.server.calls().pulls - first >= n;

        h.step_until(pulled(4));
        h.step(FRAME_MS);
        assert_eq!(h.engine.session_state(), SessionState::Active);

        h.step_until(pulled(5));
        h.step(FRAME_MS);
        assert_eq!(h.engine.session_state(), SessionState::Disconnected);
        assert_eq!(h.engine.take_events(), vec![EngineEvent::Disconnected]);

        // Nothing but pulls while disconnected
        let pushes = h.server.calls().pushes;
        h.step_until(pulled(10));
        h.step(FRAME_MS);
        assert_eq!(h.engine.session_state(), SessionState::Disconnected);
        assert_eq!(h.server.calls().pushes, pushes);
        assert!(h.engine.take_events().is_empty());

        h.step_until(pulled(11));
        h.step(FRAME_MS);
        assert_eq!(h.engine.session_state(), SessionState::Active);
        assert_eq!(h.engine.take_events(), vec![EngineEvent::Reconnected]);
        assert_eq!(h.server.calls().joins, 1);
    }

    #[test]
    fn test_contradicted_consumption_is_restored() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.add_food("f1", CENTER + Vec2::new(5.0, 0.0), 5);

        // Notification is lost; the server still has the pellet
        h.server.set_offline(true);
        h.step(FRAME_MS);
        assert_eq!(h.engine.local().mass, 15);
        h.server.set_offline(false);

        h.run_for(1100.0);
        assert_eq!(h.engine.local().mass, 10);
        assert_eq!(h.engine.local().score, 0);
        assert!(h.engine.world().food.contains_key("f1"));
        assert!(h.engine.pending().is_empty());
        let events = h.engine.take_events();
        assert!(events.contains(&EngineEvent::Restored {
            id: "f1".to_string(),
            mass: 5
        }));
    }

    #[test]
    fn test_pull_racing_a_notification_cannot_restore() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.add_food("f1", CENTER + Vec2::new(5.0, 0.0), 5);

        // Same frame: consume, notify, and issue a pull
        h.now += 1000.0;
        h.engine.tick(h.now, &TickInput::default());
        assert!(h.engine.session.pull_in_flight());
        assert_eq!(h.engine.local().mass, 15);

        // Whichever call the server serves first, that pull cannot settle f1
        h.step(FRAME_MS);
        assert_eq!(h.engine.local().mass, 15);
        assert!(!h.engine.world().food.contains_key("f1"));
        assert_eq!(h.engine.pending().len(), 1);

        h.run_for(1100.0);
        assert_eq!(h.engine.local().mass, 15);
        assert!(h.engine.pending().is_empty());
    }

    #[test]
    fn test_snapshot_merge_is_idempotent() {
        let mut h = Harness::connected();
        let snapshot = h.server.snapshot(&h.sid()).expect("room");
        h.engine.merge(snapshot.clone(), 100);
        let once = h.engine.world().clone();
        h.engine.merge(snapshot, 100);
        let twice = h.engine.world();

        assert_eq!(once.local, twice.local);
        assert_eq!(once.remote_players, twice.remote_players);
        assert_eq!(once.food, twice.food);
        assert_eq!(once.power_ups, twice.power_ups);
        assert_eq!(once.stats, twice.stats);
    }

    #[test]
    fn test_effect_waits_for_confirmation() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.add_power_up(shield(CENTER + Vec2::new(5.0, 0.0), 5.0));

        h.now += FRAME_MS;
        h.engine.tick(h.now, &TickInput::default());
        assert_eq!(h.engine.local().mass, 50);
        assert!(!h.engine.effects().shielded());

        h.pool.run_until_stalled();
        h.step(FRAME_MS);
        assert!(h.engine.effects().shielded());
        assert!(h.engine.take_events().iter().any(|e| matches!(
            e,
            EngineEvent::EffectActivated {
                kind: PowerUpKind::Shield,
                ..
            }
        )));

        // The confirming snapshot does not start it a second time
        h.server.clear_pellets(&h.sid());
        h.run_for(1100.0);
        assert!(h.engine.pending().is_empty());
        assert_eq!(effects_started(&h.engine.take_events()), 0);
    }

    #[test]
    fn test_lost_ack_effect_starts_on_confirming_snapshot() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.add_power_up(shield(CENTER + Vec2::new(5.0, 0.0), 30.0));

        h.server.set_offline(true);
        h.step(FRAME_MS);
        h.server.set_offline(false);
        assert_eq!(h.engine.local().mass, 50);
        assert!(!h.engine.effects().shielded());

        // The server did take it; only the answer was lost
        h.server.clear_pellets(&h.sid());
        h.run_for(2500.0);
        assert!(h.engine.pending().is_empty());
        assert_eq!(h.engine.local().mass, 50);
        assert!(h.engine.effects().shielded());
        assert_eq!(effects_started(&h.engine.take_events()), 1);
    }

    #[test]
    fn test_server_death_wins() {
        let mut h = Harness::connected();
        let sid = h.sid();
        let mut me = h.server.player(&sid, "me").expect("on server");
        me.is_alive = false;
        h.server.insert_player(&sid, me);

        h.run_for(1100.0);
        assert!(!h.engine.local().alive);
        assert!(
            h.engine
                .take_events()
                .contains(&EngineEvent::Died { by: None })
        );
    }

    #[test]
    fn test_eaten_by_larger_player() {
        let mut h = Harness::connected();
        h.place_local(CENTER, mass_for_radius(15.0));
        h.add_player("big", CENTER + Vec2::new(10.0, 0.0), mass_for_radius(20.0));

        h.step(FRAME_MS);
        assert!(!h.engine.local().alive);
        assert_eq!(h.engine.pending().len(), 1);

        // Server agrees; the pending death is dropped
        h.step(FRAME_MS);
        assert!(!h.engine.local().alive);
        assert!(h.engine.pending().is_empty());
        assert_eq!(
            h.server.player(&h.sid(), "me").map(|p| p.is_alive),
            Some(false)
        );

        // Dead players stay put
        let pos = h.engine.local().pos;
        h.engine.tick(h.now + FRAME_MS, &TickInput {
            pointer: Some(Vec2::ZERO),
            leave: false,
        });
        assert_eq!(h.engine.local().pos, pos);
    }

    #[test]
    fn test_leave_stops_all_traffic() {
        let mut h = Harness::connected();
        h.now += FRAME_MS;
        h.engine.tick(h.now, &TickInput {
            pointer: None,
            leave: true,
        });
        h.pool.run_until_stalled();
        assert_eq!(h.engine.session_state(), SessionState::Ended);
        assert_eq!(h.engine.take_events(), vec![EngineEvent::Ended]);
        assert_eq!(h.server.calls().leaves, 1);

        let before = h.server.calls();
        h.run_for(5000.0);
        assert_eq!(h.server.calls(), before);
        h.engine.leave();
        h.pool.run_until_stalled();
        assert_eq!(h.server.calls().leaves, 1);
    }

    #[test]
    fn test_leave_while_joining_leaves_joined_room() {
        let mut h = Harness::new();
        h.engine.tick(0.0, &TickInput::default());
        h.engine.leave();
        assert_eq!(h.engine.session_state(), SessionState::Ended);

        h.pool.run_until_stalled();
        assert_eq!(h.server.calls().joins, 1);
        assert_eq!(h.server.calls().leaves, 0);

        h.step(FRAME_MS);
        assert_eq!(h.server.calls().leaves, 1);
        assert!(h.engine.session_id().is_none());

        let before = h.server.calls();
        h.run_for(2000.0);
        assert_eq!(h.server.calls(), before);
    }

    #[test]
    fn test_unspawnable_calls_fail_through_the_queue() {
        let mut engine = Engine::new(
            EngineConfig::default(),
            LoopbackArena::new(3),
            StoppedSpawner,
            "me",
            "Me",
        );
        engine.session.joined("room".to_string(), 0.0);
        let pos = engine.world.local.pos;
        engine.world.food.insert(
            "f1".to_string(),
            Food {
                id: "f1".to_string(),
                pos,
                color: "#fff".to_string(),
                value: 5,
            },
        );

        engine.tick(0.0, &TickInput::default());
        assert_eq!(engine.pending().len(), 1);
        assert!(engine.session.pull_in_flight());

        engine.tick(FRAME_MS, &TickInput::default());
        assert!(!engine.session.pull_in_flight());
        assert_eq!(engine.session.failures(), 1);
        assert!(engine.pending().iter().all(|e| e.decided_by != UNDECIDED));
        assert!(!engine.world().food.contains_key("f1"));
    }

    #[test]
    fn test_cadence_and_single_flight() {
        let mut h = Harness::connected();
        let before = h.server.calls();
        h.run_for(3000.0);
        let after = h.server.calls();
        let pulls = after.pulls - before.pulls;
        let pushes = after.pushes - before.pushes;
        assert!((2..=4).contains(&pulls), "pulls = {}", pulls);
        assert!((40..=61).contains(&pushes), "pushes = {}", pushes);

        // Without completions nothing new is issued
        let before = h.server.calls();
        for _ in 0..300 {
            h.now += FRAME_MS;
            h.engine.tick(h.now, &TickInput::default());
        }
        h.pool.run_until_stalled();
        let after = h.server.calls();
        assert_eq!(after.pulls - before.pulls, 1);
        assert_eq!(after.pushes - before.pushes, 1);
    }

    #[test]
    fn test_pointer_steers_local_player() {
        let mut h = Harness::connected();
        h.place_local(CENTER, 10);
        h.now += FRAME_MS;
        h.engine.tick(h.now, &TickInput {
            pointer: Some(CENTER + Vec2::new(100.0, 0.0)),
            leave: false,
        });
        assert!(h.engine.local().pos.x > CENTER.x);
        assert_eq!(h.engine.local().pos.y, CENTER.y);
    }

    #[test]
    fn test_blitz_scores_double() {
        let pool = LocalPool::new();
        let engine = Engine::new(
            EngineConfig::for_mode(GameMode::Blitz),
            LoopbackArena::new(1),
            pool.spawner(),
            "me",
            "Me",
        );
        assert_eq!(engine.remaining_match_secs(), Some(300.0));
        assert_eq!(engine.mode().score_multiplier(), 2);
    }
}
