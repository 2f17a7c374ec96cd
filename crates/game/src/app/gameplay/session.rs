use engine::{
    EntityId, HostEvent, HostRequest, InputSnapshot, Scene, SceneCommand, SceneWorld, Schedule, TimerQueue,
    UserData,
};
use tracing::{debug, error, info, warn};

use super::ambience::AmbienceLoop;
use super::audio::{Sound, SoundBank};
use super::graveyard::{self, GraveyardStage};
use super::narrative::{self, BoatStage, EpilogueStage, RitualStage, SpiralStage};
use super::pursuit::show_flame_idle;
use super::stages::{StageController, StageError, StageId, StageScope};
use super::timeline::{FadeEvent, FadePlan, FadeTimings, FadeTransition};
use crate::app::config::GameConfig;
use crate::app::validation::{ErrorContext, ErrorJournal};

/// One-shot timer payloads. Timers only touch animation and audio state of
/// entities that already exist; pools are never mutated from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionTimer {
    CandleIdle(EntityId),
    AmbienceReroll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SessionFlags {
    pub(crate) game_started: bool,
    pub(crate) game_over: bool,
    pub(crate) kill_ambience: bool,
    pub(crate) finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransitionRequest {
    pub(crate) target: StageId,
    pub(crate) plan: FadePlan,
}

/// Per-stage state, owned by the session and reached by the stage's systems.
pub(crate) enum ActiveStage {
    Idle,
    Graveyard(Box<GraveyardStage>),
    Boat(BoatStage),
    Spiral(SpiralStage),
    Ritual(RitualStage),
    Epilogue(EpilogueStage),
}

impl ActiveStage {
    pub(crate) fn id(&self) -> Option<StageId> {
        match self {
            ActiveStage::Idle => None,
            ActiveStage::Graveyard(_) => Some(StageId::Graveyard),
            ActiveStage::Boat(_) => Some(StageId::Boat),
            ActiveStage::Spiral(_) => Some(StageId::Spiral),
            ActiveStage::Ritual(_) => Some(StageId::Ritual),
            ActiveStage::Epilogue(_) => Some(StageId::Epilogue),
        }
    }

    fn candle_is_lit(&self, candle: EntityId) -> bool {
        match self {
            ActiveStage::Graveyard(stage) => stage.candles.is_lit(candle),
            ActiveStage::Boat(stage) => stage.candles.is_lit(candle),
            ActiveStage::Ritual(stage) => stage.candles.is_lit(candle),
            ActiveStage::Idle | ActiveStage::Spiral(_) | ActiveStage::Epilogue(_) => false,
        }
    }
}

/// Everything per-frame systems share. Replaces the scene-wide mutable flags
/// with fields that tests can inspect directly.
pub(crate) struct SessionContext {
    pub(crate) config: GameConfig,
    pub(crate) flags: SessionFlags,
    pub(crate) events: Vec<HostEvent>,
    pub(crate) timers: TimerQueue<SessionTimer>,
    pub(crate) fade: FadeTransition<StageId>,
    pub(crate) stage: ActiveStage,
    pub(crate) ambience: AmbienceLoop,
    pub(crate) sounds: SoundBank,
    pub(crate) user_data: Option<UserData>,
    pub(crate) errors: ErrorJournal,
    transition: Option<TransitionRequest>,
}

impl SessionContext {
    pub(crate) fn new(config: GameConfig) -> Self {
        let timings = FadeTimings {
            out_seconds: config.fade.out_seconds,
            hold_seconds: config.fade.hold_seconds,
            in_seconds: config.fade.in_seconds,
        };
        let ambience = AmbienceLoop::new(config.ambience.seed);
        Self {
            config,
            flags: SessionFlags::default(),
            events: Vec::new(),
            timers: TimerQueue::default(),
            fade: FadeTransition::new(timings),
            stage: ActiveStage::Idle,
            ambience,
            sounds: SoundBank::default(),
            user_data: None,
            errors: ErrorJournal::default(),
            transition: None,
        }
    }

    pub(crate) fn now_seconds(&self) -> f64 {
        self.timers.now_seconds()
    }

    /// Queues a faded transition. Only one may be pending or running.
    pub(crate) fn request_transition(&mut self, target: StageId, plan: FadePlan) -> bool {
        if self.transition.is_some() || self.fade.is_running() {
            debug!(target = target.number(), "transition_already_pending");
            return false;
        }
        info!(target = target.number(), plan = ?plan, "transition_requested");
        self.transition = Some(TransitionRequest { target, plan });
        true
    }

    #[cfg(test)]
    pub(crate) fn pending_transition(&self) -> Option<TransitionRequest> {
        self.transition
    }

    fn take_transition(&mut self) -> Option<TransitionRequest> {
        self.transition.take()
    }
}

pub(crate) struct Session {
    ctx: SessionContext,
    schedule: Schedule<SessionContext>,
    controller: StageController,
    scope: StageScope,
}

impl Session {
    pub(crate) fn new(config: GameConfig) -> Self {
        Self {
            ctx: SessionContext::new(config),
            schedule: Schedule::default(),
            controller: StageController::default(),
            scope: StageScope::default(),
        }
    }

    pub(crate) fn context(&self) -> &SessionContext {
        &self.ctx
    }

    #[cfg(test)]
    pub(crate) fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.ctx
    }

    pub(crate) fn controller(&self) -> &StageController {
        &self.controller
    }

    pub(crate) fn scope(&self) -> &StageScope {
        &self.scope
    }

    fn begin_game(&mut self, world: &mut SceneWorld) {
        if self.ctx.flags.game_started {
            return;
        }
        self.ctx.flags.game_started = true;
        info!("game_started");
        self.ctx.sounds.apply(
            world,
            &[(Sound::Heart, true), (Sound::Wind, true), (Sound::Whisper, true)],
        );
        let delay = self.ctx.ambience.play_next(world, &self.ctx.config.ambience);
        self.ctx
            .timers
            .set_timeout_seconds(f64::from(delay), SessionTimer::AmbienceReroll);
    }

    /// Tears down the current stage (if any) and builds `target`. Runs while
    /// the screen is black when reached through a fade.
    pub(crate) fn enter_stage(&mut self, target: StageId, world: &mut SceneWorld) {
        self.enter_stage_with(target, world, build_stage);
    }

    /// The controller only moves to `target` once `build` succeeds, so a
    /// failed build can be retried.
    fn enter_stage_with(&mut self, target: StageId, world: &mut SceneWorld, build: StageBuilder) {
        if let Err(err) = self.controller.check_entry(target) {
            self.reject_transition(&err);
            return;
        }
        if let Some(stage) = self.controller.current() {
            self.teardown(stage, world);
        }

        if let Err(err) = build(target, &mut self.ctx, &mut self.schedule, world, &mut self.scope) {
            error!(stage = target.number(), error = %err, "stage_build_failed");
            let now = self.ctx.now_seconds();
            self.ctx
                .errors
                .record(ErrorContext::EntityCreation, err.to_string(), now);
            self.scope.cleanup(&mut self.schedule, world);
            self.ctx.stage = ActiveStage::Idle;
            return;
        }
        if let Err(err) = self.controller.transition_to(target) {
            self.reject_transition(&err);
            return;
        }
        info!(
            stage = target.number(),
            name = target.name(),
            entities = self.scope.entity_count(),
            systems = self.scope.system_count(),
            previous = ?self.controller.previous_stage(),
            next = ?self.controller.next_stage(),
            "stage_built"
        );
    }

    fn reject_transition(&mut self, err: &StageError) {
        warn!(error = %err, "stage_transition_rejected");
        let now = self.ctx.now_seconds();
        self.ctx
            .errors
            .record(ErrorContext::StageTransition, err.to_string(), now);
    }

    fn teardown(&mut self, stage: StageId, world: &mut SceneWorld) {
        if matches!(self.ctx.stage, ActiveStage::Ritual(_)) {
            self.ctx.flags.kill_ambience = true;
            self.ctx.sounds.stop_all(world);
        }
        let report = self.scope.cleanup(&mut self.schedule, world);
        self.ctx.stage = ActiveStage::Idle;
        info!(
            stage = stage.number(),
            systems = report.systems_removed,
            entities = report.entities_removed,
            already_gone = report.already_gone,
            "stage_cleaned_up"
        );
    }

    fn dispatch_timers(&mut self, dt_seconds: f32, world: &mut SceneWorld) {
        for timer in self.ctx.timers.advance(dt_seconds) {
            match timer {
                SessionTimer::CandleIdle(candle) => {
                    if !self.ctx.stage.candle_is_lit(candle) {
                        continue;
                    }
                    if let Err(err) = show_flame_idle(world, candle) {
                        debug!(candle = candle.0, error = %err, "candle_idle_skipped");
                    }
                }
                SessionTimer::AmbienceReroll => {
                    if self.ctx.flags.kill_ambience {
                        self.ctx.ambience.stop(world);
                        info!("ambience_stopped");
                        continue;
                    }
                    let delay = self.ctx.ambience.play_next(world, &self.ctx.config.ambience);
                    self.ctx
                        .timers
                        .set_timeout_seconds(f64::from(delay), SessionTimer::AmbienceReroll);
                }
            }
        }
    }
}

type StageBuilder = fn(
    StageId,
    &mut SessionContext,
    &mut Schedule<SessionContext>,
    &mut SceneWorld,
    &mut StageScope,
) -> Result<(), StageError>;

fn build_stage(
    target: StageId,
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    match target {
        StageId::Graveyard => graveyard::build(ctx, schedule, world, scope),
        StageId::Boat => narrative::build_boat(ctx, schedule, world, scope),
        StageId::Spiral => narrative::build_spiral(ctx, schedule, world, scope),
        StageId::Ritual => narrative::build_ritual(ctx, schedule, world, scope),
        StageId::Epilogue => narrative::build_epilogue(ctx, schedule, world, scope),
    }
}

impl Scene for Session {
    fn load(&mut self, world: &mut SceneWorld) {
        self.ctx.ambience.attach(world, self.ctx.config.ambience.volume);
        let report = self.ctx.sounds.attach(world);
        let now = self.ctx.now_seconds();
        for message in report.errors {
            self.ctx.errors.record(ErrorContext::Audio, message, now);
        }
        world.request(HostRequest::FetchUserData);
        let start = StageId::from_number(self.ctx.config.session.start_stage).unwrap_or(StageId::Graveyard);
        self.enter_stage(start, world);
        if self.ctx.config.session.auto_begin {
            self.begin_game(world);
        }
    }

    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut SceneWorld) -> SceneCommand {
        if input.begin_pressed() {
            self.begin_game(world);
        }
        self.ctx.events = world.drain_events();
        for event in &self.ctx.events {
            if let HostEvent::UserDataReady(user) = event {
                info!(user = %user.display_name, has_avatar = user.avatar.is_some(), "user_data_ready");
                self.ctx.user_data = Some(user.clone());
            }
        }
        self.dispatch_timers(fixed_dt_seconds, world);

        let failures = self.schedule.run(&mut self.ctx, world, fixed_dt_seconds);
        let now = self.ctx.now_seconds();
        for failure in failures {
            self.ctx.errors.record(
                ErrorContext::SystemUpdate,
                format!("{}: {}", failure.name, failure.error),
                now,
            );
        }

        if let Some(request) = self.ctx.take_transition() {
            self.ctx.fade.start(request.target, request.plan);
        }
        if let FadeEvent::ReachedBlack(target) = self.ctx.fade.tick(fixed_dt_seconds) {
            self.enter_stage(target, world);
        }
        world.screen_mut().fade_opacity = self.ctx.fade.opacity();

        if self.ctx.flags.finished && self.ctx.config.session.quit_on_finish {
            return SceneCommand::Quit;
        }
        SceneCommand::None
    }

    fn unload(&mut self, world: &mut SceneWorld) {
        if let Some(stage) = self.controller.current() {
            self.teardown(stage, world);
        }
        self.ctx.ambience.stop(world);
        self.ctx.sounds.stop_all(world);
        let now = self.ctx.now_seconds();
        if !self.ctx.errors.is_healthy(now) {
            let last = self.ctx.errors.entries().last().map(|entry| entry.message.as_str());
            warn!(last_error = last.unwrap_or(""), "session_unhealthy");
        }
        let health = self.ctx.errors.health(now);
        info!(
            healthy = health.healthy,
            errors = health.error_count,
            recent = health.recent_errors,
            critical = ?health.critical,
            history = self.controller.history().len(),
            "session_unloaded"
        );
        self.controller.reset();
        self.ctx.errors.clear();
    }

    fn system_count(&self) -> usize {
        self.schedule.len()
    }

    fn debug_title(&self, world: &SceneWorld) -> Option<String> {
        let stage = self
            .ctx
            .stage
            .id()
            .map_or_else(|| "none".to_string(), |stage| stage.to_string());
        Some(format!(
            "Fevered Dream | stage {stage} | entities {}",
            world.entity_count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gameplay::pool::{PoolKind, MOVING_MODEL};
    use engine::{AvatarData, Visual};

    const DT: f32 = 1.0 / 60.0;

    fn small_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.maze.cols = 8;
        config.maze.rows = 8;
        config
    }

    fn step(session: &mut Session, world: &mut SceneWorld, input: &InputSnapshot) -> SceneCommand {
        world.begin_tick(input, DT);
        let command = session.update(DT, input, world);
        world.apply_host_requests();
        command
    }

    fn run_seconds(session: &mut Session, world: &mut SceneWorld, seconds: f32) {
        let ticks = (seconds / DT).ceil() as u32;
        for _ in 0..ticks {
            step(session, world, &InputSnapshot::empty());
        }
    }

    fn loaded(config: GameConfig) -> (Session, SceneWorld) {
        let mut world = SceneWorld::default();
        let mut session = Session::new(config);
        session.load(&mut world);
        world.apply_host_requests();
        (session, world)
    }

    #[test]
    fn load_builds_the_graveyard_behind_the_start_gate() {
        let (mut session, mut world) = loaded(small_config());

        assert_eq!(session.controller().current(), Some(StageId::Graveyard));
        assert!(!session.context().flags.game_started);
        assert!(session.system_count() >= 2);

        run_seconds(&mut session, &mut world, 1.0);
        assert!(!session.context().flags.game_started);

        step(&mut session, &mut world, &InputSnapshot::empty().with_begin_pressed(true));
        assert!(session.context().flags.game_started);
        assert_eq!(session.context().timers.pending_count(), 1);
    }

    #[test]
    fn starting_candle_burns_out_and_wakes_the_angels() {
        let mut config = small_config();
        config.session.auto_begin = true;
        config.pursuit.candle_duration_seconds = 0.5;
        let (mut session, mut world) = loaded(config);

        run_seconds(&mut session, &mut world, 1.0);

        let ActiveStage::Graveyard(stage) = &session.context().stage else {
            panic!("graveyard expected");
        };
        assert!(stage.candles.angels_active());
        assert!(stage.pursuit.is_engaged());
        let pillars = stage.pools.get(PoolKind::Pillar).slots();
        assert_eq!(stage.pursuit.active().len(), pillars.len());
        let first = world.find_entity(pillars[0].entity).expect("pillar");
        assert_eq!(first.visual, Some(Visual::model(MOVING_MODEL)));
    }

    #[test]
    fn faded_transition_rebuilds_while_black() {
        let (mut session, mut world) = loaded(small_config());
        let graveyard_entities = session.scope().entity_count();
        assert!(graveyard_entities > 0);

        assert!(session.context_mut().request_transition(StageId::Boat, FadePlan::OutHoldIn));
        assert!(!session.context_mut().request_transition(StageId::Boat, FadePlan::OutHoldIn));

        step(&mut session, &mut world, &InputSnapshot::empty());
        assert_eq!(session.controller().current(), Some(StageId::Graveyard));
        assert!(world.screen().fade_opacity > 0.0);

        run_seconds(&mut session, &mut world, 1.0);
        assert_eq!(session.controller().current(), Some(StageId::Boat));
        assert_eq!(session.controller().history(), &[StageId::Graveyard]);
        assert!(matches!(session.context().stage, ActiveStage::Boat(_)));

        run_seconds(&mut session, &mut world, 2.0);
        assert_eq!(world.screen().fade_opacity, 0.0);
    }

    fn failing_build(
        target: StageId,
        _: &mut SessionContext,
        _: &mut Schedule<SessionContext>,
        world: &mut SceneWorld,
        scope: &mut StageScope,
    ) -> Result<(), StageError> {
        let id = scope.spawn(world, "half_built", engine::Transform::at(engine::Vec3::ZERO));
        Err(StageError::Build {
            stage: target,
            source: engine::HostError::EntityNotFound(engine::EntityId(id.0 + 1_000)),
        })
    }

    #[test]
    fn failed_build_leaves_the_target_enterable() {
        let (mut session, mut world) = loaded(small_config());

        session.enter_stage_with(StageId::Boat, &mut world, failing_build);

        assert_eq!(session.controller().current(), Some(StageId::Graveyard));
        assert!(session.controller().history().is_empty());
        assert!(matches!(session.context().stage, ActiveStage::Idle));
        assert_eq!(session.scope().entity_count(), 0);
        assert_eq!(session.context().errors.len(), 1);

        session.enter_stage(StageId::Boat, &mut world);
        assert_eq!(session.controller().current(), Some(StageId::Boat));
        assert_eq!(session.controller().history(), &[StageId::Graveyard]);
        assert!(matches!(session.context().stage, ActiveStage::Boat(_)));
    }

    #[test]
    fn invalid_transition_is_journaled_not_applied() {
        let (mut session, mut world) = loaded(small_config());
        session.enter_stage(StageId::Ritual, &mut world);

        assert_eq!(session.controller().current(), Some(StageId::Graveyard));
        assert_eq!(session.context().errors.len(), 1);
    }

    #[test]
    fn ambience_chain_stops_once_killed() {
        let mut config = small_config();
        config.session.auto_begin = true;
        let (mut session, mut world) = loaded(config);
        assert_eq!(session.context().ambience.plays(), 1);

        session.context_mut().flags.kill_ambience = true;
        run_seconds(&mut session, &mut world, 30.0);

        assert_eq!(session.context().ambience.plays(), 1);
        assert_eq!(session.context().timers.pending_count(), 0);
        assert!(session.context().ambience.current().is_none());
    }

    #[test]
    fn unload_removes_stage_entities() {
        let (mut session, mut world) = loaded(small_config());
        let before = world.entity_count();
        session.unload(&mut world);

        assert!(world.entity_count() < before);
        let session_audio = session.context().ambience.entities().len() + session.context().sounds.entities().count();
        assert_eq!(world.entity_count(), session_audio);
        assert_eq!(session.system_count(), 0);
        assert_eq!(
            world.player().position,
            session.context().config.session.player_spawn
        );
    }

    #[test]
    fn begin_starts_the_global_loops() {
        let (mut session, mut world) = loaded(small_config());
        assert!(!session.context().sounds.is_playing(&world, Sound::Heart));

        step(&mut session, &mut world, &InputSnapshot::empty().with_begin_pressed(true));
        let sounds = &session.context().sounds;
        assert!(sounds.is_playing(&world, Sound::Heart));
        assert!(sounds.is_playing(&world, Sound::Wind));
        assert!(sounds.is_playing(&world, Sound::Whisper));
        assert!(!sounds.is_playing(&world, Sound::Final));
    }

    #[test]
    fn user_profile_arrives_asynchronously() {
        let mut world = SceneWorld::default();
        world.set_user_profile(
            UserData {
                user_id: "0x1".to_string(),
                display_name: "dreamer".to_string(),
                avatar: Some(AvatarData::default()),
            },
            3,
        );
        let mut session = Session::new(small_config());
        session.load(&mut world);
        world.apply_host_requests();
        assert!(session.context().user_data.is_none());

        run_seconds(&mut session, &mut world, 0.2);
        let user = session.context().user_data.as_ref().expect("profile");
        assert_eq!(user.display_name, "dreamer");
    }
}
