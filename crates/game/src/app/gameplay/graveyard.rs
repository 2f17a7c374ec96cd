use engine::{
    CameraMode, EntityId, HostError, HostEvent, HostRequest, Interactable, SceneWorld, Schedule,
    System, SystemError, TimerQueue, Transform, Vec3, Visual,
};
use tracing::{debug, info};

use super::decor::{decorate, DecorRules};
use super::layout::CellGeometry;
use super::maze::MazeGrid;
use super::pool::{PoolKind, PoolSizes, StagePools};
use super::pursuit::{candle_animator, show_extinguished, show_lit, AngelPursuit, CandleBank, LightOutcome};
use super::rng::SeededRng;
use super::session::{ActiveStage, SessionContext, SessionTimer};
use super::stages::{StageError, StageId, StageScope};
use super::timeline::{Cutscene, FadePlan};
use super::window::VisibilityWindow;
use crate::app::config::GameConfig;

pub(crate) const CANDLE_MODEL: &str = "models/candle.glb";
pub(crate) const CANDLE_HOVER_TEXT: &str = "Light Candle";
pub(crate) const CANDLE_REACH: f32 = 4.0;
const CANDLE_SCALE: f32 = 0.3;
const FOG_LIGHT_HEIGHT: f32 = 18.0;
const FOG_LIGHT_LEAD_X: f32 = 5.0;
const STATUE_EMOTE: &str = "animations/statue_emote.glb";
const STATUE_STILL_EMOTE: &str = "animations/statuestill_emote.glb";
const CAMERA_CLOSE_OFFSET: Vec3 = Vec3::new(0.0, 2.0, -4.0);
const CAMERA_WIDE_OFFSET: Vec3 = Vec3::new(0.0, 7.0, -6.0);

/// Beats of the caught-by-an-angel sequence, each delay relative to the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GameOverCue {
    PullBack,
    Still,
    Reset,
}

fn game_over_cutscene() -> Cutscene<GameOverCue> {
    Cutscene::new(vec![
        (5.0, GameOverCue::PullBack),
        (3.0, GameOverCue::Still),
        (3.0, GameOverCue::Reset),
    ])
}

/// The maze stage: grid, pools, streaming window and the angel pursuit.
pub(crate) struct GraveyardStage {
    pub(crate) grid: MazeGrid,
    pub(crate) pools: StagePools,
    pub(crate) window: VisibilityWindow,
    pub(crate) candles: CandleBank,
    pub(crate) pursuit: AngelPursuit,
    pillars: Vec<EntityId>,
    fog_light: EntityId,
    game_over: Option<Cutscene<GameOverCue>>,
    caught_at: Vec3,
}

impl GraveyardStage {
    #[cfg(test)]
    pub(crate) fn is_game_over(&self) -> bool {
        self.game_over.is_some()
    }
}

fn pool_sizes(config: &GameConfig) -> PoolSizes {
    let defaults = PoolSizes::for_show_range(config.maze.show_range);
    PoolSizes {
        walls: config.pools.walls.unwrap_or(defaults.walls),
        floors: config.pools.floors.unwrap_or(defaults.floors),
        pillars: config.pools.pillars.unwrap_or(defaults.pillars),
        trees: config.pools.trees.unwrap_or(defaults.trees),
    }
}

pub(crate) fn build(
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    let config = &ctx.config;
    let geometry = CellGeometry {
        cell_size: config.maze.cell_size,
        wall_thickness: config.maze.wall_thickness,
        wall_height: config.maze.wall_height,
    };

    let mut rng = SeededRng::new(config.maze.seed);
    let mut grid = MazeGrid::new(config.maze.cols, config.maze.rows);
    let stats = grid.generate(&mut rng, config.maze.iteration_ceiling);
    let rules = DecorRules::centered(grid.cols(), grid.rows());
    decorate(&mut grid, &mut rng, &rules);
    info!(
        seed = config.maze.seed,
        cols = grid.cols(),
        rows = grid.rows(),
        carved = stats.carved,
        iterations = stats.iterations,
        completed = stats.completed,
        "maze_ready"
    );

    let sizes = pool_sizes(config);
    let mut pools = StagePools::preallocate(world, &sizes);
    scope.track_entities(pools.all_entities());
    let pillars = pools
        .get(PoolKind::Pillar)
        .slots()
        .iter()
        .map(|slot| slot.entity)
        .collect::<Vec<_>>();

    let spawn = config.session.player_spawn;
    let candle_position = config.session.initial_candle;
    let candle = scope.spawn(
        world,
        "candle",
        Transform::at(candle_position).with_scale(Vec3::splat(CANDLE_SCALE)),
    );
    let entity = world
        .entity_mut(candle)
        .map_err(|source| StageError::Build {
            stage: StageId::Graveyard,
            source,
        })?;
    entity.visual = Some(Visual::model(CANDLE_MODEL));
    entity.animator = Some(candle_animator());
    entity.interactable = Some(Interactable {
        hover_text: CANDLE_HOVER_TEXT.to_string(),
        max_distance: CANDLE_REACH,
    });

    let mut candles = CandleBank::new(
        Some(config.pursuit.max_active_candles),
        Some(config.pursuit.candle_duration_seconds),
    );
    candles.add(candle);
    candles.force_light(candle);
    show_lit(world, candle).map_err(|source| StageError::Build {
        stage: StageId::Graveyard,
        source,
    })?;
    ctx.timers
        .set_timeout_ms(config.pursuit.flame_idle_delay_ms, SessionTimer::CandleIdle(candle));

    let fog_light = scope.spawn(
        world,
        "fog_light",
        Transform::at(Vec3::new(spawn.x + FOG_LIGHT_LEAD_X, FOG_LIGHT_HEIGHT, spawn.z)),
    );

    let mut window = VisibilityWindow::new(config.maze.show_range, geometry);
    if let Some(report) = window.update(spawn, &mut grid, &mut pools, world) {
        debug!(placed = report.placed, skipped = report.skipped, "initial_window_revealed");
    }

    world.player_mut().input_locked = false;
    world.screen_mut().camera = CameraMode::FollowPlayer;
    world.request(HostRequest::MovePlayer {
        position: spawn,
        look_at: Some(candle_position),
    });

    let pursuit = AngelPursuit::new(config.pursuit.angel_speed, None);
    ctx.flags.game_over = false;
    ctx.stage = ActiveStage::Graveyard(Box::new(GraveyardStage {
        grid,
        pools,
        window,
        candles,
        pursuit,
        pillars,
        fog_light,
        game_over: None,
        caught_at: spawn,
    }));

    scope.add_system(schedule, Box::new(CandleSystem));
    scope.add_system(schedule, Box::new(GraveyardSystem));
    Ok(())
}

/// Lights every clicked candle of `bank` and schedules its idle flame.
/// Returns how many candles were newly lit.
pub(crate) fn light_clicked_candles(
    bank: &mut CandleBank,
    events: &[HostEvent],
    world: &mut SceneWorld,
    timers: &mut TimerQueue<SessionTimer>,
    idle_delay_ms: u64,
) -> Result<usize, HostError> {
    let mut lit = 0;
    for event in events {
        let HostEvent::PointerDown { entity } = event else {
            continue;
        };
        if !bank.contains(*entity) {
            continue;
        }
        match bank.try_light(*entity) {
            LightOutcome::Lit => {
                show_lit(world, *entity)?;
                timers.set_timeout_ms(idle_delay_ms, SessionTimer::CandleIdle(*entity));
                lit += 1;
            }
            outcome => debug!(candle = entity.0, outcome = ?outcome, "candle_click_ignored"),
        }
    }
    Ok(lit)
}

/// Lights candles the player clicks and extinguishes the ones that burn out.
struct CandleSystem;

impl System<SessionContext> for CandleSystem {
    fn name(&self) -> &'static str {
        "graveyard_candles"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        if !ctx.flags.game_started || ctx.flags.game_over {
            return Ok(());
        }
        let SessionContext {
            stage,
            events,
            timers,
            config,
            ..
        } = ctx;
        let ActiveStage::Graveyard(graveyard) = stage else {
            return Ok(());
        };

        light_clicked_candles(
            &mut graveyard.candles,
            events,
            world,
            timers,
            config.pursuit.flame_idle_delay_ms,
        )?;
        for candle in graveyard.candles.tick(fixed_dt_seconds) {
            show_extinguished(world, candle)?;
        }
        Ok(())
    }
}

/// Streams the maze around the player, drives the angels and detects the
/// catch. While caught it only plays the game-over sequence.
struct GraveyardSystem;

impl System<SessionContext> for GraveyardSystem {
    fn name(&self) -> &'static str {
        "graveyard_update"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        if !ctx.flags.game_started {
            return Ok(());
        }
        let ActiveStage::Graveyard(graveyard) = &mut ctx.stage else {
            return Ok(());
        };
        let graveyard = graveyard.as_mut();
        let player = world.player().position;

        world.transform_mut(graveyard.fog_light)?.position =
            Vec3::new(player.x + FOG_LIGHT_LEAD_X, FOG_LIGHT_HEIGHT, player.z);

        if let Some(cutscene) = graveyard.game_over.as_mut() {
            let cues = cutscene.tick(fixed_dt_seconds);
            let caught_at = graveyard.caught_at;
            for cue in cues {
                match cue {
                    GameOverCue::PullBack => {
                        world.screen_mut().camera = CameraMode::Cinematic {
                            position: caught_at + CAMERA_WIDE_OFFSET,
                            look_at: caught_at,
                        };
                    }
                    GameOverCue::Still => world.request(HostRequest::PlayEmote {
                        src: STATUE_STILL_EMOTE.to_string(),
                    }),
                    GameOverCue::Reset => {
                        world.screen_mut().camera = CameraMode::FollowPlayer;
                        ctx.request_transition(StageId::Boat, FadePlan::OutHoldIn);
                        return Ok(());
                    }
                }
            }
            return Ok(());
        }

        if let Some(report) =
            graveyard
                .window
                .update(player, &mut graveyard.grid, &mut graveyard.pools, world)
        {
            debug!(
                revealed = report.revealed,
                hidden = report.hidden,
                skipped = report.skipped,
                pillars_in_use = graveyard.pools.get(PoolKind::Pillar).used_count(),
                pillar_exhaustions = graveyard.pools.get(PoolKind::Pillar).exhaustion_count(),
                "graveyard_window_reconciled"
            );
        }
        graveyard
            .pursuit
            .observe(graveyard.candles.angels_active(), &graveyard.pillars, world);
        graveyard.pursuit.chase(fixed_dt_seconds, player, world);

        let caught = graveyard.pursuit.is_engaged()
            && ctx.events.iter().any(|event| {
                matches!(event, HostEvent::TriggerEntered { trigger } if graveyard.pillars.contains(trigger))
            });
        if caught {
            ctx.flags.game_over = true;
            start_game_over(graveyard, world, player);
        }
        Ok(())
    }
}

fn start_game_over(graveyard: &mut GraveyardStage, world: &mut SceneWorld, player: Vec3) {
    let settled = graveyard.pursuit.force_reset(world);
    info!(angels = settled, x = player.x, z = player.z, "player_caught");
    graveyard.caught_at = player;
    graveyard.game_over = Some(game_over_cutscene());
    world.player_mut().input_locked = true;
    world.request(HostRequest::PlayEmote {
        src: STATUE_EMOTE.to_string(),
    });
    world.screen_mut().camera = CameraMode::Cinematic {
        position: player + CAMERA_CLOSE_OFFSET,
        look_at: player,
    };
}
