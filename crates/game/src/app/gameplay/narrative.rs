use std::f32::consts::TAU;

use engine::{
    Animator, AvatarData, CameraMode, EntityId, HostError, HostEvent, HostRequest, Interactable,
    PrimitiveShape, Quat, SceneWorld, Schedule, System, SystemError, Transform, TriggerVolume, Vec3,
    Visual,
};
use tracing::{debug, info};

use super::audio::Sound;
use super::graveyard::{light_clicked_candles, CANDLE_HOVER_TEXT, CANDLE_MODEL, CANDLE_REACH};
use super::pool::POOL_PARK_POSITION;
use super::pursuit::{candle_animator, show_extinguished, AngelPursuit, CandleBank};
use super::rng::SeededRng;
use super::session::{ActiveStage, SessionContext};
use super::stages::{StageError, StageId, StageScope};
use super::timeline::{Cutscene, FadePlan};

const SKELETON_MODEL: &str = "models/skeleton.glb";
const SWIM_IDLE_CLIP: &str = "Swim_Idle";
const SWIM_FORWARD_CLIP: &str = "Swim_Forward";
const SKELETON_SCALE: f32 = 2.0;

fn build_error(stage: StageId) -> impl Fn(HostError) -> StageError {
    move |source| StageError::Build { stage, source }
}

/// Set pieces scatter deterministically from the maze seed.
fn scatter_rng(ctx: &SessionContext, stage: StageId) -> SeededRng {
    SeededRng::new(ctx.config.maze.seed.wrapping_add(u64::from(stage.number())))
}

fn spawn_visual(
    scope: &mut StageScope,
    world: &mut SceneWorld,
    stage: StageId,
    debug_name: &'static str,
    visual: Visual,
    transform: Transform,
) -> Result<EntityId, StageError> {
    let id = scope.spawn(world, debug_name, transform);
    world.set_visual(id, visual).map_err(build_error(stage))?;
    Ok(id)
}

fn spawn_model(
    scope: &mut StageScope,
    world: &mut SceneWorld,
    stage: StageId,
    debug_name: &'static str,
    src: &str,
    transform: Transform,
) -> Result<EntityId, StageError> {
    spawn_visual(scope, world, stage, debug_name, Visual::model(src), transform)
}

fn spawn_box(
    scope: &mut StageScope,
    world: &mut SceneWorld,
    stage: StageId,
    debug_name: &'static str,
    transform: Transform,
) -> Result<EntityId, StageError> {
    spawn_visual(
        scope,
        world,
        stage,
        debug_name,
        Visual::Primitive(PrimitiveShape::Box),
        transform,
    )
}

fn spawn_skeleton(
    scope: &mut StageScope,
    world: &mut SceneWorld,
    stage: StageId,
    transform: Transform,
    clip: &str,
) -> Result<EntityId, StageError> {
    let id = spawn_model(scope, world, stage, "skeleton", SKELETON_MODEL, transform)?;
    let mut animator = Animator::with_clips([(clip, true)]);
    animator.set_playing(clip, true);
    world.entity_mut(id).map_err(build_error(stage))?.animator = Some(animator);
    Ok(id)
}

fn spawn_candle(
    scope: &mut StageScope,
    world: &mut SceneWorld,
    stage: StageId,
    transform: Transform,
) -> Result<EntityId, StageError> {
    let id = spawn_model(scope, world, stage, "candle", CANDLE_MODEL, transform)?;
    let entity = world.entity_mut(id).map_err(build_error(stage))?;
    entity.animator = Some(candle_animator());
    entity.interactable = Some(Interactable {
        hover_text: CANDLE_HOVER_TEXT.to_string(),
        max_distance: CANDLE_REACH,
    });
    show_extinguished(world, id).map_err(build_error(stage))?;
    Ok(id)
}

fn set_clip(world: &mut SceneWorld, entity: EntityId, clip: &str, playing: bool) -> Result<(), HostError> {
    if !world.animator_mut(entity)?.set_playing(clip, playing) {
        debug!(entity = entity.0, clip, "clip_missing");
    }
    Ok(())
}

// Boat

const BOAT_MODEL: &str = "models/grimreaper.glb";
const BOAT_START: Vec3 = Vec3::new(-60.0, 2.0, 0.0);
const BOAT_END: Vec3 = Vec3::new(60.0, 2.0, 0.0);
const BOAT_CROSSING_SECONDS: f32 = 100.0;
const BOAT_ROUTE_START: Vec3 = Vec3::new(-100.0, 3.0, 0.0);
const BOAT_ROUTE_END: Vec3 = Vec3::new(100.0, 3.0, 0.0);
const BOAT_RESCUE_LEAD: f32 = 0.02;
const WATER_SIZE: f32 = 200.0;
const PERIMETER_HEIGHT: f32 = 25.0;
const PERIMETER_THICKNESS: f32 = 2.0;
const SKULL_MODEL: &str = "models/headwall.glb";
const SKULL_POSITION: Vec3 = Vec3::new(81.8, 15.0, 0.0);
const SKULL_SCALE: f32 = 20.0;
const TELEPORT_POSITION: Vec3 = Vec3::new(95.8, 1.4, 0.0);
const TELEPORT_HALF_EXTENTS: Vec3 = Vec3::new(2.5, 2.0, 2.5);
const SKULL_CANDLES: [Vec3; 4] = [
    Vec3::new(95.0, 1.6, -0.5),
    Vec3::new(95.0, 1.6, 0.5),
    Vec3::new(96.6, 2.8, -0.65),
    Vec3::new(96.6, 2.8, 0.65),
];
const SKULL_CANDLE_SCALE: f32 = 1.0;
const BOAT_SKELETONS: usize = 16;

pub(crate) struct BoatStage {
    pub(crate) candles: CandleBank,
    boat: EntityId,
    water: EntityId,
    teleport: EntityId,
    elapsed: f32,
    armed: bool,
}

impl BoatStage {
    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }
}

fn boat_position(elapsed: f32) -> Vec3 {
    BOAT_START.lerp(BOAT_END, (elapsed / BOAT_CROSSING_SECONDS).clamp(0.0, 1.0))
}

/// Where a player who fell in the water lands: slightly ahead of the boat
/// along the full route.
pub(crate) fn boat_rescue_point(boat: Vec3) -> Vec3 {
    let route = BOAT_ROUTE_END - BOAT_ROUTE_START;
    let route_length = (route.x * route.x + route.y * route.y + route.z * route.z).sqrt();
    let offset = boat - BOAT_ROUTE_START;
    let travelled = (offset.x * offset.x + offset.y * offset.y + offset.z * offset.z).sqrt();
    let progress = (travelled / route_length + BOAT_RESCUE_LEAD).min(1.0);
    BOAT_ROUTE_START.lerp(BOAT_ROUTE_END, progress)
}

fn move_player_to_boat(world: &mut SceneWorld, boat: Vec3) {
    let position = boat_rescue_point(boat);
    world.request(HostRequest::MovePlayer {
        position,
        look_at: Some(position + Vec3::new(0.0, 1.0, 0.0)),
    });
}

pub(crate) fn build_boat(
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    let stage = StageId::Boat;
    ctx.sounds.apply(
        world,
        &[(Sound::Heart, true), (Sound::Creaky, true), (Sound::Whisper, true)],
    );

    let half = WATER_SIZE / 2.0;
    let along_x = Vec3::new(WATER_SIZE, PERIMETER_HEIGHT, PERIMETER_THICKNESS);
    let along_z = Vec3::new(PERIMETER_THICKNESS, PERIMETER_HEIGHT, WATER_SIZE);
    let wall_y = PERIMETER_HEIGHT / 2.0;
    let perimeter = [
        (Vec3::new(0.0, wall_y, half), along_x),
        (Vec3::new(0.0, wall_y, -half), along_x),
        (Vec3::new(half, wall_y, 0.0), along_z),
        (Vec3::new(-half, wall_y, 0.0), along_z),
    ];
    for (position, scale) in perimeter {
        spawn_box(scope, world, stage, "perimeter_wall", Transform::at(position).with_scale(scale))?;
    }

    let mut rng = scatter_rng(ctx, stage);
    for i in 0..BOAT_SKELETONS {
        let along = i as f32 / (BOAT_SKELETONS - 1) as f32;
        let mut position = Vec3::new(-200.0, 0.0, 0.0).lerp(Vec3::new(180.0, 0.0, 0.0), along);
        position.z += rng.range_f32(-10.0, 10.0);
        let transform = Transform::at(position)
            .with_scale(Vec3::splat(SKELETON_SCALE))
            .with_rotation(Quat::from_yaw_degrees(rng.range_f32(0.0, 360.0)));
        spawn_skeleton(scope, world, stage, transform, SWIM_IDLE_CLIP)?;
    }

    let boat = spawn_model(
        scope,
        world,
        stage,
        "boat",
        BOAT_MODEL,
        Transform::at(BOAT_START)
            .with_scale(Vec3::splat(3.0))
            .with_rotation(Quat::from_yaw_degrees(90.0)),
    )?;
    let water = spawn_visual(
        scope,
        world,
        stage,
        "water",
        Visual::Primitive(PrimitiveShape::Plane),
        Transform::at(Vec3::ZERO).with_scale(Vec3::new(WATER_SIZE, 1.0, WATER_SIZE)),
    )?;
    world.entity_mut(water).map_err(build_error(stage))?.trigger =
        Some(TriggerVolume::new(Vec3::new(half, 1.0, half)));

    spawn_model(
        scope,
        world,
        stage,
        "skull",
        SKULL_MODEL,
        Transform::at(SKULL_POSITION)
            .with_scale(Vec3::splat(SKULL_SCALE))
            .with_rotation(Quat::from_yaw_degrees(-90.0)),
    )?;
    let teleport = scope.spawn(world, "skull_teleport", Transform::at(TELEPORT_POSITION));
    let mut trigger = TriggerVolume::new(TELEPORT_HALF_EXTENTS);
    trigger.enabled = false;
    world.entity_mut(teleport).map_err(build_error(stage))?.trigger = Some(trigger);

    let mut candles = CandleBank::new(None, None);
    for position in SKULL_CANDLES {
        let candle = spawn_candle(
            scope,
            world,
            stage,
            Transform::at(position).with_scale(Vec3::splat(SKULL_CANDLE_SCALE)),
        )?;
        candles.add(candle);
    }

    world.player_mut().input_locked = false;
    world.screen_mut().camera = CameraMode::FollowPlayer;
    move_player_to_boat(world, BOAT_START);

    ctx.stage = ActiveStage::Boat(BoatStage {
        candles,
        boat,
        water,
        teleport,
        elapsed: 0.0,
        armed: false,
    });
    scope.add_system(schedule, Box::new(BoatSystem));
    Ok(())
}

struct BoatSystem;

impl System<SessionContext> for BoatSystem {
    fn name(&self) -> &'static str {
        "boat_update"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        let ActiveStage::Boat(boat) = &mut ctx.stage else {
            return Ok(());
        };
        boat.elapsed += fixed_dt_seconds;
        let position = boat_position(boat.elapsed);
        world.transform_mut(boat.boat)?.position = position;

        light_clicked_candles(
            &mut boat.candles,
            &ctx.events,
            world,
            &mut ctx.timers,
            ctx.config.pursuit.flame_idle_delay_ms,
        )?;
        if boat.candles.all_lit() && !boat.armed {
            boat.armed = true;
            world.trigger_mut(boat.teleport)?.enabled = true;
            info!("skull_teleport_armed");
        }

        let mut leave = false;
        for event in &ctx.events {
            let HostEvent::TriggerEntered { trigger } = event else {
                continue;
            };
            if *trigger == boat.water {
                debug!("player_fell_in_water");
                move_player_to_boat(world, position);
            } else if *trigger == boat.teleport && boat.candles.all_lit() {
                leave = true;
            }
        }
        if leave {
            ctx.request_transition(StageId::Spiral, FadePlan::OutHoldIn);
        }
        Ok(())
    }
}

// Spiral

const SPIRAL_MODEL: &str = "models/spiral4.glb";
const SPIRAL_POSITION: Vec3 = Vec3::new(0.0, 22.0, 0.0);
const SPIRAL_SCALE: f32 = 22.0;
const SPIRAL_TOP: Vec3 = Vec3::new(-0.5, 41.05, -9.0);
const SPIRAL_TOP_LOOK_AT: Vec3 = Vec3::new(10.0, 30.0, 10.0);
const SPIRAL_ARRIVAL_SECONDS: f32 = 4.0;
const SPIRAL_SKELETONS: usize = 20;
const SPIRAL_SKELETON_RADIUS: f32 = 10.0;
const SPIRAL_SKELETON_MAX_HEIGHT: f32 = 50.0;
const VORTEX_MODEL: &str = "models/vortex.glb";
const VORTEX_POSITION: Vec3 = Vec3::new(4.0, 0.3, 8.0);
const VORTEX_SCALE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpiralCue {
    MoveToTop,
}

pub(crate) struct SpiralStage {
    vortex: EntityId,
    arrival: Cutscene<SpiralCue>,
}

pub(crate) fn build_spiral(
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    let stage = StageId::Spiral;
    ctx.sounds.apply(
        world,
        &[
            (Sound::Heart, true),
            (Sound::Creaky, false),
            (Sound::Whisper, false),
            (Sound::Dungeon, true),
        ],
    );

    spawn_model(
        scope,
        world,
        stage,
        "spiral",
        SPIRAL_MODEL,
        Transform::at(SPIRAL_POSITION).with_scale(Vec3::splat(SPIRAL_SCALE)),
    )?;

    let mut rng = scatter_rng(ctx, stage);
    for _ in 0..SPIRAL_SKELETONS {
        let angle = rng.range_f32(0.0, TAU);
        let distance = rng.range_f32(0.0, SPIRAL_SKELETON_RADIUS);
        let height = rng.range_f32(0.0, SPIRAL_SKELETON_MAX_HEIGHT);
        let transform = Transform::at(Vec3::new(angle.cos() * distance, height, angle.sin() * distance))
            .with_scale(Vec3::splat(SKELETON_SCALE))
            .with_rotation(Quat::from_yaw_degrees(rng.range_f32(0.0, 360.0)));
        spawn_skeleton(scope, world, stage, transform, SWIM_IDLE_CLIP)?;
    }

    let vortex = spawn_model(
        scope,
        world,
        stage,
        "vortex",
        VORTEX_MODEL,
        Transform::at(VORTEX_POSITION).with_scale(Vec3::splat(VORTEX_SCALE)),
    )?;
    world.entity_mut(vortex).map_err(build_error(stage))?.trigger =
        Some(TriggerVolume::new(Vec3::splat(VORTEX_SCALE / 2.0)));

    ctx.stage = ActiveStage::Spiral(SpiralStage {
        vortex,
        arrival: Cutscene::new(vec![(SPIRAL_ARRIVAL_SECONDS, SpiralCue::MoveToTop)]),
    });
    scope.add_system(schedule, Box::new(SpiralSystem));
    Ok(())
}

struct SpiralSystem;

impl System<SessionContext> for SpiralSystem {
    fn name(&self) -> &'static str {
        "spiral_update"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        let ActiveStage::Spiral(spiral) = &mut ctx.stage else {
            return Ok(());
        };
        for cue in spiral.arrival.tick(fixed_dt_seconds) {
            match cue {
                SpiralCue::MoveToTop => world.request(HostRequest::MovePlayer {
                    position: SPIRAL_TOP,
                    look_at: Some(SPIRAL_TOP_LOOK_AT),
                }),
            }
        }
        let vortex = spiral.vortex;
        let entered = ctx
            .events
            .iter()
            .any(|event| matches!(event, HostEvent::TriggerEntered { trigger } if *trigger == vortex));
        if entered {
            ctx.request_transition(StageId::Ritual, FadePlan::OutHoldIn);
        }
        Ok(())
    }
}

// Ritual

const ROCK_MODEL: &str = "models/rock.glb";
const ROCK_POSITION: Vec3 = Vec3::new(0.0, 1.0, 0.0);
const ROCK_SCALE: f32 = 15.0;
const PILE_MODEL: &str = "models/pileskulls.glb";
const PILE_POSITION: Vec3 = Vec3::new(-7.5, 0.7, 0.0);
const SIGN_MODEL: &str = "models/sign.glb";
const SIGN_POSITION: Vec3 = Vec3::new(-10.5, 0.7, 0.0);
const DOZEY_MODEL: &str = "models/dozey.glb";
const DOZEY_POSITION: Vec3 = Vec3::new(-6.9, 0.1, 0.6);
const DOZING_CLIP: &str = "Dozing_Elderly";
const TANTRUM_CLIP: &str = "Angry_To_Tantrum_Sit";
const STOMP_CLIP: &str = "Angry_Ground_Stomp";
const SCREAM_CLIP: &str = "Zombie_Scream";
const DARKNESS_RADIUS: f32 = 10.5;
const RITUAL_SKELETONS: usize = 20;
const RITUAL_CANDLES: usize = 40;
const RITUAL_CANDLE_RADIUS: f32 = 14.0;
const RITUAL_CANDLE_HEIGHT: f32 = 0.5;
const ANGEL_MODEL: &str = "models/angel.glb";
const ANGEL_WALK_CLIP: &str = "Sneaky_Walk_inplace";
const ANGEL_SCALE: f32 = 1.5;
const ANGEL_SPAWN_DISTANCE: f32 = DARKNESS_RADIUS + 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RitualCue {
    Scream,
    SpawnAngel,
    FadeOut,
}

fn awakening_cutscene() -> Cutscene<RitualCue> {
    Cutscene::new(vec![
        (0.0, RitualCue::Scream),
        (5.0, RitualCue::SpawnAngel),
        (15.0, RitualCue::FadeOut),
    ])
}

pub(crate) struct RitualStage {
    pub(crate) candles: CandleBank,
    pub(crate) pursuit: AngelPursuit,
    dozey: EntityId,
    angel: EntityId,
    awakening: Option<Cutscene<RitualCue>>,
    angel_screaming: bool,
}

impl RitualStage {
    #[cfg(test)]
    pub(crate) fn is_awake(&self) -> bool {
        self.awakening.is_some()
    }

    #[cfg(test)]
    pub(crate) fn angel(&self) -> EntityId {
        self.angel
    }
}

pub(crate) fn build_ritual(
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    let stage = StageId::Ritual;
    ctx.sounds.apply(
        world,
        &[(Sound::Heart, true), (Sound::Final, true), (Sound::Dungeon, false)],
    );

    spawn_model(
        scope,
        world,
        stage,
        "rock",
        ROCK_MODEL,
        Transform::at(ROCK_POSITION).with_scale(Vec3::splat(ROCK_SCALE)),
    )?;
    spawn_model(
        scope,
        world,
        stage,
        "skull_pile",
        PILE_MODEL,
        Transform::at(PILE_POSITION).with_scale(Vec3::splat(3.0)),
    )?;
    spawn_model(
        scope,
        world,
        stage,
        "sign",
        SIGN_MODEL,
        Transform::at(SIGN_POSITION)
            .with_scale(Vec3::splat(1.5))
            .with_rotation(Quat::from_yaw_degrees(10.0)),
    )?;
    let dozey = spawn_model(
        scope,
        world,
        stage,
        "dozey",
        DOZEY_MODEL,
        Transform::at(DOZEY_POSITION).with_scale(Vec3::splat(3.3)),
    )?;
    let mut animator = Animator::with_clips([
        (DOZING_CLIP, true),
        (TANTRUM_CLIP, true),
        (STOMP_CLIP, true),
        (SCREAM_CLIP, true),
    ]);
    animator.set_playing(DOZING_CLIP, true);
    world.entity_mut(dozey).map_err(build_error(stage))?.animator = Some(animator);

    let mut rng = scatter_rng(ctx, stage);
    for i in 0..RITUAL_SKELETONS {
        let angle = i as f32 / RITUAL_SKELETONS as f32 * TAU;
        let distance = DARKNESS_RADIUS + 5.0 + rng.range_f32(0.0, 10.0);
        let height = rng.range_f32(0.0, 2.0);
        let transform = Transform::at(Vec3::new(angle.cos() * distance, height, angle.sin() * distance))
            .with_scale(Vec3::splat(SKELETON_SCALE))
            .with_rotation(Quat::from_yaw_degrees(rng.range_f32(0.0, 360.0)));
        spawn_skeleton(scope, world, stage, transform, SWIM_FORWARD_CLIP)?;
    }

    let mut candles = CandleBank::new(None, None);
    for i in 0..RITUAL_CANDLES {
        let angle = i as f32 / RITUAL_CANDLES as f32 * TAU;
        let position = Vec3::new(
            angle.cos() * RITUAL_CANDLE_RADIUS,
            RITUAL_CANDLE_HEIGHT,
            angle.sin() * RITUAL_CANDLE_RADIUS,
        );
        let transform = Transform::at(position)
            .with_scale(Vec3::splat(0.5))
            .with_rotation(Quat::from_yaw_degrees(rng.range_f32(0.0, 360.0)));
        candles.add(spawn_candle(scope, world, stage, transform)?);
    }

    let angel = spawn_model(
        scope,
        world,
        stage,
        "angel",
        ANGEL_MODEL,
        Transform::at(POOL_PARK_POSITION).with_scale(Vec3::splat(ANGEL_SCALE)),
    )?;
    world.entity_mut(angel).map_err(build_error(stage))?.animator =
        Some(Animator::with_clips([(ANGEL_WALK_CLIP, true), (SCREAM_CLIP, true)]));

    world.player_mut().input_locked = false;
    world.screen_mut().camera = CameraMode::FollowPlayer;
    world.request(HostRequest::MovePlayer {
        position: Vec3::new(PILE_POSITION.x - 12.0, 3.0, PILE_POSITION.z + 4.0),
        look_at: Some(Vec3::new(7.0, 2.0, PILE_POSITION.z + 0.6)),
    });

    ctx.stage = ActiveStage::Ritual(RitualStage {
        candles,
        pursuit: AngelPursuit::new(
            ctx.config.pursuit.ritual_angel_speed,
            Some(ctx.config.pursuit.ritual_stop_radius),
        ),
        dozey,
        angel,
        awakening: None,
        angel_screaming: false,
    });
    scope.add_system(schedule, Box::new(RitualSystem));
    Ok(())
}

struct RitualSystem;

impl System<SessionContext> for RitualSystem {
    fn name(&self) -> &'static str {
        "ritual_update"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        let ActiveStage::Ritual(ritual) = &mut ctx.stage else {
            return Ok(());
        };

        let lit = light_clicked_candles(
            &mut ritual.candles,
            &ctx.events,
            world,
            &mut ctx.timers,
            ctx.config.pursuit.flame_idle_delay_ms,
        )?;
        if lit > 0 && ritual.candles.all_lit() && ritual.awakening.is_none() {
            info!(candles = ritual.candles.candles().len(), "ritual_complete");
            set_clip(world, ritual.dozey, DOZING_CLIP, false)?;
            set_clip(world, ritual.dozey, TANTRUM_CLIP, true)?;
            ctx.sounds
                .apply(world, &[(Sound::Angry, true), (Sound::Final, false)]);
            ritual.awakening = Some(awakening_cutscene());
        }

        let cues = ritual
            .awakening
            .as_mut()
            .map(|cutscene| cutscene.tick(fixed_dt_seconds))
            .unwrap_or_default();
        let mut fade_out = false;
        for cue in cues {
            match cue {
                RitualCue::Scream => {
                    set_clip(world, ritual.dozey, TANTRUM_CLIP, false)?;
                    set_clip(world, ritual.dozey, SCREAM_CLIP, true)?;
                }
                RitualCue::SpawnAngel => {
                    world.transform_mut(ritual.angel)?.position =
                        Vec3::new(ANGEL_SPAWN_DISTANCE, 0.0, 0.0);
                    set_clip(world, ritual.angel, ANGEL_WALK_CLIP, true)?;
                    ritual.pursuit.engage(&[ritual.angel]);
                }
                RitualCue::FadeOut => fade_out = true,
            }
        }

        let player = world.player().position;
        let chase = ritual.pursuit.chase(fixed_dt_seconds, player, world);
        if chase.arrived > 0 && !ritual.angel_screaming {
            ritual.angel_screaming = true;
            set_clip(world, ritual.angel, ANGEL_WALK_CLIP, false)?;
            set_clip(world, ritual.angel, SCREAM_CLIP, true)?;
            info!("angel_reached_player");
        }

        if fade_out {
            ctx.request_transition(StageId::Epilogue, FadePlan::OutOnly);
        }
        Ok(())
    }
}

// Epilogue

const TV_MODEL: &str = "models/tv2.glb";
const BUBBLE_MODEL: &str = "models/marble.glb";
const BUBBLE_POSITION: Vec3 = Vec3::new(0.0, 16.5, 4.0);
const BUBBLE_SCALE: f32 = 4.0;
const GIANT_SCALE: f32 = 30.0;
const GIANT_EMOTE: &str = "animations/giant_emote.glb";
const GIANT_EMOTE_PERIOD_SECONDS: f32 = 8.0;
const NAP_EMOTE: &str = "animations/nap_emote.glb";
const NAP_LOOP_EMOTE: &str = "animations/naploop_emote.glb";
const BED_POSITION: Vec3 = Vec3::new(0.0, 15.0, 4.0);
const EPILOGUE_CAMERA: Vec3 = Vec3::new(0.0, 16.5, -1.5);
const END_SCREEN_FADE_PER_SECOND: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EpilogueCue {
    MoveToBed,
    Nap,
    FadeIn,
    NapLoop,
    Giant,
    Release,
    EndScreen,
}

fn epilogue_cutscene() -> Cutscene<EpilogueCue> {
    Cutscene::new(vec![
        (1.0, EpilogueCue::MoveToBed),
        (2.5, EpilogueCue::Nap),
        (2.5, EpilogueCue::FadeIn),
        (10.0, EpilogueCue::NapLoop),
        (20.0, EpilogueCue::Giant),
        (2.5, EpilogueCue::Release),
        (25.0, EpilogueCue::EndScreen),
    ])
}

pub(crate) struct EpilogueStage {
    timeline: Cutscene<EpilogueCue>,
    enclosure: Vec<EntityId>,
    giant: EntityId,
    bubble: EntityId,
    giant_shown: bool,
    emote_elapsed: f32,
    emote_triggers: u32,
    end_screen: bool,
}

impl EpilogueStage {
    #[cfg(test)]
    pub(crate) fn giant(&self) -> EntityId {
        self.giant
    }

    #[cfg(test)]
    pub(crate) fn emote_triggers(&self) -> u32 {
        self.emote_triggers
    }
}

pub(crate) fn build_epilogue(
    ctx: &mut SessionContext,
    schedule: &mut Schedule<SessionContext>,
    world: &mut SceneWorld,
    scope: &mut StageScope,
) -> Result<(), StageError> {
    let stage = StageId::Epilogue;
    world.player_mut().input_locked = true;
    world.screen_mut().camera = CameraMode::Cinematic {
        position: EPILOGUE_CAMERA,
        look_at: BED_POSITION,
    };

    spawn_model(
        scope,
        world,
        stage,
        "tv",
        TV_MODEL,
        Transform::at(Vec3::new(0.0, 14.95, 5.5)).with_rotation(Quat::from_yaw_degrees(180.0)),
    )?;
    let panels = [
        (Vec3::new(0.0, 16.0, 6.0), Vec3::new(8.0, 8.0, 0.1)),
        (Vec3::new(2.0, 16.0, 4.0), Vec3::new(0.1, 8.0, 8.0)),
        (Vec3::new(-2.0, 16.0, 4.0), Vec3::new(0.1, 8.0, 8.0)),
        (Vec3::new(0.0, 14.0, 4.0), Vec3::new(8.0, 0.1, 8.0)),
        (Vec3::new(0.0, 20.0, 4.0), Vec3::new(8.0, 0.1, 8.0)),
    ];
    let mut enclosure = Vec::with_capacity(panels.len());
    for (position, scale) in panels {
        enclosure.push(spawn_box(
            scope,
            world,
            stage,
            "enclosure",
            Transform::at(position).with_scale(scale),
        )?);
    }

    let bubble = scope.spawn(
        world,
        "bubble",
        Transform::at(POOL_PARK_POSITION).with_scale(Vec3::splat(BUBBLE_SCALE)),
    );
    let giant = scope.spawn(
        world,
        "giant",
        Transform::at(POOL_PARK_POSITION)
            .with_scale(Vec3::splat(GIANT_SCALE))
            .with_rotation(Quat::from_yaw_degrees(180.0)),
    );
    world.entity_mut(giant).map_err(build_error(stage))?.animator =
        Some(Animator::with_clips([(GIANT_EMOTE, false)]));

    ctx.stage = ActiveStage::Epilogue(EpilogueStage {
        timeline: epilogue_cutscene(),
        enclosure,
        giant,
        bubble,
        giant_shown: false,
        emote_elapsed: 0.0,
        emote_triggers: 0,
        end_screen: false,
    });
    scope.add_system(schedule, Box::new(EpilogueSystem));
    Ok(())
}

struct EpilogueSystem;

impl System<SessionContext> for EpilogueSystem {
    fn name(&self) -> &'static str {
        "epilogue_update"
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError> {
        let ActiveStage::Epilogue(epilogue) = &mut ctx.stage else {
            return Ok(());
        };

        for cue in epilogue.timeline.tick(fixed_dt_seconds) {
            debug!(cue = ?cue, "epilogue_cue");
            match cue {
                EpilogueCue::MoveToBed => world.request(HostRequest::MovePlayer {
                    position: BED_POSITION,
                    look_at: Some(BED_POSITION + Vec3::new(0.0, 1.0, 0.0)),
                }),
                EpilogueCue::Nap => world.request(HostRequest::PlayEmote {
                    src: NAP_EMOTE.to_string(),
                }),
                EpilogueCue::FadeIn => ctx.fade.begin_fade_in(),
                EpilogueCue::NapLoop => world.request(HostRequest::PlayEmote {
                    src: NAP_LOOP_EMOTE.to_string(),
                }),
                EpilogueCue::Giant => {
                    let avatar = ctx
                        .user_data
                        .as_ref()
                        .and_then(|user| user.avatar.clone())
                        .unwrap_or_default();
                    show_giant(epilogue, world, avatar)?;
                }
                EpilogueCue::Release => {
                    for id in epilogue.enclosure.drain(..) {
                        if let Err(err) = world.despawn(id) {
                            debug!(error = %err, "enclosure_already_removed");
                        }
                    }
                    world.player_mut().input_locked = false;
                    world.screen_mut().camera = CameraMode::FollowPlayer;
                    info!("player_released");
                }
                EpilogueCue::EndScreen => {
                    epilogue.end_screen = true;
                    info!("end_screen_shown");
                }
            }
        }

        if epilogue.giant_shown {
            epilogue.emote_elapsed += fixed_dt_seconds;
            if epilogue.emote_elapsed >= GIANT_EMOTE_PERIOD_SECONDS {
                epilogue.emote_elapsed -= GIANT_EMOTE_PERIOD_SECONDS;
                trigger_giant_emote(epilogue, world)?;
            }
        }

        if epilogue.end_screen && !ctx.flags.finished {
            let screen = world.screen_mut();
            screen.end_screen_opacity =
                (screen.end_screen_opacity + END_SCREEN_FADE_PER_SECOND * fixed_dt_seconds).min(1.0);
            if screen.end_screen_opacity >= 1.0 {
                ctx.flags.finished = true;
                info!("session_finished");
            }
        }
        Ok(())
    }
}

fn show_giant(epilogue: &mut EpilogueStage, world: &mut SceneWorld, avatar: AvatarData) -> Result<(), HostError> {
    info!(
        wearables = avatar.wearables.len(),
        body_shape = avatar.body_shape.as_deref().unwrap_or("default"),
        "giant_spawned"
    );
    let giant = world.entity_mut(epilogue.giant)?;
    giant.visual = Some(Visual::Avatar(avatar));
    giant.transform.position = Vec3::ZERO;

    let bubble = world.entity_mut(epilogue.bubble)?;
    bubble.visual = Some(Visual::model(BUBBLE_MODEL));
    bubble.transform.position = BUBBLE_POSITION;

    epilogue.giant_shown = true;
    epilogue.emote_elapsed = 0.0;
    trigger_giant_emote(epilogue, world)
}

fn trigger_giant_emote(epilogue: &mut EpilogueStage, world: &mut SceneWorld) -> Result<(), HostError> {
    set_clip(world, epilogue.giant, GIANT_EMOTE, true)?;
    epilogue.emote_triggers += 1;
    debug!(count = epilogue.emote_triggers, "giant_emote_triggered");
    Ok(())
}
