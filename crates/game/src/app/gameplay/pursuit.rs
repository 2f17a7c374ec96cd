use engine::{Animator, EntityId, HostError, Quat, SceneWorld, Vec3, Visual};
use tracing::{debug, info};

use super::pool::{MOVING_MODEL, WEEPING_MODEL};

pub(crate) const FLAME_CLIP: &str = "Flame";
pub(crate) const FLAME_IDLE_CLIP: &str = "FlameIdle";
pub(crate) const EXTINGUISH_CLIP: &str = "Extinguish";
const MIN_CHASE_DISTANCE_SQ: f32 = 0.0001;

pub(crate) fn candle_animator() -> Animator {
    Animator::with_clips([
        (FLAME_CLIP, false),
        (FLAME_IDLE_CLIP, true),
        (EXTINGUISH_CLIP, false),
    ])
}

/// Flame start. The caller schedules [`show_flame_idle`] after the idle delay.
pub(crate) fn show_lit(world: &mut SceneWorld, candle: EntityId) -> Result<(), HostError> {
    let animator = world.animator_mut(candle)?;
    animator.set_playing(EXTINGUISH_CLIP, false);
    animator.set_playing(FLAME_CLIP, true);
    Ok(())
}

pub(crate) fn show_flame_idle(world: &mut SceneWorld, candle: EntityId) -> Result<(), HostError> {
    let animator = world.animator_mut(candle)?;
    animator.set_playing(FLAME_CLIP, false);
    animator.set_playing(FLAME_IDLE_CLIP, true);
    Ok(())
}

pub(crate) fn show_extinguished(world: &mut SceneWorld, candle: EntityId) -> Result<(), HostError> {
    let animator = world.animator_mut(candle)?;
    animator.set_playing(FLAME_CLIP, false);
    animator.set_playing(FLAME_IDLE_CLIP, false);
    animator.set_playing(EXTINGUISH_CLIP, true);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candle {
    pub(crate) entity: EntityId,
    pub(crate) timer: f32,
    pub(crate) active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LightOutcome {
    Lit,
    AlreadyLit,
    CapReached,
    UnknownCandle,
}

/// Lit/unlit state for a set of candles. `max_active` of `None` means no
/// cap; `duration` of `None` means lit candles never burn out.
#[derive(Debug, Clone)]
pub(crate) struct CandleBank {
    candles: Vec<Candle>,
    max_active: Option<usize>,
    duration: Option<f32>,
}

impl CandleBank {
    pub(crate) fn new(max_active: Option<usize>, duration_seconds: Option<f32>) -> Self {
        Self {
            candles: Vec::new(),
            max_active,
            duration: duration_seconds,
        }
    }

    pub(crate) fn add(&mut self, entity: EntityId) {
        self.candles.push(Candle {
            entity,
            timer: 0.0,
            active: false,
        });
    }

    pub(crate) fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub(crate) fn contains(&self, entity: EntityId) -> bool {
        self.candles.iter().any(|candle| candle.entity == entity)
    }

    pub(crate) fn is_lit(&self, entity: EntityId) -> bool {
        self.candles
            .iter()
            .any(|candle| candle.entity == entity && candle.active)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.candles.iter().filter(|candle| candle.active).count()
    }

    /// Derived every time it is read: true exactly when nothing is lit.
    pub(crate) fn angels_active(&self) -> bool {
        self.active_count() == 0
    }

    pub(crate) fn all_lit(&self) -> bool {
        !self.candles.is_empty() && self.candles.iter().all(|candle| candle.active)
    }

    pub(crate) fn try_light(&mut self, entity: EntityId) -> LightOutcome {
        let active_count = self.active_count();
        let max_active = self.max_active;
        let duration = self.duration.unwrap_or(0.0);
        let Some(candle) = self.candles.iter_mut().find(|candle| candle.entity == entity) else {
            return LightOutcome::UnknownCandle;
        };
        if candle.active {
            return LightOutcome::AlreadyLit;
        }
        if max_active.is_some_and(|cap| active_count >= cap) {
            debug!(candle = entity.0, active_count, "candle_cap_reached");
            return LightOutcome::CapReached;
        }
        candle.active = true;
        candle.timer = duration;
        info!(candle = entity.0, "candle_lit");
        LightOutcome::Lit
    }

    /// Lights a candle regardless of the cap. Used for the candle the
    /// graveyard starts with.
    pub(crate) fn force_light(&mut self, entity: EntityId) -> bool {
        let duration = self.duration.unwrap_or(0.0);
        match self.candles.iter_mut().find(|candle| candle.entity == entity) {
            Some(candle) => {
                candle.active = true;
                candle.timer = duration;
                true
            }
            None => false,
        }
    }

    pub(crate) fn extinguish(&mut self, entity: EntityId) -> bool {
        match self
            .candles
            .iter_mut()
            .find(|candle| candle.entity == entity && candle.active)
        {
            Some(candle) => {
                candle.active = false;
                candle.timer = 0.0;
                true
            }
            None => false,
        }
    }

    /// Counts lit candles down and returns the ones that burned out this tick.
    pub(crate) fn tick(&mut self, dt_seconds: f32) -> Vec<EntityId> {
        if self.duration.is_none() {
            return Vec::new();
        }
        let mut expired = Vec::new();
        for candle in self.candles.iter_mut().filter(|candle| candle.active) {
            candle.timer -= dt_seconds;
            if candle.timer <= 0.0 {
                expired.push(candle.entity);
            }
        }
        for &entity in &expired {
            self.extinguish(entity);
            info!(candle = entity.0, "candle_burned_out");
        }
        expired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PursuitEdge {
    Unchanged,
    Activated(usize),
    Deactivated(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChaseReport {
    pub(crate) moved: usize,
    pub(crate) arrived: usize,
}

/// Edge-triggered angel activation plus straight-line ground-plane pursuit.
#[derive(Debug, Clone)]
pub(crate) struct AngelPursuit {
    active: Vec<EntityId>,
    engaged: bool,
    speed: f32,
    stop_radius: Option<f32>,
}

impl AngelPursuit {
    pub(crate) fn new(speed: f32, stop_radius: Option<f32>) -> Self {
        Self {
            active: Vec::new(),
            engaged: false,
            speed,
            stop_radius,
        }
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> &[EntityId] {
        &self.active
    }

    pub(crate) fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Swaps models only when `angels_active` differs from the last observed
    /// value. Candidates already in the active list are never added twice.
    pub(crate) fn observe(
        &mut self,
        angels_active: bool,
        candidates: &[EntityId],
        world: &mut SceneWorld,
    ) -> PursuitEdge {
        if angels_active == self.engaged {
            return PursuitEdge::Unchanged;
        }
        self.engaged = angels_active;

        if angels_active {
            let mut added = 0;
            for &entity in candidates {
                if self.active.contains(&entity) {
                    continue;
                }
                if let Err(err) = world.set_visual(entity, Visual::model(MOVING_MODEL)) {
                    debug!(entity = entity.0, error = %err, "angel_swap_skipped");
                    continue;
                }
                self.active.push(entity);
                added += 1;
            }
            info!(angels = added, "angels_awake");
            PursuitEdge::Activated(added)
        } else {
            let count = self.settle_all(world);
            info!(angels = count, "angels_weeping");
            PursuitEdge::Deactivated(count)
        }
    }

    /// Starts chasing with `entities` as they are, without a model swap.
    pub(crate) fn engage(&mut self, entities: &[EntityId]) -> usize {
        self.engaged = true;
        let mut added = 0;
        for &entity in entities {
            if !self.active.contains(&entity) {
                self.active.push(entity);
                added += 1;
            }
        }
        info!(angels = added, "angels_engaged");
        added
    }

    /// Moves each active angel toward `target` by `speed * dt` on the ground
    /// plane and snaps it to face the target. Does nothing while disengaged.
    pub(crate) fn chase(&mut self, dt_seconds: f32, target: Vec3, world: &mut SceneWorld) -> ChaseReport {
        let mut report = ChaseReport::default();
        if !self.engaged {
            return report;
        }
        let step = self.speed * dt_seconds;
        for &entity in &self.active {
            let Ok(transform) = world.transform_mut(entity) else {
                continue;
            };
            let mut delta = target - transform.position;
            delta.y = 0.0;
            let distance_sq = delta.x * delta.x + delta.z * delta.z;

            if let Some(radius) = self.stop_radius {
                if distance_sq <= radius * radius + MIN_CHASE_DISTANCE_SQ {
                    report.arrived += 1;
                    continue;
                }
            }
            if distance_sq <= MIN_CHASE_DISTANCE_SQ {
                continue;
            }

            let distance = distance_sq.sqrt();
            let advance = match self.stop_radius {
                Some(radius) => step.min(distance - radius),
                None => step,
            };
            transform.position = transform.position + delta * (advance / distance);
            if let Some(rotation) = Quat::look_along_ground(delta) {
                transform.rotation = rotation;
            }
            report.moved += 1;
        }
        report
    }

    /// Immediate return to weeping for every active angel, used when the
    /// player is caught. The engaged flag is kept so the next observe of the
    /// same value does not wake them again.
    pub(crate) fn force_reset(&mut self, world: &mut SceneWorld) -> usize {
        let count = self.settle_all(world);
        info!(angels = count, "angels_forced_to_weep");
        count
    }

    fn settle_all(&mut self, world: &mut SceneWorld) -> usize {
        let mut count = 0;
        for entity in self.active.drain(..) {
            match world.set_visual(entity, Visual::model(WEEPING_MODEL)) {
                Ok(()) => count += 1,
                Err(err) => debug!(entity = entity.0, error = %err, "angel_swap_skipped"),
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Transform;

    fn spawn_pillars(world: &mut SceneWorld, positions: &[Vec3]) -> Vec<EntityId> {
        positions
            .iter()
            .map(|position| {
                let id = world.spawn("pillar", Transform::at(*position));
                world
                    .set_visual(id, Visual::model(WEEPING_MODEL))
                    .expect("visual");
                id
            })
            .collect()
    }

    fn model_of(world: &SceneWorld, id: EntityId) -> Option<String> {
        world
            .find_entity(id)
            .and_then(|entity| entity.visual.as_ref())
            .and_then(|visual| visual.model_src())
            .map(str::to_string)
    }

    #[test]
    fn cap_blocks_excess_lighting() {
        let mut bank = CandleBank::new(Some(1), Some(60.0));
        bank.add(EntityId(1));
        bank.add(EntityId(2));

        assert_eq!(bank.try_light(EntityId(1)), LightOutcome::Lit);
        assert_eq!(bank.try_light(EntityId(2)), LightOutcome::CapReached);
        assert_eq!(bank.try_light(EntityId(1)), LightOutcome::AlreadyLit);
        assert_eq!(bank.try_light(EntityId(9)), LightOutcome::UnknownCandle);
        assert_eq!(bank.active_count(), 1);
    }

    #[test]
    fn lighting_first_candle_clears_angels_flag() {
        let mut bank = CandleBank::new(Some(1), Some(60.0));
        bank.add(EntityId(1));
        assert!(bank.angels_active());

        bank.try_light(EntityId(1));
        assert!(!bank.angels_active());
    }

    #[test]
    fn lit_candle_burns_out_after_duration() {
        let mut bank = CandleBank::new(Some(1), Some(60.0));
        bank.add(EntityId(1));
        bank.try_light(EntityId(1));

        assert!(bank.tick(59.9).is_empty());
        assert_eq!(bank.tick(0.2), vec![EntityId(1)]);
        assert!(bank.angels_active());
        assert_eq!(bank.try_light(EntityId(1)), LightOutcome::Lit);
    }

    #[test]
    fn uncapped_bank_without_duration_stays_lit() {
        let mut bank = CandleBank::new(None, None);
        for id in 0..4 {
            bank.add(EntityId(id));
        }
        for id in 0..4 {
            assert_eq!(bank.try_light(EntityId(id)), LightOutcome::Lit);
        }
        assert!(bank.tick(1_000.0).is_empty());
        assert!(bank.all_lit());
    }

    #[test]
    fn force_light_ignores_cap() {
        let mut bank = CandleBank::new(Some(1), Some(60.0));
        bank.add(EntityId(1));
        bank.add(EntityId(2));
        bank.try_light(EntityId(1));
        assert!(bank.force_light(EntityId(2)));
        assert_eq!(bank.active_count(), 2);
        assert!(bank.extinguish(EntityId(2)));
        assert!(!bank.extinguish(EntityId(2)));
    }

    #[test]
    fn candle_clips_follow_light_and_extinguish() {
        let mut world = SceneWorld::default();
        let candle = world.spawn("candle", Transform::at(Vec3::ZERO));
        world.entity_mut(candle).expect("candle").animator = Some(candle_animator());

        show_lit(&mut world, candle).expect("lit");
        let animator = world.animator_mut(candle).expect("animator");
        assert!(animator.is_playing(FLAME_CLIP));
        assert!(!animator.is_playing(EXTINGUISH_CLIP));

        show_flame_idle(&mut world, candle).expect("idle");
        let animator = world.animator_mut(candle).expect("animator");
        assert!(animator.is_playing(FLAME_IDLE_CLIP));
        assert!(!animator.is_playing(FLAME_CLIP));

        show_extinguished(&mut world, candle).expect("out");
        let animator = world.animator_mut(candle).expect("animator");
        assert!(animator.is_playing(EXTINGUISH_CLIP));
        assert!(!animator.is_playing(FLAME_IDLE_CLIP));
    }

    #[test]
    fn activation_is_edge_triggered_without_duplicates() {
        let mut world = SceneWorld::default();
        let pillars = spawn_pillars(&mut world, &[Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0)]);
        let mut pursuit = AngelPursuit::new(2.0, None);

        assert_eq!(pursuit.observe(true, &pillars, &mut world), PursuitEdge::Activated(2));
        assert_eq!(pursuit.observe(true, &pillars, &mut world), PursuitEdge::Unchanged);
        assert_eq!(pursuit.active(), pillars.as_slice());
        assert_eq!(model_of(&world, pillars[0]).as_deref(), Some(MOVING_MODEL));

        assert_eq!(pursuit.observe(false, &pillars, &mut world), PursuitEdge::Deactivated(2));
        assert!(pursuit.active().is_empty());
        assert_eq!(model_of(&world, pillars[1]).as_deref(), Some(WEEPING_MODEL));

        pursuit.observe(true, &pillars, &mut world);
        assert_eq!(pursuit.active().len(), 2);
    }

    #[test]
    fn chase_moves_on_ground_plane_and_faces_target() {
        let mut world = SceneWorld::default();
        let pillars = spawn_pillars(&mut world, &[Vec3::new(10.0, 1.8, 0.0)]);
        let mut pursuit = AngelPursuit::new(2.0, None);
        pursuit.observe(true, &pillars, &mut world);

        let report = pursuit.chase(0.5, Vec3::new(0.0, 0.0, 0.0), &mut world);

        assert_eq!(report.moved, 1);
        let transform = world.find_entity(pillars[0]).expect("angel").transform;
        assert!((transform.position.x - 9.0).abs() < 1e-5);
        assert_eq!(transform.position.y, 1.8);
        assert_eq!(
            Some(transform.rotation),
            Quat::look_along_ground(Vec3::new(-1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn disengaged_angels_stay_put() {
        let mut world = SceneWorld::default();
        let pillars = spawn_pillars(&mut world, &[Vec3::new(10.0, 0.0, 0.0)]);
        let mut pursuit = AngelPursuit::new(2.0, None);

        assert_eq!(pursuit.chase(1.0, Vec3::ZERO, &mut world), ChaseReport::default());
        assert_eq!(
            world.find_entity(pillars[0]).expect("angel").transform.position,
            Vec3::new(10.0, 0.0, 0.0)
        );
    }

    #[test]
    fn angel_on_top_of_target_does_not_move() {
        let mut world = SceneWorld::default();
        let pillars = spawn_pillars(&mut world, &[Vec3::new(1.0, 0.0, 1.0)]);
        let mut pursuit = AngelPursuit::new(2.0, None);
        pursuit.observe(true, &pillars, &mut world);

        let report = pursuit.chase(1.0, Vec3::new(1.0, 5.0, 1.0), &mut world);
        assert_eq!(report.moved, 0);
        assert!(world.find_entity(pillars[0]).expect("angel").transform.position.is_finite());
    }

    #[test]
    fn stop_radius_halts_at_the_edge() {
        let mut world = SceneWorld::default();
        let angels = spawn_pillars(&mut world, &[Vec3::new(3.0, 0.0, 0.0)]);
        let mut pursuit = AngelPursuit::new(1.5, Some(2.0));
        pursuit.observe(true, &angels, &mut world);

        assert_eq!(pursuit.chase(1.0, Vec3::ZERO, &mut world).moved, 1);
        let x = world.find_entity(angels[0]).expect("angel").transform.position.x;
        assert!((x - 2.0).abs() < 1e-5);

        let report = pursuit.chase(1.0, Vec3::ZERO, &mut world);
        assert_eq!(report, ChaseReport { moved: 0, arrived: 1 });
    }

    #[test]
    fn force_reset_returns_every_angel_to_weeping() {
        let mut world = SceneWorld::default();
        let pillars = spawn_pillars(&mut world, &[Vec3::ZERO, Vec3::ONE]);
        let mut pursuit = AngelPursuit::new(2.0, None);
        pursuit.observe(true, &pillars, &mut world);

        assert_eq!(pursuit.force_reset(&mut world), 2);
        assert!(pursuit.active().is_empty());
        assert_eq!(model_of(&world, pillars[0]).as_deref(), Some(WEEPING_MODEL));
        assert_eq!(pursuit.observe(true, &pillars, &mut world), PursuitEdge::Unchanged);
    }

    #[test]
    fn engage_keeps_the_model_and_skips_duplicates() {
        let mut world = SceneWorld::default();
        let angel = world.spawn("angel", Transform::at(Vec3::new(5.0, 0.0, 0.0)));
        world
            .set_visual(angel, Visual::model("models/angel.glb"))
            .expect("visual");
        let mut pursuit = AngelPursuit::new(1.5, Some(2.0));

        assert_eq!(pursuit.engage(&[angel, angel]), 1);
        assert!(pursuit.is_engaged());
        assert_eq!(model_of(&world, angel).as_deref(), Some("models/angel.glb"));
        assert_eq!(pursuit.chase(1.0, Vec3::ZERO, &mut world).moved, 1);
    }
}
