use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::input::{InputAction, InputSnapshot};
use super::math::{Quat, Vec3};
use super::schedule::SystemId;

pub const DEFAULT_PLAYER_MOVE_SPEED: f32 = 4.0;
pub const DEFAULT_USER_DATA_DELAY_TICKS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),
    #[error("system {0:?} not found")]
    SystemNotFound(SystemId),
    #[error("entity {entity:?} has no {component} component")]
    MissingComponent {
        entity: EntityId,
        component: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveShape {
    Box,
    Plane,
    Sphere,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visual {
    Primitive(PrimitiveShape),
    Model(String),
    /// Host-rendered avatar built from a player's profile.
    Avatar(AvatarData),
}

impl Visual {
    pub fn model(src: impl Into<String>) -> Self {
        Self::Model(src.into())
    }

    pub fn model_src(&self) -> Option<&str> {
        match self {
            Visual::Model(src) => Some(src.as_str()),
            Visual::Primitive(_) | Visual::Avatar(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationClip {
    pub name: String,
    pub playing: bool,
    pub looping: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Animator {
    clips: Vec<AnimationClip>,
}

impl Animator {
    /// Builds an animator from `(clip, looping)` pairs, all initially stopped.
    pub fn with_clips<'a>(clips: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        Self {
            clips: clips
                .into_iter()
                .map(|(name, looping)| AnimationClip {
                    name: name.to_string(),
                    playing: false,
                    looping,
                })
                .collect(),
        }
    }

    pub fn clip(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.iter().find(|clip| clip.name == name)
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.clip(name).is_some_and(|clip| clip.playing)
    }

    /// Returns false when the clip does not exist on this animator.
    pub fn set_playing(&mut self, name: &str, playing: bool) -> bool {
        match self.clips.iter_mut().find(|clip| clip.name == name) {
            Some(clip) => {
                clip.playing = playing;
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for clip in &mut self.clips {
            clip.playing = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub clip: String,
    pub playing: bool,
    pub looping: bool,
    pub volume: f32,
}

impl AudioSource {
    pub fn new(clip: impl Into<String>, looping: bool, volume: f32) -> Self {
        Self {
            clip: clip.into(),
            playing: false,
            looping,
            volume,
        }
    }
}

/// Axis-aligned box centred on the owning entity's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerVolume {
    pub half_extents: Vec3,
    pub enabled: bool,
    player_inside: bool,
}

impl TriggerVolume {
    pub fn new(half_extents: Vec3) -> Self {
        Self {
            half_extents,
            enabled: true,
            player_inside: false,
        }
    }

    pub fn contains(&self, center: Vec3, point: Vec3) -> bool {
        (point.x - center.x).abs() <= self.half_extents.x
            && (point.y - center.y).abs() <= self.half_extents.y
            && (point.z - center.z).abs() <= self.half_extents.z
    }

    pub fn player_inside(&self) -> bool {
        self.player_inside
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interactable {
    pub hover_text: String,
    pub max_distance: f32,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub debug_name: &'static str,
    pub transform: Transform,
    pub visual: Option<Visual>,
    pub animator: Option<Animator>,
    pub audio: Option<AudioSource>,
    pub trigger: Option<TriggerVolume>,
    pub interactable: Option<Interactable>,
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub rotation: Quat,
    pub input_locked: bool,
    pub move_speed: f32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            input_locked: false,
            move_speed: DEFAULT_PLAYER_MOVE_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum CameraMode {
    #[default]
    FollowPlayer,
    Cinematic {
        position: Vec3,
        look_at: Vec3,
    },
}

/// Host-drawn screen state: fade overlay, end screen and camera.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenState {
    pub fade_opacity: f32,
    pub end_screen_opacity: f32,
    pub camera: CameraMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvatarData {
    pub body_shape: Option<String>,
    pub wearables: Vec<String>,
    pub eye_color: String,
    pub skin_color: String,
    pub hair_color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    pub user_id: String,
    pub display_name: String,
    pub avatar: Option<AvatarData>,
}

/// Fire-and-forget requests the scene hands to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    MovePlayer {
        position: Vec3,
        look_at: Option<Vec3>,
    },
    PlayEmote {
        src: String,
    },
    FetchUserData,
}

/// Host notifications delivered to the scene at the start of a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    TriggerEntered { trigger: EntityId },
    PointerDown { entity: EntityId },
    UserDataReady(UserData),
}

#[derive(Debug, Default)]
pub struct SceneWorld {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    player: PlayerState,
    screen: ScreenState,
    requests: Vec<HostRequest>,
    events: Vec<HostEvent>,
    pending_user_data: Vec<u32>,
    user_profile: UserData,
    user_data_delay_ticks: u32,
    emote_log: Vec<String>,
}

impl SceneWorld {
    pub fn spawn(&mut self, debug_name: &'static str, transform: Transform) -> EntityId {
        let id = self.allocator.allocate();
        self.entities.push(Entity {
            id,
            debug_name,
            transform,
            visual: None,
            animator: None,
            audio: None,
            trigger: None,
            interactable: None,
        });
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Result<(), HostError> {
        let index = self
            .entities
            .iter()
            .position(|entity| entity.id == id)
            .ok_or(HostError::EntityNotFound(id))?;
        self.entities.remove(index);
        Ok(())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.iter().any(|entity| entity.id == id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, HostError> {
        self.find_entity_mut(id).ok_or(HostError::EntityNotFound(id))
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Result<&mut Transform, HostError> {
        Ok(&mut self.entity_mut(id)?.transform)
    }

    pub fn set_visual(&mut self, id: EntityId, visual: Visual) -> Result<(), HostError> {
        self.entity_mut(id)?.visual = Some(visual);
        Ok(())
    }

    pub fn animator_mut(&mut self, id: EntityId) -> Result<&mut Animator, HostError> {
        self.entity_mut(id)?
            .animator
            .as_mut()
            .ok_or(HostError::MissingComponent {
                entity: id,
                component: "animator",
            })
    }

    pub fn audio_mut(&mut self, id: EntityId) -> Result<&mut AudioSource, HostError> {
        self.entity_mut(id)?
            .audio
            .as_mut()
            .ok_or(HostError::MissingComponent {
                entity: id,
                component: "audio_source",
            })
    }

    pub fn trigger_mut(&mut self, id: EntityId) -> Result<&mut TriggerVolume, HostError> {
        self.entity_mut(id)?
            .trigger
            .as_mut()
            .ok_or(HostError::MissingComponent {
                entity: id,
                component: "trigger_volume",
            })
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    pub fn screen(&self) -> &ScreenState {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut ScreenState {
        &mut self.screen
    }

    pub fn request(&mut self, request: HostRequest) {
        self.requests.push(request);
    }

    pub fn pending_requests(&self) -> &[HostRequest] {
        &self.requests
    }

    pub fn set_user_profile(&mut self, profile: UserData, delay_ticks: u32) {
        self.user_profile = profile;
        self.user_data_delay_ticks = delay_ticks;
    }

    pub fn emote_log(&self) -> &[String] {
        &self.emote_log
    }

    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    /// Host-side work that precedes the scene update: avatar movement,
    /// pointer resolution, trigger enter detection and async resolutions.
    pub fn begin_tick(&mut self, input: &InputSnapshot, fixed_dt_seconds: f32) {
        self.move_player_from_input(input, fixed_dt_seconds);
        if input.interact_pressed() && !self.player.input_locked {
            if let Some(entity) = self.nearest_interactable() {
                self.events.push(HostEvent::PointerDown { entity });
            }
        }
        self.detect_trigger_entries();
        self.advance_user_data_fetches();
    }

    /// Applies requests queued by the scene during the tick.
    pub fn apply_host_requests(&mut self) {
        for request in std::mem::take(&mut self.requests) {
            match request {
                HostRequest::MovePlayer { position, look_at } => {
                    self.player.position = position;
                    if let Some(rotation) =
                        look_at.and_then(|target| Quat::look_along_ground(target - position))
                    {
                        self.player.rotation = rotation;
                    }
                    debug!(x = position.x, y = position.y, z = position.z, "player_moved");
                }
                HostRequest::PlayEmote { src } => {
                    info!(src = %src, "emote_played");
                    self.emote_log.push(src);
                }
                HostRequest::FetchUserData => {
                    self.pending_user_data.push(self.user_data_delay_ticks);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.requests.clear();
        self.events.clear();
        self.pending_user_data.clear();
        self.emote_log.clear();
        self.player = PlayerState::default();
        self.screen = ScreenState::default();
    }

    fn move_player_from_input(&mut self, input: &InputSnapshot, fixed_dt_seconds: f32) {
        if self.player.input_locked {
            return;
        }
        let mut dx = 0.0f32;
        let mut dz = 0.0f32;
        if input.is_down(InputAction::MoveForward) {
            dz += 1.0;
        }
        if input.is_down(InputAction::MoveBack) {
            dz -= 1.0;
        }
        if input.is_down(InputAction::MoveRight) {
            dx += 1.0;
        }
        if input.is_down(InputAction::MoveLeft) {
            dx -= 1.0;
        }
        let length_sq = dx * dx + dz * dz;
        if length_sq <= f32::EPSILON {
            return;
        }
        let scale = self.player.move_speed * fixed_dt_seconds / length_sq.sqrt();
        let direction = Vec3::new(dx, 0.0, dz);
        self.player.position = self.player.position + direction * scale;
        if let Some(rotation) = Quat::look_along_ground(direction) {
            self.player.rotation = rotation;
        }
    }

    fn nearest_interactable(&self) -> Option<EntityId> {
        let player = self.player.position;
        let mut best: Option<(f32, EntityId)> = None;
        for entity in &self.entities {
            let Some(interactable) = &entity.interactable else {
                continue;
            };
            let offset = entity.transform.position - player;
            let distance_sq = offset.x * offset.x + offset.y * offset.y + offset.z * offset.z;
            if distance_sq > interactable.max_distance * interactable.max_distance {
                continue;
            }
            match best {
                Some((best_sq, _)) if best_sq <= distance_sq => {}
                _ => best = Some((distance_sq, entity.id)),
            }
        }
        best.map(|(_, id)| id)
    }

    fn detect_trigger_entries(&mut self) {
        let player = self.player.position;
        for entity in &mut self.entities {
            let center = entity.transform.position;
            let Some(trigger) = entity.trigger.as_mut() else {
                continue;
            };
            let inside = trigger.enabled && trigger.contains(center, player);
            if inside && !trigger.player_inside {
                self.events.push(HostEvent::TriggerEntered { trigger: entity.id });
            }
            trigger.player_inside = inside;
        }
    }

    fn advance_user_data_fetches(&mut self) {
        let mut resolved = 0usize;
        self.pending_user_data.retain_mut(|remaining| {
            if *remaining == 0 {
                resolved += 1;
                false
            } else {
                *remaining -= 1;
                true
            }
        });
        for _ in 0..resolved {
            self.events
                .push(HostEvent::UserDataReady(self.user_profile.clone()));
        }
    }
}
