mod input;
mod loop_runner;
mod math;
mod metrics;
mod scene;
mod schedule;
mod script;
mod timers;
mod world;

pub use input::{InputAction, InputSnapshot};
pub use loop_runner::{
    run_headless, run_headless_with_metrics, LoopConfig, RunSummary, StopReason,
};
pub use math::{Quat, Vec3};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use scene::{Scene, SceneCommand};
pub use schedule::{Schedule, System, SystemError, SystemFailure, SystemId};
pub use script::{IdleInput, InputSource, ScriptError, ScriptStep, ScriptedInput};
pub use timers::TimerQueue;
pub use world::{
    AnimationClip, Animator, AudioSource, AvatarData, CameraMode, Entity, EntityId, HostError,
    HostEvent, HostRequest, Interactable, PlayerState, PrimitiveShape, SceneWorld, ScreenState,
    Transform, TriggerVolume, UserData, Visual, DEFAULT_PLAYER_MOVE_SPEED,
    DEFAULT_USER_DATA_DELAY_TICKS,
};
