//! Headless stand-in for the host runtime: entities and components, a
//! per-frame system schedule, one-shot timers, fire-and-forget host actions
//! and a fixed-step loop.

pub mod app;

pub use app::{
    run_headless, run_headless_with_metrics, AnimationClip, Animator, AudioSource, AvatarData,
    CameraMode, Entity, EntityId, HostError, HostEvent, HostRequest, IdleInput, InputAction,
    InputSnapshot, InputSource, Interactable, LoopConfig, LoopMetricsSnapshot, MetricsHandle,
    PlayerState, PrimitiveShape, Quat, RunSummary, Scene, SceneCommand, SceneWorld, Schedule,
    ScreenState, ScriptError, ScriptStep, ScriptedInput, StopReason, System, SystemError,
    SystemFailure, SystemId, TimerQueue, Transform, TriggerVolume, UserData, Vec3, Visual,
    DEFAULT_PLAYER_MOVE_SPEED, DEFAULT_USER_DATA_DELAY_TICKS,
};
