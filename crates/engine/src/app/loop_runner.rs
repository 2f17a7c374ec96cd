use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::scene::SceneRuntime;
use super::script::InputSource;
use super::world::{SceneWorld, UserData, DEFAULT_USER_DATA_DELAY_TICKS};
use super::{MetricsHandle, Scene, SceneCommand};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many ticks. `None` runs until input ends or the scene quits.
    pub max_ticks: Option<u64>,
    /// Pace frames against the wall clock instead of simulating as fast as possible.
    pub realtime: bool,
    pub user_profile: UserData,
    pub user_data_delay_ticks: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
            realtime: false,
            user_profile: UserData::default(),
            user_data_delay_ticks: DEFAULT_USER_DATA_DELAY_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    InputEnded,
    QuitRequested,
    SceneQuit,
    TickLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub frames: u64,
    pub stop_reason: StopReason,
    pub final_entity_count: usize,
    pub final_title: Option<String>,
}

pub fn run_headless(
    config: LoopConfig,
    scene: Box<dyn Scene>,
    input: &mut dyn InputSource,
) -> RunSummary {
    let metrics_handle = MetricsHandle::default();
    run_headless_with_metrics(config, scene, input, metrics_handle)
}

pub fn run_headless_with_metrics(
    config: LoopConfig,
    scene: Box<dyn Scene>,
    input: &mut dyn InputSource,
    metrics_handle: MetricsHandle,
) -> RunSummary {
    let mut world = SceneWorld::default();
    world.set_user_profile(config.user_profile.clone(), config.user_data_delay_ticks);
    let mut runtime = SceneRuntime::new(scene, world);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();

    runtime.load();
    info!(
        entity_count = runtime.world().entity_count(),
        system_count = runtime.system_count(),
        "scene_loaded"
    );
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        "loop_config"
    );

    let started = Instant::now();
    let mut simulated_elapsed = Duration::ZERO;
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = started;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval, started);
    let mut ticks: u64 = 0;
    let mut frames: u64 = 0;

    let stop_reason = 'frames: loop {
        let frame_started = Instant::now();
        let raw_frame_dt = if config.realtime {
            let dt = frame_started.saturating_duration_since(last_frame_instant);
            last_frame_instant = frame_started;
            dt
        } else {
            fixed_dt
        };
        simulated_elapsed = simulated_elapsed.saturating_add(raw_frame_dt);

        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
        accumulator = accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let Some(snapshot) = input.next_tick() else {
                break 'frames StopReason::InputEnded;
            };
            if snapshot.quit_requested() {
                info!(reason = "quit_action", "shutdown_requested");
                break 'frames StopReason::QuitRequested;
            }
            let command = runtime.tick(fixed_dt_seconds, &snapshot);
            ticks = ticks.saturating_add(1);
            metrics_accumulator.record_tick();
            if command == SceneCommand::Quit {
                info!(reason = "scene_quit", "shutdown_requested");
                break 'frames StopReason::SceneQuit;
            }
            if config.max_ticks.is_some_and(|limit| ticks >= limit) {
                break 'frames StopReason::TickLimit;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        frames = frames.saturating_add(1);
        metrics_accumulator.record_frame(raw_frame_dt);
        let now = if config.realtime {
            Instant::now()
        } else {
            started + simulated_elapsed
        };
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(
            now,
            runtime.world().entity_count(),
            runtime.system_count(),
        ) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                entity_count = snapshot.entity_count,
                system_count = snapshot.system_count,
                title = runtime.debug_title().as_deref().unwrap_or(""),
                "loop_metrics"
            );
        }

        if config.realtime {
            let elapsed = Instant::now().saturating_duration_since(frame_started);
            if elapsed < fixed_dt {
                thread::sleep(fixed_dt - elapsed);
            }
        }
    };

    let summary = RunSummary {
        ticks,
        frames,
        stop_reason,
        final_entity_count: runtime.world().entity_count(),
        final_title: runtime.debug_title(),
    };
    runtime.shutdown();
    info!(ticks, frames, reason = ?stop_reason, "shutdown");
    summary
}

struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
