use std::collections::VecDeque;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FadeTimings {
    pub(crate) out_seconds: f32,
    pub(crate) hold_seconds: f32,
    pub(crate) in_seconds: f32,
}

impl Default for FadeTimings {
    fn default() -> Self {
        Self {
            out_seconds: 1.0,
            hold_seconds: 0.5,
            in_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FadePlan {
    /// Black, hold, then back to clear.
    OutHoldIn,
    /// Stays black; the next stage fades itself in.
    OutOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadePhase {
    Idle,
    Out,
    Hold,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FadeEvent<T> {
    Idle,
    Running { opacity: f32 },
    /// Full black was reached this tick; the payload is handed back exactly once.
    ReachedBlack(T),
    Finished,
}

/// Screen fade as sequential timed ramps: opacity 0 to 1, hold, 1 to 0.
#[derive(Debug, Clone)]
pub(crate) struct FadeTransition<T> {
    timings: FadeTimings,
    plan: FadePlan,
    phase: FadePhase,
    elapsed: f32,
    opacity: f32,
    payload: Option<T>,
}

impl<T> FadeTransition<T> {
    pub(crate) fn new(timings: FadeTimings) -> Self {
        Self {
            timings,
            plan: FadePlan::OutHoldIn,
            phase: FadePhase::Idle,
            elapsed: 0.0,
            opacity: 0.0,
            payload: None,
        }
    }

    pub(crate) fn opacity(&self) -> f32 {
        self.opacity
    }

    pub(crate) fn is_running(&self) -> bool {
        self.phase != FadePhase::Idle
    }

    /// Returns false and drops `payload` when a fade is already running.
    pub(crate) fn start(&mut self, payload: T, plan: FadePlan) -> bool {
        if self.is_running() {
            debug!("fade_already_running");
            return false;
        }
        self.plan = plan;
        self.phase = FadePhase::Out;
        self.elapsed = 0.0;
        self.payload = Some(payload);
        true
    }

    /// Ramps from the current opacity back to clear.
    pub(crate) fn begin_fade_in(&mut self) {
        self.phase = FadePhase::In;
        self.elapsed = (1.0 - self.opacity) * self.timings.in_seconds;
    }

    pub(crate) fn tick(&mut self, dt_seconds: f32) -> FadeEvent<T> {
        match self.phase {
            FadePhase::Idle => FadeEvent::Idle,
            FadePhase::Out => {
                self.elapsed += dt_seconds;
                self.opacity = ramp(self.elapsed, self.timings.out_seconds);
                if self.elapsed < self.timings.out_seconds {
                    return FadeEvent::Running {
                        opacity: self.opacity,
                    };
                }
                self.opacity = 1.0;
                self.elapsed = 0.0;
                self.phase = match self.plan {
                    FadePlan::OutHoldIn => FadePhase::Hold,
                    FadePlan::OutOnly => FadePhase::Idle,
                };
                match self.payload.take() {
                    Some(payload) => FadeEvent::ReachedBlack(payload),
                    None => FadeEvent::Running { opacity: 1.0 },
                }
            }
            FadePhase::Hold => {
                self.elapsed += dt_seconds;
                if self.elapsed >= self.timings.hold_seconds {
                    self.phase = FadePhase::In;
                    self.elapsed = 0.0;
                }
                FadeEvent::Running { opacity: 1.0 }
            }
            FadePhase::In => {
                self.elapsed += dt_seconds;
                self.opacity = 1.0 - ramp(self.elapsed, self.timings.in_seconds);
                if self.elapsed < self.timings.in_seconds {
                    return FadeEvent::Running {
                        opacity: self.opacity,
                    };
                }
                self.opacity = 0.0;
                self.phase = FadePhase::Idle;
                FadeEvent::Finished
            }
        }
    }
}

fn ramp(elapsed: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        return 1.0;
    }
    (elapsed / duration).clamp(0.0, 1.0)
}

/// Ordered `(delay_seconds, action)` steps. Each delay counts from the
/// previous step firing.
#[derive(Debug, Clone)]
pub(crate) struct Cutscene<A> {
    steps: VecDeque<(f32, A)>,
    elapsed: f32,
}

impl<A> Cutscene<A> {
    pub(crate) fn new(steps: Vec<(f32, A)>) -> Self {
        Self {
            steps: steps.into(),
            elapsed: 0.0,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Returns every action that came due, in order. A long tick can fire
    /// several steps at once.
    pub(crate) fn tick(&mut self, dt_seconds: f32) -> Vec<A> {
        self.elapsed += dt_seconds.max(0.0);
        let mut fired = Vec::new();
        while let Some((delay, _)) = self.steps.front() {
            if self.elapsed < *delay {
                break;
            }
            self.elapsed -= *delay;
            if let Some((_, action)) = self.steps.pop_front() {
                fired.push(action);
            }
        }
        if self.steps.is_empty() {
            self.elapsed = 0.0;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_black(fade: &mut FadeTransition<&'static str>, dt: f32) -> (u32, Option<&'static str>) {
        for tick in 1..1_000 {
            if let FadeEvent::ReachedBlack(payload) = fade.tick(dt) {
                return (tick, Some(payload));
            }
        }
        (0, None)
    }

    #[test]
    fn fade_reaches_black_once_then_clears() {
        let mut fade = FadeTransition::new(FadeTimings::default());
        assert!(fade.start("stage_2", FadePlan::OutHoldIn));
        assert!(!fade.start("stage_3", FadePlan::OutHoldIn));

        let (ticks, payload) = run_until_black(&mut fade, 0.125);
        assert_eq!(payload, Some("stage_2"));
        assert_eq!(ticks, 8);
        assert_eq!(fade.opacity(), 1.0);

        let mut finished = false;
        for _ in 0..30 {
            match fade.tick(0.125) {
                FadeEvent::ReachedBlack(_) => panic!("payload delivered twice"),
                FadeEvent::Finished => {
                    finished = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(finished);
        assert_eq!(fade.opacity(), 0.0);
        assert!(!fade.is_running());
    }

    #[test]
    fn opacity_ramps_during_fade_out() {
        let mut fade = FadeTransition::new(FadeTimings::default());
        fade.start((), FadePlan::OutHoldIn);
        assert_eq!(fade.tick(0.25), FadeEvent::Running { opacity: 0.25 });
        assert_eq!(fade.tick(0.25), FadeEvent::Running { opacity: 0.5 });
    }

    #[test]
    fn out_only_stays_black_until_faded_in() {
        let mut fade = FadeTransition::new(FadeTimings::default());
        fade.start(7u8, FadePlan::OutOnly);
        assert_eq!(fade.tick(1.0), FadeEvent::ReachedBlack(7));
        assert_eq!(fade.tick(5.0), FadeEvent::Idle);
        assert_eq!(fade.opacity(), 1.0);

        fade.begin_fade_in();
        assert_eq!(fade.tick(0.5), FadeEvent::Running { opacity: 0.5 });
        assert_eq!(fade.tick(0.5), FadeEvent::Finished);
        assert_eq!(fade.opacity(), 0.0);
    }

    #[test]
    fn zero_duration_fade_goes_black_on_first_tick() {
        let timings = FadeTimings {
            out_seconds: 0.0,
            hold_seconds: 0.0,
            in_seconds: 0.0,
        };
        let mut fade = FadeTransition::new(timings);
        fade.start("x", FadePlan::OutHoldIn);
        assert_eq!(fade.tick(0.016), FadeEvent::ReachedBlack("x"));
    }

    #[test]
    fn cutscene_fires_steps_relative_to_previous() {
        let mut cutscene = Cutscene::new(vec![(1.0, "move"), (2.5, "nap"), (0.0, "fade_in")]);

        assert!(cutscene.tick(0.75).is_empty());
        assert_eq!(cutscene.tick(0.25), vec!["move"]);
        assert!(cutscene.tick(2.25).is_empty());
        assert_eq!(cutscene.tick(0.25), vec!["nap", "fade_in"]);
        assert!(cutscene.is_finished());
        assert!(cutscene.tick(10.0).is_empty());
    }

    #[test]
    fn long_tick_fires_several_steps_in_order() {
        let mut cutscene = Cutscene::new(vec![(1.0, 1), (1.0, 2), (5.0, 3)]);
        assert_eq!(cutscene.tick(2.5), vec![1, 2]);
        assert_eq!(cutscene.remaining(), 1);
        assert_eq!(cutscene.tick(4.5), vec![3]);
    }
}
