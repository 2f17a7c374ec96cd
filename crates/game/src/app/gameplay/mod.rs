//! The scene itself: a streamed graveyard maze followed by four scripted
//! stages, sequenced by [`session::Session`].

mod ambience;
mod audio;
mod decor;
mod graveyard;
mod layout;
mod maze;
mod narrative;
mod pool;
mod pursuit;
mod rng;
mod session;
mod stages;
mod timeline;
mod window;

use engine::Scene;

use super::config::GameConfig;

pub(crate) use stages::{StageError, StageId};

pub(crate) fn build_session(config: GameConfig) -> Box<dyn Scene> {
    Box::new(session::Session::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{run_headless, IdleInput, LoopConfig, ScriptedInput, StopReason};

    #[test]
    fn idle_run_stops_at_the_tick_limit() {
        let mut config = GameConfig::default();
        config.maze.cols = 10;
        config.maze.rows = 10;
        let loop_config = LoopConfig {
            max_ticks: Some(120),
            ..LoopConfig::default()
        };

        let summary = run_headless(loop_config, build_session(config), &mut IdleInput);
        assert_eq!(summary.stop_reason, StopReason::TickLimit);
        assert_eq!(summary.ticks, 120);
        let title = summary.final_title.expect("title");
        assert!(title.contains("graveyard"), "{title}");
    }

    #[test]
    fn scripted_begin_starts_the_game_and_input_end_stops_the_run() {
        let mut config = GameConfig::default();
        config.maze.cols = 10;
        config.maze.rows = 10;
        let script = r#"{ "steps": [ { "ticks": 5 }, { "begin": true, "ticks": 30 } ] }"#;
        let mut input = ScriptedInput::parse(script).expect("script");

        let summary = run_headless(LoopConfig::default(), build_session(config), &mut input);
        assert_eq!(summary.stop_reason, StopReason::InputEnded);
        assert_eq!(summary.ticks, 35);
        assert!(summary.final_entity_count > 0);
    }
}
