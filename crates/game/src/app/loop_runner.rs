use std::process::ExitCode;

use engine::run_headless;
use tracing::info;

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        scene,
        mut input,
    } = app;
    let summary = run_headless(config, scene, input.as_mut());
    info!(
        ticks = summary.ticks,
        frames = summary.frames,
        stop_reason = ?summary.stop_reason,
        entities = summary.final_entity_count,
        title = summary.final_title.as_deref().unwrap_or(""),
        "run_finished"
    );

    ExitCode::SUCCESS
}
