use engine::events::Event;
use engine::foundation::logging;
use engine::render::RecordingBackend;
use engine::scene::{FixedFrameSource, FrameSource, SystemFrameSource};
use engine::Engine;
use game::config::GameConfig;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "game.toml".to_string());
    let config = GameConfig::load(&path)?;
    logging::init(&config.engine.logging.level);
    log::info!("Starting voxel demo with {path}");

    let mut context = game::create_context(&config)?;
    let scene = game::scene::build(&mut context, &config.scene)?;
    let loaded = context.finish_loading(Duration::from_secs(5));
    log::info!("{loaded} assets loaded before the first frame");

    context.events.register_handler(
        "block_spawned",
        Box::new(|event: &Event| {
            log::info!("Spawner dropped block {:?} at t={:.2}", event.get_arg("count"), event.timestamp);
            false
        }),
    );
    context.events.register_handler(
        "row_cleared",
        Box::new(|event: &Event| {
            log::info!("Spawner cleared a row of {:?}", event.get_arg("count"));
            false
        }),
    );

    let mut engine = Engine::new(context);
    let shutdown = engine.shutdown_signal();
    if config.scene.frames == 0 {
        shutdown.raise();
    }

    let mut source: Box<dyn FrameSource> = if config.scene.frame_delta > 0.0 {
        Box::new(FixedFrameSource::new(config.scene.frame_delta))
    } else {
        Box::new(SystemFrameSource::new(config.engine.timing.max_delta))
    };

    let mut faults = 0;
    let frames = engine.run(source.as_mut(), |_, report| {
        faults += report.script_faults.len();
        for fault in &report.script_faults {
            log::warn!("Frame {}: {fault}", report.frame);
        }
        if report.frame % 60 == 0 {
            log::info!(
                "Frame {} ({:.2} ms): {} draws, {} culled, {} scripts, {} transforms",
                report.frame,
                report.elapsed_ms,
                report.render.draw_calls,
                report.render.culled,
                report.scripts_invoked,
                report.transforms_recomputed
            );
        }
        if report.frame + 1 >= config.scene.frames {
            shutdown.raise();
        }
    });

    let context = engine.into_context();
    let waits = context
        .renderer
        .backend_as::<RecordingBackend>()
        .map_or(0, RecordingBackend::waits);
    log::info!(
        "Ran {frames} frames: {} entities alive, {} scripts active, {faults} script faults, {waits} fence waits",
        context.world.entity_count(),
        context.scripts.active_count()
    );
    if let Ok(banner) = context.world.get_component::<engine::ecs::components::Transform>(scene.banner) {
        log::debug!("Banner finished at {:?}", banner.world_position());
    }
    Ok(())
}
