use approx::assert_relative_eq;
use engine::ecs::components::{ScriptBehavior, Transform};
use engine::events::Event;
use engine::render::{Lookup, RecordingBackend};
use engine::scene::FixedFrameSource;
use engine::Engine;
use game::config::GameConfig;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn setup(config: &GameConfig) -> (Engine, game::scene::DemoScene) {
    let mut context = game::create_context(config).unwrap();
    let scene = game::scene::build(&mut context, &config.scene).unwrap();
    context.finish_loading(Duration::from_secs(5));
    (Engine::new(context), scene)
}

fn run_frames(engine: &mut Engine, frames: u64) -> usize {
    let shutdown = engine.shutdown_signal();
    let mut faults = 0;
    engine.run(&mut FixedFrameSource::new(1.0 / 60.0), |_, report| {
        faults += report.script_faults.len();
        if report.frame + 1 >= frames {
            shutdown.raise();
        }
    });
    faults
}

#[test]
fn demo_scripts_run_without_faults() {
    let config = GameConfig::default();
    let (mut engine, scene) = setup(&config);

    let spawned = Rc::new(Cell::new(0));
    let counter = Rc::clone(&spawned);
    engine.context_mut().events.register_handler(
        "block_spawned",
        Box::new(move |_: &Event| {
            counter.set(counter.get() + 1);
            false
        }),
    );

    let banner_start = {
        let context = engine.context_mut();
        context.step(&engine::scene::FrameInput::new(1.0 / 60.0));
        context.world.get_component::<Transform>(scene.banner).unwrap().world_position()
    };

    assert_eq!(run_frames(&mut engine, 120), 0);
    let context = engine.context();

    for entity in [scene.pillar, scene.bobber, scene.spawner] {
        assert!(context.world.has_component::<ScriptBehavior>(entity).unwrap());
    }
    assert_eq!(context.scripts.active_count(), 3);
    assert!(spawned.get() >= 3);

    let banner_now = context.world.get_component::<Transform>(scene.banner).unwrap().world_position();
    assert!((banner_now - banner_start).norm() > 0.1);
    assert_relative_eq!(banner_now.y, banner_start.y, epsilon = 1e-4);
}

#[test]
fn demo_submits_floor_and_glass() {
    let config = GameConfig::default();
    let (mut engine, scene) = setup(&config);
    run_frames(&mut engine, 3);
    let context = engine.context();

    assert!(matches!(
        context.resources.material(context.world.get_component::<engine::ecs::components::Renderable>(scene.glass).unwrap().material),
        Lookup::Ready(_)
    ));
    let draws = context.renderer.last_draw_list();
    assert!(draws.len() > scene.floor.len() / 2);
    assert_eq!(draws.last().map(|command| command.entity), Some(scene.glass));

    let backend = context.renderer.backend_as::<RecordingBackend>().unwrap();
    assert_eq!(backend.overlaps(), 0);
}

#[test]
fn demo_without_scripts_is_static() {
    let mut config = GameConfig::default();
    config.scene.scripts = false;
    let (mut engine, scene) = setup(&config);
    run_frames(&mut engine, 2);

    let context = engine.context();
    assert_eq!(context.scripts.active_count(), 0);
    let bobber = context.world.get_component::<Transform>(scene.bobber).unwrap();
    assert_relative_eq!(bobber.world_position().y, 2.0);
}
