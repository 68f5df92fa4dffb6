//! Engine context and the per-frame driver
//!
//! [`EngineContext`] owns every subsystem. There is no global state: callers
//! hold the context and hand it out by reference.

use crate::assets::{AssetSource, LoadError, ResourceLoader, ScriptSourceId};
use crate::config::EngineConfig;
use crate::ecs::components::ScriptHandle;
use crate::ecs::{Entity, World};
use crate::error::EngineResult;
use crate::events::EventSystem;
use crate::foundation::time::Stopwatch;
use crate::input::InputSnapshot;
use crate::render::{GpuBackend, MaterialId, MeshId, RenderPipeline, ResourceRegistry};
use crate::scene::{clear_frame_flags, resolve_transforms, FrameInput, FramePhase, FrameReport, SimulationHook};
use crate::scripting::{ScriptBridge, ScriptError, ScriptFrame};

struct PendingScript {
    entity: Entity,
    source: ScriptSourceId,
}

/// Everything one running scene needs
pub struct EngineContext {
    /// Entity store and scene hierarchy
    pub world: World,
    /// Meshes and materials
    pub resources: ResourceRegistry,
    /// Lua script bridge
    pub scripts: ScriptBridge,
    /// Event queue, dispatched at EndFrame
    pub events: EventSystem,
    /// Render submission
    pub renderer: RenderPipeline,
    loader: Option<ResourceLoader>,
    pending_scripts: Vec<PendingScript>,
    hooks: Vec<Box<dyn SimulationHook>>,
    input: InputSnapshot,
    config: EngineConfig,
    frame: u64,
    time: f64,
}

impl EngineContext {
    /// Validate `config` and build every subsystem
    pub fn new(config: EngineConfig, backend: Box<dyn GpuBackend>) -> EngineResult<Self> {
        config.validate()?;
        log::info!("Initializing engine context...");

        let scripts = ScriptBridge::new(&config.scripting)?;
        let renderer = RenderPipeline::new(backend, &config.render);

        Ok(Self {
            world: World::new(),
            resources: ResourceRegistry::new(),
            scripts,
            events: EventSystem::new(),
            renderer,
            loader: None,
            pending_scripts: Vec::new(),
            hooks: Vec::new(),
            input: InputSnapshot::new(),
            config,
            frame: 0,
            time: 0.0,
        })
    }

    /// Start background loading from `source`
    pub fn attach_loader(&mut self, source: impl AssetSource) -> EngineResult<()> {
        self.loader = Some(ResourceLoader::new(source)?);
        Ok(())
    }

    /// Request a mesh; pending until a later BeginFrame installs it
    pub fn load_mesh(&mut self, path: &str) -> EngineResult<MeshId> {
        let loader = self.loader.as_mut().ok_or(LoadError::WorkerUnavailable)?;
        Ok(loader.load_mesh(&mut self.resources, path))
    }

    /// Request a material; pending until a later BeginFrame installs it
    pub fn load_material(&mut self, path: &str) -> EngineResult<MaterialId> {
        let loader = self.loader.as_mut().ok_or(LoadError::WorkerUnavailable)?;
        Ok(loader.load_material(&mut self.resources, path))
    }

    /// Attach a script from source text
    pub fn attach_script(&mut self, entity: Entity, name: &str, source: &str) -> Result<ScriptHandle, ScriptError> {
        self.scripts.register_script(&mut self.world, entity, name, source)
    }

    /// Load a script asset and attach it once it arrives
    pub fn attach_script_asset(&mut self, entity: Entity, path: &str) -> EngineResult<()> {
        let loader = self.loader.as_mut().ok_or(LoadError::WorkerUnavailable)?;
        let source = loader.load_script(path);
        self.pending_scripts.push(PendingScript { entity, source });
        Ok(())
    }

    /// Block until queued loads finish, installing them
    pub fn finish_loading(&mut self, timeout: std::time::Duration) -> usize {
        let Some(loader) = self.loader.as_mut() else {
            return 0;
        };
        loader.finish_pending(&mut self.resources, timeout).total()
    }

    /// Run `hook` every frame between the script pass and transform resolve
    pub fn add_hook(&mut self, hook: impl SimulationHook + 'static) {
        log::debug!("Registered simulation hook '{}'", hook.name());
        self.hooks.push(Box::new(hook));
    }

    /// Configuration the context was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames completed
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Input latched for the current frame
    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    /// Run one frame through every phase
    pub fn step(&mut self, input: &FrameInput) -> FrameReport {
        let stopwatch = Stopwatch::start_new();
        let mut report = FrameReport {
            frame: self.frame,
            delta: input.delta,
            ..FrameReport::default()
        };

        report.enter(FramePhase::BeginFrame);
        self.input = input.input.clone();
        self.events.update_time(self.time);
        if let Some(loader) = self.loader.as_mut() {
            report.resources = loader.drain(&mut self.resources, self.config.assets.max_completions_per_frame);
        }
        self.attach_arrived_scripts(&mut report);

        report.enter(FramePhase::ScriptPass);
        let frame = ScriptFrame {
            dt: input.delta,
            time: self.time,
            input: &self.input,
        };
        let pass = self.scripts.run_pass(&mut self.world, &frame);
        report.scripts_invoked = pass.invoked;
        report.script_faults.extend(pass.faults);
        report.structural_changes = pass.structural_changes;
        for event in self.scripts.take_events() {
            self.events.send(event);
        }

        report.enter(FramePhase::Simulate);
        for hook in &mut self.hooks {
            hook.simulate(&mut self.world, input);
        }
        if !self.hooks.is_empty() {
            report.structural_changes += self.world.apply_commands();
            self.scripts.release_orphans(&mut self.world);
        }

        report.enter(FramePhase::TransformResolve);
        report.transforms_recomputed = resolve_transforms(&mut self.world);

        report.enter(FramePhase::RenderSubmit);
        report.render = self.renderer.submit(&self.world, &self.resources);

        report.enter(FramePhase::EndFrame);
        clear_frame_flags(&mut self.world);
        report.events_dispatched = self.events.dispatch();
        self.time += f64::from(input.delta);
        self.frame += 1;
        report.elapsed_ms = stopwatch.elapsed_millis();

        log::debug!(
            "Frame {} ({:.2} ms): {} scripts, {} faults, {} transforms, {} draws",
            report.frame,
            report.elapsed_ms,
            report.scripts_invoked,
            report.script_faults.len(),
            report.transforms_recomputed,
            report.render.draw_calls
        );
        report
    }

    fn attach_arrived_scripts(&mut self, report: &mut FrameReport) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };

        let mut still_pending = Vec::new();
        for pending in self.pending_scripts.drain(..) {
            let arrived = match loader.take_script(pending.source) {
                None => {
                    still_pending.push(pending);
                    continue;
                }
                Some(arrived) => arrived,
            };
            if !self.world.is_alive(pending.entity) {
                log::debug!("Dropping script for destroyed {}", pending.entity);
                continue;
            }

            let result = arrived
                .map_err(|e| ScriptError::Load {
                    script: format!("{:?}", pending.source),
                    reason: e.to_string(),
                })
                .and_then(|(path, source)| {
                    self.scripts.register_script(&mut self.world, pending.entity, &path, &source)
                });
            if let Err(e) = result {
                log::warn!("Could not attach script to {}: {e}", pending.entity);
                report.script_faults.push(e);
            }
        }
        self.pending_scripts = still_pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::ecs::components::{Camera, Renderable, ScriptBehavior, Transform};
    use crate::events::Event;
    use crate::foundation::math::Vec3;
    use crate::render::{MaterialData, MeshData, RecordingBackend};
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    fn context() -> EngineContext {
        let mut context = EngineContext::new(EngineConfig::default(), Box::new(RecordingBackend::new())).unwrap();
        let camera = context.world.create();
        context
            .world
            .add_component(camera, Camera::perspective(60.0, 1.0, 0.1, 100.0))
            .unwrap();
        context
            .world
            .add_component(camera, Transform::from_position(Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        context
    }

    fn cube(context: &mut EngineContext) -> Entity {
        let mesh = context.resources.insert_mesh("cube", MeshData::unit_cube());
        let material = context.resources.insert_material("stone", MaterialData::opaque(0));
        let entity = context.world.create();
        context.world.add_component(entity, Transform::identity()).unwrap();
        context.world.add_component(entity, Renderable::new(mesh, material)).unwrap();
        entity
    }

    #[test]
    fn test_phases_run_in_order() {
        let mut context = context();
        let report = context.step(&FrameInput::new(0.016));
        assert_eq!(report.phases, FramePhase::ORDER.to_vec());
        assert_eq!(context.frame_count(), 1);
        assert_relative_eq!(context.time(), 0.016, epsilon = 1e-6);
    }

    #[test]
    fn test_script_moves_entity_then_destroy_removes_it() {
        let mut context = context();
        let entity = cube(&mut context);
        context
            .attach_script(
                entity,
                "mover",
                r#"
                function on_update(self, dt)
                    engine.setField(self, "transform.position", { x = 1, y = 0, z = 0 })
                end
                "#,
            )
            .unwrap();

        let report = context.step(&FrameInput::new(0.016));
        assert!(report.script_faults.is_empty());
        let transform = context.world.get_component::<Transform>(entity).unwrap();
        assert_relative_eq!(transform.world_position(), Vec3::new(1.0, 0.0, 0.0));
        assert!(context.renderer.last_draw_list().iter().any(|c| c.entity == entity));

        context.world.destroy(entity);
        let report = context.step(&FrameInput::new(0.016));
        assert_eq!(report.render.draw_calls, 0);
        assert!(context.renderer.last_draw_list().iter().all(|c| c.entity != entity));
        assert_eq!(context.scripts.active_count(), 0);
    }

    #[test]
    fn test_fault_isolated_to_one_behavior() {
        let mut context = context();
        let bad = cube(&mut context);
        let good = context.world.create();
        context.world.add_component(good, Transform::identity()).unwrap();
        context
            .attach_script(bad, "bad", "function on_update() error('boom') end")
            .unwrap();
        context
            .attach_script(
                good,
                "good",
                "function on_update(self) engine.setField(self, 'transform.scale', {2, 2, 2}) end",
            )
            .unwrap();

        let report = context.step(&FrameInput::new(0.016));
        assert_eq!(report.script_faults.len(), 1);
        assert_eq!(report.script_faults[0].entity(), Some(bad));
        assert_eq!(report.scripts_invoked, 1);
        assert!(!context.world.has_component::<ScriptBehavior>(bad).unwrap());
        assert!(context.world.has_component::<ScriptBehavior>(good).unwrap());
        let scale = context.world.get_component::<Transform>(good).unwrap().scale();
        assert_relative_eq!(scale, Vec3::new(2.0, 2.0, 2.0));

        let report = context.step(&FrameInput::new(0.016));
        assert!(report.script_faults.is_empty());
        assert_eq!(report.scripts_invoked, 1);
    }

    #[test]
    fn test_script_events_dispatched_at_end_of_frame() {
        let mut context = context();
        let entity = context.world.create();
        context
            .attach_script(
                entity,
                "emitter",
                "function on_update(self) engine.emitEvent('ping', { n = 3 }) end",
            )
            .unwrap();

        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        context.events.register_handler(
            "ping",
            Box::new(move |event: &Event| {
                assert_eq!(event.source, Some(entity));
                counter.set(counter.get() + 1);
                true
            }),
        );

        let report = context.step(&FrameInput::new(0.016));
        assert_eq!(report.events_dispatched, 1);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_hooks_run_after_scripts() {
        let mut context = context();
        let entity = context.world.create();
        context.world.add_component(entity, Transform::identity()).unwrap();
        context
            .attach_script(
                entity,
                "mover",
                "function on_update(self) engine.setField(self, 'transform.position', {1, 0, 0}) end",
            )
            .unwrap();
        context.add_hook(("double", move |world: &mut World, _: &FrameInput| {
            let transform = world.get_component_mut::<Transform>(entity).unwrap();
            let doubled = transform.position() * 2.0;
            transform.set_position(doubled);
        }));

        context.step(&FrameInput::new(0.016));
        let transform = context.world.get_component::<Transform>(entity).unwrap();
        assert_relative_eq!(transform.world_position(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_script_asset_attached_after_load() {
        let mut context = context();
        let source = MemorySource::new()
            .with_file("spin.lua", "function on_update(self, dt) end")
            .with_file("stone.ron", "(shader: 2)");
        context.attach_loader(source).unwrap();

        let entity = context.world.create();
        context.attach_script_asset(entity, "spin.lua").unwrap();
        let material = context.load_material("stone.ron").unwrap();
        context.finish_loading(Duration::from_secs(5));

        let report = context.step(&FrameInput::new(0.016));
        assert!(report.script_faults.is_empty());
        assert_eq!(report.scripts_invoked, 1);
        assert!(context.world.has_component::<ScriptBehavior>(entity).unwrap());
        assert!(matches!(context.resources.material(material), crate::render::Lookup::Ready(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.render.frames_in_flight = 0;
        assert!(EngineContext::new(config, Box::new(RecordingBackend::new())).is_err());
    }
}
