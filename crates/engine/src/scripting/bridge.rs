//! Script binding bridge
//!
//! Owns the Lua state and every live script instance. Each instance has its
//! own environment. Each call into a script runs inside [`call_with_budget`]
//! with a freshly scoped `engine` table placed in that environment, so the
//! host functions a script sees cannot outlive the call that handed them out.
//! Faults are caught here, logged with the handle and entity, and the faulting
//! behavior is detached; they never propagate into the frame loop.

use super::budget::{call_with_budget, CallFailure, ScriptBudget};
use super::error::ScriptError;
use super::fields::{FieldAccess, FieldError, FieldWhitelist};
use super::marshal::{entity_from_lua, entity_to_lua, from_lua, table_to_vec3, to_lua};
use super::sandbox;
use crate::config::ScriptingConfig;
use crate::ecs::components::{FieldBindings, Renderable, ScriptBehavior, ScriptHandle, Transform};
use crate::ecs::{EcsError, Entity, EntityTemplate, World};
use crate::events::Event;
use crate::foundation::math::Vec3;
use crate::input::InputSnapshot;
use mlua::{Function, Lua, Table, Value};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// What a spawned entity looks like when a script names a prefab
#[derive(Debug, Clone, PartialEq)]
pub struct Prefab {
    /// Mesh and material
    pub renderable: Renderable,
    /// Local scale
    pub scale: Vec3,
}

/// Per-frame values scripts can read through `engine`
#[derive(Debug, Clone, Copy)]
pub struct ScriptFrame<'a> {
    /// Seconds since the previous frame
    pub dt: f32,
    /// Seconds since start
    pub time: f64,
    /// Latched input
    pub input: &'a InputSnapshot,
}

/// Outcome of one script pass
#[derive(Debug, Default)]
pub struct ScriptPassReport {
    /// Callbacks that ran to completion
    pub invoked: usize,
    /// Faults raised this pass; each detached one behavior
    pub faults: Vec<ScriptError>,
    /// Deferred structural changes applied at the end of the pass
    pub structural_changes: usize,
    /// Instances released because their entity was destroyed
    pub released: usize,
}

struct ScriptInstance {
    name: String,
    entity: Entity,
    env: Table,
    bindings: FieldBindings,
}

/// Bridge between the entity store and Lua scripts
pub struct ScriptBridge {
    lua: Lua,
    sandbox: Table,
    instances: SlotMap<ScriptHandle, ScriptInstance>,
    whitelist: FieldWhitelist,
    prefabs: HashMap<String, Prefab>,
    events: Vec<Event>,
    faults: VecDeque<ScriptError>,
    config: ScriptingConfig,
    budget: ScriptBudget,
}

impl ScriptBridge {
    /// Bridge exposing the engine's default field whitelist
    pub fn new(config: &ScriptingConfig) -> Result<Self, ScriptError> {
        Self::with_whitelist(config, FieldWhitelist::engine_defaults()?)
    }

    /// Bridge exposing a custom whitelist
    pub fn with_whitelist(config: &ScriptingConfig, whitelist: FieldWhitelist) -> Result<Self, ScriptError> {
        let lua = sandbox::create_state(config)?;
        let sandbox = sandbox::build_sandbox(&lua)?;
        log::info!(
            "Script bridge ready ({} field paths exposed, {} instruction budget)",
            whitelist.paths().count(),
            config.max_instructions
        );
        Ok(Self {
            lua,
            sandbox,
            instances: SlotMap::with_key(),
            whitelist,
            prefabs: HashMap::new(),
            events: Vec::new(),
            faults: VecDeque::new(),
            budget: ScriptBudget::from(config),
            config: config.clone(),
        })
    }

    /// Whitelist, for exposing game-defined components
    pub fn whitelist_mut(&mut self) -> &mut FieldWhitelist {
        &mut self.whitelist
    }

    /// Make `name` available to `engine.spawnEntity{prefab = name}`
    pub fn register_prefab(&mut self, name: impl Into<String>, prefab: Prefab) {
        self.prefabs.insert(name.into(), prefab);
    }

    /// Compile `source` and attach it to `entity`.
    ///
    /// On any failure the entity is left without a [`ScriptBehavior`].
    pub fn register_script(
        &mut self,
        world: &mut World,
        entity: Entity,
        name: &str,
        source: &str,
    ) -> Result<ScriptHandle, ScriptError> {
        if world.has_component::<ScriptBehavior>(entity)? {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: std::any::type_name::<ScriptBehavior>(),
            }
            .into());
        }

        let load_error = |reason: String| ScriptError::Load {
            script: name.to_string(),
            reason,
        };

        let env = sandbox::script_environment(&self.lua, &self.sandbox)?;
        let chunk = self.lua.load(source).set_name(name).set_environment(env.clone());
        call_with_budget(&self.lua, self.budget, || chunk.exec()).map_err(|failure| match failure {
            CallFailure::Lua(e) => load_error(e.to_string()),
            CallFailure::Exhausted(reason) => load_error(format!("top-level code: {reason}")),
        })?;

        if !matches!(env.raw_get::<Value>(self.config.update_callback.as_str())?, Value::Function(_)) {
            return Err(load_error(format!("missing '{}' function", self.config.update_callback)));
        }
        let bindings = self.resolve_bindings(&env).map_err(load_error)?;

        let handle = self.instances.insert(ScriptInstance {
            name: name.to_string(),
            entity,
            env,
            bindings: bindings.clone(),
        });
        world.add_component(
            entity,
            ScriptBehavior {
                handle,
                script_name: name.to_string(),
                bindings,
            },
        )?;

        let idle = InputSnapshot::default();
        let frame = ScriptFrame { dt: 0.0, time: 0.0, input: &idle };
        if let Err(failure) = self.execute(world, handle, "on_attach", &frame) {
            self.instances.remove(handle);
            if let Err(e) = world.remove_component::<ScriptBehavior>(entity) {
                log::debug!("Behavior of script that failed to attach already gone: {e}");
            }
            return Err(load_error(match failure {
                CallFailure::Lua(e) => format!("on_attach: {e}"),
                CallFailure::Exhausted(reason) => format!("on_attach: {reason}"),
            }));
        }

        log::debug!("Attached script '{name}' to {entity} as {handle:?}");
        Ok(handle)
    }

    /// Call `callback` on one instance.
    ///
    /// A fault is logged, recorded, and detaches the behavior before being
    /// returned. Calling a callback the script does not define is a no-op.
    pub fn invoke(
        &mut self,
        world: &mut World,
        handle: ScriptHandle,
        callback: &str,
        frame: &ScriptFrame<'_>,
    ) -> Result<(), ScriptError> {
        let (entity, script) = match self.instances.get(handle) {
            Some(instance) => (instance.entity, instance.name.clone()),
            None => return Err(ScriptError::UnknownHandle(handle)),
        };

        let failure = match self.execute(world, handle, callback, frame) {
            Ok(_) => return Ok(()),
            Err(failure) => failure,
        };
        let error = match failure {
            CallFailure::Lua(e) => ScriptError::Runtime {
                handle,
                entity,
                script,
                message: e.to_string(),
            },
            CallFailure::Exhausted(reason) => ScriptError::Timeout {
                handle,
                entity,
                script,
                reason: reason.to_string(),
            },
        };

        log::error!("{error}; detaching behavior");
        self.instances.remove(handle);
        if let Err(e) = world.remove_component::<ScriptBehavior>(entity) {
            log::debug!("Behavior of faulted script already gone: {e}");
        }
        self.record_fault(error.clone());
        Err(error)
    }

    /// Run the per-frame callback of every active behavior in creation order,
    /// then apply the structural changes the scripts queued.
    pub fn run_pass(&mut self, world: &mut World, frame: &ScriptFrame<'_>) -> ScriptPassReport {
        let mut report = ScriptPassReport {
            released: self.release_orphans(world),
            ..ScriptPassReport::default()
        };

        let mut order: Vec<(u64, ScriptHandle)> = Vec::new();
        world.for_each::<ScriptBehavior>(|entity, behavior| {
            if let Ok(sequence) = world.creation_sequence(entity) {
                order.push((sequence, behavior.handle));
            }
        });
        order.sort_unstable_by_key(|(sequence, _)| *sequence);

        let callback = self.config.update_callback.clone();
        for (_, handle) in order {
            if !self.instances.contains_key(handle) {
                continue;
            }
            match self.invoke(world, handle, &callback, frame) {
                Ok(()) => report.invoked += 1,
                Err(e) => report.faults.push(e),
            }
        }

        report.structural_changes = world.apply_commands();
        report.released += self.release_orphans(world);
        report
    }

    /// Detach the behavior on `entity`, calling its `on_detach` first.
    ///
    /// Returns false if the entity had no behavior.
    pub fn detach_script(&mut self, world: &mut World, entity: Entity) -> Result<bool, ScriptError> {
        let handle = match world.get_component::<ScriptBehavior>(entity) {
            Ok(behavior) => behavior.handle,
            Err(EcsError::MissingComponent { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let idle = InputSnapshot::default();
        let frame = ScriptFrame { dt: 0.0, time: 0.0, input: &idle };
        if self.instances.contains_key(handle) {
            if let Err(failure) = self.execute(world, handle, "on_detach", &frame) {
                let message = match failure {
                    CallFailure::Lua(e) => e.to_string(),
                    CallFailure::Exhausted(reason) => reason.to_string(),
                };
                log::warn!("on_detach of {handle:?} failed: {message}");
            }
        }

        self.instances.remove(handle);
        world.remove_component::<ScriptBehavior>(entity)?;
        Ok(true)
    }

    /// Drop instances whose entity was destroyed
    pub fn release_orphans(&mut self, world: &mut World) -> usize {
        let orphans = world.take_orphaned_scripts();
        let mut released = 0;
        for handle in orphans {
            if let Some(instance) = self.instances.remove(handle) {
                log::debug!("Released orphaned script '{}' of {}", instance.name, instance.entity);
                released += 1;
            }
        }
        released
    }

    /// Events scripts emitted since the last call
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Most recent faults, oldest first
    pub fn recent_faults(&self) -> impl Iterator<Item = &ScriptError> {
        self.faults.iter()
    }

    /// Live script instances
    pub fn active_count(&self) -> usize {
        self.instances.len()
    }

    /// Entity an instance is attached to
    pub fn entity_of(&self, handle: ScriptHandle) -> Option<Entity> {
        self.instances.get(handle).map(|instance| instance.entity)
    }

    fn record_fault(&mut self, error: ScriptError) {
        if self.config.fault_history == 0 {
            return;
        }
        while self.faults.len() >= self.config.fault_history {
            self.faults.pop_front();
        }
        self.faults.push_back(error);
    }

    fn resolve_bindings(&self, env: &Table) -> Result<FieldBindings, String> {
        let mut bindings = FieldBindings::default();
        match env.raw_get::<Value>("fields").map_err(|e| e.to_string())? {
            Value::Nil => {
                for (path, access) in self.whitelist.paths() {
                    bindings.grant(path, access);
                }
            }
            Value::Table(declared) => {
                for path in declared.sequence_values::<String>() {
                    let path = path.map_err(|e| format!("fields: {e}"))?;
                    let access = self
                        .whitelist
                        .access(&path)
                        .map_err(|e| format!("field binding '{path}': {e}"))?;
                    bindings.grant(path, access);
                }
            }
            other => return Err(format!("'fields' must be a list, got {}", other.type_name())),
        }
        Ok(bindings)
    }

    /// Run one callback with the host API in scope.
    ///
    /// Returns Ok(false) if the script does not define `callback`.
    fn execute(
        &mut self,
        world: &mut World,
        handle: ScriptHandle,
        callback: &str,
        frame: &ScriptFrame<'_>,
    ) -> Result<bool, CallFailure> {
        let Self {
            lua,
            instances,
            whitelist,
            prefabs,
            events,
            budget,
            ..
        } = self;
        let Some(instance) = instances.get(handle) else {
            return Ok(false);
        };
        let function = match instance.env.raw_get::<Value>(callback) {
            Ok(Value::Function(function)) => function,
            Ok(_) => return Ok(false),
            Err(e) => return Err(CallFailure::Lua(e)),
        };

        let host = Host {
            world: RefCell::new(world),
            whitelist,
            prefabs,
            bindings: &instance.bindings,
            entity: instance.entity,
            frame,
            events: RefCell::new(Vec::new()),
        };
        let result = call_with_budget(lua, *budget, || host.call(lua, &instance.env, &function));
        events.extend(host.events.into_inner());
        result.map(|()| true)
    }
}

/// State the scoped `engine` functions borrow for one call
struct Host<'a, 'w> {
    world: RefCell<&'w mut World>,
    whitelist: &'a FieldWhitelist,
    prefabs: &'a HashMap<String, Prefab>,
    bindings: &'a FieldBindings,
    entity: Entity,
    frame: &'a ScriptFrame<'a>,
    events: RefCell<Vec<Event>>,
}

impl Host<'_, '_> {
    fn call(&self, lua: &Lua, env: &Table, function: &Function) -> mlua::Result<()> {
        lua.scope(|scope| {
            let api = lua.create_table()?;
            api.raw_set("self", entity_to_lua(self.entity))?;
            api.raw_set("dt", self.frame.dt)?;
            api.raw_set("time", self.frame.time)?;
            api.raw_set("input", input_table(lua, self.frame.input)?)?;

            api.raw_set(
                "getField",
                scope.create_function(|lua, (id, path): (i64, String)| self.get_field(lua, id, &path))?,
            )?;
            api.raw_set(
                "setField",
                scope.create_function(|_, (id, path, value): (i64, String, Value)| {
                    self.set_field(id, &path, value)
                })?,
            )?;
            api.raw_set(
                "spawnEntity",
                scope.create_function(|_, template: Option<Table>| self.spawn(template))?,
            )?;
            api.raw_set(
                "destroyEntity",
                scope.create_function(|_, id: i64| self.destroy(id))?,
            )?;
            api.raw_set(
                "emitEvent",
                scope.create_function(|_, (name, payload): (String, Option<Table>)| self.emit(name, payload))?,
            )?;

            env.raw_set("engine", api)?;
            let result = function.call::<()>((entity_to_lua(self.entity), self.frame.dt));
            env.raw_set("engine", Value::Nil)?;
            result
        })
    }

    fn check_binding(&self, path: &str, access: FieldAccess) -> mlua::Result<()> {
        if self.bindings.allows(path, access) {
            Ok(())
        } else {
            Err(mlua::Error::external(FieldError::AccessDenied {
                path: path.to_string(),
                access,
            }))
        }
    }

    fn get_field(&self, lua: &Lua, id: i64, path: &str) -> mlua::Result<Value> {
        self.check_binding(path, FieldAccess::READ)?;
        let world = self.world.borrow();
        let value = self
            .whitelist
            .get(&world, entity_from_lua(id), path)
            .map_err(mlua::Error::external)?;
        to_lua(lua, value)
    }

    fn set_field(&self, id: i64, path: &str, value: Value) -> mlua::Result<()> {
        self.check_binding(path, FieldAccess::WRITE)?;
        let value = from_lua(value, path)?;
        let mut world = self.world.borrow_mut();
        self.whitelist
            .set(&mut world, entity_from_lua(id), path, value)
            .map_err(mlua::Error::external)
    }

    fn spawn(&self, template: Option<Table>) -> mlua::Result<i64> {
        let mut spawn = EntityTemplate::default();
        if let Some(template) = template {
            if let Some(prefab_name) = template.raw_get::<Option<String>>("prefab")? {
                let prefab = self
                    .prefabs
                    .get(&prefab_name)
                    .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown prefab '{prefab_name}'")))?;
                spawn.renderable = Some(prefab.renderable.clone());
                spawn.transform = Transform::identity().with_scale(prefab.scale);
            }
            if let Some(position) = template.raw_get::<Option<Table>>("position")? {
                spawn.transform.set_position(table_to_vec3(&position, "position")?);
            }
            if let Some(parent) = template.raw_get::<Option<i64>>("parent")? {
                spawn.parent = Some(entity_from_lua(parent));
            }
            spawn.name = template.raw_get::<Option<String>>("name")?;
        }

        let entity = self.world.borrow_mut().queue_spawn(spawn);
        log::trace!("{} queued spawn of {entity}", self.entity);
        Ok(entity_to_lua(entity))
    }

    fn destroy(&self, id: i64) -> mlua::Result<bool> {
        let target = entity_from_lua(id);
        let mut world = self.world.borrow_mut();
        let alive = world.is_alive(target);
        world.queue_destroy(target);
        Ok(alive)
    }

    fn emit(&self, name: String, payload: Option<Table>) -> mlua::Result<()> {
        let mut event = Event::new(name, self.frame.time).from_entity(self.entity);
        if let Some(payload) = payload {
            for pair in payload.pairs::<String, Value>() {
                let (key, value) = pair?;
                let value = from_lua(value, &key)?;
                event = event.with_arg(key, value);
            }
        }
        self.events.borrow_mut().push(event);
        Ok(())
    }
}

fn input_table(lua: &Lua, input: &InputSnapshot) -> mlua::Result<Table> {
    let actions = lua.create_table()?;
    for action in input.actions() {
        actions.raw_set(action, true)?;
    }
    let axes = lua.create_table()?;
    for (axis, value) in input.axes() {
        axes.raw_set(axis, value)?;
    }
    let table = lua.create_table()?;
    table.raw_set("actions", actions)?;
    table.raw_set("axes", axes)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::Health;
    use crate::render::ResourceRegistry;
    use approx::assert_relative_eq;

    fn bridge() -> ScriptBridge {
        let config = ScriptingConfig {
            max_instructions: 50_000,
            hook_interval: 100,
            max_wall_time_ms: None,
            ..ScriptingConfig::default()
        };
        ScriptBridge::new(&config).unwrap()
    }

    fn frame(input: &InputSnapshot) -> ScriptFrame<'_> {
        ScriptFrame { dt: 0.5, time: 1.0, input }
    }

    fn scripted_entity(world: &mut World) -> Entity {
        let entity = world.create();
        world.add_component(entity, Transform::identity()).unwrap();
        entity
    }

    const MOVER: &str = r#"
        function on_update(self, dt)
            local p = engine.getField(self, "transform.position")
            engine.setField(self, "transform.position", {x = p.x + dt, y = p.y, z = p.z})
        end
    "#;

    #[test]
    fn test_register_and_update() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let handle = bridge.register_script(&mut world, entity, "mover", MOVER).unwrap();

        assert_eq!(world.get_component::<ScriptBehavior>(entity).unwrap().handle, handle);

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));
        assert_eq!(report.invoked, 1);
        assert!(report.faults.is_empty());
        assert_relative_eq!(world.get_component::<Transform>(entity).unwrap().position().x, 0.5);
    }

    #[test]
    fn test_syntax_error_is_load_error_and_no_behavior() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);

        let err = bridge
            .register_script(&mut world, entity, "broken", "function on_update(")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Load { .. }));
        assert!(!world.has_component::<ScriptBehavior>(entity).unwrap());
        assert_eq!(bridge.active_count(), 0);
    }

    #[test]
    fn test_missing_update_is_load_error() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let err = bridge.register_script(&mut world, entity, "idle", "x = 1").unwrap_err();
        assert!(matches!(err, ScriptError::Load { ref reason, .. } if reason.contains("on_update")));
    }

    #[test]
    fn test_unknown_declared_field_is_load_error() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            fields = { "transform.position", "transform.generation" }
            function on_update(self, dt) end
        "#;
        let err = bridge.register_script(&mut world, entity, "sneaky", source).unwrap_err();
        assert!(matches!(err, ScriptError::Load { ref reason, .. } if reason.contains("transform.generation")));
        assert!(!world.has_component::<ScriptBehavior>(entity).unwrap());
    }

    #[test]
    fn test_undeclared_field_access_is_denied() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        world.add_component(entity, Health::new(10.0)).unwrap();
        let source = r#"
            fields = { "transform.position" }
            function on_update(self, dt)
                engine.setField(self, "health.current", 0)
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "limited", source).unwrap();

        let input = InputSnapshot::default();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { ref message, .. } if message.contains("health.current")));
        assert_eq!(world.get_component::<Health>(entity).unwrap().current, 10.0);
    }

    #[test]
    fn test_read_only_field_rejects_write() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            function on_update(self, dt)
                engine.setField(self, "transform.world_position", {1, 2, 3})
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "writer", source).unwrap();
        let input = InputSnapshot::default();
        assert!(bridge.invoke(&mut world, handle, "on_update", &frame(&input)).is_err());
    }

    #[test]
    fn test_fault_detaches_only_the_faulting_behavior() {
        let mut world = World::new();
        let mut bridge = bridge();
        let first = scripted_entity(&mut world);
        let faulty = scripted_entity(&mut world);
        let last = scripted_entity(&mut world);
        bridge.register_script(&mut world, first, "a", MOVER).unwrap();
        let bad = bridge
            .register_script(&mut world, faulty, "bad", "function on_update() error('kaboom') end")
            .unwrap();
        bridge.register_script(&mut world, last, "c", MOVER).unwrap();

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));

        assert_eq!(report.invoked, 2);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].handle(), Some(bad));
        assert_eq!(report.faults[0].entity(), Some(faulty));
        assert!(!world.has_component::<ScriptBehavior>(faulty).unwrap());
        assert!(world.is_alive(faulty));
        assert_relative_eq!(world.get_component::<Transform>(first).unwrap().position().x, 0.5);
        assert_relative_eq!(world.get_component::<Transform>(last).unwrap().position().x, 0.5);
        assert_eq!(bridge.recent_faults().count(), 1);

        let report = bridge.run_pass(&mut world, &frame(&input));
        assert_eq!(report.invoked, 2);
        assert!(report.faults.is_empty());
    }

    #[test]
    fn test_runaway_script_times_out_even_with_pcall() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            function on_update(self, dt)
                while true do
                    pcall(function() while true do end end)
                end
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "spin", source).unwrap();

        let input = InputSnapshot::default();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(err.is_timeout());
        assert!(!world.has_component::<ScriptBehavior>(entity).unwrap());
    }

    #[test]
    fn test_spawn_and_destroy_are_deferred() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let victim = world.create();

        let mut registry = ResourceRegistry::new();
        let mesh = registry.insert_mesh("cube", crate::render::MeshData::unit_cube());
        let material = registry.insert_material("stone", crate::render::MaterialData::opaque(0));
        bridge.register_prefab(
            "block",
            Prefab {
                renderable: Renderable::new(mesh, material),
                scale: Vec3::new(1.0, 1.0, 1.0),
            },
        );

        let source = format!(
            r#"
            spawned = nil
            function on_update(self, dt)
                spawned = engine.spawnEntity({{ prefab = "block", position = {{ 2, 0, 0 }}, name = "child" }})
                local ok = pcall(engine.getField, spawned, "transform.position")
                engine.emitEvent("spawned", {{ id = spawned, readable = ok }})
                engine.destroyEntity({})
            end
        "#,
            entity_to_lua(victim)
        );
        bridge.register_script(&mut world, entity, "spawner", &source).unwrap();

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));
        assert!(report.faults.is_empty());
        assert_eq!(report.structural_changes, 2);
        assert!(!world.is_alive(victim));

        let events = bridge.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, Some(entity));
        assert_eq!(events[0].get_arg("readable"), Some(&crate::scripting::FieldValue::Bool(false)));
        let Some(crate::scripting::FieldValue::Int(id)) = events[0].get_arg("id") else {
            panic!("spawn id missing");
        };
        let child = entity_from_lua(*id);
        assert!(world.is_alive(child));
        assert_eq!(world.get_component::<Renderable>(child).unwrap().mesh, mesh);
        assert_relative_eq!(world.get_component::<Transform>(child).unwrap().position().x, 2.0);
    }

    #[test]
    fn test_unknown_prefab_is_runtime_fault() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let handle = bridge
            .register_script(
                &mut world,
                entity,
                "spawner",
                "function on_update() engine.spawnEntity({ prefab = 'ghost' }) end",
            )
            .unwrap();
        let input = InputSnapshot::default();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { ref message, .. } if message.contains("ghost")));
        assert_eq!(world.pending_commands(), 0);
    }

    #[test]
    fn test_attach_failure_rolls_back() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = "function on_attach() error('no') end function on_update() end";
        assert!(matches!(
            bridge.register_script(&mut world, entity, "picky", source),
            Err(ScriptError::Load { .. })
        ));
        assert!(!world.has_component::<ScriptBehavior>(entity).unwrap());
        assert_eq!(bridge.active_count(), 0);
    }

    #[test]
    fn test_host_functions_do_not_outlive_call() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            stash = nil
            function on_update(self)
                if stash then stash(self, "transform.position") end
                stash = engine.getField
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "hoarder", source).unwrap();
        let input = InputSnapshot::default();
        bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap();
        assert!(bridge.invoke(&mut world, handle, "on_update", &frame(&input)).is_err());
    }

    #[test]
    fn test_destroyed_entity_releases_instance() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        bridge.register_script(&mut world, entity, "mover", MOVER).unwrap();
        world.destroy(entity);

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));
        assert_eq!(report.released, 1);
        assert_eq!(report.invoked, 0);
        assert_eq!(bridge.active_count(), 0);
    }

    #[test]
    fn test_detach_calls_on_detach() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        world.add_component(entity, Health::new(5.0)).unwrap();
        let source = r#"
            function on_update() end
            function on_detach(self) engine.setField(self, "health.current", 1) end
        "#;
        bridge.register_script(&mut world, entity, "farewell", source).unwrap();

        assert!(bridge.detach_script(&mut world, entity).unwrap());
        assert_eq!(world.get_component::<Health>(entity).unwrap().current, 1.0);
        assert!(!bridge.detach_script(&mut world, entity).unwrap());
    }

    #[test]
    fn test_input_is_visible_to_scripts() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            function on_update(self)
                if engine.input.actions.jump then
                    engine.setField(self, "transform.position", {0, engine.input.axes.lift, 0})
                end
            end
        "#;
        bridge.register_script(&mut world, entity, "jumper", source).unwrap();

        let input = InputSnapshot::new().with_action("jump").with_axis("lift", 0.25);
        bridge.run_pass(&mut world, &frame(&input));
        assert_relative_eq!(world.get_component::<Transform>(entity).unwrap().position().y, 0.25);
    }

    #[test]
    fn test_removing_behavior_component_releases_instance() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        bridge.register_script(&mut world, entity, "mover", MOVER).unwrap();
        world.remove_component::<ScriptBehavior>(entity).unwrap();

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));
        assert_eq!(report.released, 1);
        assert_eq!(report.invoked, 0);
        assert_eq!(bridge.active_count(), 0);
        assert!(world.is_alive(entity));
    }

    #[test]
    fn test_scripts_cannot_tamper_with_each_other() {
        let mut world = World::new();
        let mut bridge = bridge();
        let meddler = scripted_entity(&mut world);
        let victim = scripted_entity(&mut world);
        world.add_component(victim, Health::new(10.0)).unwrap();

        let meddling = r#"
            fields = {}
            local function hijack()
                engine.setField(engine.self, "health.current", 0)
                return function() end
            end
            function on_attach()
                pcall(function() getmetatable(_ENV).__index.ipairs = hijack end)
                pcall(function() getmetatable("").__index.len = hijack end)
                string.len = hijack
                table.insert = hijack
                ipairs = hijack
                shared = "meddler"
            end
            function on_update() end
        "#;
        let innocent = r#"
            fields = { "health.current" }
            function on_update()
                for _ in ipairs({ 1 }) do end
                local n = ("abc"):len() + string.len("ab")
                table.insert({}, n)
                assert(shared == nil)
            end
        "#;
        bridge.register_script(&mut world, meddler, "meddler", meddling).unwrap();
        bridge.register_script(&mut world, victim, "innocent", innocent).unwrap();

        let input = InputSnapshot::default();
        let report = bridge.run_pass(&mut world, &frame(&input));
        assert!(report.faults.is_empty(), "{:?}", report.faults);
        assert_eq!(report.invoked, 2);
        assert_relative_eq!(world.get_component::<Health>(victim).unwrap().current, 10.0);
    }

    #[test]
    fn test_wall_time_limit_times_out_script() {
        let config = ScriptingConfig {
            max_instructions: u64::MAX,
            hook_interval: 100,
            max_wall_time_ms: Some(20),
            ..ScriptingConfig::default()
        };
        let mut bridge = ScriptBridge::new(&config).unwrap();
        let mut world = World::new();
        let entity = scripted_entity(&mut world);
        let handle = bridge
            .register_script(&mut world, entity, "spin", "function on_update() while true do end end")
            .unwrap();

        let input = InputSnapshot::default();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(err.is_timeout());
        assert!(!world.has_component::<ScriptBehavior>(entity).unwrap());
    }

    #[test]
    fn test_explosive_pattern_is_runtime_fault() {
        let mut world = World::new();
        let mut bridge = bridge();
        let entity = scripted_entity(&mut world);
        let source = r#"
            function on_update()
                string.find(string.rep("a", 26), string.rep("a*", 26) .. "b")
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "bomb", source).unwrap();

        let input = InputSnapshot::default();
        let started = std::time::Instant::now();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { ref message, .. } if message.contains("too complex")));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_memory_limit_is_runtime_fault() {
        let config = ScriptingConfig {
            max_instructions: u64::MAX,
            hook_interval: 1_000,
            max_wall_time_ms: None,
            max_memory_bytes: 2 * 1024 * 1024,
            ..ScriptingConfig::default()
        };
        let mut bridge = ScriptBridge::new(&config).unwrap();
        let mut world = World::new();
        let entity = scripted_entity(&mut world);
        let source = r#"
            function on_update()
                local hoard = {}
                for i = 1, 10000000 do hoard[i] = { i } end
            end
        "#;
        let handle = bridge.register_script(&mut world, entity, "hoarder", source).unwrap();

        let input = InputSnapshot::default();
        let err = bridge.invoke(&mut world, handle, "on_update", &frame(&input)).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
        assert_eq!(bridge.active_count(), 0);
    }
}
