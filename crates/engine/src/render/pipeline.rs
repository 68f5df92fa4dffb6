//! Render submission pipeline
//!
//! Reads the entity store after transforms are resolved, builds the frame's
//! render items, culls them against the active camera's frustum, sorts them
//! and submits the resulting draw list. It only ever borrows the world
//! immutably. Nothing that goes wrong in here is returned to the frame loop:
//! missing resources skip the item, backend failures skip the frame's
//! submission, and both are logged.

use super::backend::{DrawCommand, Fence, GpuBackend, RenderTarget};
use super::queue::{RenderItem, RenderPass, RenderQueue};
use super::resources::{Lookup, MaterialId, MeshId, ResourceRegistry};
use super::RenderError;
use crate::config::RenderConfig;
use crate::ecs::components::{Camera, Renderable, Transform};
use crate::ecs::{Entity, World};
use crate::foundation::bounds::Frustum;
use std::collections::HashSet;

/// Resource the pipeline could not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// A mesh id
    Mesh(MeshId),
    /// A material id
    Material(MaterialId),
}

/// Per-frame render statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// Entities with Renderable + Transform
    pub considered: usize,
    /// Skipped because `visible` is false
    pub hidden: usize,
    /// Outside the frustum
    pub culled: usize,
    /// Skipped because a resource is missing
    pub missing: usize,
    /// Skipped because a resource is still loading
    pub pending: usize,
    /// Commands in the submitted list
    pub draw_calls: usize,
    /// The pipeline had to block on the buffer's previous fence
    pub waited_on_fence: bool,
    /// No camera was available
    pub no_camera: bool,
    /// Backend failure, if the submission did not go through
    pub backend_error: Option<String>,
}

#[derive(Debug, Default)]
struct DrawList {
    commands: Vec<DrawCommand>,
    fence: Option<Fence>,
}

/// Builds and submits one draw list per frame
pub struct RenderPipeline {
    backend: Box<dyn GpuBackend>,
    lists: Vec<DrawList>,
    next_list: usize,
    last_list: Option<usize>,
    queue: RenderQueue,
    active_camera: Option<Entity>,
    reported_missing: HashSet<ResourceRef>,
    warned_no_camera: bool,
    max_draw_commands: usize,
}

impl RenderPipeline {
    /// Pipeline submitting to `backend`
    pub fn new(backend: Box<dyn GpuBackend>, config: &RenderConfig) -> Self {
        let list_count = config.frames_in_flight.max(1);
        log::info!("Render pipeline using '{}' backend with {list_count} draw lists", backend.name());
        Self {
            backend,
            lists: (0..list_count).map(|_| DrawList::default()).collect(),
            next_list: 0,
            last_list: None,
            queue: RenderQueue::new(),
            active_camera: None,
            reported_missing: HashSet::new(),
            warned_no_camera: false,
            max_draw_commands: config.max_draw_commands,
        }
    }

    /// Render through `camera`; `None` uses the first camera in the store
    pub fn set_active_camera(&mut self, camera: Option<Entity>) {
        self.active_camera = camera;
    }

    /// Backend, for inspection
    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// Concrete backend, if it is a `B`
    pub fn backend_as<B: GpuBackend + 'static>(&self) -> Option<&B> {
        self.backend.as_any().downcast_ref()
    }

    /// The most recently submitted draw list
    pub fn last_draw_list(&self) -> &[DrawCommand] {
        self.last_list
            .and_then(|index| self.lists.get(index))
            .map_or(&[][..], |list| list.commands.as_slice())
    }

    /// Build, sort and submit this frame's draw list
    pub fn submit(&mut self, world: &World, resources: &ResourceRegistry) -> RenderStats {
        let mut stats = RenderStats::default();
        self.queue.clear();

        match self.find_camera(world) {
            Some((camera, camera_transform)) => {
                if self.warned_no_camera {
                    log::info!("Camera available again");
                    self.warned_no_camera = false;
                }
                self.collect(world, resources, camera, camera_transform, &mut stats);
            }
            None => {
                stats.no_camera = true;
                if !self.warned_no_camera {
                    log::warn!("No active camera; submitting empty draw lists");
                    self.warned_no_camera = true;
                }
            }
        }

        self.queue.sort();
        if self.queue.len() > self.max_draw_commands {
            log::warn!(
                "{} draw commands exceed the limit of {}; dropping the rest",
                self.queue.len(),
                self.max_draw_commands
            );
            self.queue.truncate(self.max_draw_commands);
        }

        self.flush(&mut stats);
        stats
    }

    fn find_camera<'w>(&self, world: &'w World) -> Option<(&'w Camera, &'w Transform)> {
        if let Some(entity) = self.active_camera {
            if let (Ok(camera), Ok(transform)) =
                (world.get_component::<Camera>(entity), world.get_component::<Transform>(entity))
            {
                return Some((camera, transform));
            }
        }

        let mut first = None;
        world.for_each2::<Camera, Transform>(|entity, _, _| {
            first.get_or_insert(entity);
        });
        let entity = first?;
        match (world.get_component::<Camera>(entity), world.get_component::<Transform>(entity)) {
            (Ok(camera), Ok(transform)) => Some((camera, transform)),
            _ => None,
        }
    }

    fn collect(
        &mut self,
        world: &World,
        resources: &ResourceRegistry,
        camera: &Camera,
        camera_transform: &Transform,
        stats: &mut RenderStats,
    ) {
        let frustum = Frustum::from_matrix(&camera.view_projection(camera_transform.world_matrix()));
        let eye = camera_transform.world_position();

        world.for_each2::<Renderable, Transform>(|entity, renderable, transform| {
            stats.considered += 1;
            if !renderable.visible {
                stats.hidden += 1;
                return;
            }

            let mesh = match resources.mesh(renderable.mesh) {
                Lookup::Ready(mesh) => Some(mesh),
                Lookup::Pending => None,
                Lookup::Missing => {
                    self.report_missing(ResourceRef::Mesh(renderable.mesh), resources);
                    stats.missing += 1;
                    return;
                }
            };
            let material = match resources.material(renderable.material) {
                Lookup::Ready(material) => Some(material),
                Lookup::Pending => None,
                Lookup::Missing => {
                    self.report_missing(ResourceRef::Material(renderable.material), resources);
                    stats.missing += 1;
                    return;
                }
            };
            let (Some(mesh), Some(material)) = (mesh, material) else {
                stats.pending += 1;
                return;
            };

            let world_matrix = transform.world_matrix();
            let bounds = mesh.bounds().transformed(world_matrix);
            if !frustum.intersects_aabb(&bounds) {
                stats.culled += 1;
                return;
            }

            self.queue.push(RenderItem {
                entity,
                mesh: renderable.mesh,
                material: renderable.material,
                shader: material.shader,
                transform: *world_matrix,
                depth: (bounds.center() - eye).norm(),
                pass: if material.is_transparent() {
                    RenderPass::Transparent
                } else {
                    RenderPass::Opaque
                },
            });
        });
    }

    fn report_missing(&mut self, resource: ResourceRef, resources: &ResourceRegistry) {
        if !self.reported_missing.insert(resource) {
            return;
        }
        let error = match resource {
            ResourceRef::Mesh(id) => RenderError::ResourceMissing {
                kind: "mesh",
                resource: describe(resources.mesh_name(id), resources.mesh_failure(id), id),
            },
            ResourceRef::Material(id) => RenderError::ResourceMissing {
                kind: "material",
                resource: describe(resources.material_name(id), resources.material_failure(id), id),
            },
        };
        log::warn!("{error}; skipping items that use it");
    }

    fn flush(&mut self, stats: &mut RenderStats) {
        let index = self.next_list;
        if let Some(fence) = self.lists[index].fence {
            if !self.backend.is_retired(fence) {
                stats.waited_on_fence = true;
                if let Err(e) = self.backend.wait(fence) {
                    let error = RenderError::from(e);
                    log::error!("Draw list {index} still in flight: {error}; frame not submitted");
                    stats.backend_error = Some(error.to_string());
                    return;
                }
            }
            self.lists[index].fence = None;
        }

        let list = &mut self.lists[index];
        list.commands.clear();
        list.commands.extend(self.queue.items().iter().map(|item| DrawCommand {
            entity: item.entity,
            mesh: item.mesh,
            material: item.material,
            transform: item.transform,
            target: RenderTarget::Main,
            clip: None,
        }));
        stats.draw_calls = list.commands.len();

        match self.backend.submit(index, &list.commands) {
            Ok(fence) => {
                list.fence = Some(fence);
                self.last_list = Some(index);
                self.next_list = (index + 1) % self.lists.len();
            }
            Err(e) => {
                let error = RenderError::from(e);
                log::error!("Submission of draw list {index} failed: {error}");
                stats.backend_error = Some(error.to_string());
                stats.draw_calls = 0;
            }
        }
    }
}

fn describe(name: Option<&str>, failure: Option<&str>, id: impl std::fmt::Debug) -> String {
    match (name, failure) {
        (Some(name), Some(reason)) => format!("'{name}' ({reason})"),
        (Some(name), None) => format!("'{name}'"),
        (None, _) => format!("{id:?}"),
    }
}
