//! GPU-facing resources referenced by renderables
//!
//! Meshes and materials live in slot maps keyed by [`MeshId`] / [`MaterialId`].
//! A slot can be reserved before its data exists (the loader hands out the id
//! immediately and installs the data once the background load completes), so
//! lookups distinguish "still loading" from "gone".

use crate::foundation::bounds::AABB;
use crate::foundation::math::Vec3;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;

slotmap::new_key_type! {
    /// Handle to a mesh in the [`ResourceRegistry`]
    pub struct MeshId;
    /// Handle to a material in the [`ResourceRegistry`]
    pub struct MaterialId;
}

/// Vertex layout uploaded to the GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex from position and normal with zero UVs
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            uv: [0.0, 0.0],
        }
    }
}

/// Triangle mesh
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    /// Vertex buffer
    pub vertices: Vec<Vertex>,
    /// Index buffer, three per triangle
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned cube centred on the origin with side 1
    pub fn unit_cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut mesh = Self::default();
        for (normal, u, v) in FACES {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = [
                    0.5 * (normal[0] + su * u[0] + sv * v[0]),
                    0.5 * (normal[1] + su * u[1] + sv * v[1]),
                    0.5 * (normal[2] + su * u[2] + sv * v[2]),
                ];
                mesh.vertices.push(Vertex::new(position, normal));
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Object-space bounds; a degenerate box at the origin for empty meshes
    pub fn bounds(&self) -> AABB {
        let mut points = self.vertices.iter().map(|v| Vec3::from(v.position));
        let Some(first) = points.next() else {
            return AABB::new(Vec3::zeros(), Vec3::zeros());
        };
        points.fold(AABB::new(first, first), |aabb, p| AABB::new(aabb.min.inf(&p), aabb.max.sup(&p)))
    }

    /// Check that the index buffer describes whole triangles within the vertex buffer
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!("{} indices is not a whole number of triangles", self.indices.len()));
        }
        let count = self.vertices.len() as u32;
        match self.indices.iter().find(|&&index| index >= count) {
            Some(index) => Err(format!("index {index} out of range for {count} vertices")),
            None => Ok(()),
        }
    }

    /// Triangle count
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// How a material is blended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Depth-tested, written in any order
    #[default]
    Opaque,
    /// Alpha-blended, drawn back to front
    Transparent,
}

/// Shading parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialData {
    /// Shader program the material binds
    pub shader: u32,
    /// Base color (RGBA)
    #[serde(default = "white")]
    pub base_color: [f32; 4],
    /// Blend mode
    #[serde(default)]
    pub blend: BlendMode,
}

fn white() -> [f32; 4] {
    [1.0; 4]
}

impl MaterialData {
    /// Opaque white material using `shader`
    pub fn opaque(shader: u32) -> Self {
        Self {
            shader,
            base_color: white(),
            blend: BlendMode::Opaque,
        }
    }

    /// Transparent material using `shader`
    pub fn transparent(shader: u32) -> Self {
        Self {
            blend: BlendMode::Transparent,
            ..Self::opaque(shader)
        }
    }

    /// Builder pattern: set the base color
    pub fn with_color(mut self, r: f32, g: f32, b: f32, a: f32) -> Self {
        self.base_color = [r, g, b, a];
        self
    }

    /// Whether items using this material need depth sorting
    pub fn is_transparent(&self) -> bool {
        self.blend == BlendMode::Transparent
    }
}

/// Result of looking up a resource by id
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, T> {
    /// Loaded and usable
    Ready(&'a T),
    /// Reserved, data not installed yet
    Pending,
    /// Unknown id, removed, or the load failed
    Missing,
}

#[derive(Debug)]
enum SlotState<T> {
    Pending,
    Ready(T),
    Failed(String),
}

#[derive(Debug)]
struct Slot<T> {
    name: String,
    state: SlotState<T>,
}

impl<T> Slot<T> {
    fn lookup(&self) -> Lookup<'_, T> {
        match &self.state {
            SlotState::Ready(data) => Lookup::Ready(data),
            SlotState::Pending => Lookup::Pending,
            SlotState::Failed(_) => Lookup::Missing,
        }
    }
}

/// Named table of one resource kind
#[derive(Debug)]
struct Table<K: slotmap::Key, T> {
    slots: SlotMap<K, Slot<T>>,
    by_name: HashMap<String, K>,
}

impl<K: slotmap::Key, T> Default for Table<K, T> {
    fn default() -> Self {
        Self {
            slots: SlotMap::with_key(),
            by_name: HashMap::new(),
        }
    }
}

impl<K: slotmap::Key, T> Table<K, T> {
    fn add(&mut self, name: &str, state: SlotState<T>) -> K {
        let key = self.slots.insert(Slot {
            name: name.to_string(),
            state,
        });
        if let Some(previous) = self.by_name.insert(name.to_string(), key) {
            log::debug!("Resource name '{name}' now refers to a new slot ({previous:?} shadowed)");
        }
        key
    }

    fn set(&mut self, key: K, state: SlotState<T>) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.state = state;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: K) -> bool {
        let Some(slot) = self.slots.remove(key) else {
            return false;
        };
        if self.by_name.get(&slot.name) == Some(&key) {
            self.by_name.remove(&slot.name);
        }
        true
    }

    fn lookup(&self, key: K) -> Lookup<'_, T> {
        self.slots.get(key).map_or(Lookup::Missing, Slot::lookup)
    }

    fn name(&self, key: K) -> Option<&str> {
        self.slots.get(key).map(|slot| slot.name.as_str())
    }

    fn failure(&self, key: K) -> Option<&str> {
        match &self.slots.get(key)?.state {
            SlotState::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    fn ready_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.state, SlotState::Ready(_)))
            .count()
    }
}

/// Every mesh and material the renderer can reference
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    meshes: Table<MeshId, MeshData>,
    materials: Table<MaterialId, MaterialData>,
}

impl ResourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loaded mesh
    pub fn insert_mesh(&mut self, name: &str, mesh: MeshData) -> MeshId {
        self.meshes.add(name, SlotState::Ready(mesh))
    }

    /// Add a loaded material
    pub fn insert_material(&mut self, name: &str, material: MaterialData) -> MaterialId {
        self.materials.add(name, SlotState::Ready(material))
    }

    /// Reserve a mesh id whose data arrives later
    pub fn reserve_mesh(&mut self, name: &str) -> MeshId {
        self.meshes.add(name, SlotState::Pending)
    }

    /// Reserve a material id whose data arrives later
    pub fn reserve_material(&mut self, name: &str) -> MaterialId {
        self.materials.add(name, SlotState::Pending)
    }

    /// Install data into a reserved mesh slot. False if the id is gone.
    pub fn install_mesh(&mut self, id: MeshId, mesh: MeshData) -> bool {
        self.meshes.set(id, SlotState::Ready(mesh))
    }

    /// Install data into a reserved material slot. False if the id is gone.
    pub fn install_material(&mut self, id: MaterialId, material: MaterialData) -> bool {
        self.materials.set(id, SlotState::Ready(material))
    }

    /// Mark a mesh load as failed
    pub fn fail_mesh(&mut self, id: MeshId, reason: String) -> bool {
        self.meshes.set(id, SlotState::Failed(reason))
    }

    /// Mark a material load as failed
    pub fn fail_material(&mut self, id: MaterialId, reason: String) -> bool {
        self.materials.set(id, SlotState::Failed(reason))
    }

    /// Drop a mesh
    pub fn remove_mesh(&mut self, id: MeshId) -> bool {
        self.meshes.remove(id)
    }

    /// Drop a material
    pub fn remove_material(&mut self, id: MaterialId) -> bool {
        self.materials.remove(id)
    }

    /// Look up a mesh
    pub fn mesh(&self, id: MeshId) -> Lookup<'_, MeshData> {
        self.meshes.lookup(id)
    }

    /// Look up a material
    pub fn material(&self, id: MaterialId) -> Lookup<'_, MaterialData> {
        self.materials.lookup(id)
    }

    /// Mesh id by name
    pub fn mesh_id(&self, name: &str) -> Option<MeshId> {
        self.meshes.by_name.get(name).copied()
    }

    /// Material id by name
    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.materials.by_name.get(name).copied()
    }

    /// Name a mesh was registered under
    pub fn mesh_name(&self, id: MeshId) -> Option<&str> {
        self.meshes.name(id)
    }

    /// Name a material was registered under
    pub fn material_name(&self, id: MaterialId) -> Option<&str> {
        self.materials.name(id)
    }

    /// Why a mesh load failed
    pub fn mesh_failure(&self, id: MeshId) -> Option<&str> {
        self.meshes.failure(id)
    }

    /// Why a material load failed
    pub fn material_failure(&self, id: MaterialId) -> Option<&str> {
        self.materials.failure(id)
    }

    /// Loaded meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.ready_count()
    }

    /// Loaded materials
    pub fn material_count(&self) -> usize {
        self.materials.ready_count()
    }
}
