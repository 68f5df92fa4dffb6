//! # Render Queue
//!
//! Collects the frame's [`RenderItem`]s and orders them to minimise GPU state
//! changes. Items are rebuilt every frame and never outlive the submission
//! that produced them.
//!
//! ## Ordering
//!
//! - Opaque pass first, then the transparent pass
//! - Within a pass: shader, then material, then mesh
//! - Transparent items sharing shader/material/mesh are drawn back to front
//! - Entity id breaks any remaining tie, so the order is deterministic

use super::resources::{MaterialId, MeshId};
use crate::ecs::Entity;
use crate::foundation::math::Mat4;
use std::cmp::Ordering;

/// Render pass an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPass {
    /// Depth-tested geometry
    Opaque,
    /// Alpha-blended geometry, depth sorted
    Transparent,
}

/// Draw-ready record for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    /// Source entity
    pub entity: Entity,
    /// Mesh to draw
    pub mesh: MeshId,
    /// Material to bind
    pub material: MaterialId,
    /// Shader the material uses
    pub shader: u32,
    /// Resolved world matrix
    pub transform: Mat4,
    /// Distance from the camera
    pub depth: f32,
    /// Pass the material selects
    pub pass: RenderPass,
}

impl RenderItem {
    /// State-change ordering described in the module docs
    pub fn draw_order(&self, other: &Self) -> Ordering {
        self.pass
            .cmp(&other.pass)
            .then(self.shader.cmp(&other.shader))
            .then(self.material.cmp(&other.material))
            .then(self.mesh.cmp(&other.mesh))
            .then_with(|| match self.pass {
                RenderPass::Transparent => other.depth.total_cmp(&self.depth),
                RenderPass::Opaque => Ordering::Equal,
            })
            .then(self.entity.cmp(&other.entity))
    }
}

/// Per-frame list of render items
#[derive(Debug, Default)]
pub struct RenderQueue {
    items: Vec<RenderItem>,
}

impl RenderQueue {
    /// Create a new empty render queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a render queue with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Add an item
    pub fn push(&mut self, item: RenderItem) {
        self.items.push(item);
    }

    /// Sort into draw order
    pub fn sort(&mut self) {
        self.items.sort_by(RenderItem::draw_order);
    }

    /// Drop everything past `len`
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Items in their current order
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    /// Get total number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clear all items for the next frame, keeping the allocation
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;
    use crate::render::{MaterialData, MeshData, ResourceRegistry};

    struct Fixture {
        world: World,
        registry: ResourceRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                world: World::new(),
                registry: ResourceRegistry::new(),
            }
        }

        fn item(&mut self, mesh: MeshId, material: MaterialId, shader: u32, depth: f32, pass: RenderPass) -> RenderItem {
            RenderItem {
                entity: self.world.create(),
                mesh,
                material,
                shader,
                transform: Mat4::identity(),
                depth,
                pass,
            }
        }
    }

    #[test]
    fn test_same_material_items_are_contiguous() {
        let mut f = Fixture::new();
        let mesh1 = f.registry.insert_mesh("1", MeshData::unit_cube());
        let mesh2 = f.registry.insert_mesh("2", MeshData::unit_cube());
        let a = f.registry.insert_material("A", MaterialData::opaque(0));
        let b = f.registry.insert_material("B", MaterialData::opaque(0));

        let mut queue = RenderQueue::new();
        queue.push(f.item(mesh1, a, 0, 1.0, RenderPass::Opaque));
        queue.push(f.item(mesh1, b, 0, 2.0, RenderPass::Opaque));
        queue.push(f.item(mesh2, a, 0, 3.0, RenderPass::Opaque));
        queue.sort();

        let materials: Vec<MaterialId> = queue.items().iter().map(|item| item.material).collect();
        let first_b = materials.iter().position(|&m| m == b).unwrap();
        let a_positions: Vec<usize> = (0..materials.len()).filter(|&i| materials[i] == a).collect();
        assert_eq!(a_positions.len(), 2);
        assert_eq!(a_positions[1] - a_positions[0], 1);
        assert!(first_b == 0 || first_b == 2);
    }

    #[test]
    fn test_transparent_back_to_front_after_opaque() {
        let mut f = Fixture::new();
        let mesh = f.registry.insert_mesh("m", MeshData::unit_cube());
        let glass = f.registry.insert_material("glass", MaterialData::transparent(0));
        let stone = f.registry.insert_material("stone", MaterialData::opaque(5));

        let mut queue = RenderQueue::new();
        queue.push(f.item(mesh, glass, 0, 2.0, RenderPass::Transparent));
        queue.push(f.item(mesh, glass, 0, 9.0, RenderPass::Transparent));
        queue.push(f.item(mesh, stone, 5, 4.0, RenderPass::Opaque));
        queue.sort();

        let order: Vec<(RenderPass, f32)> = queue.items().iter().map(|i| (i.pass, i.depth)).collect();
        assert_eq!(
            order,
            vec![(RenderPass::Opaque, 4.0), (RenderPass::Transparent, 9.0), (RenderPass::Transparent, 2.0)]
        );
    }

    #[test]
    fn test_entity_breaks_ties() {
        let mut f = Fixture::new();
        let mesh = f.registry.insert_mesh("m", MeshData::unit_cube());
        let stone = f.registry.insert_material("stone", MaterialData::opaque(0));

        let first = f.item(mesh, stone, 0, 7.0, RenderPass::Opaque);
        let second = f.item(mesh, stone, 0, 1.0, RenderPass::Opaque);
        let mut queue = RenderQueue::new();
        queue.push(second.clone());
        queue.push(first.clone());
        queue.sort();

        assert_eq!(queue.items()[0].entity, first.entity);
        assert_eq!(queue.items()[1].entity, second.entity);
    }

    #[test]
    fn test_clear_queue() {
        let mut f = Fixture::new();
        let mesh = f.registry.insert_mesh("m", MeshData::unit_cube());
        let stone = f.registry.insert_material("stone", MaterialData::opaque(0));
        let mut queue = RenderQueue::with_capacity(4);
        queue.push(f.item(mesh, stone, 0, 1.0, RenderPass::Opaque));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
    }
}
