//! Voxel blocks: kinds, the block component and their render resources

use engine::ecs::Component;
use engine::render::{MaterialData, MaterialId, MeshData, MeshId, ResourceRegistry};
use engine::scripting::{FieldAccess, FieldError, FieldValue, Reflect};
use std::collections::HashMap;

/// Block material kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Floor
    Stone,
    /// Loose blocks
    Dirt,
    /// The pillar
    Brick,
}

impl BlockKind {
    /// Every kind
    pub const ALL: [BlockKind; 3] = [BlockKind::Stone, BlockKind::Dirt, BlockKind::Brick];

    /// Name used for resources and scripts
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Stone => "stone",
            BlockKind::Dirt => "dirt",
            BlockKind::Brick => "brick",
        }
    }

    fn material(self) -> MaterialData {
        match self {
            BlockKind::Stone => MaterialData::opaque(0).with_color(0.5, 0.5, 0.5, 1.0),
            BlockKind::Dirt => MaterialData::opaque(0).with_color(0.55, 0.35, 0.2, 1.0),
            BlockKind::Brick => MaterialData::opaque(0).with_color(0.7, 0.25, 0.2, 1.0),
        }
    }
}

/// Marks an entity as a voxel block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// What the block is made of
    pub kind: BlockKind,
}

impl Component for Block {}

impl Reflect for Block {
    const TYPE_NAME: &'static str = "block";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[("kind", FieldAccess::READ)];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        (field == "kind").then(|| FieldValue::Text(self.kind.name().to_string()))
    }

    fn set_field(&mut self, field: &str, _value: FieldValue) -> Result<(), FieldError> {
        match field {
            "kind" => Err(FieldError::ReadOnly(format!("block.{field}"))),
            _ => Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
    }
}

/// Shared cube mesh plus one material per block kind
#[derive(Debug, Clone)]
pub struct Palette {
    /// Unit cube
    pub cube: MeshId,
    materials: HashMap<BlockKind, MaterialId>,
}

impl Palette {
    /// Register the cube and the block materials
    pub fn install(resources: &mut ResourceRegistry) -> Self {
        let cube = resources.insert_mesh("block", MeshData::unit_cube());
        let materials = BlockKind::ALL
            .iter()
            .map(|&kind| (kind, resources.insert_material(kind.name(), kind.material())))
            .collect();
        Self { cube, materials }
    }

    /// Material for `kind`
    pub fn material(&self, kind: BlockKind) -> MaterialId {
        self.materials[&kind]
    }
}
