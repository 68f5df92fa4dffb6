//! Demo scene layout
//!
//! A stone floor, a few dirt blocks (one of them bobbing), a brick pillar
//! with a banner that spins with it, a glass block loaded from disk, an
//! invisible spawner and a camera looking down at the floor.

use crate::blocks::{Block, BlockKind, Palette};
use crate::config::SceneConfig;
use engine::ecs::components::{Camera, Name, Renderable, Transform};
use engine::ecs::Entity;
use engine::foundation::math::{Quat, Vec3};
use engine::render::MaterialId;
use engine::scripting::{FieldAccess, Prefab};
use engine::{EngineContext, EngineResult};

const CAMERA_POSITION: [f32; 3] = [16.0, 10.0, 16.0];
const DIRT_BLOCKS: [[f32; 3]; 4] = [[2.0, 1.0, 3.0], [3.0, 1.0, 3.0], [2.0, 1.0, 4.0], [2.0, 2.0, 3.0]];
const BOBBER: [f32; 3] = [5.0, 2.0, 2.0];
const PILLAR: [f32; 3] = [7.0, 1.0, 7.0];
const PILLAR_HEIGHT: u32 = 3;
const GLASS: [f32; 3] = [4.0, 1.0, 8.0];

/// Entities the demo refers to after setup
#[derive(Debug, Clone)]
pub struct DemoScene {
    /// Block resources
    pub palette: Palette,
    /// Active camera
    pub camera: Entity,
    /// Spinning pillar base
    pub pillar: Entity,
    /// Block orbiting with the pillar
    pub banner: Entity,
    /// Bobbing dirt block
    pub bobber: Entity,
    /// Script-only entity dropping dirt
    pub spawner: Entity,
    /// Glass block whose material loads in the background
    pub glass: Entity,
    /// Floor blocks
    pub floor: Vec<Entity>,
}

/// Populate `context` with the demo scene
pub fn build(context: &mut EngineContext, config: &SceneConfig) -> EngineResult<DemoScene> {
    let palette = Palette::install(&mut context.resources);
    context
        .scripts
        .whitelist_mut()
        .allow::<Block>(&["kind"], FieldAccess::READ)?;
    context.scripts.register_prefab(
        "dirt",
        Prefab {
            renderable: Renderable::new(palette.cube, palette.material(BlockKind::Dirt)),
            scale: Vec3::new(1.0, 1.0, 1.0),
        },
    );

    let mut floor = Vec::new();
    for x in 0..config.floor_size {
        for z in 0..config.floor_size {
            let position = Vec3::new(x as f32, 0.0, z as f32);
            floor.push(spawn_block(context, &palette, BlockKind::Stone, position, "floor")?);
        }
    }
    for position in DIRT_BLOCKS {
        spawn_block(context, &palette, BlockKind::Dirt, Vec3::from(position), "dirt")?;
    }
    let bobber = spawn_block(context, &palette, BlockKind::Dirt, Vec3::from(BOBBER), "bobber")?;

    let pillar = spawn_block(context, &palette, BlockKind::Brick, Vec3::from(PILLAR), "pillar")?;
    for level in 1..=PILLAR_HEIGHT {
        let segment = spawn_block(context, &palette, BlockKind::Brick, Vec3::new(0.0, level as f32, 0.0), "segment")?;
        context.world.attach_child(segment, pillar)?;
    }
    let banner = spawn_block(context, &palette, BlockKind::Dirt, Vec3::new(1.5, PILLAR_HEIGHT as f32, 0.0), "banner")?;
    context.world.attach_child(banner, pillar)?;

    let glass_material = context.load_material("materials/glass.ron")?;
    let glass = spawn(context, &palette, glass_material, Vec3::from(GLASS), "glass")?;

    let spawner = context.world.create();
    context
        .world
        .add_component(spawner, Transform::from_position(Vec3::new(0.0, 6.0, -2.0)))?;
    context.world.add_component(spawner, Name::new("spawner"))?;

    let center = Vec3::new(config.floor_size as f32 / 2.0, 0.0, config.floor_size as f32 / 2.0);
    let camera = spawn_camera(context, Vec3::from(CAMERA_POSITION), center)?;
    context.renderer.set_active_camera(Some(camera));

    if config.scripts {
        context.attach_script_asset(pillar, "scripts/spin.lua")?;
        context.attach_script_asset(bobber, "scripts/bob.lua")?;
        context.attach_script_asset(spawner, "scripts/spawner.lua")?;
    }

    log::info!(
        "Demo scene: {} entities, {} floor blocks",
        context.world.entity_count(),
        floor.len()
    );
    Ok(DemoScene {
        palette,
        camera,
        pillar,
        banner,
        bobber,
        spawner,
        glass,
        floor,
    })
}

fn spawn_block(
    context: &mut EngineContext,
    palette: &Palette,
    kind: BlockKind,
    position: Vec3,
    name: &str,
) -> EngineResult<Entity> {
    let entity = spawn(context, palette, palette.material(kind), position, name)?;
    context.world.add_component(entity, Block { kind })?;
    Ok(entity)
}

fn spawn(
    context: &mut EngineContext,
    palette: &Palette,
    material: MaterialId,
    position: Vec3,
    name: &str,
) -> EngineResult<Entity> {
    let entity = context.world.create();
    context.world.add_component(entity, Transform::from_position(position))?;
    context.world.add_component(entity, Renderable::new(palette.cube, material))?;
    context.world.add_component(entity, Name::new(name))?;
    Ok(entity)
}

fn spawn_camera(context: &mut EngineContext, eye: Vec3, target: Vec3) -> EngineResult<Entity> {
    // Cameras look down local -Z
    let rotation = Quat::face_towards(&(eye - target), &Vec3::y());
    let camera = context.world.create();
    context
        .world
        .add_component(camera, Transform::from_position(eye).with_rotation(rotation))?;
    context
        .world
        .add_component(camera, Camera::perspective(70.0, 16.0 / 9.0, 0.1, 200.0))?;
    context.world.add_component(camera, Name::new("camera"))?;
    Ok(camera)
}
