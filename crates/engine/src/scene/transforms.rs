//! World transform propagation
//!
//! Walks the hierarchy forest breadth first with an explicit worklist. A node
//! is recomputed when its own local state is dirty or an ancestor was
//! recomputed this pass; everything else keeps its cached world matrix.
//! Entities without a [`Transform`] pass their parent's matrix through.

use crate::ecs::components::Transform;
use crate::ecs::{Entity, World};
use crate::foundation::math::Mat4;
use std::collections::VecDeque;

struct Pending {
    entity: Entity,
    parent_world: Mat4,
    parent_changed: bool,
}

/// Recompute dirty world matrices; returns how many were recomputed
pub fn resolve_transforms(world: &mut World) -> usize {
    let mut worklist: VecDeque<Pending> = world
        .roots()
        .into_iter()
        .map(|entity| Pending {
            entity,
            parent_world: Mat4::identity(),
            parent_changed: false,
        })
        .collect();
    let mut recomputed = 0;

    while let Some(Pending {
        entity,
        parent_world,
        parent_changed,
    }) = worklist.pop_front()
    {
        let (world_matrix, changed) = match world.get_component_mut::<Transform>(entity) {
            Ok(transform) if parent_changed || transform.is_dirty() => {
                transform.resolve(&parent_world);
                recomputed += 1;
                (*transform.world_matrix(), true)
            }
            Ok(transform) => (*transform.world_matrix(), false),
            Err(_) => (parent_world, parent_changed),
        };

        let Ok(children) = world.children_of(entity) else {
            continue;
        };
        worklist.extend(children.iter().map(|&child| Pending {
            entity: child,
            parent_world: world_matrix,
            parent_changed: changed,
        }));
    }

    if recomputed > 0 {
        log::trace!("Recomputed {recomputed} world transforms");
    }
    recomputed
}

/// Reset the per-frame `changed` flags
pub fn clear_frame_flags(world: &mut World) {
    world.for_each_mut::<Transform>(|_, transform| transform.clear_frame_flags());
}
