//! Parent/child relation over entities
//!
//! The hierarchy is a forest stored as two maps keyed by entity id; there are
//! no pointers between nodes. Attaching checks the acyclic invariant up front.

use super::{EcsError, Entity};
use std::collections::{HashMap, VecDeque};

/// Scene graph forest
#[derive(Debug, Default)]
pub struct Hierarchy {
    parents: HashMap<Entity, Entity>,
    children: HashMap<Entity, Vec<Entity>>,
}

impl Hierarchy {
    /// Make `child` a child of `parent`, moving it from any previous parent.
    ///
    /// Fails with [`EcsError::Cycle`] if `parent` is `child` or one of its
    /// descendants; the hierarchy is left untouched in that case.
    pub fn attach(&mut self, child: Entity, parent: Entity) -> Result<(), EcsError> {
        if self.is_ancestor_or_self(child, parent) {
            return Err(EcsError::Cycle { child, parent });
        }

        self.detach(child);
        self.parents.insert(child, parent);
        self.children.entry(parent).or_default().push(child);
        Ok(())
    }

    /// Make `child` a root again. Returns the previous parent.
    pub fn detach(&mut self, child: Entity) -> Option<Entity> {
        let parent = self.parents.remove(&child)?;
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|&sibling| sibling != child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
        Some(parent)
    }

    /// Parent of an entity, if it has one
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.parents.get(&entity).copied()
    }

    /// Direct children in attach order
    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.children.get(&entity).map_or(&[][..], Vec::as_slice)
    }

    /// True if `ancestor` is `node` or lies on the path from `node` to its root
    pub fn is_ancestor_or_self(&self, ancestor: Entity, node: Entity) -> bool {
        let mut current = Some(node);
        while let Some(entity) = current {
            if entity == ancestor {
                return true;
            }
            current = self.parent(entity);
        }
        false
    }

    /// `root` followed by all of its descendants, breadth first
    pub fn subtree(&self, root: Entity) -> Vec<Entity> {
        let mut ordered = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(entity) = queue.pop_front() {
            ordered.push(entity);
            queue.extend(self.children(entity).iter().copied());
        }
        ordered
    }

    /// Forget an entity entirely: unlink it from its parent and orphan its children.
    pub(crate) fn remove(&mut self, entity: Entity) {
        self.detach(entity);
        if let Some(children) = self.children.remove(&entity) {
            for child in children {
                self.parents.remove(&child);
            }
        }
    }

    /// Number of parent links
    pub fn link_count(&self) -> usize {
        self.parents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.create()).collect()
    }

    #[test]
    fn test_attach_and_reparent() {
        let e = entities(3);
        let mut graph = Hierarchy::default();

        graph.attach(e[1], e[0]).unwrap();
        assert_eq!(graph.parent(e[1]), Some(e[0]));
        assert_eq!(graph.children(e[0]), &[e[1]]);

        graph.attach(e[1], e[2]).unwrap();
        assert_eq!(graph.parent(e[1]), Some(e[2]));
        assert!(graph.children(e[0]).is_empty());
    }

    #[test]
    fn test_self_attach_is_cycle() {
        let e = entities(1);
        let mut graph = Hierarchy::default();
        assert!(matches!(graph.attach(e[0], e[0]), Err(EcsError::Cycle { .. })));
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_attach_under_descendant_is_rejected_and_graph_unchanged() {
        let e = entities(4);
        let mut graph = Hierarchy::default();
        graph.attach(e[1], e[0]).unwrap();
        graph.attach(e[2], e[1]).unwrap();
        graph.attach(e[3], e[2]).unwrap();

        for descendant in [e[1], e[2], e[3]] {
            let err = graph.attach(e[0], descendant).unwrap_err();
            assert!(matches!(err, EcsError::Cycle { child, parent } if child == e[0] && parent == descendant));
        }

        assert_eq!(graph.parent(e[0]), None);
        assert_eq!(graph.parent(e[1]), Some(e[0]));
        assert_eq!(graph.parent(e[2]), Some(e[1]));
        assert_eq!(graph.parent(e[3]), Some(e[2]));
        assert_eq!(graph.link_count(), 3);
    }

    #[test]
    fn test_subtree_is_breadth_first() {
        let e = entities(4);
        let mut graph = Hierarchy::default();
        graph.attach(e[1], e[0]).unwrap();
        graph.attach(e[2], e[0]).unwrap();
        graph.attach(e[3], e[1]).unwrap();

        assert_eq!(graph.subtree(e[0]), vec![e[0], e[1], e[2], e[3]]);
    }

    #[test]
    fn test_remove_orphans_children() {
        let e = entities(3);
        let mut graph = Hierarchy::default();
        graph.attach(e[1], e[0]).unwrap();
        graph.attach(e[2], e[1]).unwrap();

        graph.remove(e[1]);
        assert_eq!(graph.parent(e[2]), None);
        assert!(graph.children(e[0]).is_empty());
    }
}
