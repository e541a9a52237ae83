// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Container membership consumed by contained-entity expansion.

use core::fmt;

use rustc_hash::FxHashMap;
use tether_xform::EntityId;

/// A named container and its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    /// Container name, unique per owner.
    pub name: String,
    /// Entities held, in insertion order.
    pub contents: Vec<EntityId>,
}

/// Read access to container membership.
pub trait ContainerAccess {
    /// Whether `entity` owns any containers.
    fn has_containers(&self, entity: EntityId) -> bool;

    /// Containers owned by `entity`.
    fn containers(&self, entity: EntityId) -> &[Container];

    /// Whether `entity` is held by some container.
    fn is_in_container(&self, entity: EntityId) -> bool;
}

/// In-memory container membership.
#[derive(Clone, Default)]
pub struct ContainerRegistry {
    owned: FxHashMap<EntityId, Vec<Container>>,
    held_by: FxHashMap<EntityId, EntityId>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `entity` into `owner`'s container `name`, creating the container if needed.
    ///
    /// Returns `false` if `entity` is already held somewhere or is `owner` itself.
    pub fn insert(&mut self, owner: EntityId, name: &str, entity: EntityId) -> bool {
        if entity == owner || self.held_by.contains_key(&entity) {
            return false;
        }
        let containers = self.owned.entry(owner).or_default();
        match containers.iter_mut().find(|c| c.name == name) {
            Some(c) => c.contents.push(entity),
            None => containers.push(Container {
                name: name.to_owned(),
                contents: vec![entity],
            }),
        }
        self.held_by.insert(entity, owner);
        true
    }

    /// Take `entity` out of whatever container holds it, returning the owner.
    pub fn remove(&mut self, entity: EntityId) -> Option<EntityId> {
        let owner = self.held_by.remove(&entity)?;
        if let Some(containers) = self.owned.get_mut(&owner) {
            for c in containers.iter_mut() {
                c.contents.retain(|e| *e != entity);
            }
        }
        Some(owner)
    }

    /// Owner of the container holding `entity`.
    pub fn holder(&self, entity: EntityId) -> Option<EntityId> {
        self.held_by.get(&entity).copied()
    }

    /// Forget every container `owner` has, returning the entities they held.
    pub fn remove_owner(&mut self, owner: EntityId) -> Vec<EntityId> {
        let released: Vec<_> = self
            .owned
            .remove(&owner)
            .into_iter()
            .flatten()
            .flat_map(|c| c.contents)
            .collect();
        for e in &released {
            self.held_by.remove(e);
        }
        released
    }
}

impl ContainerAccess for ContainerRegistry {
    fn has_containers(&self, entity: EntityId) -> bool {
        self.owned.get(&entity).is_some_and(|c| !c.is_empty())
    }

    fn containers(&self, entity: EntityId) -> &[Container] {
        self.owned.get(&entity).map_or(&[][..], Vec::as_slice)
    }

    fn is_in_container(&self, entity: EntityId) -> bool {
        self.held_by.contains_key(&entity)
    }
}

impl fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerRegistry")
            .field("owners", &self.owned.len())
            .field("held", &self.held_by.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_are_held_once() {
        let mut reg = ContainerRegistry::new();
        let (a, b, c) = (EntityId(1), EntityId(2), EntityId(3));
        assert!(reg.insert(a, "pocket", b));
        assert!(!reg.insert(c, "bag", b));
        assert!(!reg.insert(a, "pocket", a));
        assert!(reg.is_in_container(b));
        assert_eq!(reg.containers(a)[0].contents, [b]);
        assert_eq!(reg.remove(b), Some(a));
        assert!(!reg.is_in_container(b));
        assert!(reg.insert(c, "bag", b));
        assert_eq!(reg.remove_owner(c), [b]);
        assert!(!reg.has_containers(c));
    }
}
