//! Explicit ownership of GPU handles.
//!
//! Nothing is collected automatically: every buffer, texture and program a
//! backend creates is registered here and must come back out through
//! [`ResourceRegistry::release`] or [`ResourceRegistry::release_all`].

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub index: u64,
}

#[derive(Debug)]
pub struct ResourceRegistry<H> {
    next_index: u64,
    live: BTreeMap<ResourceId, H>,
}

impl<H> Default for ResourceRegistry<H> {
    fn default() -> Self {
        Self {
            next_index: 0,
            live: BTreeMap::new(),
        }
    }
}

impl<H> ResourceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, handle: H) -> ResourceId {
        self.next_index += 1;
        let id = ResourceId {
            kind,
            index: self.next_index,
        };
        self.live.insert(id, handle);
        id
    }

    pub fn get(&self, id: ResourceId) -> Option<&H> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut H> {
        self.live.get_mut(&id)
    }

    /// Hands the handle back for deletion. `None` if already released.
    pub fn release(&mut self, id: ResourceId) -> Option<H> {
        self.live.remove(&id)
    }

    /// Every outstanding handle, buffers first, then textures, then programs.
    pub fn release_all(&mut self) -> Vec<(ResourceId, H)> {
        std::mem::take(&mut self.live).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.live.keys().filter(|id| id.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_returns_each_handle_once() {
        let mut reg = ResourceRegistry::new();
        let a = reg.register(ResourceKind::Buffer, "arc-positions");
        let b = reg.register(ResourceKind::Buffer, "arc-alphas");
        assert_ne!(a, b);
        assert_eq!(reg.release(a), Some("arc-positions"));
        assert_eq!(reg.release(a), None);
        assert_eq!(reg.get(b), Some(&"arc-alphas"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn teardown_drains_everything_in_kind_order() {
        let mut reg = ResourceRegistry::new();
        reg.register(ResourceKind::Program, "earth");
        reg.register(ResourceKind::Texture, "countries");
        reg.register(ResourceKind::Buffer, "sphere");
        reg.register(ResourceKind::Program, "arc");
        assert_eq!(reg.count(ResourceKind::Program), 2);

        let released: Vec<_> = reg.release_all().into_iter().map(|(_, h)| h).collect();
        assert_eq!(released, vec!["sphere", "countries", "earth", "arc"]);
        assert!(reg.is_empty());
        assert!(reg.release_all().is_empty());
    }
}
