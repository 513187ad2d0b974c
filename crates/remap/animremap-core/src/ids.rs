//! Identifiers and simple allocators for graph entities.

use serde::{Deserialize, Serialize};

/// Identity of a clip asset. Two clips with the same display name are still distinct.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ClipId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StateId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MachineId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TreeId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MenuId(pub u32);

/// Skeleton node identity handed out by a [`crate::skeleton::SkeletonMap`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Monotonic allocator for the arena-backed ids.
/// Each owner (controller, clip library, menu library) keeps its own allocator.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct IdAllocator {
    next_clip: u32,
    next_state: u32,
    next_machine: u32,
    next_tree: u32,
    next_menu: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_clip(&mut self) -> ClipId {
        let id = ClipId(self.next_clip);
        self.next_clip = self.next_clip.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_state(&mut self) -> StateId {
        let id = StateId(self.next_state);
        self.next_state = self.next_state.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_machine(&mut self) -> MachineId {
        let id = MachineId(self.next_machine);
        self.next_machine = self.next_machine.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_tree(&mut self) -> TreeId {
        let id = TreeId(self.next_tree);
        self.next_tree = self.next_tree.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_menu(&mut self) -> MenuId {
        let id = MenuId(self.next_menu);
        self.next_menu = self.next_menu.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
        assert_eq!(alloc.alloc_clip(), ClipId(1));
        assert_eq!(alloc.alloc_state(), StateId(0));
        assert_eq!(alloc.alloc_machine(), MachineId(0));
        assert_eq!(alloc.alloc_machine(), MachineId(1));
        assert_eq!(alloc.alloc_tree(), TreeId(0));
        assert_eq!(alloc.alloc_menu(), MenuId(0));
        assert_eq!(alloc.alloc_state(), StateId(1));
    }
}
