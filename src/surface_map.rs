//! The per-client scene graph: a flat table of surfaces plus the
//! attachment edge that places each one under a parent, or at the root.
//!
//! Attachment is tracked at the id level rather than with pointers so
//! that restructuring (`attach`) can be validated with a cheap
//! ancestor-walk cycle check instead of needing a borrow-checker-proof
//! tree type.

use std::collections::HashMap;

use crate::error::ClientProtocolError;
use crate::geometry::V2;
use crate::ids::SurfaceId;
use crate::surface::{BackendSurfaceHandle, ChildRef, Surface};

/// Where a surface sits in its client's scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Not anyone's child; this is a root surface (a toplevel or an
    /// unparented popup).
    Root,
    /// A direct child of the named surface.
    Child(SurfaceId),
}

/// One client's surfaces, keyed by [`SurfaceId`].
#[derive(Debug, Default)]
pub struct SurfaceMap {
    entries: HashMap<SurfaceId, (Surface, Attachment)>,
}

impl SurfaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SurfaceId, backend: BackendSurfaceHandle) {
        self.entries.insert(id, (Surface::new(backend), Attachment::Root));
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn lookup(&self, id: SurfaceId) -> Option<&Surface> {
        self.entries.get(&id).map(|(s, _)| s)
    }

    pub fn lookup_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.entries.get_mut(&id).map(|(s, _)| s)
    }

    pub fn attachment_of(&self, id: SurfaceId) -> Option<Attachment> {
        self.entries.get(&id).map(|(_, a)| *a)
    }

    /// Every surface id currently in the map, in arbitrary order.
    pub fn all_ids(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.entries.keys().copied()
    }

    /// Every backend handle in the map. Used on client disconnect to
    /// request destruction of each surface's backend resources.
    pub fn all_handles(&self) -> impl Iterator<Item = BackendSurfaceHandle> + '_ {
        self.entries.values().map(|(s, _)| s.backend)
    }

    /// Mutates a surface's state in place, erroring if it doesn't exist.
    pub fn modify_state<F: FnOnce(&mut crate::surface::SurfaceState)>(
        &mut self,
        id: SurfaceId,
        f: F,
    ) -> Result<(), ClientProtocolError> {
        let (surface, _) = self
            .entries
            .get_mut(&id)
            .ok_or(ClientProtocolError::BadSurface)?;
        f(&mut surface.state);
        Ok(())
    }

    /// Removes a surface. Its direct children are promoted to root
    /// rather than orphaned, and it is unlinked from whichever parent's
    /// child list referenced it.
    pub fn delete(&mut self, id: SurfaceId) -> Result<(), ClientProtocolError> {
        let (_, attachment) = self
            .entries
            .remove(&id)
            .ok_or(ClientProtocolError::BadSurface)?;

        if let Attachment::Child(parent) = attachment {
            if let Some((parent_surface, _)) = self.entries.get_mut(&parent) {
                parent_surface.state.children_below.retain(|c| c.id != id);
                parent_surface.state.children_above.retain(|c| c.id != id);
            }
        }

        let orphaned: Vec<SurfaceId> = self
            .entries
            .iter()
            .filter(|(_, (_, a))| *a == Attachment::Child(id))
            .map(|(sid, _)| *sid)
            .collect();
        for child in orphaned {
            if let Some((_, a)) = self.entries.get_mut(&child) {
                *a = Attachment::Root;
            }
        }

        Ok(())
    }

    /// True if `ancestor` is `descendant` or a (possibly indirect)
    /// parent of it. Walks up the attachment chain, which is always
    /// finite since attachment is acyclic by construction.
    fn is_ancestor(&self, ancestor: SurfaceId, descendant: SurfaceId) -> bool {
        let mut cur = descendant;
        loop {
            if cur == ancestor {
                return true;
            }
            match self.attachment_of(cur) {
                Some(Attachment::Child(parent)) => cur = parent,
                _ => return false,
            }
        }
    }

    /// Detaches `child` from its current parent (if any), then, if
    /// `parent` is given, splices it in below or above that parent.
    /// Passing `None` simply detaches `child` into its own root, with no
    /// reparenting. Rejects attaching a surface under itself or one of
    /// its own descendants, which would create a cycle.
    pub fn attach(
        &mut self,
        child: SurfaceId,
        parent: Option<SurfaceId>,
        offset: V2<i32>,
        above: bool,
    ) -> Result<(), ClientProtocolError> {
        if !self.entries.contains_key(&child) {
            return Err(ClientProtocolError::BadSurface);
        }
        let Some(parent) = parent else {
            self.detach(child);
            return Ok(());
        };
        if !self.entries.contains_key(&parent) {
            return Err(ClientProtocolError::BadSurface);
        }
        if self.is_ancestor(child, parent) {
            return Err(ClientProtocolError::BadSurface);
        }

        self.detach(child);

        if let Some((parent_surface, _)) = self.entries.get_mut(&parent) {
            let list = if above {
                &mut parent_surface.state.children_above
            } else {
                &mut parent_surface.state.children_below
            };
            list.push(ChildRef::new(child, offset));
        }
        if let Some((_, attachment)) = self.entries.get_mut(&child) {
            *attachment = Attachment::Child(parent);
        }
        Ok(())
    }

    /// Unlinks `id` from its current parent's child lists and marks it
    /// as a root. No-op if it's already a root or doesn't exist.
    pub fn detach(&mut self, id: SurfaceId) {
        if let Some(Attachment::Child(old_parent)) = self.attachment_of(id) {
            if let Some((parent_surface, _)) = self.entries.get_mut(&old_parent) {
                parent_surface.state.children_below.retain(|c| c.id != id);
                parent_surface.state.children_above.retain(|c| c.id != id);
            }
        }
        if let Some((_, attachment)) = self.entries.get_mut(&id) {
            *attachment = Attachment::Root;
        }
    }

    /// Flattens the stacking order rooted at `id` into a depth-first,
    /// below-then-node-then-above traversal, pairing each surface's
    /// backend handle with its offset from `root_offset`.
    pub fn lookup_all(&self, root_offset: V2<i32>, id: SurfaceId) -> Vec<(V2<i32>, BackendSurfaceHandle)> {
        let mut out = Vec::new();
        self.walk(id, root_offset, &mut out);
        out
    }

    /// Same traversal as [`lookup_all`](Self::lookup_all), but yielding
    /// surface ids instead of backend handles.
    pub fn lookup_all_ids(&self, id: SurfaceId) -> Vec<SurfaceId> {
        let mut out = Vec::new();
        self.walk_ids(id, &mut out);
        out
    }

    fn walk(&self, id: SurfaceId, offset: V2<i32>, out: &mut Vec<(V2<i32>, BackendSurfaceHandle)>) {
        let Some((surface, _)) = self.entries.get(&id) else {
            return;
        };
        for child in &surface.state.children_below {
            self.walk(child.id, offset + child.offset, out);
        }
        out.push((offset, surface.backend));
        for child in &surface.state.children_above {
            self.walk(child.id, offset + child.offset, out);
        }
    }

    fn walk_ids(&self, id: SurfaceId, out: &mut Vec<SurfaceId>) {
        let Some((surface, _)) = self.entries.get(&id) else {
            return;
        };
        for child in &surface.state.children_below {
            self.walk_ids(child.id, out);
        }
        out.push(id);
        for child in &surface.state.children_above {
            self.walk_ids(child.id, out);
        }
    }
}
