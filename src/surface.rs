//! The committed/pending content model of a single surface: buffers,
//! damage, the subsurface stacking lists, and the optional window state
//! that promotes a surface to a mapped window.

use crate::geometry::{Rect, V2};
use crate::ids::{ClientId, SurfaceId};

/// The raw `wl_shm` format code, left opaque: pixel format is a handle
/// detail, not a concern of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferFormat(pub u32);

/// An opaque owned handle to pixel data. Ownership lives with the client
/// that attached it until the backend signals `BufferReleased`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub id: BufferId,
    pub format: BufferFormat,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub client: ClientId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// A reference to a direct child surface: its id, and the offset at which
/// to place it relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    pub id: SurfaceId,
    pub offset: V2<i32>,
}

impl ChildRef {
    pub fn new(id: SurfaceId, offset: V2<i32>) -> Self {
        Self { id, offset }
    }
}

/// A toplevel or popup's mapped-window state.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub title: Option<String>,
    pub class: Option<String>,
    pub geometry: Rect,
    pub popup: Option<PopupParent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupParent {
    pub parent: SurfaceId,
    pub offset: V2<i32>,
}

/// The committed or pending content of one surface.
#[derive(Debug, Clone, Default)]
pub struct SurfaceState {
    pub buffer: Option<Buffer>,
    pub buffer_offset: V2<i32>,
    pub scale: i32,
    pub damage: Vec<Rect>,
    pub opaque_region: Vec<Rect>,
    pub input_region: Vec<Rect>,
    pub transform: crate::geometry::OutputTransform,
    /// Direct children stacked below this surface, in z-order.
    pub children_below: Vec<ChildRef>,
    /// Direct children stacked above this surface, in z-order.
    pub children_above: Vec<ChildRef>,
    pub window: Option<WindowState>,
}

impl SurfaceState {
    /// A surface is mapped iff it carries both a `WindowState` and a
    /// non-null buffer.
    pub fn is_mapped(&self) -> bool {
        self.window.is_some() && self.buffer.is_some()
    }
}

/// An opaque handle into the rendering backend's own bookkeeping for a
/// surface. Obtained on `SurfaceCreate`, relinquished by a
/// `SurfaceDestroy` backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendSurfaceHandle(pub u64);

/// A surface: its committed state, and the backend's handle for it.
#[derive(Debug, Clone)]
pub struct Surface {
    pub state: SurfaceState,
    pub backend: BackendSurfaceHandle,
}

impl Surface {
    pub fn new(backend: BackendSurfaceHandle) -> Self {
        Self {
            state: SurfaceState::default(),
            backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Buffer {
        Buffer {
            id: BufferId(0),
            format: BufferFormat(0),
            width: 100,
            height: 100,
            stride: 400,
            client: ClientId(0),
        }
    }

    #[test]
    fn unmapped_without_window_or_buffer() {
        let state = SurfaceState::default();
        assert!(!state.is_mapped());
    }

    #[test]
    fn mapped_requires_both_window_and_buffer() {
        let mut state = SurfaceState {
            buffer: Some(buffer()),
            ..Default::default()
        };
        assert!(!state.is_mapped());

        state.window = Some(WindowState {
            title: None,
            class: None,
            geometry: Rect::new(0, 0, 100, 100),
            popup: None,
        });
        assert!(state.is_mapped());

        state.buffer = None;
        assert!(!state.is_mapped());
    }
}
