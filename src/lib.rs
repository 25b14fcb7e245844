//! The core of a Wayland compositor: the stateful arbiter between client
//! surfaces and a rendering backend. It tracks the scene graph each client
//! builds out of surfaces, the workspace/screen focus model, and the
//! layout those produce, then drives the backend and client events that
//! follow from changes to either.
//!
//! Dependency order (leaves first): [`output_space`] → [`surface`],
//! [`surface_map`], [`universe`] → [`layout`] → [`engine`].

pub mod engine;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod layout;
pub mod output_space;
pub mod surface;
pub mod surface_map;
pub mod universe;
pub mod zipper;

pub use engine::{
    BackendCommitOutput, BackendEvent, BackendRequest, BackendSurfaces, ClientData, CoreEngine, CoreInput,
    CoreOutput, CoreState, Event, Request,
};
pub use error::ClientProtocolError;
pub use ids::{ClientId, ClientSurfaceId, OutputId, SurfaceId};
pub use output_space::{MappedOutput, OutputDescriptor};
pub use surface::{BackendSurfaceHandle, Buffer, BufferFormat};
pub use universe::Universe;
