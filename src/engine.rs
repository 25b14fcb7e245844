//! The Core Engine: the single-threaded, cooperative state machine that
//! demultiplexes client requests and backend events, mutates the surface
//! map and universe, recomputes layout, and emits client events and
//! backend commits.
//!
//! The Engine never suspends mid-message: [`CoreEngine::handle_input`] is
//! synchronous end to end. The one effect that needs a return value
//! before the Engine can proceed — allocating a backend surface handle —
//! is modeled as the [`BackendSurfaces`] trait rather than folded into
//! the effect stream.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::error::ClientProtocolError;
use crate::geometry::{Rect, V2};
use crate::ids::{ClientId, ClientSurfaceId, OutputId, SurfaceId};
use crate::layout::{layout, ScreenLayout};
use crate::output_space::{self, MappedOutput, OutputDescriptor};
use crate::surface::{Buffer, BackendSurfaceHandle, SurfaceState};
use crate::surface_map::SurfaceMap;
use crate::universe::Universe;

/// Requests a client may send the Engine.
#[derive(Debug, Clone)]
pub enum Request {
    SurfaceCreate(SurfaceId),
    SurfaceDestroy(SurfaceId),
    SurfaceCommit(Vec<(SurfaceId, SurfaceState)>),
}

/// Events signaled by the backend, arriving through the input queue.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    BufferReleased(Buffer),
    OutputAdded(OutputDescriptor),
    OutputRemoved(OutputId),
    OutputFrame(OutputId),
}

/// The Engine's single multiplexed input stream: client
/// connect/disconnect/requests and backend events, already serialized
/// into one queue upstream of the Engine.
#[derive(Debug, Clone)]
pub enum CoreInput {
    ClientAdd(ClientId),
    ClientDel(ClientId),
    ClientRequest(ClientId, Request),
    BackendEvent(BackendEvent),
}

/// An event delivered to a client.
#[derive(Debug, Clone)]
pub enum Event {
    OutputAdded(MappedOutput),
    OutputRemoved(MappedOutput),
    SurfaceFrame(Vec<SurfaceId>),
    BufferReleased(Buffer),
    WindowConfigure(SurfaceId, V2<u32>),
    Error(ClientProtocolError),
}

/// A request posted to the rendering backend.
#[derive(Debug, Clone)]
pub enum BackendRequest {
    SurfaceCommit(Vec<BackendCommitOutput>),
    SurfaceDestroy(Vec<BackendSurfaceHandle>),
}

/// One output's worth of a backend commit: its id, and for each rect on
/// it the flattened, offset-tagged surface list to draw there.
pub type BackendCommitOutput = (OutputId, Vec<(Rect, Vec<(V2<i32>, BackendSurfaceHandle)>)>);

/// One item of the Engine's output stream.
#[derive(Debug, Clone)]
pub enum CoreOutput {
    ClientEvent(Option<ClientId>, Event),
    BackendRequest(BackendRequest),
    CoreError(String),
}

/// Builds a [`CoreOutput::ClientEvent`] targeted at a single client.
pub fn client_event(client: ClientId, event: Event) -> CoreOutput {
    CoreOutput::ClientEvent(Some(client), event)
}

/// Builds a [`CoreOutput::ClientEvent`] broadcast to every client.
pub fn broadcast_event(event: Event) -> CoreOutput {
    CoreOutput::ClientEvent(None, event)
}

/// The synchronous, request-with-response collaborator the Engine needs
/// from the rendering backend: a fresh handle for a newly created
/// surface. Called inline from `handle_input`, never queued.
pub trait BackendSurfaces {
    fn alloc_surface_handle(&mut self) -> BackendSurfaceHandle;
}

/// Per-client state: just its scene graph. Surfaces are destroyed with
/// the client that owns them.
#[derive(Debug, Default)]
pub struct ClientData {
    pub surfaces: SurfaceMap,
}

/// The Engine's full authoritative state.
pub struct CoreState {
    pub outputs: Vec<MappedOutput>,
    pub clients: HashMap<ClientId, ClientData>,
    pub universe: Universe<ClientSurfaceId>,
    last_layout: Vec<ScreenLayout<ClientSurfaceId>>,
}

impl CoreState {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            clients: HashMap::new(),
            universe: Universe::create(vec!["1".into()]),
            last_layout: Vec::new(),
        }
    }
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new()
    }
}

/// The orchestrator: owns [`CoreState`] and turns one [`CoreInput`] at a
/// time into an ordered [`Vec<CoreOutput>`].
#[derive(Default)]
pub struct CoreEngine {
    state: CoreState,
}

impl CoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    pub fn handle_input<B: BackendSurfaces>(&mut self, backend: &mut B, input: CoreInput) -> Vec<CoreOutput> {
        match input {
            CoreInput::ClientAdd(cid) => self.on_client_add(cid),
            CoreInput::ClientDel(cid) => self.on_client_del(cid),
            CoreInput::ClientRequest(cid, req) => self.on_client_request(backend, cid, req),
            CoreInput::BackendEvent(ev) => self.on_backend_event(ev),
        }
    }

    fn on_client_add(&mut self, cid: ClientId) -> Vec<CoreOutput> {
        info!(client = %cid, "client connected");
        self.state.clients.insert(cid, ClientData::default());
        self.state
            .outputs
            .iter()
            .map(|mo| client_event(cid, Event::OutputAdded(*mo)))
            .collect()
    }

    fn on_client_del(&mut self, cid: ClientId) -> Vec<CoreOutput> {
        info!(client = %cid, "client disconnected");
        let Some(client) = self.state.clients.remove(&cid) else {
            warn!(client = %cid, "ClientDel for unknown client");
            return vec![CoreOutput::CoreError(format!("ClientDel for unknown client {cid}"))];
        };

        let mut out = Vec::new();
        self.state.universe.filter(|w| w.client != cid);
        out.extend(self.recompute_layout());
        out.push(self.build_commit());

        let handles: Vec<BackendSurfaceHandle> = client.surfaces.all_handles().collect();
        if !handles.is_empty() {
            out.push(CoreOutput::BackendRequest(BackendRequest::SurfaceDestroy(handles)));
        }
        out
    }

    fn on_client_request<B: BackendSurfaces>(
        &mut self,
        backend: &mut B,
        cid: ClientId,
        req: Request,
    ) -> Vec<CoreOutput> {
        let Some(client) = self.state.clients.get_mut(&cid) else {
            return vec![CoreOutput::CoreError(format!(
                "request from unknown client {cid}"
            ))];
        };

        match req {
            Request::SurfaceCreate(sid) => {
                let handle = backend.alloc_surface_handle();
                client.surfaces.insert(sid, handle);
                debug!(client = %cid, surface = %sid, "surface created");
                Vec::new()
            }
            Request::SurfaceDestroy(sid) => {
                let handle = client.surfaces.lookup(sid).map(|s| s.backend);
                match client.surfaces.delete(sid) {
                    Ok(()) => {
                        let mut out = Vec::new();
                        self.state.universe.delete(&ClientSurfaceId::new(cid, sid));
                        out.extend(self.recompute_layout());
                        out.push(self.build_commit());
                        if let Some(handle) = handle {
                            out.push(CoreOutput::BackendRequest(BackendRequest::SurfaceDestroy(vec![handle])));
                        }
                        out
                    }
                    Err(e) => vec![client_event(cid, Event::Error(e))],
                }
            }
            Request::SurfaceCommit(updates) => self.on_surface_commit(cid, updates),
        }
    }

    fn on_surface_commit(&mut self, cid: ClientId, updates: Vec<(SurfaceId, SurfaceState)>) -> Vec<CoreOutput> {
        let mut out = Vec::new();
        let mut any_universe_op = false;

        for (sid, new_state) in updates {
            let Some(client) = self.state.clients.get_mut(&cid) else {
                break;
            };
            let Some(surface) = client.surfaces.lookup_mut(sid) else {
                out.push(client_event(cid, Event::Error(ClientProtocolError::BadSurface)));
                continue;
            };

            let was_mapped = surface.state.is_mapped();
            surface.state = new_state;
            let now_mapped = surface.state.is_mapped();

            let w = ClientSurfaceId::new(cid, sid);
            match (was_mapped, now_mapped) {
                (false, true) => {
                    self.state.universe.insert(w);
                    any_universe_op = true;
                }
                (true, false) => {
                    self.state.universe.delete(&w);
                    any_universe_op = true;
                }
                _ => {}
            }
        }

        if any_universe_op {
            out.extend(self.recompute_layout());
        }
        out.push(self.build_commit());
        out
    }

    fn on_backend_event(&mut self, ev: BackendEvent) -> Vec<CoreOutput> {
        match ev {
            BackendEvent::BufferReleased(buf) => {
                vec![client_event(buf.client, Event::BufferReleased(buf))]
            }
            BackendEvent::OutputAdded(desc) => {
                self.state.outputs.retain(|mo| mo.id() != desc.id);
                output_space::output_added(&mut self.state.outputs, desc);
                let added = *self.state.outputs.iter().find(|mo| mo.id() == desc.id).unwrap();

                let mut out = vec![broadcast_event(Event::OutputAdded(added))];
                self.state.universe.set_outputs(&self.state.outputs);
                out.extend(self.recompute_layout());
                out
            }
            BackendEvent::OutputRemoved(oid) => {
                let Some(remapped) = output_space::output_removed(&self.state.outputs, oid) else {
                    error!(output = %oid, "OutputRemoved for unknown output");
                    return vec![CoreOutput::CoreError(format!("OutputRemoved for unknown output {oid}"))];
                };
                let removed = *self.state.outputs.iter().find(|mo| mo.id() == oid).unwrap();
                self.state.outputs = remapped;

                let mut out = vec![broadcast_event(Event::OutputRemoved(removed))];
                self.state.universe.set_outputs(&self.state.outputs);
                out.extend(self.recompute_layout());
                out
            }
            BackendEvent::OutputFrame(oid) => {
                let windows = self.state.universe.on_output(oid);
                let mut out = Vec::new();
                for w in windows {
                    if let Some(client) = self.state.clients.get(&w.client) {
                        let sids = client.surfaces.lookup_all_ids(w.surface);
                        out.push(client_event(w.client, Event::SurfaceFrame(sids)));
                    }
                }
                out
            }
        }
    }

    /// Recomputes layout and diffs by `(size, window)` against the
    /// previous one, emitting `WindowConfigure` for every window whose
    /// size changed. Ignores pure position changes.
    fn recompute_layout(&mut self) -> Vec<CoreOutput> {
        let new_layout = layout(&self.state.universe);

        let old_sizes: std::collections::HashSet<(u32, u32, ClientSurfaceId)> = self
            .state
            .last_layout
            .iter()
            .flat_map(|(_, placements)| placements.iter())
            .map(|(r, w)| (r.w, r.h, *w))
            .collect();
        let new_sizes: std::collections::HashSet<(u32, u32, ClientSurfaceId)> = new_layout
            .iter()
            .flat_map(|(_, placements)| placements.iter())
            .map(|(r, w)| (r.w, r.h, *w))
            .collect();

        let mut out = Vec::new();
        for (w_px, h_px, w) in new_sizes.difference(&old_sizes) {
            out.push(client_event(
                w.client,
                Event::WindowConfigure(w.surface, V2::new(*w_px, *h_px)),
            ));
        }

        self.state.last_layout = new_layout;
        out
    }

    /// Builds the backend commit payload from the current `last_layout`:
    /// for each placed window, flattens its subsurface tree via its
    /// owning client's surface map.
    fn build_commit(&self) -> CoreOutput {
        let mut commit = Vec::with_capacity(self.state.last_layout.len());
        for (output, placements) in &self.state.last_layout {
            let mut rects = Vec::with_capacity(placements.len());
            for (rect, w) in placements {
                let flattened = self
                    .state
                    .clients
                    .get(&w.client)
                    .map(|client| client.surfaces.lookup_all(rect.top_left(), w.surface))
                    .unwrap_or_default();
                rects.push((*rect, flattened));
            }
            commit.push((output.id(), rects));
        }
        CoreOutput::BackendRequest(BackendRequest::SurfaceCommit(commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::OutputTransform;
    use crate::surface::{BufferFormat, WindowState};

    struct StubBackend {
        next: u64,
    }

    impl StubBackend {
        fn new() -> Self {
            Self { next: 0 }
        }
    }

    impl BackendSurfaces for StubBackend {
        fn alloc_surface_handle(&mut self) -> BackendSurfaceHandle {
            let h = BackendSurfaceHandle(self.next);
            self.next += 1;
            h
        }
    }

    fn mapped_state(geometry: Rect) -> SurfaceState {
        SurfaceState {
            buffer: Some(Buffer {
                id: crate::surface::BufferId(0),
                format: BufferFormat(0),
                width: geometry.w,
                height: geometry.h,
                stride: geometry.w * 4,
                client: ClientId(0),
            }),
            window: Some(WindowState {
                title: None,
                class: None,
                geometry,
                popup: None,
            }),
            ..Default::default()
        }
    }

    fn output_added(id: u64, w: u32, h: u32, transform: OutputTransform) -> BackendEvent {
        BackendEvent::OutputAdded(OutputDescriptor {
            id: OutputId(id),
            width: w,
            height: h,
            scale: 1,
            transform,
        })
    }

    fn find_commit(outputs: &[CoreOutput]) -> &BackendCommitOutput {
        outputs
            .iter()
            .find_map(|o| match o {
                CoreOutput::BackendRequest(BackendRequest::SurfaceCommit(v)) => v.first(),
                _ => None,
            })
            .expect("expected at least one commit entry")
    }

    #[test]
    fn scenario_one_output_one_client_one_surface_mapped() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();

        engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Normal)));
        let out = engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(1)));
        assert!(matches!(
            out[0],
            CoreOutput::ClientEvent(Some(_), Event::OutputAdded(mo)) if mo.region == Rect::new(0, 0, 1920, 1080)
        ));

        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(ClientId(1), Request::SurfaceCreate(SurfaceId(1))),
        );
        let out = engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(1), mapped_state(Rect::new(0, 0, 1920, 1080)))]),
            ),
        );

        let configure = out.iter().find(|o| {
            matches!(o, CoreOutput::ClientEvent(_, Event::WindowConfigure(..)))
        });
        assert!(configure.is_some());

        let (_, rects) = find_commit(&out);
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].0, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn scenario_second_output_mapped_to_the_right() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Normal)));
        let out = engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(2, 1280, 720, OutputTransform::Normal)));

        let broadcast = out.iter().find_map(|o| match o {
            CoreOutput::ClientEvent(None, Event::OutputAdded(mo)) => Some(*mo),
            _ => None,
        });
        assert_eq!(broadcast.unwrap().region, Rect::new(1920, 0, 1280, 720));
    }

    #[test]
    fn scenario_portrait_transform_swaps_dimensions() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        let out = engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Rot90)));
        let broadcast = out.iter().find_map(|o| match o {
            CoreOutput::ClientEvent(None, Event::OutputAdded(mo)) => Some(*mo),
            _ => None,
        });
        assert_eq!(broadcast.unwrap().region, Rect::new(0, 0, 1080, 1920));
    }

    #[test]
    fn scenario_unmap_via_commit_yields_no_configure() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Normal)));
        engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(1)));
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(ClientId(1), Request::SurfaceCreate(SurfaceId(1))),
        );
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(1), mapped_state(Rect::new(0, 0, 1920, 1080)))]),
            ),
        );

        let out = engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(1), SurfaceState::default())]),
            ),
        );

        assert!(!out.iter().any(|o| matches!(o, CoreOutput::ClientEvent(_, Event::WindowConfigure(..)))));
        let (_, rects) = find_commit(&out);
        assert!(rects.is_empty());
    }

    #[test]
    fn scenario_client_crash_destroys_surfaces_and_filters_universe() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Normal)));
        engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(1)));
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(ClientId(1), Request::SurfaceCreate(SurfaceId(1))),
        );
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(1), mapped_state(Rect::new(0, 0, 1920, 1080)))]),
            ),
        );

        let out = engine.handle_input(&mut backend, CoreInput::ClientDel(ClientId(1)));

        let (_, rects) = find_commit(&out);
        assert!(rects.is_empty());
        assert!(out.iter().any(|o| matches!(
            o,
            CoreOutput::BackendRequest(BackendRequest::SurfaceDestroy(handles)) if handles.len() == 1
        )));

        // A later BufferReleased for the departed client must not crash the engine.
        let out = engine.handle_input(
            &mut backend,
            CoreInput::BackendEvent(BackendEvent::BufferReleased(Buffer {
                id: crate::surface::BufferId(0),
                format: BufferFormat(0),
                width: 1,
                height: 1,
                stride: 4,
                client: ClientId(1),
            })),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn scenario_frame_routing_targets_owning_client_only() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        engine.handle_input(&mut backend, CoreInput::BackendEvent(output_added(1, 1920, 1080, OutputTransform::Normal)));
        engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(1)));
        engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(2)));
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(ClientId(1), Request::SurfaceCreate(SurfaceId(1))),
        );
        engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(1), mapped_state(Rect::new(0, 0, 1920, 1080)))]),
            ),
        );

        let out = engine.handle_input(&mut backend, CoreInput::BackendEvent(BackendEvent::OutputFrame(OutputId(1))));
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            CoreOutput::ClientEvent(Some(cid), Event::SurfaceFrame(sids)) if *cid == ClientId(1) && sids == &vec![SurfaceId(1)]
        ));
    }

    #[test]
    fn unknown_surface_commit_reports_bad_surface_and_skips_entry() {
        let mut engine = CoreEngine::new();
        let mut backend = StubBackend::new();
        engine.handle_input(&mut backend, CoreInput::ClientAdd(ClientId(1)));
        let out = engine.handle_input(
            &mut backend,
            CoreInput::ClientRequest(
                ClientId(1),
                Request::SurfaceCommit(vec![(SurfaceId(404), SurfaceState::default())]),
            ),
        );
        assert!(out.iter().any(|o| matches!(
            o,
            CoreOutput::ClientEvent(Some(cid), Event::Error(ClientProtocolError::BadSurface)) if *cid == ClientId(1)
        )));
    }
}
