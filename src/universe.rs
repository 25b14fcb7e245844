//! The workspace/screen/focus model: which windows exist, which
//! workspace and screen each lives on, and which window (if any) holds
//! input focus.
//!
//! A workspace not currently shown on any output is "hidden"; a window
//! promoted to floating keeps its workspace membership but gets a fixed
//! rectangle instead of participating in tiling.

use std::collections::HashMap;
use std::hash::Hash;

use crate::geometry::Rect;
use crate::output_space::MappedOutput;
use crate::zipper::FocusZipper;

/// A named group of windows, stacked in a focus-zipper so the most
/// recently focused window in the workspace is always `windows.focus()`.
#[derive(Debug, Clone)]
pub struct Workspace<W> {
    pub tag: String,
    pub windows: FocusZipper<W>,
}

impl<W> Workspace<W> {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            windows: FocusZipper::new(),
        }
    }
}

/// A workspace currently displayed on a specific output.
#[derive(Debug, Clone)]
pub struct Screen<W> {
    pub workspace: Workspace<W>,
    pub output: MappedOutput,
}

/// The full window/workspace/screen state, independent of any single
/// client's scene graph.
#[derive(Debug, Clone)]
pub struct Universe<W> {
    /// Visible screens, one per connected output, focus-ordered so the
    /// focused screen is the one receiving keyboard input.
    screens: FocusZipper<Screen<W>>,
    /// Workspaces not currently shown on any output.
    hidden: Vec<Workspace<W>>,
    /// Windows pulled out of tiling into a fixed rectangle, keyed by
    /// window identity.
    floating: HashMap<W, Rect>,
}

impl<W: Clone + PartialEq + Eq + Hash> Universe<W> {
    /// Builds a universe with one hidden, empty workspace per tag and no
    /// screens. Call [`set_outputs`](Self::set_outputs) to bring
    /// workspaces onto outputs.
    pub fn create(tags: Vec<String>) -> Self {
        Self {
            screens: FocusZipper::new(),
            hidden: tags.into_iter().map(Workspace::new).collect(),
            floating: HashMap::new(),
        }
    }

    pub fn screens(&self) -> &FocusZipper<Screen<W>> {
        &self.screens
    }

    pub fn floating(&self) -> &HashMap<W, Rect> {
        &self.floating
    }

    /// Re-derives the screen list from a freshly computed output
    /// arrangement: the first `outputs.len()` workspaces (visible
    /// screens' workspaces first, then hidden ones) are assigned one per
    /// output in order; surplus workspaces go back to hidden, and surplus
    /// outputs (more outputs than workspaces) get no screen at all —
    /// truncated to `min(#workspaces, #outputs)`. Focus defaults to the
    /// first screen.
    pub fn set_outputs(&mut self, outputs: &[MappedOutput]) {
        let mut all_workspaces: Vec<Workspace<W>> = Vec::new();
        for screen in std::mem::take(&mut self.screens).into_vec() {
            all_workspaces.push(screen.workspace);
        }
        all_workspaces.append(&mut self.hidden);

        let screen_count = all_workspaces.len().min(outputs.len());
        let mut remaining = all_workspaces.into_iter();
        let mut new_screens = Vec::with_capacity(screen_count);
        for output in outputs.iter().take(screen_count) {
            new_screens.push(Screen {
                workspace: remaining.next().expect("bounded by screen_count"),
                output: *output,
            });
        }
        self.hidden = remaining.collect();
        self.screens = FocusZipper::from_vec(new_screens);
    }

    /// Inserts a new window into the currently focused screen's
    /// workspace, becoming that workspace's focus. If no screen exists yet
    /// (no outputs connected), falls back to the first hidden workspace so
    /// the window isn't lost before the first output shows up. No-op if
    /// there are no workspaces at all.
    pub fn insert(&mut self, w: W) {
        if let Some(screen) = self.screens.focus_mut() {
            screen.workspace.windows.insert_before_focus(w);
        } else if let Some(ws) = self.hidden.first_mut() {
            ws.windows.insert_before_focus(w);
        }
    }

    /// Removes a window wherever it lives: a visible screen's workspace,
    /// a hidden workspace, or the floating set.
    pub fn delete(&mut self, w: &W) {
        for screen in self.screens.iter_mut() {
            screen.workspace.windows.remove_where(|x| x == w);
        }
        for workspace in &mut self.hidden {
            workspace.windows.remove_where(|x| x == w);
        }
        self.floating.remove(w);
    }

    /// Retains only windows satisfying `pred`, across every screen,
    /// hidden workspace, and the floating set.
    pub fn filter<F: Fn(&W) -> bool>(&mut self, pred: F) {
        for screen in self.screens.iter_mut() {
            screen.workspace.windows.retain(&pred);
        }
        for workspace in &mut self.hidden {
            workspace.windows.retain(&pred);
        }
        self.floating.retain(|w, _| pred(w));
    }

    /// The windows on the screen showing the given output, in stacking
    /// order (focus first), or an empty vec if no screen shows it.
    pub fn on_output(&self, output: crate::ids::OutputId) -> Vec<W> {
        self.screens
            .iter()
            .find(|screen| screen.output.id() == output)
            .map(|screen| screen.workspace.windows.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_floating(&mut self, w: W, rect: Rect) {
        self.floating.insert(w, rect);
    }

    pub fn clear_floating(&mut self, w: &W) {
        self.floating.remove(w);
    }
}
