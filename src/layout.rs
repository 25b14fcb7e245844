//! Pure tiling: a function from a [`Universe`] to placed rectangles,
//! depending only on the universe and the outputs carried inside it.
//! Never touches the surface map or the backend.
//!
//! The policy is vertical-stack-with-master: the focused window takes
//! the left half (or the full screen if it's alone), and the rest stack
//! in the right half with equal heights, save for the last one
//! absorbing any remainder from integer division.

use std::hash::Hash;

use crate::geometry::Rect;
use crate::output_space::MappedOutput;
use crate::universe::Universe;

/// One screen's placement: its output, and every window on it paired
/// with its placed rectangle (focus first).
pub type ScreenLayout<W> = (MappedOutput, Vec<(Rect, W)>);

/// Computes placements for every visible screen in `universe`. Floating
/// windows override their tiled position with the fixed rectangle from
/// [`Universe::floating`], translated into the screen's global space.
pub fn layout<W: Clone + PartialEq + Eq + Hash>(universe: &Universe<W>) -> Vec<ScreenLayout<W>> {
    universe
        .screens()
        .iter()
        .map(|screen| {
            let windows: Vec<W> = screen.workspace.windows.iter().cloned().collect();
            let tiled = stack_with_master(&screen.output.region, &windows);
            let placed = windows
                .into_iter()
                .zip(tiled)
                .map(|(w, rect)| {
                    let rect = match universe.floating().get(&w) {
                        Some(floating) => floating.translate(screen.output.region.x, screen.output.region.y),
                        None => rect,
                    };
                    (rect, w)
                })
                .collect();
            (screen.output, placed)
        })
        .collect()
}

/// Tiles `count` windows within `area`, focus (first) as master.
fn stack_with_master<W>(area: &Rect, windows: &[W]) -> Vec<Rect> {
    match windows.len() {
        0 => Vec::new(),
        1 => vec![*area],
        n => {
            let master_w = area.w / 2;
            let stack_w = area.w - master_w;
            let stack_x = area.x + master_w as i32;

            let mut rects = Vec::with_capacity(n);
            rects.push(Rect::new(area.x, area.y, master_w, area.h));

            let stack_count = n - 1;
            let each_h = area.h / stack_count as u32;
            let remainder = area.h - each_h * stack_count as u32;
            for i in 0..stack_count {
                let h = if i == stack_count - 1 { each_h + remainder } else { each_h };
                let y = area.y + (each_h * i as u32) as i32;
                rects.push(Rect::new(stack_x, y, stack_w, h));
            }
            rects
        }
    }
}
