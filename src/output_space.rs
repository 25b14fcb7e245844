//! The global coordinate strip outputs are arranged along: each connected
//! output gets a rectangle of logical space immediately to the right of
//! the previous one, left edge flush at zero.

use std::collections::VecDeque;

use crate::geometry::{OutputTransform, Rect};
use crate::ids::OutputId;

/// An output's fixed physical properties, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub id: OutputId,
    pub width: u32,
    pub height: u32,
    pub scale: i32,
    pub transform: OutputTransform,
}

impl OutputDescriptor {
    /// The output's logical size: physical size divided by scale, with
    /// width/height swapped under a portrait transform.
    pub fn logical_size(&self) -> (u32, u32) {
        let (w, h) = (
            (self.width as i32 / self.scale.max(1)) as u32,
            (self.height as i32 / self.scale.max(1)) as u32,
        );
        if self.transform.is_portrait() {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// An output placed somewhere in the global coordinate strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedOutput {
    pub descriptor: OutputDescriptor,
    pub region: Rect,
}

impl MappedOutput {
    pub fn id(&self) -> OutputId {
        self.descriptor.id
    }
}

/// Places a single output's logical rectangle starting at `x_offset`.
pub fn map_output(x_offset: i32, output: OutputDescriptor) -> MappedOutput {
    let (w, h) = output.logical_size();
    MappedOutput {
        descriptor: output,
        region: Rect::new(x_offset, 0, w, h),
    }
}

/// Lays out a full set of outputs left-to-right starting at `start_offset`,
/// in the order given.
pub fn map_outputs(start_offset: i32, outputs: Vec<OutputDescriptor>) -> Vec<MappedOutput> {
    let mut mapped: VecDeque<MappedOutput> = VecDeque::with_capacity(outputs.len());
    let mut x = start_offset;
    for output in outputs {
        let placed = map_output(x, output);
        x = placed.region.next_free_x();
        mapped.push_back(placed);
    }
    mapped.into()
}

/// Appends a newly connected output to the right of the existing strip.
pub fn output_added(outputs: &mut Vec<MappedOutput>, output: OutputDescriptor) {
    let x = outputs.last().map(|o| o.region.next_free_x()).unwrap_or(0);
    outputs.push(map_output(x, output));
}

/// Removes an output and re-packs the remaining ones flush against zero
/// in their existing relative order, preserving the "no gaps, left edge
/// at zero" invariant regardless of which output was removed.
pub fn output_removed(outputs: &[MappedOutput], id: OutputId) -> Option<Vec<MappedOutput>> {
    if !outputs.iter().any(|o| o.id() == id) {
        return None;
    }
    let remaining: Vec<OutputDescriptor> = outputs
        .iter()
        .filter(|o| o.id() != id)
        .map(|o| o.descriptor)
        .collect();
    Some(map_outputs(0, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: u64, w: u32, h: u32) -> OutputDescriptor {
        OutputDescriptor {
            id: OutputId(id),
            width: w,
            height: h,
            scale: 1,
            transform: OutputTransform::Normal,
        }
    }

    #[test]
    fn map_outputs_lays_out_left_to_right() {
        let mapped = map_outputs(0, vec![desc(1, 1920, 1080), desc(2, 1280, 720)]);
        assert_eq!(mapped[0].region, Rect::new(0, 0, 1920, 1080));
        assert_eq!(mapped[1].region, Rect::new(1920, 0, 1280, 720));
    }

    #[test]
    fn portrait_transform_swaps_logical_dimensions() {
        let mut d = desc(1, 1920, 1080);
        d.transform = OutputTransform::Rot90;
        assert_eq!(d.logical_size(), (1080, 1920));
    }

    #[test]
    fn scale_divides_physical_size() {
        let mut d = desc(1, 3840, 2160);
        d.scale = 2;
        assert_eq!(d.logical_size(), (1920, 1080));
    }

    #[test]
    fn output_added_appends_to_the_right() {
        let mut mapped = map_outputs(0, vec![desc(1, 1920, 1080)]);
        output_added(&mut mapped, desc(2, 1280, 720));
        assert_eq!(mapped[1].region, Rect::new(1920, 0, 1280, 720));
    }

    #[test]
    fn output_removed_repacks_remaining_flush_at_zero() {
        let mapped = map_outputs(0, vec![desc(1, 1920, 1080), desc(2, 1280, 720), desc(3, 800, 600)]);
        let after = output_removed(&mapped, OutputId(2)).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].region, Rect::new(0, 0, 1920, 1080));
        assert_eq!(after[1].region, Rect::new(1920, 0, 800, 600));
    }

    #[test]
    fn output_removed_unknown_id_returns_none() {
        let mapped = map_outputs(0, vec![desc(1, 1920, 1080)]);
        assert!(output_removed(&mapped, OutputId(99)).is_none());
    }
}
