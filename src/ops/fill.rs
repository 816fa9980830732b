//! Flood fill (bucket tool) — iterative 4-connected region fill.
//!
//! The traversal uses an explicit DFS Vec-stack of packed flat indices, so
//! arbitrarily large regions never risk call-stack overflow.  A visited
//! array doubles as the duplicate guard: a pixel pushed twice is skipped the
//! second time.  Cost is O(area of the connected region), worst case the
//! whole buffer.
//!
//! Two independent axes of variation:
//! * unconstrained vs. selection-constrained (unselected pixels act as
//!   impassable walls, exactly like a color mismatch);
//! * collect-only vs. in-place (the collect variants never touch the
//!   buffer — the orchestrator uses them to build an undo command before
//!   committing anything).

use image::Rgba;

use crate::canvas::{PixelBuffer, Selection};
use crate::components::history::PixelChange;

/// Fill the 4-connected region around `(start_x, start_y)` with `new_color`,
/// mutating `buf`.  Returns the applied changes (buffer-local coordinates,
/// pre-fill colors) for undo.
///
/// Out-of-bounds start, or a start pixel already equal to `new_color`,
/// yields an empty list and leaves the buffer untouched.
pub fn flood_fill(
    buf: &mut PixelBuffer,
    start_x: i32,
    start_y: i32,
    new_color: Rgba<u8>,
) -> Vec<PixelChange> {
    let changes = flood_fill_collect(buf, start_x, start_y, new_color);
    apply_changes(buf, &changes);
    changes
}

/// Selection-constrained in-place fill.  `layer_offset` places the buffer in
/// document space so mask weights (which live on the document grid) can be
/// looked up per buffer pixel.  A start pixel with weight 0 makes the whole
/// operation a no-op.
pub fn flood_fill_masked(
    buf: &mut PixelBuffer,
    selection: &Selection,
    layer_offset: (i32, i32),
    start_x: i32,
    start_y: i32,
    new_color: Rgba<u8>,
) -> Vec<PixelChange> {
    let changes =
        flood_fill_masked_collect(buf, selection, layer_offset, start_x, start_y, new_color);
    apply_changes(buf, &changes);
    changes
}

/// Dry-run variant of [`flood_fill`]: same traversal, no mutation.
pub fn flood_fill_collect(
    buf: &PixelBuffer,
    start_x: i32,
    start_y: i32,
    new_color: Rgba<u8>,
) -> Vec<PixelChange> {
    collect(buf, None, start_x, start_y, new_color)
}

/// Dry-run variant of [`flood_fill_masked`].
pub fn flood_fill_masked_collect(
    buf: &PixelBuffer,
    selection: &Selection,
    layer_offset: (i32, i32),
    start_x: i32,
    start_y: i32,
    new_color: Rgba<u8>,
) -> Vec<PixelChange> {
    collect(buf, Some((selection, layer_offset)), start_x, start_y, new_color)
}

fn apply_changes(buf: &mut PixelBuffer, changes: &[PixelChange]) {
    for ch in changes {
        buf.set(ch.x, ch.y, ch.after);
    }
}

/// Shared traversal on the flat RGBA byte buffer.
fn collect(
    buf: &PixelBuffer,
    mask: Option<(&Selection, (i32, i32))>,
    start_x: i32,
    start_y: i32,
    new_color: Rgba<u8>,
) -> Vec<PixelChange> {
    if !buf.in_bounds(start_x, start_y) {
        return Vec::new();
    }
    let (start_x, start_y) = (start_x as u32, start_y as u32);
    let w = buf.width() as usize;
    let h = buf.height() as usize;
    let raw = buf.raw();

    // Inline pixel fetch from the flat RGBA buffer
    #[inline(always)]
    fn pix(raw: &[u8], idx: usize) -> [u8; 4] {
        let o = idx * 4;
        [raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]
    }

    // Selection weight for a buffer-local pixel, mapped through the layer
    // offset onto the document grid.  No mask = always passable.
    let passable = |x: usize, y: usize| -> bool {
        match mask {
            Some((sel, (off_x, off_y))) => {
                sel.weight_at(x as i32 + off_x, y as i32 + off_y) != 0
            }
            None => true,
        }
    };

    let seed_idx = start_y as usize * w + start_x as usize;
    let target = pix(raw, seed_idx);
    // Filling with the region's own color would visit the whole region for
    // zero effect — treat as "nothing to undo"
    if target == new_color.0 {
        return Vec::new();
    }
    if !passable(start_x as usize, start_y as usize) {
        return Vec::new();
    }

    let mut visited = vec![0u8; w * h];
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    let mut changes: Vec<PixelChange> = Vec::new();

    visited[seed_idx] = 1;
    stack.push(seed_idx as u32);

    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        let x = idx % w;
        let y = idx / w;

        changes.push(PixelChange {
            x: x as u32,
            y: y as u32,
            before: Rgba(target),
            after: new_color,
        });

        // Check 4 neighbors, push unvisited matching ones
        // Left
        if x > 0 {
            let ni = idx - 1;
            if visited[ni] == 0 && pix(raw, ni) == target && passable(x - 1, y) {
                visited[ni] = 1;
                stack.push(ni as u32);
            }
        }
        // Right
        if x + 1 < w {
            let ni = idx + 1;
            if visited[ni] == 0 && pix(raw, ni) == target && passable(x + 1, y) {
                visited[ni] = 1;
                stack.push(ni as u32);
            }
        }
        // Up
        if y > 0 {
            let ni = idx - w;
            if visited[ni] == 0 && pix(raw, ni) == target && passable(x, y - 1) {
                visited[ni] = 1;
                stack.push(ni as u32);
            }
        }
        // Down
        if y + 1 < h {
            let ni = idx + w;
            if visited[ni] == 0 && pix(raw, ni) == target && passable(x, y + 1) {
                visited[ni] = 1;
                stack.push(ni as u32);
            }
        }
    }

    changes
}
