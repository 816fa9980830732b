//! Stroke construction for the pencil tool.
//!
//! A [`StrokeBuilder`] accumulates document-space points while the user
//! drags, then reduces the whole stroke to a deduplicated list of
//! [`PixelChange`]s against the target layer.  Consecutive points are
//! connected with Bresenham's integer line algorithm (8-connected, both
//! endpoints inclusive), so fast drags leave no gaps.
//!
//! Dedup matters for self-intersecting paths: the first visit to a pixel
//! records the buffer's pre-stroke color as `before`, and later visits only
//! update `after` — the undo baseline is never corrupted by the stroke's
//! own paint.

use std::collections::HashMap;

use image::Rgba;

use crate::canvas::{Layer, LayerId, Selection};
use crate::components::history::PixelChange;

pub struct StrokeBuilder {
    layer_id: LayerId,
    color: Rgba<u8>,
    /// Document-space path, in drag order.
    points: Vec<(i32, i32)>,
}

impl StrokeBuilder {
    pub fn new(layer_id: LayerId, color: Rgba<u8>) -> Self {
        Self {
            layer_id,
            color,
            points: Vec::new(),
        }
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn push_point(&mut self, doc_x: i32, doc_y: i32) {
        // Repeated motion events at the same position add nothing
        if self.points.last() != Some(&(doc_x, doc_y)) {
            self.points.push((doc_x, doc_y));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Flatten the accumulated path into per-pixel changes in `layer`'s
    /// local coordinates.  Points outside the layer's buffer — and, when a
    /// selection is active, points with mask weight 0 — are silently
    /// dropped.  A single-point stroke yields exactly one change; an empty
    /// stroke yields none.
    ///
    /// The layer buffer is not touched; applying the changes is the
    /// command's job.
    pub fn rasterize(&self, layer: &Layer, selection: &Selection) -> Vec<PixelChange> {
        let mut changes: Vec<PixelChange> = Vec::new();
        let mut index: HashMap<(u32, u32), usize> = HashMap::new();

        let mut visit = |doc_x: i32, doc_y: i32| {
            if selection.is_active() && selection.weight_at(doc_x, doc_y) == 0 {
                return;
            }
            let Some((lx, ly)) = layer.to_local(doc_x, doc_y) else {
                return;
            };
            match index.get(&(lx, ly)) {
                Some(&i) => changes[i].after = self.color,
                None => {
                    index.insert((lx, ly), changes.len());
                    changes.push(PixelChange {
                        x: lx,
                        y: ly,
                        before: layer.pixels().get(lx, ly),
                        after: self.color,
                    });
                }
            }
        };

        match self.points.as_slice() {
            [] => {}
            [only] => visit(only.0, only.1),
            points => {
                for pair in points.windows(2) {
                    bresenham(pair[0], pair[1], &mut visit);
                }
            }
        }

        changes
    }
}

/// Visit every pixel of the 8-connected line from `a` to `b`, both endpoints
/// inclusive.  Classic integer error-accumulator variant.
fn bresenham(a: (i32, i32), b: (i32, i32), visit: &mut impl FnMut(i32, i32)) {
    let (mut x0, mut y0) = a;
    let (x1, y1) = b;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    loop {
        visit(x0, y0);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::TRANSPARENT;

    const INK: Rgba<u8> = Rgba([0x11, 0x22, 0x33, 0xFF]);

    fn layer_6x3() -> Layer {
        Layer::new(1, "L".into(), 6, 3, TRANSPARENT)
    }

    fn no_selection() -> Selection {
        Selection::new(6, 3)
    }

    #[test]
    fn horizontal_segment_paints_inclusive_endpoints() {
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(1, 1);
        stroke.push_point(4, 1);
        let changes = stroke.rasterize(&layer_6x3(), &no_selection());
        let coords: Vec<_> = changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(1, 1), (2, 1), (3, 1), (4, 1)]);
        assert!(changes.iter().all(|c| c.before == TRANSPARENT && c.after == INK));
    }

    #[test]
    fn single_point_stroke_is_one_change() {
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(2, 2);
        let changes = stroke.rasterize(&layer_6x3(), &no_selection());
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].x, changes[0].y), (2, 2));
    }

    #[test]
    fn empty_stroke_produces_nothing() {
        let stroke = StrokeBuilder::new(1, INK);
        assert!(stroke.is_empty());
        assert!(stroke.rasterize(&layer_6x3(), &no_selection()).is_empty());
    }

    #[test]
    fn self_intersection_keeps_prestroke_baseline() {
        // Pre-paint the crossing pixel so a corrupted baseline would show
        let mut layer = Layer::new(1, "L".into(), 8, 8, TRANSPARENT);
        let green = Rgba([0, 255, 0, 255]);
        layer.pixels_mut().set(3, 3, green);

        // Two passes through (3, 3): → across, then ↓ down
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(0, 3);
        stroke.push_point(6, 3);
        stroke.push_point(3, 3);
        stroke.push_point(3, 6);

        let sel = Selection::new(8, 8);
        let changes = stroke.rasterize(&layer, &sel);

        // One change per distinct pixel
        let mut seen = std::collections::HashSet::new();
        for ch in &changes {
            assert!(seen.insert((ch.x, ch.y)));
        }
        let cross = changes
            .iter()
            .find(|c| (c.x, c.y) == (3, 3))
            .expect("crossing pixel painted");
        assert_eq!(cross.before, green);
        assert_eq!(cross.after, INK);
    }

    #[test]
    fn out_of_layer_points_dropped() {
        let mut layer = Layer::new(1, "L".into(), 4, 4, TRANSPARENT);
        layer.offset_x = 2;
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(0, 0); // left of the layer
        stroke.push_point(7, 0); // runs off the right edge
        let changes = stroke.rasterize(&layer, &Selection::new(10, 10));
        let coords: Vec<_> = changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn fully_out_of_bounds_stroke_is_empty() {
        let layer = layer_6x3();
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(-5, -5);
        stroke.push_point(-2, -5);
        assert!(stroke.rasterize(&layer, &no_selection()).is_empty());
    }

    #[test]
    fn selection_gates_stroke_pixels() {
        let layer = layer_6x3();
        let mut sel = Selection::new(6, 3);
        sel.add_rect(2, 1, 3, 1);
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(0, 1);
        stroke.push_point(5, 1);
        let changes = stroke.rasterize(&layer, &sel);
        let coords: Vec<_> = changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(2, 1), (3, 1)]);
    }

    #[test]
    fn diagonal_line_is_eight_connected() {
        let layer = Layer::new(1, "L".into(), 5, 5, TRANSPARENT);
        let mut stroke = StrokeBuilder::new(1, INK);
        stroke.push_point(0, 0);
        stroke.push_point(4, 4);
        let changes = stroke.rasterize(&layer, &Selection::new(5, 5));
        let coords: Vec<_> = changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
    }
}
