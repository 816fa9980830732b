//! Stateless back-to-front compositor.
//!
//! Straight (non-premultiplied) alpha throughout: color channels are divided
//! by the output alpha after blending.  The compositor never mutates the
//! document — it is safe to call repeatedly for preview rendering.

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{Document, Layer, PixelBuffer, TRANSPARENT};

/// Source-over blend of `src` (scaled by `opacity`) onto `dst`.
///
/// Byte rounding is `round(clamp(v, 0, 1) * 255)` per channel.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent source — nothing to blend
    if src[3] == 0 || opacity <= 0.0 {
        return dst;
    }
    // Fast path: fully opaque source at full opacity — just overwrite
    if src[3] == 255 && opacity >= 1.0 {
        return src;
    }

    let eff = (src[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = eff + dst_a * (1.0 - eff);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let src_c = src[c] as f32 / 255.0;
        let dst_c = dst[c] as f32 / 255.0;
        let v = (src_c * eff + dst_c * dst_a * (1.0 - eff)) / out_a;
        out[c] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (out_a.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba(out)
}

/// Flatten the whole document into one straight-alpha buffer.
pub fn compose(doc: &Document) -> PixelBuffer {
    compose_region(doc, 0, 0, doc.width(), doc.height())
}

/// Region-of-interest variant: compose only the `width × height` window at
/// `(origin_x, origin_y)` in document space.  Identical math to [`compose`],
/// restricted domain — used for partial redraws.
///
/// The window is clamped to the canvas; the returned buffer has the clamped
/// size.  Rows are composited in parallel.
pub fn compose_region(
    doc: &Document,
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
) -> PixelBuffer {
    let origin_x = origin_x.min(doc.width());
    let origin_y = origin_y.min(doc.height());
    let width = width.min(doc.width() - origin_x);
    let height = height.min(doc.height() - origin_y);

    let mut out = PixelBuffer::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    let layers = doc.layers();
    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|row| {
            let doc_y = (origin_y + row) as i32;
            let mut pixels = vec![TRANSPARENT; width as usize];
            for layer in layers {
                if !layer.visible || layer.opacity() <= 0.0 {
                    continue;
                }
                for (col, px) in pixels.iter_mut().enumerate() {
                    let doc_x = (origin_x + col as u32) as i32;
                    // Outside the layer's own buffer = fully transparent source
                    if let Some((lx, ly)) = layer.to_local(doc_x, doc_y) {
                        *px = blend_over(*px, layer.pixels().get(lx, ly), layer.opacity());
                    }
                }
            }
            pixels
        })
        .collect();

    for (row, pixels) in rows.into_iter().enumerate() {
        for (col, px) in pixels.into_iter().enumerate() {
            out.set(col as u32, row as u32, px);
        }
    }
    out
}

/// Blend `upper` down onto `lower`, producing the replacement buffer for
/// `lower`.  Upper pixels are mapped through both layers' offsets; anything
/// landing outside `lower`'s buffer is dropped.  An invisible upper layer
/// contributes nothing.
pub fn merge_down(upper: &Layer, lower: &Layer) -> PixelBuffer {
    let mut out = lower.pixels().clone();
    if !upper.visible || upper.opacity() <= 0.0 {
        return out;
    }
    for ly in 0..out.height() {
        for lx in 0..out.width() {
            let doc_x = lx as i32 + lower.offset_x;
            let doc_y = ly as i32 + lower.offset_y;
            if let Some((ux, uy)) = upper.to_local(doc_x, doc_y) {
                let src = upper.pixels().get(ux, uy);
                if src[3] > 0 {
                    let blended = blend_over(out.get(lx, ly), src, upper.opacity());
                    out.set(lx, ly, blended);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;

    fn doc_with_layers(w: u32, h: u32, layers: Vec<Layer>) -> Document {
        let mut doc = Document::empty(w, h, 96);
        let count = layers.len();
        for layer in layers {
            let idx = doc.layer_count();
            doc.insert_layer(idx, layer);
        }
        assert_eq!(doc.layer_count(), count);
        doc
    }

    #[test]
    fn single_opaque_layer_is_identity() {
        let mut layer = Layer::new(1, "L".into(), 3, 3, Rgba([10, 20, 30, 255]));
        layer.pixels_mut().set(1, 1, Rgba([200, 100, 50, 255]));
        let expected = layer.pixels().clone();
        let doc = doc_with_layers(3, 3, vec![layer]);
        assert_eq!(compose(&doc), expected);
    }

    #[test]
    fn hidden_layer_contributes_nothing() {
        let base = Layer::new(1, "Base".into(), 3, 3, Rgba([10, 20, 30, 255]));
        let mut top = Layer::new(2, "Top".into(), 3, 3, Rgba([255, 0, 0, 255]));
        top.visible = false;
        let with_hidden = doc_with_layers(3, 3, vec![base.clone(), top]);
        let without = doc_with_layers(3, 3, vec![base]);
        assert_eq!(compose(&with_hidden), compose(&without));
    }

    #[test]
    fn half_alpha_red_over_opaque_blue() {
        let blue = Layer::new(1, "Blue".into(), 1, 1, Rgba([0, 0, 255, 255]));
        let red = Layer::new(2, "Red".into(), 1, 1, Rgba([255, 0, 0, 128]));
        let doc = doc_with_layers(1, 1, vec![blue, red]);
        let px = compose(&doc).get(0, 0);
        assert_eq!(px[3], 255);
        // Analytic: eff = 128/255, out_r = eff, out_b = 1 - eff
        assert!((px[0] as i32 - 128).abs() <= 1, "r = {}", px[0]);
        assert_eq!(px[1], 0);
        assert!((px[2] as i32 - 127).abs() <= 1, "b = {}", px[2]);
    }

    #[test]
    fn layer_opacity_scales_source_alpha() {
        let blue = Layer::new(1, "Blue".into(), 1, 1, Rgba([0, 0, 255, 255]));
        let mut red = Layer::new(2, "Red".into(), 1, 1, Rgba([255, 0, 0, 255]));
        red.set_opacity(0.5);
        let doc = doc_with_layers(1, 1, vec![blue, red]);
        let px = compose(&doc).get(0, 0);
        assert!((px[0] as i32 - 128).abs() <= 1);
        assert!((px[2] as i32 - 128).abs() <= 1);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn offset_layer_maps_into_document_space() {
        let mut top = Layer::new(1, "Top".into(), 2, 2, Rgba([9, 9, 9, 255]));
        top.offset_x = 1;
        top.offset_y = 1;
        let doc = doc_with_layers(4, 4, vec![top]);
        let out = compose(&doc);
        assert_eq!(out.get(0, 0), TRANSPARENT);
        assert_eq!(out.get(1, 1), Rgba([9, 9, 9, 255]));
        assert_eq!(out.get(2, 2), Rgba([9, 9, 9, 255]));
        assert_eq!(out.get(3, 3), TRANSPARENT);
    }

    #[test]
    fn region_matches_full_compose_subwindow() {
        let mut layer = Layer::new(1, "L".into(), 8, 8, Rgba([0, 0, 0, 0]));
        for y in 0..8 {
            for x in 0..8 {
                layer
                    .pixels_mut()
                    .set(x, y, Rgba([(x * 31) as u8, (y * 31) as u8, 7, 255]));
            }
        }
        let doc = doc_with_layers(8, 8, vec![layer]);
        let full = compose(&doc);
        let region = compose_region(&doc, 2, 3, 4, 4);
        assert_eq!(region.width(), 4);
        assert_eq!(region.height(), 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(region.get(x, y), full.get(x + 2, y + 3));
            }
        }
    }

    #[test]
    fn merge_down_blends_through_offsets() {
        let lower = Layer::new(1, "Low".into(), 2, 1, Rgba([0, 0, 255, 255]));
        let mut upper = Layer::new(2, "Up".into(), 1, 1, Rgba([255, 0, 0, 128]));
        upper.offset_x = 1;
        let merged = merge_down(&upper, &lower);
        assert_eq!(merged.get(0, 0), Rgba([0, 0, 255, 255]));
        let px = merged.get(1, 0);
        assert!((px[0] as i32 - 128).abs() <= 1);
        assert!((px[2] as i32 - 127).abs() <= 1);
        assert_eq!(px[3], 255);
    }
}
