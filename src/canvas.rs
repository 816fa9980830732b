use std::sync::Arc;

use image::{Rgba, RgbaImage};
use uuid::Uuid;

// ============================================================================
// PIXEL BUFFER — contiguous straight-alpha RGBA raster
// ============================================================================

/// A pixel with zero alpha, used wherever "nothing there" needs a color.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Fixed-size 2D array of straight-alpha RGBA pixels.
///
/// `get` / `set` are only valid for `0 <= x < width`, `0 <= y < height`;
/// out-of-range access panics (debug and release).  Every engine code path
/// in this crate guards bounds before calling — use [`PixelBuffer::get_checked`]
/// when the coordinate comes from user input.
#[derive(Clone)]
pub struct PixelBuffer {
    pixels: RgbaImage,
}

impl PixelBuffer {
    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Create a buffer with every pixel set to `color`.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut buf = Self::new(width, height);
        if color != TRANSPARENT {
            buf.fill(color);
        }
        buf
    }

    /// Wrap an existing decoded image.
    pub fn from_image(image: RgbaImage) -> Self {
        Self { pixels: image }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True for coordinates addressable by `get` / `set`.
    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        self.pixels.put_pixel(x, y, color);
    }

    /// Bounds-tolerant read for signed coordinates from user input.
    #[inline]
    pub fn get_checked(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if self.in_bounds(x, y) {
            Some(self.get(x as u32, y as u32))
        } else {
            None
        }
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.pixels.pixels_mut() {
            *px = color;
        }
    }

    /// Flat RGBA bytes, row-major, 4 bytes per pixel.
    pub fn raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Borrow the underlying image (codec boundary).
    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.pixels.as_raw() == other.pixels.as_raw()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PixelBuffer({}×{})", self.width(), self.height())
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Stable layer identity.  Assigned once by the owning [`Document`], never
/// reused or mutated, and survives reordering.
pub type LayerId = u64;

/// Named, orderable raster unit: one pixel buffer plus placement and
/// display flags.
///
/// The buffer is held behind an `Arc` so undo history can keep a removed
/// layer (or a pre-resize buffer) alive without deep-copying pixels.
/// Mutation goes through [`Layer::pixels_mut`], which copy-on-writes the
/// buffer when it is shared.
#[derive(Clone)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    opacity: f32,
    pixels: Arc<PixelBuffer>,
    /// Placement of the buffer's local origin in document space.
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Layer {
    pub fn new(id: LayerId, name: String, width: u32, height: u32, fill_color: Rgba<u8>) -> Self {
        Self::from_buffer(id, name, PixelBuffer::new_filled(width, height, fill_color))
    }

    /// Build a layer around an existing buffer (imported image, loaded
    /// project entry, merge result).
    pub fn from_buffer(id: LayerId, name: String, buffer: PixelBuffer) -> Self {
        Self {
            id,
            name,
            visible: true,
            locked: false,
            opacity: 1.0,
            pixels: Arc::new(buffer),
            offset_x: 0,
            offset_y: 0,
        }
    }

    /// Content edits are gated on the lock flag; metadata toggles are not.
    pub fn is_editable(&self) -> bool {
        !self.locked
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Clamped to `[0, 1]` on write.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Shared handle to the buffer, for commands that must keep this exact
    /// pixel state alive across undo.
    pub fn pixels_arc(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.pixels)
    }

    /// Mutable buffer access.  Copy-on-write: if undo history still holds
    /// the old buffer, the layer gets its own copy and the history's stays
    /// intact.
    pub fn pixels_mut(&mut self) -> &mut PixelBuffer {
        Arc::make_mut(&mut self.pixels)
    }

    /// Swap in a whole replacement buffer (resize undo/redo).
    pub fn replace_pixels(&mut self, buffer: Arc<PixelBuffer>) {
        self.pixels = buffer;
    }

    /// Map a document-space coordinate into this layer's buffer, or `None`
    /// when it falls outside the buffer.
    #[inline]
    pub fn to_local(&self, doc_x: i32, doc_y: i32) -> Option<(u32, u32)> {
        let lx = doc_x - self.offset_x;
        let ly = doc_y - self.offset_y;
        if self.pixels.in_bounds(lx, ly) {
            Some((lx as u32, ly as u32))
        } else {
            None
        }
    }
}

// ============================================================================
// SELECTION — optional document-sized mask gating edits
// ============================================================================

/// Optional per-document selection mask.
///
/// Absent mask means "no restriction" — every document pixel is editable.
/// When present the mask has exactly the document's dimensions and each
/// pixel's low byte (the alpha channel of the packed RGBA value) is the
/// selection weight: 0 = unselected, 255 = fully selected.  `add_rect` /
/// `subtract_rect` only ever write 0 or 255; the byte range is kept for a
/// future soft-selection brush.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    width: u32,
    height: u32,
    mask: Option<PixelBuffer>,
}

impl Selection {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mask: None,
        }
    }

    /// `None` when the selection is inactive (edit anywhere).
    pub fn mask(&self) -> Option<&PixelBuffer> {
        self.mask.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.mask.is_some()
    }

    /// Selection weight at a document coordinate.  Outside the canvas the
    /// weight is 0; with no active mask everything in-canvas is 255.
    pub fn weight_at(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return 0;
        }
        match &self.mask {
            Some(mask) => mask.get(x as u32, y as u32)[3],
            None => 255,
        }
    }

    /// True when a mask exists but selects nothing.
    pub fn is_effectively_empty(&self) -> bool {
        match &self.mask {
            Some(mask) => mask.raw().chunks_exact(4).all(|px| px[3] == 0),
            None => false,
        }
    }

    /// Mark every pixel in the (inclusive-corner) rectangle selected.
    /// Returns whether any weight actually changed.
    pub fn add_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) -> bool {
        self.paint_rect(x0, y0, x1, y1, 255)
    }

    /// Mark every pixel in the rectangle unselected.
    pub fn subtract_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) -> bool {
        if self.mask.is_some() {
            self.paint_rect(x0, y0, x1, y1, 0)
        } else {
            false
        }
    }

    /// Drop the mask entirely — back to "no restriction".  Returns whether
    /// a mask was active.
    pub fn clear(&mut self) -> bool {
        self.mask.take().is_some()
    }

    fn paint_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, weight: u8) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let min_x = x0.min(x1).max(0) as u32;
        let min_y = y0.min(y1).max(0) as u32;
        let max_x = (x0.max(x1) as i64).min(self.width as i64 - 1);
        let max_y = (y0.max(y1) as i64).min(self.height as i64 - 1);
        if max_x < min_x as i64 || max_y < min_y as i64 {
            return false;
        }
        let mask = self
            .mask
            .get_or_insert_with(|| PixelBuffer::new(self.width, self.height));
        let value = Rgba([weight, weight, weight, weight]);
        let mut changed = false;
        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                if mask.get(x, y)[3] != weight {
                    mask.set(x, y, value);
                    changed = true;
                }
            }
        }
        changed
    }
}

// ============================================================================
// DOCUMENT — ordered layer stack + selection
// ============================================================================

/// Single open document: canvas dimensions, the bottom-to-top layer stack,
/// and the active selection.
///
/// Index 0 is the bottom-most layer; the compositor walks the stack in
/// index order.  Layer ids are unique for the document's whole lifetime —
/// the id counter only resets when a brand-new document is created.
pub struct Document {
    pub id: Uuid,
    width: u32,
    height: u32,
    dpi: u32,
    layers: Vec<Layer>,
    selection: Selection,
    next_layer_id: LayerId,
    /// Bumped on every committed mutation so a shell can invalidate caches.
    revision: u64,
}

impl Document {
    /// Create a document with a single white "Background" layer.
    pub fn new(width: u32, height: u32, dpi: u32) -> Self {
        let mut doc = Self::empty(width, height, dpi);
        let id = doc.alloc_layer_id();
        let white = Rgba([255, 255, 255, 255]);
        doc.layers
            .push(Layer::new(id, "Background".to_string(), width, height, white));
        doc
    }

    /// Create a document with no layers at all (project loading).
    pub fn empty(width: u32, height: u32, dpi: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            width,
            height,
            dpi,
            layers: Vec::new(),
            selection: Selection::new(width, height),
            next_layer_id: 1,
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn layer_index_by_id(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer_by_id_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Next never-used layer id.  Monotonic; ids are not recycled when a
    /// layer is removed.
    pub fn alloc_layer_id(&mut self) -> LayerId {
        let id = self.next_layer_id;
        self.next_layer_id += 1;
        id
    }

    /// Used by the project loader so ids from the manifest stay stable.
    pub fn reserve_layer_ids_through(&mut self, id: LayerId) {
        if id >= self.next_layer_id {
            self.next_layer_id = id + 1;
        }
    }

    /// Insert at `index`, shifting everything above up one slot.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) {
        debug_assert!(
            self.layer_index_by_id(layer.id).is_none(),
            "duplicate layer id {}",
            layer.id
        );
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
    }

    pub fn remove_layer(&mut self, index: usize) -> Option<Layer> {
        if index < self.layers.len() {
            Some(self.layers.remove(index))
        } else {
            None
        }
    }

    /// Move the layer at `from` so it ends up at index `to`.
    pub fn reorder_layer(&mut self, from: usize, to: usize) {
        if from < self.layers.len() && to < self.layers.len() && from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }
}

// ============================================================================
// TESTS
// ============================================================================
