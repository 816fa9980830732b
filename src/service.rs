//! Editor orchestration — the single mutation entry point a GUI shell
//! drives.
//!
//! [`EditorService`] owns the live [`Document`], the active-layer index and
//! the [`HistoryManager`].  Every user intent is validated here first
//! (lock checks, bounds checks, selection gating); only then is an
//! [`EditCommand`] built and executed through the history.  Invalid intents
//! fail fast with an [`EditorError`] before any command exists; harmless
//! ones (out-of-bounds clicks, redundant value sets, empty strokes) are
//! silent no-ops that push nothing and notify nobody.
//!
//! Exactly one change notification is raised per logical mutation,
//! including one per undo/redo that actually executes.  All calls must come
//! from one thread; the core has no internal synchronization.

use std::sync::Arc;

use image::Rgba;

use crate::canvas::{Document, Layer, PixelBuffer, TRANSPARENT};
use crate::components::history::{EditCommand, HistoryManager};
use crate::compositor;
use crate::io::{ArchiveStore, PixelCodec};
use crate::log_info;
use crate::ops::fill;
use crate::ops::stroke::StrokeBuilder;
use crate::project::{self, ProjectError};

// ============================================================================
// ERRORS — precondition violations, caught before any command is built
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EditorError {
    NoDocument,
    LayerIndexOutOfRange(usize),
    LayerLocked(String),
    CannotMergeBottomLayer,
    CannotRemoveLastLayer,
    InvalidDimensions(u32, u32),
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorError::NoDocument => write!(f, "No document is open"),
            EditorError::LayerIndexOutOfRange(idx) => {
                write!(f, "Layer index {} out of range", idx)
            }
            EditorError::LayerLocked(name) => write!(f, "Layer \"{}\" is locked", name),
            EditorError::CannotMergeBottomLayer => {
                write!(f, "The bottom layer has nothing below it to merge into")
            }
            EditorError::CannotRemoveLastLayer => {
                write!(f, "A document must keep at least one layer")
            }
            EditorError::InvalidDimensions(w, h) => {
                write!(f, "Invalid dimensions {}×{}", w, h)
            }
        }
    }
}

type EditorResult<T = ()> = Result<T, EditorError>;

// ============================================================================
// EDITOR SERVICE
// ============================================================================

pub struct EditorService {
    document: Option<Document>,
    active_layer: usize,
    history: HistoryManager,
    /// "Document changed" observers; invocation order is unspecified.
    observers: Vec<Box<dyn Fn()>>,
    active_stroke: Option<StrokeBuilder>,
}

impl Default for EditorService {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorService {
    pub fn new() -> Self {
        Self::with_history_depth(50)
    }

    pub fn with_history_depth(depth: usize) -> Self {
        Self {
            document: None,
            active_layer: 0,
            history: HistoryManager::new(depth),
            observers: Vec::new(),
            active_stroke: None,
        }
    }

    // ---- document lifecycle -------------------------------------------------

    /// Replace any open document with a fresh one (single white background
    /// layer, empty history, layer ids restarted).
    pub fn new_document(&mut self, width: u32, height: u32, dpi: u32) -> EditorResult {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimensions(width, height));
        }
        log_info!("New document {}×{} @ {} dpi", width, height, dpi);
        self.document = Some(Document::new(width, height, dpi));
        self.active_layer = 0;
        self.active_stroke = None;
        self.history.clear();
        self.notify();
        Ok(())
    }

    pub fn close_document(&mut self) {
        if self.document.take().is_some() {
            self.active_layer = 0;
            self.active_stroke = None;
            self.history.clear();
            self.notify();
        }
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Flatten the current document for display.  Pure read.
    pub fn composite(&self) -> EditorResult<PixelBuffer> {
        Ok(compositor::compose(self.doc()?))
    }

    /// Register a "document changed" callback.  The core guarantees one
    /// invocation per logical mutation, nothing about what changed.
    pub fn on_change(&mut self, callback: impl Fn() + 'static) {
        self.observers.push(Box::new(callback));
    }

    // ---- layer management ---------------------------------------------------

    /// Append a document-sized layer filled with `color` and make it active.
    pub fn add_layer(&mut self, name: &str, color: Rgba<u8>) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let id = doc.alloc_layer_id();
        let layer = Layer::new(id, name.to_string(), doc.width(), doc.height(), color);
        let index = doc.layer_count();
        self.history
            .apply_push(doc, EditCommand::AddLayer { index, layer });
        self.active_layer = index;
        self.notify();
        Ok(())
    }

    /// Append a layer sized from an existing image (import path) and make it
    /// active.
    pub fn add_layer_from_image(
        &mut self,
        name: &str,
        buffer: PixelBuffer,
        offset_x: i32,
        offset_y: i32,
    ) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let id = doc.alloc_layer_id();
        let mut layer = Layer::from_buffer(id, name.to_string(), buffer);
        layer.offset_x = offset_x;
        layer.offset_y = offset_y;
        let index = doc.layer_count();
        self.history
            .apply_push(doc, EditCommand::AddLayer { index, layer });
        self.active_layer = index;
        self.notify();
        Ok(())
    }

    /// Insert a deep copy of the layer directly above the original and make
    /// it active.
    pub fn duplicate_layer(&mut self, index: usize) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let source = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        let mut copy = source.clone();
        copy.name = format!("{} copy", source.name);
        // Deep-copy the pixels; the duplicate must not share the original's buffer
        copy.replace_pixels(Arc::new(source.pixels().clone()));
        copy.id = doc.alloc_layer_id();
        self.history.apply_push(
            doc,
            EditCommand::AddLayer {
                index: index + 1,
                layer: copy,
            },
        );
        self.active_layer = index + 1;
        self.notify();
        Ok(())
    }

    pub fn active_layer_index(&self) -> usize {
        self.active_layer
    }

    pub fn set_active_layer(&mut self, index: usize) -> EditorResult {
        let doc = self.doc()?;
        if index >= doc.layer_count() {
            return Err(EditorError::LayerIndexOutOfRange(index));
        }
        self.active_layer = index;
        Ok(())
    }

    pub fn remove_layer(&mut self, index: usize) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        if doc.layer_count() == 1 {
            return Err(EditorError::CannotRemoveLastLayer);
        }
        let layer = layer.clone();
        self.history
            .apply_push(doc, EditCommand::RemoveLayer { index, layer });
        self.clamp_active_layer();
        self.notify();
        Ok(())
    }

    /// Blend the layer at `index` into the one below it and remove it.
    /// The bottom-most layer has nothing below it — merging it fails.
    pub fn merge_layer_down(&mut self, index: usize) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        if index == 0 {
            if doc.layer(0).is_none() {
                return Err(EditorError::LayerIndexOutOfRange(0));
            }
            return Err(EditorError::CannotMergeBottomLayer);
        }
        let upper = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        let lower = doc
            .layer(index - 1)
            .ok_or(EditorError::LayerIndexOutOfRange(index - 1))?;
        if upper.locked {
            return Err(EditorError::LayerLocked(upper.name.clone()));
        }
        // The merge rewrites the lower layer's pixels, so its lock gates too
        if lower.locked {
            return Err(EditorError::LayerLocked(lower.name.clone()));
        }

        let lower_after = compositor::merge_down(upper, lower);
        let command = EditCommand::MergeDown {
            index,
            upper: upper.clone(),
            lower_id: lower.id,
            lower_before: lower.pixels_arc(),
            lower_after: Arc::new(lower_after),
        };
        self.history.apply_push(doc, command);
        self.active_layer = index - 1;
        self.notify();
        Ok(())
    }

    /// Move the layer at `from` to position `to` in the stack.
    pub fn reorder_layer(&mut self, from: usize, to: usize) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let count = doc.layer_count();
        if from >= count {
            return Err(EditorError::LayerIndexOutOfRange(from));
        }
        if to >= count {
            return Err(EditorError::LayerIndexOutOfRange(to));
        }
        if from == to {
            return Ok(());
        }
        let layer_id = doc
            .layer(from)
            .ok_or(EditorError::LayerIndexOutOfRange(from))?
            .id;
        self.history
            .apply_push(doc, EditCommand::ReorderLayer { layer_id, from, to });
        // Keep the same layer active through the shuffle
        if self.active_layer == from {
            self.active_layer = to;
        } else if from < self.active_layer && self.active_layer <= to {
            self.active_layer -= 1;
        } else if to <= self.active_layer && self.active_layer < from {
            self.active_layer += 1;
        }
        self.notify();
        Ok(())
    }

    // ---- layer properties ---------------------------------------------------

    /// Rename a layer.  Blocked while the layer is locked; setting the name
    /// it already has is a silent no-op.
    pub fn set_layer_name(&mut self, index: usize, name: &str) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if layer.name == name {
            return Ok(());
        }
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        let command = EditCommand::SetName {
            layer_id: layer.id,
            before: layer.name.clone(),
            after: name.to_string(),
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// The lock flag itself stays togglable on a locked layer — it guards
    /// content, not its own switch.
    pub fn set_layer_locked(&mut self, index: usize, locked: bool) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if layer.locked == locked {
            return Ok(());
        }
        let command = EditCommand::SetLocked {
            layer_id: layer.id,
            before: layer.locked,
            after: locked,
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if layer.visible == visible {
            return Ok(());
        }
        let command = EditCommand::SetVisible {
            layer_id: layer.id,
            before: layer.visible,
            after: visible,
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// Opacity is display metadata like visibility — allowed on locked
    /// layers.  The value is clamped to `[0, 1]` before the no-op check.
    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        let opacity = opacity.clamp(0.0, 1.0);
        if layer.opacity() == opacity {
            return Ok(());
        }
        let command = EditCommand::SetOpacity {
            layer_id: layer.id,
            before: layer.opacity(),
            after: opacity,
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// Reposition a layer in document space.  The background layer
    /// (index 0) is exempt: the call is silently ignored.
    pub fn move_layer(&mut self, index: usize, offset_x: i32, offset_y: i32) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if index == 0 {
            return Ok(());
        }
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        if (layer.offset_x, layer.offset_y) == (offset_x, offset_y) {
            return Ok(());
        }
        let command = EditCommand::MoveOffset {
            layer_id: layer.id,
            before: (layer.offset_x, layer.offset_y),
            after: (offset_x, offset_y),
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// Resize a layer's buffer, keeping the overlapping pixels anchored at
    /// the local origin; grown area is transparent.
    pub fn resize_layer(&mut self, index: usize, width: u32, height: u32) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let layer = doc
            .layer(index)
            .ok_or(EditorError::LayerIndexOutOfRange(index))?;
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimensions(width, height));
        }
        let old = layer.pixels();
        if (old.width(), old.height()) == (width, height) {
            return Ok(());
        }
        let mut resized = PixelBuffer::new(width, height);
        for y in 0..height.min(old.height()) {
            for x in 0..width.min(old.width()) {
                resized.set(x, y, old.get(x, y));
            }
        }
        let command = EditCommand::Resize {
            layer_id: layer.id,
            before: layer.pixels_arc(),
            after: Arc::new(resized),
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    // ---- drawing tools ------------------------------------------------------

    /// Start a pencil stroke on the active layer at a document-space point.
    /// Replaces any stroke already in flight.
    pub fn begin_stroke(&mut self, doc_x: i32, doc_y: i32, color: Rgba<u8>) -> EditorResult {
        let layer = self.active_layer_ref()?;
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        let mut stroke = StrokeBuilder::new(layer.id, color);
        stroke.push_point(doc_x, doc_y);
        self.active_stroke = Some(stroke);
        Ok(())
    }

    /// Extend the in-flight stroke.  No-op when no stroke is active.
    pub fn move_stroke(&mut self, doc_x: i32, doc_y: i32) {
        if let Some(stroke) = self.active_stroke.as_mut() {
            stroke.push_point(doc_x, doc_y);
        }
    }

    /// Commit the in-flight stroke as one undoable command.  A stroke whose
    /// every pixel fell outside the layer (or the selection) commits
    /// nothing — no history entry, no notification.
    pub fn end_stroke(&mut self) -> EditorResult {
        let Some(stroke) = self.active_stroke.take() else {
            return Ok(());
        };
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let Some(layer) = doc
            .layer_index_by_id(stroke.layer_id())
            .and_then(|idx| doc.layer(idx))
        else {
            return Ok(());
        };
        let changes = stroke.rasterize(layer, doc.selection());
        if changes.is_empty() {
            return Ok(());
        }
        let command = EditCommand::PixelDiff {
            layer_id: stroke.layer_id(),
            changes,
            label: "Pencil Stroke".to_string(),
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// Bucket fill at a document-space point on the active layer,
    /// constrained by the selection when one is active.  Clicking outside
    /// the layer — or outside the selection — is a silent no-op.
    pub fn bucket_fill(&mut self, doc_x: i32, doc_y: i32, color: Rgba<u8>) -> EditorResult {
        let active = self.active_layer;
        let layer = self.active_layer_ref()?;
        if layer.locked {
            return Err(EditorError::LayerLocked(layer.name.clone()));
        }
        let layer_id = layer.id;
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        let Some(layer) = doc.layer(active) else {
            return Ok(());
        };

        let Some((lx, ly)) = layer.to_local(doc_x, doc_y) else {
            return Ok(());
        };
        let offset = (layer.offset_x, layer.offset_y);
        // Dry-run first: the command is only built once we know the fill
        // does something
        let changes = if doc.selection().is_active() {
            fill::flood_fill_masked_collect(
                layer.pixels(),
                doc.selection(),
                offset,
                lx as i32,
                ly as i32,
                color,
            )
        } else {
            fill::flood_fill_collect(layer.pixels(), lx as i32, ly as i32, color)
        };
        if changes.is_empty() {
            return Ok(());
        }
        let command = EditCommand::PixelDiff {
            layer_id,
            changes,
            label: "Bucket Fill".to_string(),
        };
        self.history.apply_push(doc, command);
        self.notify();
        Ok(())
    }

    /// Read the active layer's pixel at a document-space point.  Out of
    /// bounds reads the transparent sentinel.  Never touches history.
    pub fn pick_color_at(&self, doc_x: i32, doc_y: i32) -> EditorResult<Rgba<u8>> {
        let layer = self.active_layer_ref()?;
        Ok(match layer.to_local(doc_x, doc_y) {
            Some((lx, ly)) => layer.pixels().get(lx, ly),
            None => TRANSPARENT,
        })
    }

    // ---- selection ----------------------------------------------------------

    pub fn select_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        if doc.selection_mut().add_rect(x0, y0, x1, y1) {
            self.notify();
        }
        Ok(())
    }

    pub fn deselect_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        if doc.selection_mut().subtract_rect(x0, y0, x1, y1) {
            self.notify();
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) -> EditorResult {
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        if doc.selection_mut().clear() {
            self.notify();
        }
        Ok(())
    }

    // ---- undo / redo --------------------------------------------------------

    /// Returns whether a command was undone.  Empty stack is a quiet no-op
    /// with no notification.
    pub fn undo(&mut self) -> bool {
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        match self.history.undo(doc) {
            Some(_) => {
                self.clamp_active_layer();
                self.notify();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        match self.history.redo(doc) {
            Some(_) => {
                self.clamp_active_layer();
                self.notify();
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- persistence --------------------------------------------------------

    /// Write the current document through the archive/codec collaborators.
    pub fn save_project(
        &self,
        store: &mut dyn ArchiveStore,
        codec: &dyn PixelCodec,
    ) -> Result<(), ProjectError> {
        let doc = self.doc().map_err(|_| ProjectError::NoDocument)?;
        project::save_document(doc, store, codec)
    }

    /// Replace the open document with one loaded from a project container.
    /// History is cleared; layer ids from the manifest are preserved.
    pub fn load_project(
        &mut self,
        store: &dyn ArchiveStore,
        codec: &dyn PixelCodec,
    ) -> Result<(), ProjectError> {
        let doc = project::load_document(store, codec)?;
        self.document = Some(doc);
        self.active_layer = 0;
        self.active_stroke = None;
        self.history.clear();
        self.notify();
        Ok(())
    }

    // ---- internals ----------------------------------------------------------

    fn doc(&self) -> EditorResult<&Document> {
        self.document.as_ref().ok_or(EditorError::NoDocument)
    }

    fn active_layer_ref(&self) -> EditorResult<&Layer> {
        let doc = self.doc()?;
        doc.layer(self.active_layer)
            .ok_or(EditorError::LayerIndexOutOfRange(self.active_layer))
    }

    /// Undo/redo of structural commands can shrink the stack under the
    /// active index.
    fn clamp_active_layer(&mut self) {
        if let Some(doc) = self.document.as_ref() {
            let count = doc.layer_count();
            if count > 0 && self.active_layer >= count {
                self.active_layer = count - 1;
            }
        }
    }

    /// One notification per logical mutation; also bumps the document
    /// revision so shells can invalidate caches.
    fn notify(&mut self) {
        if let Some(doc) = self.document.as_mut() {
            doc.bump_revision();
        }
        for observer in &self.observers {
            observer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// Service with an open 8×8 document and a notification counter.
    fn editor_with_counter() -> (EditorService, Rc<Cell<usize>>) {
        let mut editor = EditorService::new();
        editor.new_document(8, 8, 96).unwrap();
        let counter = Rc::new(Cell::new(0));
        let c = Rc::clone(&counter);
        editor.on_change(move || c.set(c.get() + 1));
        (editor, counter)
    }

    #[test]
    fn operations_without_document_fail() {
        let mut editor = EditorService::new();
        assert_eq!(editor.add_layer("L", RED), Err(EditorError::NoDocument));
        assert_eq!(editor.bucket_fill(0, 0, RED), Err(EditorError::NoDocument));
        assert_eq!(editor.pick_color_at(0, 0), Err(EditorError::NoDocument));
        assert!(!editor.undo());
    }

    #[test]
    fn set_active_layer_validates_index() {
        let (mut editor, _) = editor_with_counter();
        assert_eq!(
            editor.set_active_layer(1),
            Err(EditorError::LayerIndexOutOfRange(1))
        );
        editor.add_layer("L2", TRANSPARENT).unwrap();
        assert_eq!(editor.active_layer_index(), 1);
        assert!(editor.set_active_layer(0).is_ok());
    }

    #[test]
    fn one_notification_per_logical_edit() {
        let (mut editor, counter) = editor_with_counter();

        editor.add_layer("Paint", TRANSPARENT).unwrap();
        assert_eq!(counter.get(), 1);

        editor.bucket_fill(3, 3, RED).unwrap();
        assert_eq!(counter.get(), 2);

        assert!(editor.undo());
        assert_eq!(counter.get(), 3);
        assert!(editor.redo());
        assert_eq!(counter.get(), 4);

        // Exhausted stacks stay silent
        assert!(!editor.redo());
        assert_eq!(counter.get(), 4);
    }

    #[test]
    fn redundant_value_sets_are_silent_noops() {
        let (mut editor, counter) = editor_with_counter();
        let baseline = counter.get();

        editor.set_layer_visible(0, true).unwrap();
        editor.set_layer_locked(0, false).unwrap();
        editor.set_layer_name(0, "Background").unwrap();
        editor.set_layer_opacity(0, 1.0).unwrap();
        assert_eq!(counter.get(), baseline);
        assert!(!editor.can_undo());

        editor.set_layer_visible(0, false).unwrap();
        assert_eq!(counter.get(), baseline + 1);
        assert!(editor.can_undo());
    }

    #[test]
    fn locked_layer_blocks_content_edits_only() {
        let (mut editor, _) = editor_with_counter();
        editor.add_layer("Art", TRANSPARENT).unwrap();
        editor.set_layer_locked(1, true).unwrap();

        assert!(matches!(
            editor.bucket_fill(1, 1, RED),
            Err(EditorError::LayerLocked(_))
        ));
        assert!(matches!(
            editor.begin_stroke(1, 1, RED),
            Err(EditorError::LayerLocked(_))
        ));
        assert!(matches!(
            editor.set_layer_name(1, "Other"),
            Err(EditorError::LayerLocked(_))
        ));
        assert!(matches!(
            editor.remove_layer(1),
            Err(EditorError::LayerLocked(_))
        ));
        assert!(matches!(
            editor.move_layer(1, 3, 3),
            Err(EditorError::LayerLocked(_))
        ));

        // Metadata toggles stay available on a locked layer
        editor.set_layer_visible(1, false).unwrap();
        editor.set_layer_opacity(1, 0.5).unwrap();
        editor.set_layer_locked(1, false).unwrap();
    }

    #[test]
    fn merge_bottom_layer_fails() {
        let (mut editor, _) = editor_with_counter();
        assert_eq!(
            editor.merge_layer_down(0),
            Err(EditorError::CannotMergeBottomLayer)
        );
    }

    #[test]
    fn cannot_remove_last_layer() {
        let (mut editor, _) = editor_with_counter();
        assert_eq!(
            editor.remove_layer(0),
            Err(EditorError::CannotRemoveLastLayer)
        );
    }

    #[test]
    fn background_is_exempt_from_move() {
        let (mut editor, counter) = editor_with_counter();
        let baseline = counter.get();
        editor.move_layer(0, 5, 5).unwrap();
        assert_eq!(counter.get(), baseline);
        assert!(!editor.can_undo());
        let bg = &editor.document().unwrap().layers()[0];
        assert_eq!((bg.offset_x, bg.offset_y), (0, 0));
    }

    #[test]
    fn move_to_same_offset_is_noop() {
        let (mut editor, counter) = editor_with_counter();
        editor.add_layer("L", TRANSPARENT).unwrap();
        editor.move_layer(1, 2, 3).unwrap();
        let after_move = counter.get();
        editor.move_layer(1, 2, 3).unwrap();
        assert_eq!(counter.get(), after_move);
    }

    #[test]
    fn out_of_bounds_click_is_silent() {
        let (mut editor, counter) = editor_with_counter();
        let baseline = counter.get();
        editor.bucket_fill(50, 50, RED).unwrap();
        editor.bucket_fill(-1, 2, RED).unwrap();
        assert_eq!(counter.get(), baseline);
        assert!(!editor.can_undo());
    }

    #[test]
    fn bucket_fill_misses_outside_selection() {
        let (mut editor, counter) = editor_with_counter();
        editor.add_layer("Paint", TRANSPARENT).unwrap();
        editor.select_rect(0, 0, 3, 3).unwrap();
        let baseline = counter.get();

        editor.bucket_fill(6, 6, RED).unwrap();
        assert_eq!(counter.get(), baseline);
        assert!(!editor.can_undo());

        editor.bucket_fill(1, 1, RED).unwrap();
        assert_eq!(counter.get(), baseline + 1);
        let layer = &editor.document().unwrap().layers()[1];
        assert_eq!(layer.pixels().get(1, 1), RED);
        assert_eq!(layer.pixels().get(6, 6), TRANSPARENT);
    }

    #[test]
    fn empty_and_stray_strokes_commit_nothing() {
        let (mut editor, counter) = editor_with_counter();
        let baseline = counter.get();

        // end without begin
        editor.end_stroke().unwrap();
        // moves without begin
        editor.move_stroke(1, 1);
        // entirely off-canvas stroke
        editor.begin_stroke(-5, -5, RED).unwrap();
        editor.move_stroke(-2, -7);
        editor.end_stroke().unwrap();

        assert_eq!(counter.get(), baseline);
        assert!(!editor.can_undo());
    }

    #[test]
    fn stroke_commits_one_command() {
        let (mut editor, counter) = editor_with_counter();
        editor.add_layer("Paint", TRANSPARENT).unwrap();
        let baseline = counter.get();

        editor.begin_stroke(1, 1, RED).unwrap();
        editor.move_stroke(4, 1);
        editor.end_stroke().unwrap();
        assert_eq!(counter.get(), baseline + 1);

        let layer = &editor.document().unwrap().layers()[1];
        for x in 1..=4 {
            assert_eq!(layer.pixels().get(x, 1), RED);
        }
        assert_eq!(
            editor.history().undo_description().as_deref(),
            Some("Pencil Stroke")
        );
    }

    #[test]
    fn pick_color_reads_without_history() {
        let (mut editor, counter) = editor_with_counter();
        editor.add_layer("Paint", TRANSPARENT).unwrap();
        editor.bucket_fill(0, 0, RED).unwrap();
        let baseline = counter.get();

        assert_eq!(editor.pick_color_at(3, 3), Ok(RED));
        assert_eq!(editor.pick_color_at(100, 3), Ok(TRANSPARENT));
        assert_eq!(counter.get(), baseline);
    }

    #[test]
    fn duplicate_layer_deep_copies_pixels() {
        let (mut editor, _) = editor_with_counter();
        editor.add_layer("Paint", TRANSPARENT).unwrap();
        editor.bucket_fill(0, 0, RED).unwrap();
        editor.duplicate_layer(1).unwrap();
        assert_eq!(editor.active_layer_index(), 2);

        editor.bucket_fill(0, 0, WHITE).unwrap();
        let doc = editor.document().unwrap();
        assert_eq!(doc.layers()[1].pixels().get(0, 0), RED);
        assert_eq!(doc.layers()[2].pixels().get(0, 0), WHITE);
        assert_eq!(doc.layers()[2].name, "Paint copy");
        assert_ne!(doc.layers()[1].id, doc.layers()[2].id);
    }

    #[test]
    fn reorder_tracks_active_layer() {
        let (mut editor, _) = editor_with_counter();
        editor.add_layer("A", TRANSPARENT).unwrap();
        editor.add_layer("B", TRANSPARENT).unwrap();
        editor.set_active_layer(2).unwrap();
        editor.reorder_layer(2, 0).unwrap();
        assert_eq!(editor.active_layer_index(), 0);
        assert_eq!(editor.document().unwrap().layers()[0].name, "B");
    }

    #[test]
    fn resize_layer_preserves_overlap() {
        let (mut editor, _) = editor_with_counter();
        editor.add_layer("Paint", TRANSPARENT).unwrap();
        editor.bucket_fill(0, 0, RED).unwrap();
        editor.resize_layer(1, 4, 12).unwrap();

        let layer = &editor.document().unwrap().layers()[1];
        assert_eq!((layer.pixels().width(), layer.pixels().height()), (4, 12));
        assert_eq!(layer.pixels().get(3, 7), RED);
        assert_eq!(layer.pixels().get(3, 8), TRANSPARENT);

        editor.undo();
        let layer = &editor.document().unwrap().layers()[1];
        assert_eq!((layer.pixels().width(), layer.pixels().height()), (8, 8));
    }

    #[test]
    fn undo_clamps_active_layer() {
        let (mut editor, _) = editor_with_counter();
        editor.add_layer("A", TRANSPARENT).unwrap();
        assert_eq!(editor.active_layer_index(), 1);
        editor.undo();
        assert_eq!(editor.active_layer_index(), 0);
    }
}
