//! Undoable commands and the bounded undo/redo history.
//!
//! Every user-visible edit is one [`EditCommand`] — a closed sum type over
//! the distinct command kinds, each carrying exactly the before/after
//! payload its `undo`/`redo` pair needs.  Pixel edits (strokes, bucket
//! fills) share the `PixelDiff` kind: a list of per-pixel before/after
//! colors rather than whole-buffer snapshots, so undo is exact and cheap.
//!
//! Commands are only constructed after the orchestrator has validated all
//! preconditions; once pushed they are assumed re-appliable, and repeated
//! undo/redo cycles always converge to the same state.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use image::Rgba;

use crate::canvas::{Document, Layer, LayerId, PixelBuffer};
use crate::log_warn;

// ============================================================================
// PIXEL CHANGE — minimal unit of a pixel-level diff
// ============================================================================

/// One pixel's edit in layer-local coordinates: the color it had before the
/// operation and the color it has after.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelChange {
    pub x: u32,
    pub y: u32,
    pub before: Rgba<u8>,
    pub after: Rgba<u8>,
}

// ============================================================================
// EDIT COMMAND
// ============================================================================

/// A reversible record of one user-visible edit.
///
/// Layers are addressed by stable id, not index, wherever the command
/// survives structural edits around it.  Structural commands that remove a
/// layer keep the removed [`Layer`] itself — its pixel buffer is an `Arc`,
/// so this holds the pixels alive without a deep copy.
pub enum EditCommand {
    /// Shared by stroke and bucket fill: write `after` (redo) or `before`
    /// (undo) for every recorded pixel of the addressed layer.
    PixelDiff {
        layer_id: LayerId,
        changes: Vec<PixelChange>,
        label: String,
    },
    AddLayer {
        index: usize,
        layer: Layer,
    },
    RemoveLayer {
        /// Original position, so undo re-inserts at the same place.
        index: usize,
        layer: Layer,
    },
    ReorderLayer {
        layer_id: LayerId,
        from: usize,
        to: usize,
    },
    /// Merge is not reversed by re-computing the blend (that would be
    /// lossy): undo restores the removed upper layer verbatim and swaps the
    /// lower layer's pre-merge buffer back in.
    MergeDown {
        /// The merged-away upper layer and its original index.
        index: usize,
        upper: Layer,
        lower_id: LayerId,
        lower_before: Arc<PixelBuffer>,
        lower_after: Arc<PixelBuffer>,
    },
    SetLocked {
        layer_id: LayerId,
        before: bool,
        after: bool,
    },
    SetVisible {
        layer_id: LayerId,
        before: bool,
        after: bool,
    },
    SetOpacity {
        layer_id: LayerId,
        before: f32,
        after: f32,
    },
    SetName {
        layer_id: LayerId,
        before: String,
        after: String,
    },
    MoveOffset {
        layer_id: LayerId,
        before: (i32, i32),
        after: (i32, i32),
    },
    Resize {
        layer_id: LayerId,
        before: Arc<PixelBuffer>,
        after: Arc<PixelBuffer>,
    },
}

impl EditCommand {
    /// Apply the forward effect.
    pub fn redo(&self, doc: &mut Document) {
        self.apply(doc, true);
    }

    /// Apply the inverse effect.
    pub fn undo(&self, doc: &mut Document) {
        self.apply(doc, false);
    }

    fn apply(&self, doc: &mut Document, forward: bool) {
        match self {
            EditCommand::PixelDiff {
                layer_id, changes, ..
            } => {
                let Some(layer) = doc.layer_by_id_mut(*layer_id) else {
                    log_warn!("PixelDiff: layer {} no longer exists", layer_id);
                    return;
                };
                let buf = layer.pixels_mut();
                for ch in changes {
                    if ch.x < buf.width() && ch.y < buf.height() {
                        buf.set(ch.x, ch.y, if forward { ch.after } else { ch.before });
                    }
                }
            }
            EditCommand::AddLayer { index, layer } => {
                if forward {
                    doc.insert_layer(*index, layer.clone());
                } else if let Some(idx) = doc.layer_index_by_id(layer.id) {
                    doc.remove_layer(idx);
                }
            }
            EditCommand::RemoveLayer { index, layer } => {
                if forward {
                    if let Some(idx) = doc.layer_index_by_id(layer.id) {
                        doc.remove_layer(idx);
                    }
                } else {
                    doc.insert_layer(*index, layer.clone());
                }
            }
            EditCommand::ReorderLayer { from, to, .. } => {
                if forward {
                    doc.reorder_layer(*from, *to);
                } else {
                    doc.reorder_layer(*to, *from);
                }
            }
            EditCommand::MergeDown {
                index,
                upper,
                lower_id,
                lower_before,
                lower_after,
            } => {
                if forward {
                    if let Some(idx) = doc.layer_index_by_id(upper.id) {
                        doc.remove_layer(idx);
                    }
                    if let Some(lower) = doc.layer_by_id_mut(*lower_id) {
                        lower.replace_pixels(Arc::clone(lower_after));
                    }
                } else {
                    if let Some(lower) = doc.layer_by_id_mut(*lower_id) {
                        lower.replace_pixels(Arc::clone(lower_before));
                    }
                    doc.insert_layer(*index, upper.clone());
                }
            }
            EditCommand::SetLocked {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    layer.locked = if forward { *after } else { *before };
                }
            }
            EditCommand::SetVisible {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    layer.visible = if forward { *after } else { *before };
                }
            }
            EditCommand::SetOpacity {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    layer.set_opacity(if forward { *after } else { *before });
                }
            }
            EditCommand::SetName {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    layer.name = if forward { after.clone() } else { before.clone() };
                }
            }
            EditCommand::MoveOffset {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    let (x, y) = if forward { *after } else { *before };
                    layer.offset_x = x;
                    layer.offset_y = y;
                }
            }
            EditCommand::Resize {
                layer_id,
                before,
                after,
            } => {
                if let Some(layer) = doc.layer_by_id_mut(*layer_id) {
                    layer.replace_pixels(Arc::clone(if forward { after } else { before }));
                }
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            EditCommand::PixelDiff { label, .. } => label.clone(),
            EditCommand::AddLayer { layer, .. } => format!("Add Layer \"{}\"", layer.name),
            EditCommand::RemoveLayer { layer, .. } => format!("Delete Layer \"{}\"", layer.name),
            EditCommand::ReorderLayer { .. } => "Reorder Layer".to_string(),
            EditCommand::MergeDown { upper, .. } => format!("Merge Down \"{}\"", upper.name),
            EditCommand::SetLocked { after, .. } => {
                if *after { "Lock Layer" } else { "Unlock Layer" }.to_string()
            }
            EditCommand::SetVisible { after, .. } => {
                if *after { "Show Layer" } else { "Hide Layer" }.to_string()
            }
            EditCommand::SetOpacity { .. } => "Layer Opacity".to_string(),
            EditCommand::SetName { after, .. } => format!("Rename Layer to \"{}\"", after),
            EditCommand::MoveOffset { .. } => "Move Layer".to_string(),
            EditCommand::Resize { .. } => "Resize Layer".to_string(),
        }
    }

    /// Approximate retained bytes, for the history memory cap.
    pub fn memory_size(&self) -> usize {
        match self {
            EditCommand::PixelDiff { changes, .. } => {
                changes.len() * mem::size_of::<PixelChange>()
            }
            EditCommand::AddLayer { layer, .. } | EditCommand::RemoveLayer { layer, .. } => {
                layer.pixels().memory_bytes() + layer.name.len()
            }
            EditCommand::MergeDown {
                upper,
                lower_before,
                lower_after,
                ..
            } => {
                upper.pixels().memory_bytes()
                    + lower_before.memory_bytes()
                    + lower_after.memory_bytes()
            }
            EditCommand::Resize { before, after, .. } => {
                before.memory_bytes() + after.memory_bytes()
            }
            EditCommand::SetName { before, after, .. } => before.len() + after.len(),
            _ => mem::size_of::<Self>(),
        }
    }
}

// ============================================================================
// HISTORY MANAGER — bounded two-stack undo/redo
// ============================================================================

pub struct HistoryManager {
    undo_stack: VecDeque<EditCommand>,
    redo_stack: VecDeque<EditCommand>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
        }
    }

    /// Override the byte cap (`None` disables it).
    pub fn set_memory_limit(&mut self, max_bytes: Option<usize>) {
        self.max_memory_bytes = max_bytes;
        self.prune();
    }

    /// Execute `command` against `doc` and record it.  Pushing always clears
    /// the redo stack; the depth and memory bounds then evict the oldest
    /// entries (dropped, not undone — they become permanently unreachable).
    pub fn apply_push(&mut self, doc: &mut Document, command: EditCommand) {
        command.redo(doc);

        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    /// Undo the most recent command.  Returns its description, or `None`
    /// when the stack is empty (a no-op, never an error).
    pub fn undo(&mut self, doc: &mut Document) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(doc);
        self.redo_stack.push_back(command);
        Some(description)
    }

    /// Re-apply the most recently undone command.
    pub fn redo(&mut self, doc: &mut Document) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(doc);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undo descriptions, most recent first (history panel).
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Current retained bytes across both stacks (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Empty both stacks (document replaced or closed).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Evict oldest commands to stay within the depth and memory limits.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }
}
