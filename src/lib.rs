//! PaintKit — the document/layer editing core behind a raster paint
//! application.
//!
//! This crate owns the pieces a GUI shell should never have to reimplement:
//! the layered [`Document`] model, the straight-alpha [`compositor`], the
//! flood-fill and stroke-rasterization engines, the command-based undo/redo
//! history, and the project persistence layer (one codec entry per layer
//! plus a binary manifest, written through an [`io::ArchiveStore`]).
//!
//! The shell talks to a single entry point, [`EditorService`], which
//! validates every user intent, turns it into an [`EditCommand`], runs it
//! through the [`HistoryManager`], and raises one change notification per
//! logical edit.  All calls are synchronous and must come from one thread;
//! the core has no internal locking.

pub mod logger;

pub mod canvas;
pub mod compositor;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod service;

pub use canvas::{Document, Layer, PixelBuffer, Selection};
pub use components::history::{EditCommand, HistoryManager, PixelChange};
pub use ops::stroke::StrokeBuilder;
pub use project::{ProjectError, ProjectManifest};
pub use service::{EditorError, EditorService};
