//! Project persistence — one codec entry per layer plus a binary manifest.
//!
//! The container mapping this module dictates is deliberately small: each
//! layer's pixel buffer becomes one [`ArchiveStore`] entry named
//! `layers/<id>.<ext>`, and a single `manifest.bin` entry (bincode-encoded
//! [`ProjectManifest`]) records the canvas geometry and per-layer metadata,
//! including an FNV-1a content hash of the raw pixels.  Everything else —
//! zip vs. directory, compression, file paths — belongs to the shell.
//!
//! Load resilience: a layer entry that is missing, undecodable, the wrong
//! size, or hash-mismatched is skipped with a warning and the rest of the
//! document still loads.  A missing or corrupt manifest aborts the whole
//! open operation.

use serde::{Deserialize, Serialize};

use crate::canvas::{Document, Layer};
use crate::io::{ArchiveStore, PixelCodec};
use crate::{log_info, log_warn};

/// Name of the manifest entry inside the container.
pub const MANIFEST_ENTRY: &str = "manifest.bin";

const MANIFEST_VERSION: u32 = 1;

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for project save/load operations.
#[derive(Debug)]
pub enum ProjectError {
    MissingEntry(String),
    NotWritable,
    Codec(String),
    Serialize(String),
    InvalidManifest(String),
    NoDocument,
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::MissingEntry(name) => write!(f, "Missing archive entry: {}", name),
            ProjectError::NotWritable => write!(f, "Archive is not writable"),
            ProjectError::Codec(e) => write!(f, "Codec error: {}", e),
            ProjectError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ProjectError::InvalidManifest(e) => write!(f, "Invalid manifest: {}", e),
            ProjectError::NoDocument => write!(f, "No document is open"),
        }
    }
}

impl From<Box<bincode::ErrorKind>> for ProjectError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ProjectError::Serialize(e.to_string())
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectManifest {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub layers: Vec<LayerManifest>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LayerManifest {
    pub id: u64,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: u32,
    pub height: u32,
    /// FNV-1a over the raw RGBA bytes, checked on load.
    pub content_hash: u64,
    /// Container entry holding this layer's encoded pixels.
    pub entry: String,
}

/// Build the manifest for a document without writing anything.
pub fn build_manifest(doc: &Document, codec: &dyn PixelCodec) -> ProjectManifest {
    let layers = doc
        .layers()
        .iter()
        .map(|layer| LayerManifest {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            locked: layer.locked,
            opacity: layer.opacity(),
            offset_x: layer.offset_x,
            offset_y: layer.offset_y,
            width: layer.pixels().width(),
            height: layer.pixels().height(),
            content_hash: fnv1a_64(layer.pixels().raw()),
            entry: format!("layers/{}.{}", layer.id, codec.extension()),
        })
        .collect();

    ProjectManifest {
        version: MANIFEST_VERSION,
        width: doc.width(),
        height: doc.height(),
        dpi: doc.dpi(),
        layers,
    }
}

// ============================================================================
// SAVE / LOAD
// ============================================================================

/// Write every layer plus the manifest into the container.
pub fn save_document(
    doc: &Document,
    store: &mut dyn ArchiveStore,
    codec: &dyn PixelCodec,
) -> Result<(), ProjectError> {
    let manifest = build_manifest(doc, codec);

    for (layer, entry) in doc.layers().iter().zip(&manifest.layers) {
        let bytes = codec.encode(layer.pixels())?;
        store.write_entry(&entry.entry, &bytes)?;
    }

    let manifest_bytes = bincode::serialize(&manifest)?;
    store.write_entry(MANIFEST_ENTRY, &manifest_bytes)?;
    log_info!(
        "Saved project: {} layer(s), {}×{}",
        manifest.layers.len(),
        manifest.width,
        manifest.height
    );
    Ok(())
}

/// Rebuild a document from the container.  Per-layer failures are skipped
/// with a warning; manifest failures abort.
pub fn load_document(
    store: &dyn ArchiveStore,
    codec: &dyn PixelCodec,
) -> Result<Document, ProjectError> {
    let manifest_bytes = store.read_entry(MANIFEST_ENTRY)?;
    let manifest: ProjectManifest = bincode::deserialize(&manifest_bytes)
        .map_err(|e| ProjectError::InvalidManifest(e.to_string()))?;

    if manifest.version != MANIFEST_VERSION {
        return Err(ProjectError::InvalidManifest(format!(
            "unsupported version {}",
            manifest.version
        )));
    }
    if manifest.width == 0 || manifest.height == 0 {
        return Err(ProjectError::InvalidManifest(format!(
            "bad canvas size {}×{}",
            manifest.width, manifest.height
        )));
    }

    let mut doc = Document::empty(manifest.width, manifest.height, manifest.dpi);
    for entry in &manifest.layers {
        if doc.layer_index_by_id(entry.id).is_some() {
            log_warn!("Skipping layer \"{}\": duplicate id {}", entry.name, entry.id);
            continue;
        }
        match load_layer(store, codec, entry) {
            Ok(layer) => {
                doc.reserve_layer_ids_through(entry.id);
                let index = doc.layer_count();
                doc.insert_layer(index, layer);
            }
            Err(e) => {
                log_warn!("Skipping layer \"{}\": {}", entry.name, e);
            }
        }
    }
    log_info!(
        "Loaded project: {} of {} layer(s), {}×{}",
        doc.layer_count(),
        manifest.layers.len(),
        manifest.width,
        manifest.height
    );
    Ok(doc)
}

fn load_layer(
    store: &dyn ArchiveStore,
    codec: &dyn PixelCodec,
    entry: &LayerManifest,
) -> Result<Layer, ProjectError> {
    let bytes = store.read_entry(&entry.entry)?;
    let pixels = codec.decode(&bytes)?;
    if (pixels.width(), pixels.height()) != (entry.width, entry.height) {
        return Err(ProjectError::Codec(format!(
            "dimension mismatch: manifest says {}×{}, entry decodes to {}×{}",
            entry.width,
            entry.height,
            pixels.width(),
            pixels.height()
        )));
    }
    if fnv1a_64(pixels.raw()) != entry.content_hash {
        return Err(ProjectError::Codec("content hash mismatch".to_string()));
    }

    let mut layer = Layer::from_buffer(entry.id, entry.name.clone(), pixels);
    layer.visible = entry.visible;
    layer.locked = entry.locked;
    layer.set_opacity(entry.opacity);
    layer.offset_x = entry.offset_x;
    layer.offset_y = entry.offset_y;
    Ok(layer)
}

/// 64-bit FNV-1a.  Fast, dependency-free, good enough to flag a corrupted
/// or truncated layer entry.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{PixelBuffer, TRANSPARENT};
    use crate::io::{MemoryArchive, PngCodec};
    use image::Rgba;

    fn sample_document() -> Document {
        let mut doc = Document::new(6, 4, 300);
        let id = doc.alloc_layer_id();
        let mut layer = Layer::new(id, "Ink".into(), 3, 3, TRANSPARENT);
        layer.pixels_mut().set(1, 1, Rgba([10, 20, 30, 200]));
        layer.offset_x = 2;
        layer.offset_y = 1;
        layer.visible = false;
        layer.set_opacity(0.25);
        doc.insert_layer(1, layer);
        doc.layer_mut(0).unwrap().locked = true;
        doc
    }

    #[test]
    fn save_load_roundtrip() {
        let doc = sample_document();
        let mut store = MemoryArchive::new();
        save_document(&doc, &mut store, &PngCodec).unwrap();
        assert!(store.contains(MANIFEST_ENTRY));

        let loaded = load_document(&store, &PngCodec).unwrap();
        assert_eq!(loaded.width(), 6);
        assert_eq!(loaded.height(), 4);
        assert_eq!(loaded.dpi(), 300);
        assert_eq!(loaded.layer_count(), 2);

        let bg = loaded.layer(0).unwrap();
        assert_eq!(bg.name, "Background");
        assert!(bg.locked);
        assert_eq!(*bg.pixels(), *doc.layer(0).unwrap().pixels());

        let ink = loaded.layer(1).unwrap();
        assert_eq!(ink.id, doc.layer(1).unwrap().id);
        assert!(!ink.visible);
        assert_eq!(ink.opacity(), 0.25);
        assert_eq!((ink.offset_x, ink.offset_y), (2, 1));
        assert_eq!(ink.pixels().get(1, 1), Rgba([10, 20, 30, 200]));
    }

    #[test]
    fn loaded_document_continues_id_sequence() {
        let doc = sample_document();
        let max_id = doc.layers().iter().map(|l| l.id).max().unwrap();
        let mut store = MemoryArchive::new();
        save_document(&doc, &mut store, &PngCodec).unwrap();

        let mut loaded = load_document(&store, &PngCodec).unwrap();
        assert!(loaded.alloc_layer_id() > max_id);
    }

    #[test]
    fn corrupt_layer_entry_is_skipped() {
        let doc = sample_document();
        let mut store = MemoryArchive::new();
        save_document(&doc, &mut store, &PngCodec).unwrap();

        let entry = format!("layers/{}.png", doc.layer(1).unwrap().id);
        store.replace_entry(&entry, vec![0xDE, 0xAD, 0xBE, 0xEF]);

        let loaded = load_document(&store, &PngCodec).unwrap();
        assert_eq!(loaded.layer_count(), 1);
        assert_eq!(loaded.layer(0).unwrap().name, "Background");
    }

    #[test]
    fn hash_mismatch_is_skipped() {
        let doc = sample_document();
        let mut store = MemoryArchive::new();
        save_document(&doc, &mut store, &PngCodec).unwrap();

        // Re-encode different pixels under the same entry name
        let entry = format!("layers/{}.png", doc.layer(1).unwrap().id);
        let imposter = PixelBuffer::new_filled(3, 3, Rgba([1, 1, 1, 1]));
        let bytes = PngCodec.encode(&imposter).unwrap();
        store.replace_entry(&entry, bytes);

        let loaded = load_document(&store, &PngCodec).unwrap();
        assert_eq!(loaded.layer_count(), 1);
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let store = MemoryArchive::new();
        assert!(matches!(
            load_document(&store, &PngCodec),
            Err(ProjectError::MissingEntry(_))
        ));
    }

    #[test]
    fn corrupt_manifest_is_fatal() {
        let doc = sample_document();
        let mut store = MemoryArchive::new();
        save_document(&doc, &mut store, &PngCodec).unwrap();
        store.replace_entry(MANIFEST_ENTRY, vec![0xFF; 7]);
        assert!(matches!(
            load_document(&store, &PngCodec),
            Err(ProjectError::InvalidManifest(_))
        ));
    }
}
