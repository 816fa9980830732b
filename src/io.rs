//! Collaborator seams for project persistence.
//!
//! The core does not open files or drive a zip library itself.  It talks to
//! two small traits: a [`PixelCodec`] that turns a layer's pixel buffer
//! into an opaque lossless byte blob and back, and an [`ArchiveStore`] that
//! maps entry names to byte blobs inside some container.  The shell plugs
//! in its real backends (a zip archive on disk, typically); the crate ships
//! [`PngCodec`] and the in-memory [`MemoryArchive`] used throughout the
//! tests.

use std::collections::BTreeMap;

use image::ImageFormat;
use image::codecs::png::PngEncoder;

use crate::canvas::PixelBuffer;
use crate::project::ProjectError;

// ============================================================================
// CODEC — lossless, alpha-preserving raster encode/decode
// ============================================================================

pub trait PixelCodec {
    /// File extension for entries this codec produces (no dot).
    fn extension(&self) -> &'static str;

    fn encode(&self, pixels: &PixelBuffer) -> Result<Vec<u8>, ProjectError>;

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, ProjectError>;
}

/// PNG round-trips 8-bit straight-alpha RGBA exactly.
pub struct PngCodec;

impl PixelCodec for PngCodec {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, pixels: &PixelBuffer) -> Result<Vec<u8>, ProjectError> {
        let mut out = Vec::new();
        let encoder = PngEncoder::new(&mut out);
        #[allow(deprecated)]
        encoder
            .encode(
                pixels.raw(),
                pixels.width(),
                pixels.height(),
                image::ColorType::Rgba8,
            )
            .map_err(|e| ProjectError::Codec(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, ProjectError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| ProjectError::Codec(e.to_string()))?
            .to_rgba8();
        Ok(PixelBuffer::from_image(image))
    }
}

// ============================================================================
// ARCHIVE STORE — "read/write named entry bytes" container surface
// ============================================================================

pub trait ArchiveStore {
    /// Fails with [`ProjectError::MissingEntry`] when the entry is absent
    /// and with a store error when the container itself is corrupt.
    fn read_entry(&self, name: &str) -> Result<Vec<u8>, ProjectError>;

    /// Fails with [`ProjectError::NotWritable`] on a read-only container.
    fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), ProjectError>;
}

/// In-memory archive backend.  Test double for the shell's zip container;
/// also handy for clipboard-style project transfer.
#[derive(Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Vec<u8>>,
    read_only: bool,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Overwrite an entry's bytes directly (corruption injection in tests).
    pub fn replace_entry(&mut self, name: &str, bytes: Vec<u8>) {
        self.entries.insert(name.to_string(), bytes);
    }

    pub fn remove_entry(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

impl ArchiveStore for MemoryArchive {
    fn read_entry(&self, name: &str) -> Result<Vec<u8>, ProjectError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectError::MissingEntry(name.to_string()))
    }

    fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), ProjectError> {
        if self.read_only {
            return Err(ProjectError::NotWritable);
        }
        self.entries.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
